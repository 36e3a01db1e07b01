//! PostgreSQL implementation of [`Store`] on top of `sqlx`.
//!
//! Every statement runs inside a `db.query` span. Uniqueness is enforced by the
//! database; unique violations are translated into [`Write::Conflict`] using the
//! constraint names declared in `sql/schema.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Postgres, QueryBuilder, Row};
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::{
    escape_like, Admin, AdminDetail, AdminGroup, AdminSort, AdminUser, BootstrapOutcome,
    Conflict, NewUser, Page, PageRequest, Permission, PermissionEntry, PermissionGrant,
    PrincipalRecord, Rejection, Role, Sort, Store, User, UserChanges, UserCredentials, UserFilter,
    UserLink, UserSort, Write, ROOT_GROUP, ROOT_USERNAME,
};

const BOOTSTRAP_LOCK_ID: i64 = 7_310_501;

/// Embedded schema, applied statement by statement by [`apply_schema`].
pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn unique_violation(err: &sqlx::Error) -> Option<Conflict> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if db_err.code().as_deref() != Some("23505") {
        return None;
    }
    match db_err.constraint() {
        Some("users_username_key") => Some(Conflict::Username),
        Some("users_email_key") => Some(Conflict::Email),
        Some("admins_user_id_key") => Some(Conflict::AdminUser),
        Some("permissions_name_key") => Some(Conflict::PermissionName),
        Some("permission_entries_pkey") => Some(Conflict::PermissionEntry),
        _ => None,
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        is_active: row.get("is_active"),
    }
}

fn user_sort_column(field: UserSort) -> &'static str {
    match field {
        UserSort::Id => "u.id",
        UserSort::Username => "u.username",
        UserSort::Email => "u.email",
        UserSort::IsActive => "u.is_active",
    }
}

fn admin_sort_column(field: AdminSort) -> &'static str {
    match field {
        AdminSort::Id => "a.id",
        AdminSort::Name => "a.name",
    }
}

fn direction(descending: bool) -> &'static str {
    if descending {
        " DESC"
    } else {
        " ASC"
    }
}

fn push_user_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    if let Some(username) = &filter.username {
        builder
            .push(" AND u.username LIKE ")
            .push_bind(format!("%{}%", escape_like(username)));
    }
    if let Some(is_active) = filter.is_active {
        builder.push(" AND u.is_active = ").push_bind(is_active);
    }
    match filter.role {
        Some(Role::Admin) => {
            builder.push(" AND EXISTS (SELECT 1 FROM admins a WHERE a.user_id = u.id)");
        }
        Some(Role::Account) => {
            builder.push(" AND EXISTS (SELECT 1 FROM accounts c WHERE c.user_id = u.id)");
        }
        None => {}
    }
}

fn push_admin_filters(builder: &mut QueryBuilder<'_, Postgres>, name: Option<&str>) {
    if let Some(name) = name {
        builder
            .push(" AND a.name ILIKE ")
            .push_bind(format!("%{}%", escape_like(name)));
    }
}

/// Split `sql/schema.sql` into single statements, dropping comment-only chunks.
#[must_use]
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

/// Apply the embedded schema; every statement is idempotent.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;
    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut *conn)
            .instrument(db_span("DDL", statement))
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }
    Ok(())
}

impl PgStore {
    async fn admin_groups(&self, admin_id: Uuid) -> Result<Vec<AdminGroup>> {
        let query = r"
            SELECT g.id, g.name
            FROM admin_groups g
            JOIN admin_group_entries e ON e.group_id = g.id
            WHERE e.admin_id = $1
            ORDER BY g.name
        ";
        let rows = sqlx::query(query)
            .bind(admin_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to load admin groups")?;
        Ok(rows
            .into_iter()
            .map(|row| AdminGroup {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn admin_permission_entries(&self, admin_id: Uuid) -> Result<Vec<PermissionEntry>> {
        let query = r"
            SELECT e.id, e.admin_id, e.permission_id, e.active, p.name
            FROM permission_entries e
            JOIN permissions p ON p.id = e.permission_id
            WHERE e.admin_id = $1
            ORDER BY lower(p.name), p.id
        ";
        let rows = sqlx::query(query)
            .bind(admin_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to load permission entries")?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let permission_id: Uuid = row.get("permission_id");
                PermissionEntry {
                    id: row.get("id"),
                    admin_id: row.get("admin_id"),
                    permission_id,
                    active: row.get("active"),
                    permission: Permission {
                        id: permission_id,
                        name: row.get("name"),
                    },
                }
            })
            .collect())
    }

    async fn in_use(&self, query: &'static str, value: &str, except: Option<Uuid>) -> Result<bool> {
        let row = sqlx::query(query)
            .bind(value)
            .bind(except)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to check uniqueness")?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(tracing::info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(tracing::info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")
    }

    async fn find_users(
        &self,
        filter: &UserFilter,
        sort: Sort<UserSort>,
        page: PageRequest,
    ) -> Result<Page<User>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users u WHERE TRUE");
        push_user_filters(&mut count, filter);
        let count_sql = count.sql().to_string();
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", &count_sql))
            .await
            .context("failed to count users")?;

        let mut select =
            QueryBuilder::new("SELECT u.id, u.username, u.email, u.is_active FROM users u WHERE TRUE");
        push_user_filters(&mut select, filter);
        select
            .push(" ORDER BY ")
            .push(user_sort_column(sort.field))
            .push(direction(sort.descending))
            .push(", u.id ASC LIMIT ")
            .push_bind(to_i64(page.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(page.offset()));
        let select_sql = select.sql().to_string();
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &select_sql))
            .await
            .context("failed to list users")?;

        Ok(Page {
            items: rows.iter().map(user_from_row).collect(),
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, username, email, is_active FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>> {
        let query = r"
            SELECT id, username, email, is_active, password_hash
            FROM users
            WHERE username = $1 OR email = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(login)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup credentials")?;
        Ok(row.map(|row| UserCredentials {
            user: user_from_row(&row),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn username_in_use(&self, username: &str, except: Option<Uuid>) -> Result<bool> {
        let query = "SELECT 1 FROM users WHERE username = $1 AND ($2::uuid IS NULL OR id <> $2) LIMIT 1";
        self.in_use(query, username, except).await
    }

    async fn email_in_use(&self, email: &str, except: Option<Uuid>) -> Result<bool> {
        let query = "SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2) LIMIT 1";
        self.in_use(query, email, except).await
    }

    async fn insert_user(&self, user: NewUser) -> Result<Write<User>> {
        let query = r"
            INSERT INTO users (id, username, email, password_hash, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING id, username, email, is_active
        ";
        let result = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;
        match result {
            Ok(row) => Ok(Write::Done(user_from_row(&row))),
            Err(err) => match unique_violation(&err) {
                Some(conflict) => Ok(Write::Conflict(conflict)),
                None => Err(err).context("failed to insert user"),
            },
        }
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Write<User>> {
        let query = r"
            UPDATE users
            SET
                username = $1,
                email = $2,
                is_active = COALESCE($3, is_active),
                updated_at = NOW()
            WHERE id = $4
            RETURNING id, username, email, is_active
        ";
        let result = sqlx::query(query)
            .bind(&changes.username)
            .bind(&changes.email)
            .bind(changes.is_active)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await;
        match result {
            Ok(Some(row)) => Ok(Write::Done(user_from_row(&row))),
            Ok(None) => Ok(Write::NotFound),
            Err(err) => match unique_violation(&err) {
                Some(conflict) => Ok(Write::Conflict(conflict)),
                None => Err(err).context("failed to update user"),
            },
        }
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let query = "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2";
        let result = sqlx::query(query)
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_session(
        &self,
        user_id: Uuid,
        session_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<()> {
        let query = r"
            INSERT INTO sessions (id, user_id, session_hash, expires_at)
            VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        ";
        sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(user_id)
            .bind(session_hash)
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn lookup_session(&self, session_hash: &[u8]) -> Result<Option<Uuid>> {
        let query = r"
            SELECT user_id
            FROM sessions
            WHERE session_hash = $1 AND expires_at > NOW()
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(session_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session")?;
        Ok(row.map(|row| row.get("user_id")))
    }

    async fn delete_session(&self, session_hash: &[u8]) -> Result<()> {
        let query = "DELETE FROM sessions WHERE session_hash = $1";
        sqlx::query(query)
            .bind(session_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn load_principal(&self, user_id: Uuid) -> Result<Option<PrincipalRecord>> {
        let query = r"
            SELECT
                u.id, u.username, u.email, u.is_active,
                a.id AS admin_id,
                c.id AS account_id
            FROM users u
            LEFT JOIN admins a ON a.user_id = u.id
            LEFT JOIN accounts c ON c.user_id = u.id
            WHERE u.id = $1
        ";
        let Some(row) = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to load principal")?
        else {
            return Ok(None);
        };

        let admin_id: Option<Uuid> = row.get("admin_id");
        let groups = match admin_id {
            Some(admin_id) => self
                .admin_groups(admin_id)
                .await?
                .into_iter()
                .map(|group| group.name)
                .collect(),
            None => Vec::new(),
        };

        Ok(Some(PrincipalRecord {
            user: user_from_row(&row),
            admin_id,
            account_id: row.get("account_id"),
            groups,
        }))
    }

    async fn find_admins(
        &self,
        name: Option<&str>,
        sort: Sort<AdminSort>,
        page: PageRequest,
    ) -> Result<Page<Admin>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM admins a WHERE TRUE");
        push_admin_filters(&mut count, name);
        let count_sql = count.sql().to_string();
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", &count_sql))
            .await
            .context("failed to count admins")?;

        let mut select = QueryBuilder::new("SELECT a.id, a.name, a.user_id FROM admins a WHERE TRUE");
        push_admin_filters(&mut select, name);
        select
            .push(" ORDER BY ")
            .push(admin_sort_column(sort.field))
            .push(direction(sort.descending))
            .push(", a.id ASC LIMIT ")
            .push_bind(to_i64(page.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(page.offset()));
        let select_sql = select.sql().to_string();
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &select_sql))
            .await
            .context("failed to list admins")?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(|row| Admin {
                    id: row.get("id"),
                    name: row.get("name"),
                    user_id: row.get("user_id"),
                })
                .collect(),
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn find_admin(&self, id: Uuid) -> Result<Option<AdminDetail>> {
        let query = r"
            SELECT a.id, a.name, u.id AS user_id, u.username
            FROM admins a
            LEFT JOIN users u ON u.id = a.user_id
            WHERE a.id = $1
        ";
        let Some(row) = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup admin")?
        else {
            return Ok(None);
        };

        let user_id: Option<Uuid> = row.get("user_id");
        let username: Option<String> = row.get("username");
        let user = user_id
            .zip(username)
            .map(|(id, username)| AdminUser { id, username });

        Ok(Some(AdminDetail {
            id: row.get("id"),
            name: row.get("name"),
            user,
            groups: self.admin_groups(id).await?,
            permission_entries: self.admin_permission_entries(id).await?,
        }))
    }

    async fn insert_admin(&self, name: &str) -> Result<Admin> {
        let query = "INSERT INTO admins (id, name) VALUES ($1, $2) RETURNING id, name, user_id";
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(name)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert admin")?;
        Ok(Admin {
            id: row.get("id"),
            name: row.get("name"),
            user_id: row.get("user_id"),
        })
    }

    async fn update_admin(
        &self,
        id: Uuid,
        name: &str,
        link: UserLink,
    ) -> Result<Write<Admin>> {
        let mut tx = self.pool.begin().await.context("begin admin update")?;

        if let UserLink::Link(user_id) = link {
            let query = "SELECT 1 FROM users WHERE id = $1";
            let exists = sqlx::query(query)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .instrument(db_span("SELECT", query))
                .await
                .context("failed to lookup linked user")?;
            if exists.is_none() {
                tx.rollback().await.context("rollback admin update")?;
                return Ok(Write::Rejected(Rejection::UnknownUser));
            }
        }

        let query = r"
            UPDATE admins
            SET name = $1,
                user_id = CASE WHEN $2 THEN user_id ELSE $3 END,
                updated_at = NOW()
            WHERE id = $4
            RETURNING id, name, user_id
        ";
        let (keep, user_id) = match link {
            UserLink::Keep => (true, None),
            UserLink::Unlink => (false, None),
            UserLink::Link(user_id) => (false, Some(user_id)),
        };
        let result = sqlx::query(query)
            .bind(name)
            .bind(keep)
            .bind(user_id)
            .bind(id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await;

        let outcome = match result {
            Ok(Some(row)) => Write::Done(Admin {
                id: row.get("id"),
                name: row.get("name"),
                user_id: row.get("user_id"),
            }),
            Ok(None) => Write::NotFound,
            Err(err) => match unique_violation(&err) {
                Some(conflict) => Write::Conflict(conflict),
                None => return Err(err).context("failed to update admin"),
            },
        };

        if matches!(outcome, Write::Done(_)) {
            tx.commit().await.context("commit admin update")?;
        } else {
            tx.rollback().await.context("rollback admin update")?;
        }
        Ok(outcome)
    }

    async fn delete_admin(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM admins WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete admin")?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_permission_entries(
        &self,
        admin_id: Uuid,
        grants: &[PermissionGrant],
    ) -> Result<Write<()>> {
        let mut tx = self.pool.begin().await.context("begin permission update")?;

        let query = "SELECT 1 FROM admins WHERE id = $1 FOR UPDATE";
        let admin = sqlx::query(query)
            .bind(admin_id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lock admin")?;
        if admin.is_none() {
            tx.rollback().await.context("rollback permission update")?;
            return Ok(Write::NotFound);
        }

        let permission_ids: Vec<Uuid> = grants.iter().map(|grant| grant.permission_id).collect();
        let query = "SELECT COUNT(*) FROM permissions WHERE id = ANY($1)";
        let known: i64 = sqlx::query_scalar(query)
            .bind(&permission_ids)
            .fetch_one(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to verify permissions")?;
        if usize::try_from(known).unwrap_or(0) != permission_ids.len() {
            tx.rollback().await.context("rollback permission update")?;
            return Ok(Write::Rejected(Rejection::UnknownPermission));
        }

        let entry_ids: Vec<Uuid> = grants.iter().map(|grant| grant.id).collect();
        let query = "SELECT 1 FROM permission_entries WHERE id = ANY($1) AND admin_id <> $2 LIMIT 1";
        let foreign = sqlx::query(query)
            .bind(&entry_ids)
            .bind(admin_id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to check permission entry ids")?;
        if foreign.is_some() {
            tx.rollback().await.context("rollback permission update")?;
            return Ok(Write::Conflict(Conflict::PermissionEntry));
        }

        let query = "DELETE FROM permission_entries WHERE admin_id = $1";
        sqlx::query(query)
            .bind(admin_id)
            .execute(&mut *tx)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to clear permission entries")?;

        let query = r"
            INSERT INTO permission_entries (id, admin_id, permission_id, active)
            VALUES ($1, $2, $3, $4)
        ";
        for grant in grants {
            let inserted = sqlx::query(query)
                .bind(grant.id)
                .bind(admin_id)
                .bind(grant.permission_id)
                .bind(grant.active)
                .execute(&mut *tx)
                .instrument(db_span("INSERT", query))
                .await;
            if let Err(err) = inserted {
                tx.rollback().await.context("rollback permission update")?;
                return match unique_violation(&err) {
                    Some(conflict) => Ok(Write::Conflict(conflict)),
                    None => Err(err).context("failed to insert permission entry"),
                };
            }
        }

        tx.commit().await.context("commit permission update")?;
        Ok(Write::Done(()))
    }

    async fn replace_admin_groups(&self, admin_id: Uuid, group_ids: &[Uuid]) -> Result<Write<()>> {
        let mut tx = self.pool.begin().await.context("begin group update")?;

        let query = "SELECT 1 FROM admins WHERE id = $1 FOR UPDATE";
        let admin = sqlx::query(query)
            .bind(admin_id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lock admin")?;
        if admin.is_none() {
            tx.rollback().await.context("rollback group update")?;
            return Ok(Write::NotFound);
        }

        let query = "SELECT COUNT(*) FROM admin_groups WHERE id = ANY($1)";
        let known: i64 = sqlx::query_scalar(query)
            .bind(group_ids)
            .fetch_one(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to verify groups")?;
        if usize::try_from(known).unwrap_or(0) != group_ids.len() {
            tx.rollback().await.context("rollback group update")?;
            return Ok(Write::Rejected(Rejection::UnknownGroup));
        }

        let query = "DELETE FROM admin_group_entries WHERE admin_id = $1";
        sqlx::query(query)
            .bind(admin_id)
            .execute(&mut *tx)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to clear group entries")?;

        let query = "INSERT INTO admin_group_entries (admin_id, group_id) VALUES ($1, $2)";
        for group_id in group_ids {
            sqlx::query(query)
                .bind(admin_id)
                .bind(group_id)
                .execute(&mut *tx)
                .instrument(db_span("INSERT", query))
                .await
                .context("failed to insert group entry")?;
        }

        tx.commit().await.context("commit group update")?;
        Ok(Write::Done(()))
    }

    async fn list_admin_groups(&self) -> Result<Vec<AdminGroup>> {
        let query = "SELECT id, name FROM admin_groups ORDER BY lower(name), id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list admin groups")?;
        Ok(rows
            .into_iter()
            .map(|row| AdminGroup {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let query = "SELECT id, name FROM permissions ORDER BY lower(name), id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list permissions")?;
        Ok(rows
            .into_iter()
            .map(|row| Permission {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn insert_permission(&self, name: &str) -> Result<Write<Permission>> {
        let query = "INSERT INTO permissions (id, name) VALUES ($1, $2) RETURNING id, name";
        let result = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(name)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;
        match result {
            Ok(row) => Ok(Write::Done(Permission {
                id: row.get("id"),
                name: row.get("name"),
            })),
            Err(err) => match unique_violation(&err) {
                Some(conflict) => Ok(Write::Conflict(conflict)),
                None => Err(err).context("failed to insert permission"),
            },
        }
    }

    async fn delete_permission(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM permissions WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete permission")?;
        Ok(result.rows_affected() > 0)
    }

    async fn bootstrap_root(&self, user: NewUser, admin_name: &str) -> Result<BootstrapOutcome> {
        let mut tx = self.pool.begin().await.context("begin bootstrap transaction")?;

        let query = "SELECT pg_advisory_xact_lock($1)";
        sqlx::query(query)
            .bind(BOOTSTRAP_LOCK_ID)
            .execute(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to acquire bootstrap lock")?;

        let query = "SELECT 1 FROM users WHERE username = $1 OR email = $2 LIMIT 1";
        let existing = sqlx::query(query)
            .bind(ROOT_USERNAME)
            .bind(&user.email)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to check for existing root user")?;
        if existing.is_some() {
            tx.rollback().await.context("rollback bootstrap transaction")?;
            return Ok(BootstrapOutcome::Closed);
        }

        let query = r"
            INSERT INTO users (id, username, email, password_hash, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING id, username, email, is_active
        ";
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(ROOT_USERNAME)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert root user")?;
        let root = user_from_row(&row);

        let admin_id = Uuid::now_v7();
        let query = "INSERT INTO admins (id, user_id, name) VALUES ($1, $2, $3)";
        sqlx::query(query)
            .bind(admin_id)
            .bind(root.id)
            .bind(admin_name)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert root admin")?;

        let query = r"
            INSERT INTO admin_groups (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
        ";
        let group_id: Uuid = sqlx::query_scalar(query)
            .bind(Uuid::now_v7())
            .bind(ROOT_GROUP)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to ensure root group")?;

        let query = "INSERT INTO admin_group_entries (admin_id, group_id) VALUES ($1, $2)";
        sqlx::query(query)
            .bind(admin_id)
            .bind(group_id)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert root group membership")?;

        tx.commit().await.context("commit bootstrap transaction")?;
        Ok(BootstrapOutcome::Inserted(root))
    }
}
