//! Persistence boundary for the console.
//!
//! Handlers only talk to [`Store`]; the production implementation is
//! [`postgres::PgStore`]. Lookups return `Ok(None)` for missing rows and writes
//! report domain outcomes through [`Write`] so handlers can map them to
//! status codes without inspecting database errors.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Name of the admin group that unlocks the management routes.
pub const ROOT_GROUP: &str = "Root";

/// Username reserved for the bootstrap account.
pub const ROOT_USERNAME: &str = "root";

pub type SharedStore = Arc<dyn Store>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_active: bool,
}

/// A user together with the stored password hash, only used by login.
#[derive(Clone, Debug)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Clone, Debug)]
pub struct UserChanges {
    pub username: String,
    pub email: String,
    /// `None` leaves the flag untouched.
    pub is_active: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Account,
}

#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub username: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserSort {
    #[default]
    Id,
    Username,
    Email,
    IsActive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdminSort {
    #[default]
    Id,
    Name,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sort<F> {
    pub field: F,
    pub descending: bool,
}

/// One-based page selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// A slice of rows plus the number of rows matching the filter.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: Uuid,
    pub name: String,
    pub user_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdminUser {
    pub id: Uuid,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdminGroup {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
}

/// A permission granted to an admin; inactive entries are kept but do not apply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub permission_id: Uuid,
    pub active: bool,
    pub permission: Permission,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminDetail {
    pub id: Uuid,
    pub name: String,
    pub user: Option<AdminUser>,
    pub groups: Vec<AdminGroup>,
    pub permission_entries: Vec<PermissionEntry>,
}

/// Validated input row for [`Store::replace_permission_entries`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermissionGrant {
    pub id: Uuid,
    pub permission_id: Uuid,
    pub active: bool,
}

/// Everything needed to build an authenticated principal.
#[derive(Clone, Debug)]
pub struct PrincipalRecord {
    pub user: User,
    pub admin_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub groups: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conflict {
    Username,
    Email,
    AdminUser,
    PermissionName,
    /// A permission entry id already belongs to another admin.
    PermissionEntry,
}

/// How an admin update treats the linked user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserLink {
    Keep,
    Unlink,
    Link(Uuid),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    UnknownUser,
    UnknownPermission,
    UnknownGroup,
}

/// Outcome of a write that can fail for domain reasons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Write<T> {
    Done(T),
    NotFound,
    Conflict(Conflict),
    Rejected(Rejection),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Inserted(User),
    Closed,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn find_users(
        &self,
        filter: &UserFilter,
        sort: Sort<UserSort>,
        page: PageRequest,
    ) -> Result<Page<User>>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
    /// Match `login` against username or email.
    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>>;
    async fn username_in_use(&self, username: &str, except: Option<Uuid>) -> Result<bool>;
    async fn email_in_use(&self, email: &str, except: Option<Uuid>) -> Result<bool>;
    async fn insert_user(&self, user: NewUser) -> Result<Write<User>>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Write<User>>;
    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<bool>;
    async fn delete_user(&self, id: Uuid) -> Result<bool>;

    async fn insert_session(&self, user_id: Uuid, session_hash: &[u8], ttl_seconds: i64)
        -> Result<()>;
    /// Returns the session's user id when the session exists and has not expired.
    async fn lookup_session(&self, session_hash: &[u8]) -> Result<Option<Uuid>>;
    async fn delete_session(&self, session_hash: &[u8]) -> Result<()>;
    async fn load_principal(&self, user_id: Uuid) -> Result<Option<PrincipalRecord>>;

    async fn find_admins(
        &self,
        name: Option<&str>,
        sort: Sort<AdminSort>,
        page: PageRequest,
    ) -> Result<Page<Admin>>;
    async fn find_admin(&self, id: Uuid) -> Result<Option<AdminDetail>>;
    async fn insert_admin(&self, name: &str) -> Result<Admin>;
    async fn update_admin(&self, id: Uuid, name: &str, link: UserLink) -> Result<Write<Admin>>;
    async fn delete_admin(&self, id: Uuid) -> Result<bool>;
    async fn replace_permission_entries(
        &self,
        admin_id: Uuid,
        grants: &[PermissionGrant],
    ) -> Result<Write<()>>;
    async fn replace_admin_groups(&self, admin_id: Uuid, group_ids: &[Uuid]) -> Result<Write<()>>;
    async fn list_admin_groups(&self) -> Result<Vec<AdminGroup>>;

    async fn list_permissions(&self) -> Result<Vec<Permission>>;
    async fn insert_permission(&self, name: &str) -> Result<Write<Permission>>;
    async fn delete_permission(&self, id: Uuid) -> Result<bool>;

    /// Create the root user, its admin record and `Root` membership, once.
    async fn bootstrap_root(&self, user: NewUser, admin_name: &str) -> Result<BootstrapOutcome>;
}

/// Escape `%`, `_` and `\` so user input only matches literally inside `LIKE`.
#[must_use]
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
