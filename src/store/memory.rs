//! In-memory [`Store`] used by handler and client tests.

use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Admin, AdminDetail, AdminGroup, AdminSort, AdminUser, BootstrapOutcome, Conflict, NewUser,
    Page, PageRequest, Permission, PermissionEntry, PermissionGrant, PrincipalRecord, Rejection,
    Role, Sort, Store, User, UserChanges, UserCredentials, UserFilter, UserLink, UserSort, Write,
    ROOT_GROUP, ROOT_USERNAME,
};

#[derive(Clone, Debug)]
struct StoredEntry {
    id: Uuid,
    admin_id: Uuid,
    permission_id: Uuid,
    active: bool,
}

#[derive(Default)]
struct State {
    users: Vec<UserCredentials>,
    accounts: HashMap<Uuid, Uuid>,
    admins: Vec<Admin>,
    groups: Vec<AdminGroup>,
    group_entries: Vec<(Uuid, Uuid)>,
    permissions: Vec<Permission>,
    entries: Vec<StoredEntry>,
    /// Session hash to user id and expiry in unix seconds.
    sessions: HashMap<Vec<u8>, (Uuid, i64)>,
}

impl State {
    fn user_conflict(&self, username: &str, email: &str, except: Option<Uuid>) -> Option<Conflict> {
        let others = || self.users.iter().filter(move |c| Some(c.user.id) != except);
        if others().any(|c| c.user.username == username) {
            return Some(Conflict::Username);
        }
        if others().any(|c| c.user.email == email) {
            return Some(Conflict::Email);
        }
        None
    }

    fn group_id(&mut self, name: &str) -> Uuid {
        if let Some(group) = self.groups.iter().find(|g| g.name == name) {
            return group.id;
        }
        let id = Uuid::now_v7();
        self.groups.push(AdminGroup {
            id,
            name: name.to_string(),
        });
        id
    }

    fn admin_groups(&self, admin_id: Uuid) -> Vec<AdminGroup> {
        let mut groups: Vec<AdminGroup> = self
            .group_entries
            .iter()
            .filter(|(admin, _)| *admin == admin_id)
            .filter_map(|(_, group)| self.groups.iter().find(|g| g.id == *group).cloned())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    Page {
        items: items.into_iter().skip(offset).take(limit).collect(),
        total,
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user; `password_hash` may be any string when the test never logs in.
    pub async fn add_user(&self, username: &str, email: &str, password_hash: &str) -> User {
        let user = User {
            id: Uuid::now_v7(),
            username: username.to_string(),
            email: email.to_string(),
            is_active: true,
        };
        self.state.lock().await.users.push(UserCredentials {
            user: user.clone(),
            password_hash: password_hash.to_string(),
        });
        user
    }

    pub async fn add_account(&self, user_id: Uuid) -> Uuid {
        let id = Uuid::now_v7();
        self.state.lock().await.accounts.insert(user_id, id);
        id
    }

    /// Seed an admin linked to `user_id` and member of `groups` (created on demand).
    pub async fn add_admin(&self, name: &str, user_id: Option<Uuid>, groups: &[&str]) -> Admin {
        let mut state = self.state.lock().await;
        let admin = Admin {
            id: Uuid::now_v7(),
            name: name.to_string(),
            user_id,
        };
        for group in groups {
            let group_id = state.group_id(group);
            state.group_entries.push((admin.id, group_id));
        }
        state.admins.push(admin.clone());
        admin
    }

    pub async fn add_group(&self, name: &str) -> AdminGroup {
        let mut state = self.state.lock().await;
        let id = state.group_id(name);
        AdminGroup {
            id,
            name: name.to_string(),
        }
    }

    pub async fn add_permission(&self, name: &str) -> Permission {
        let permission = Permission {
            id: Uuid::now_v7(),
            name: name.to_string(),
        };
        self.state.lock().await.permissions.push(permission.clone());
        permission
    }

    pub async fn set_active(&self, user_id: Uuid, is_active: bool) {
        let mut state = self.state.lock().await;
        if let Some(credentials) = state.users.iter_mut().find(|c| c.user.id == user_id) {
            credentials.user.is_active = is_active;
        }
    }

    pub async fn password_hash(&self, user_id: Uuid) -> Option<String> {
        let state = self.state.lock().await;
        state
            .users
            .iter()
            .find(|c| c.user.id == user_id)
            .map(|c| c.password_hash.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_users(
        &self,
        filter: &UserFilter,
        sort: Sort<UserSort>,
        page: PageRequest,
    ) -> Result<Page<User>> {
        let state = self.state.lock().await;
        let admin_users: Vec<Uuid> = state.admins.iter().filter_map(|a| a.user_id).collect();
        let mut users: Vec<User> = state
            .users
            .iter()
            .map(|c| c.user.clone())
            .filter(|u| {
                filter
                    .username
                    .as_deref()
                    .map_or(true, |needle| u.username.contains(needle))
            })
            .filter(|u| filter.is_active.map_or(true, |active| u.is_active == active))
            .filter(|u| match filter.role {
                Some(Role::Admin) => admin_users.contains(&u.id),
                Some(Role::Account) => state.accounts.contains_key(&u.id),
                None => true,
            })
            .collect();

        users.sort_by(|a, b| {
            let ordering = match sort.field {
                UserSort::Id => a.id.cmp(&b.id),
                UserSort::Username => a.username.cmp(&b.username),
                UserSort::Email => a.email.cmp(&b.email),
                UserSort::IsActive => a.is_active.cmp(&b.is_active),
            };
            let ordering = if sort.descending {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then(a.id.cmp(&b.id))
        });

        Ok(paginate(users, page))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|c| c.user.id == id)
            .map(|c| c.user.clone()))
    }

    async fn find_credentials(&self, login: &str) -> Result<Option<UserCredentials>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|c| c.user.username == login || c.user.email == login)
            .cloned())
    }

    async fn username_in_use(&self, username: &str, except: Option<Uuid>) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .any(|c| c.user.username == username && Some(c.user.id) != except))
    }

    async fn email_in_use(&self, email: &str, except: Option<Uuid>) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .any(|c| c.user.email == email && Some(c.user.id) != except))
    }

    async fn insert_user(&self, user: NewUser) -> Result<Write<User>> {
        let mut state = self.state.lock().await;
        if let Some(conflict) = state.user_conflict(&user.username, &user.email, None) {
            return Ok(Write::Conflict(conflict));
        }
        let created = User {
            id: Uuid::now_v7(),
            username: user.username,
            email: user.email,
            is_active: true,
        };
        state.users.push(UserCredentials {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(Write::Done(created))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<Write<User>> {
        let mut state = self.state.lock().await;
        if !state.users.iter().any(|c| c.user.id == id) {
            return Ok(Write::NotFound);
        }
        if let Some(conflict) = state.user_conflict(&changes.username, &changes.email, Some(id)) {
            return Ok(Write::Conflict(conflict));
        }
        let Some(credentials) = state.users.iter_mut().find(|c| c.user.id == id) else {
            return Ok(Write::NotFound);
        };
        credentials.user.username = changes.username;
        credentials.user.email = changes.email;
        if let Some(is_active) = changes.is_active {
            credentials.user.is_active = is_active;
        }
        Ok(Write::Done(credentials.user.clone()))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.users.iter_mut().find(|c| c.user.id == id) {
            Some(credentials) => {
                credentials.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.users.len();
        state.users.retain(|c| c.user.id != id);
        if state.users.len() == before {
            return Ok(false);
        }
        state.accounts.remove(&id);
        state.sessions.retain(|_, (user_id, _)| *user_id != id);
        for admin in &mut state.admins {
            if admin.user_id == Some(id) {
                admin.user_id = None;
            }
        }
        Ok(true)
    }

    async fn insert_session(
        &self,
        user_id: Uuid,
        session_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<()> {
        let expires_at = unix_now().saturating_add(ttl_seconds);
        self.state
            .lock()
            .await
            .sessions
            .insert(session_hash.to_vec(), (user_id, expires_at));
        Ok(())
    }

    async fn lookup_session(&self, session_hash: &[u8]) -> Result<Option<Uuid>> {
        let now = unix_now();
        Ok(self
            .state
            .lock()
            .await
            .sessions
            .get(session_hash)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(user_id, _)| *user_id))
    }

    async fn delete_session(&self, session_hash: &[u8]) -> Result<()> {
        self.state.lock().await.sessions.remove(session_hash);
        Ok(())
    }

    async fn load_principal(&self, user_id: Uuid) -> Result<Option<PrincipalRecord>> {
        let state = self.state.lock().await;
        let Some(credentials) = state.users.iter().find(|c| c.user.id == user_id) else {
            return Ok(None);
        };
        let admin_id = state
            .admins
            .iter()
            .find(|a| a.user_id == Some(user_id))
            .map(|a| a.id);
        let groups = admin_id
            .map(|id| state.admin_groups(id).into_iter().map(|g| g.name).collect())
            .unwrap_or_default();
        Ok(Some(PrincipalRecord {
            user: credentials.user.clone(),
            admin_id,
            account_id: state.accounts.get(&user_id).copied(),
            groups,
        }))
    }

    async fn find_admins(
        &self,
        name: Option<&str>,
        sort: Sort<AdminSort>,
        page: PageRequest,
    ) -> Result<Page<Admin>> {
        let state = self.state.lock().await;
        let needle = name.map(str::to_lowercase);
        let mut admins: Vec<Admin> = state
            .admins
            .iter()
            .filter(|a| {
                needle
                    .as_deref()
                    .map_or(true, |needle| a.name.to_lowercase().contains(needle))
            })
            .cloned()
            .collect();
        admins.sort_by(|a, b| {
            let ordering = match sort.field {
                AdminSort::Id => a.id.cmp(&b.id),
                AdminSort::Name => a.name.cmp(&b.name),
            };
            let ordering = if sort.descending {
                ordering.reverse()
            } else {
                ordering
            };
            ordering.then(a.id.cmp(&b.id))
        });
        Ok(paginate(admins, page))
    }

    async fn find_admin(&self, id: Uuid) -> Result<Option<AdminDetail>> {
        let state = self.state.lock().await;
        let Some(admin) = state.admins.iter().find(|a| a.id == id) else {
            return Ok(None);
        };
        let user = admin.user_id.and_then(|user_id| {
            state
                .users
                .iter()
                .find(|c| c.user.id == user_id)
                .map(|c| AdminUser {
                    id: c.user.id,
                    username: c.user.username.clone(),
                })
        });
        let mut permission_entries: Vec<PermissionEntry> = state
            .entries
            .iter()
            .filter(|e| e.admin_id == id)
            .filter_map(|e| {
                let permission = state.permissions.iter().find(|p| p.id == e.permission_id)?;
                Some(PermissionEntry {
                    id: e.id,
                    admin_id: e.admin_id,
                    permission_id: e.permission_id,
                    active: e.active,
                    permission: permission.clone(),
                })
            })
            .collect();
        permission_entries.sort_by(|a, b| {
            a.permission
                .name
                .to_lowercase()
                .cmp(&b.permission.name.to_lowercase())
        });
        Ok(Some(AdminDetail {
            id: admin.id,
            name: admin.name.clone(),
            user,
            groups: state.admin_groups(id),
            permission_entries,
        }))
    }

    async fn insert_admin(&self, name: &str) -> Result<Admin> {
        let admin = Admin {
            id: Uuid::now_v7(),
            name: name.to_string(),
            user_id: None,
        };
        self.state.lock().await.admins.push(admin.clone());
        Ok(admin)
    }

    async fn update_admin(
        &self,
        id: Uuid,
        name: &str,
        link: UserLink,
    ) -> Result<Write<Admin>> {
        let mut state = self.state.lock().await;
        if let UserLink::Link(user_id) = link {
            if !state.users.iter().any(|c| c.user.id == user_id) {
                return Ok(Write::Rejected(Rejection::UnknownUser));
            }
            if state
                .admins
                .iter()
                .any(|a| a.id != id && a.user_id == Some(user_id))
            {
                return Ok(Write::Conflict(Conflict::AdminUser));
            }
        }
        let Some(admin) = state.admins.iter_mut().find(|a| a.id == id) else {
            return Ok(Write::NotFound);
        };
        admin.name = name.to_string();
        match link {
            UserLink::Keep => {}
            UserLink::Unlink => admin.user_id = None,
            UserLink::Link(user_id) => admin.user_id = Some(user_id),
        }
        Ok(Write::Done(admin.clone()))
    }

    async fn delete_admin(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.admins.len();
        state.admins.retain(|a| a.id != id);
        if state.admins.len() == before {
            return Ok(false);
        }
        state.entries.retain(|e| e.admin_id != id);
        state.group_entries.retain(|(admin, _)| *admin != id);
        Ok(true)
    }

    async fn replace_permission_entries(
        &self,
        admin_id: Uuid,
        grants: &[PermissionGrant],
    ) -> Result<Write<()>> {
        let mut state = self.state.lock().await;
        if !state.admins.iter().any(|a| a.id == admin_id) {
            return Ok(Write::NotFound);
        }
        if grants
            .iter()
            .any(|g| !state.permissions.iter().any(|p| p.id == g.permission_id))
        {
            return Ok(Write::Rejected(Rejection::UnknownPermission));
        }
        if state
            .entries
            .iter()
            .any(|e| e.admin_id != admin_id && grants.iter().any(|g| g.id == e.id))
        {
            return Ok(Write::Conflict(Conflict::PermissionEntry));
        }
        state.entries.retain(|e| e.admin_id != admin_id);
        state.entries.extend(grants.iter().map(|g| StoredEntry {
            id: g.id,
            admin_id,
            permission_id: g.permission_id,
            active: g.active,
        }));
        Ok(Write::Done(()))
    }

    async fn replace_admin_groups(&self, admin_id: Uuid, group_ids: &[Uuid]) -> Result<Write<()>> {
        let mut state = self.state.lock().await;
        if !state.admins.iter().any(|a| a.id == admin_id) {
            return Ok(Write::NotFound);
        }
        if group_ids
            .iter()
            .any(|id| !state.groups.iter().any(|g| g.id == *id))
        {
            return Ok(Write::Rejected(Rejection::UnknownGroup));
        }
        state.group_entries.retain(|(admin, _)| *admin != admin_id);
        state
            .group_entries
            .extend(group_ids.iter().map(|group| (admin_id, *group)));
        Ok(Write::Done(()))
    }

    async fn list_admin_groups(&self) -> Result<Vec<AdminGroup>> {
        let mut groups = self.state.lock().await.groups.clone();
        groups.sort_by_key(|g| g.name.to_lowercase());
        Ok(groups)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let mut permissions = self.state.lock().await.permissions.clone();
        permissions.sort_by_key(|p| p.name.to_lowercase());
        Ok(permissions)
    }

    async fn insert_permission(&self, name: &str) -> Result<Write<Permission>> {
        let mut state = self.state.lock().await;
        if state.permissions.iter().any(|p| p.name == name) {
            return Ok(Write::Conflict(Conflict::PermissionName));
        }
        let permission = Permission {
            id: Uuid::now_v7(),
            name: name.to_string(),
        };
        state.permissions.push(permission.clone());
        Ok(Write::Done(permission))
    }

    async fn delete_permission(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.permissions.len();
        state.permissions.retain(|p| p.id != id);
        if state.permissions.len() == before {
            return Ok(false);
        }
        state.entries.retain(|e| e.permission_id != id);
        Ok(true)
    }

    async fn bootstrap_root(&self, user: NewUser, admin_name: &str) -> Result<BootstrapOutcome> {
        let mut state = self.state.lock().await;
        if state
            .users
            .iter()
            .any(|c| c.user.username == ROOT_USERNAME || c.user.email == user.email)
        {
            return Ok(BootstrapOutcome::Closed);
        }
        let root = User {
            id: Uuid::now_v7(),
            username: ROOT_USERNAME.to_string(),
            email: user.email,
            is_active: true,
        };
        state.users.push(UserCredentials {
            user: root.clone(),
            password_hash: user.password_hash,
        });
        let admin_id = Uuid::now_v7();
        state.admins.push(Admin {
            id: admin_id,
            name: admin_name.to_string(),
            user_id: Some(root.id),
        });
        let group_id = state.group_id(ROOT_GROUP);
        state.group_entries.push((admin_id, group_id));
        Ok(BootstrapOutcome::Inserted(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_root_runs_once() -> Result<()> {
        let store = MemoryStore::new();
        let new_root = || NewUser {
            username: ROOT_USERNAME.to_string(),
            email: "root@example.com".to_string(),
            password_hash: "hash".to_string(),
        };

        let BootstrapOutcome::Inserted(root) = store.bootstrap_root(new_root(), "Root Admin").await?
        else {
            panic!("first bootstrap should insert");
        };
        assert_eq!(root.username, ROOT_USERNAME);

        let principal = store.load_principal(root.id).await?;
        assert_eq!(
            principal.map(|p| p.groups),
            Some(vec![ROOT_GROUP.to_string()])
        );

        let second = store.bootstrap_root(new_root(), "Root Admin").await?;
        assert_eq!(second, BootstrapOutcome::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_user_unlinks_admin() -> Result<()> {
        let store = MemoryStore::new();
        let user = store.add_user("ada", "ada@example.com", "x").await;
        let admin = store.add_admin("Ada", Some(user.id), &[]).await;

        assert!(store.delete_user(user.id).await?);
        let detail = store.find_admin(admin.id).await?;
        assert_eq!(detail.and_then(|d| d.user), None);
        Ok(())
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve() -> Result<()> {
        let store = MemoryStore::new();
        let user = store.add_user("ada", "ada@example.com", "x").await;

        store.insert_session(user.id, b"live", 60).await?;
        store.insert_session(user.id, b"stale", -60).await?;

        assert_eq!(store.lookup_session(b"live").await?, Some(user.id));
        assert_eq!(store.lookup_session(b"stale").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn update_admin_keeps_link_unless_asked() -> Result<()> {
        let store = MemoryStore::new();
        let user = store.add_user("ada", "ada@example.com", "x").await;
        let admin = store.add_admin("Ada", Some(user.id), &[]).await;

        let Write::Done(renamed) = store.update_admin(admin.id, "Ada L.", UserLink::Keep).await?
        else {
            panic!("rename should succeed");
        };
        assert_eq!(renamed.user_id, Some(user.id));

        let Write::Done(unlinked) = store.update_admin(admin.id, "Ada L.", UserLink::Unlink).await?
        else {
            panic!("unlink should succeed");
        };
        assert_eq!(unlinked.user_id, None);
        Ok(())
    }

    #[tokio::test]
    async fn entry_ids_stay_with_their_admin() -> Result<()> {
        let store = MemoryStore::new();
        let ada = store.add_admin("Ada", None, &[]).await;
        let bob = store.add_admin("Bob", None, &[]).await;
        let read = store.add_permission("reports.read").await;
        let grant = PermissionGrant {
            id: Uuid::now_v7(),
            permission_id: read.id,
            active: true,
        };

        assert_eq!(
            store.replace_permission_entries(ada.id, &[grant]).await?,
            Write::Done(())
        );
        // Saving the same entries again for the owner is fine.
        assert_eq!(
            store.replace_permission_entries(ada.id, &[grant]).await?,
            Write::Done(())
        );
        assert_eq!(
            store.replace_permission_entries(bob.id, &[grant]).await?,
            Write::Conflict(Conflict::PermissionEntry)
        );
        Ok(())
    }
}
