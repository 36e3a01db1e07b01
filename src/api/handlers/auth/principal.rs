//! Authenticated principal resolution and authorization guards.
//!
//! Flow Overview: read the session token, resolve it to a user, derive scopes
//! from the user's roles and hand the principal to the handler. Guards return
//! `403` with a fixed message when a requirement is not met.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::session::{extract_session_token, hash_session_token};
use crate::{
    api::error::ApiError,
    store::{PrincipalRecord, Store, ROOT_GROUP, ROOT_USERNAME},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Admin,
    Account,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdminMembership {
    pub id: Uuid,
    pub groups: Vec<String>,
}

/// Authenticated user context derived from the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub scopes: Vec<Scope>,
    pub admin: Option<AdminMembership>,
}

impl From<PrincipalRecord> for Principal {
    fn from(record: PrincipalRecord) -> Self {
        let mut scopes = Vec::new();
        if record.admin_id.is_some() {
            scopes.push(Scope::Admin);
        }
        if record.account_id.is_some() {
            scopes.push(Scope::Account);
        }
        Self {
            user_id: record.user.id,
            username: record.user.username,
            email: record.user.email,
            scopes,
            admin: record.admin_id.map(|id| AdminMembership {
                id,
                groups: record.groups,
            }),
        }
    }
}

impl Principal {
    /// Passes when at least one of `scopes` is held.
    ///
    /// # Errors
    /// `403 "Insufficient scope."` otherwise.
    pub fn require_scope(&self, scopes: &[Scope]) -> Result<(), ApiError> {
        if scopes.iter().any(|scope| self.scopes.contains(scope)) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Insufficient scope."))
        }
    }

    /// # Errors
    /// `403` unless the principal is an admin in the named group.
    pub fn ensure_admin_group(&self, group: &str) -> Result<(), ApiError> {
        let member = self
            .admin
            .as_ref()
            .is_some_and(|admin| admin.groups.iter().any(|g| g == group));
        if member {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Missing required group membership."))
        }
    }

    /// # Errors
    /// `403` when the principal is the `root` user.
    pub fn ensure_not_root(&self) -> Result<(), ApiError> {
        if self.username == ROOT_USERNAME {
            Err(ApiError::Forbidden("Not permitted for the root user."))
        } else {
            Ok(())
        }
    }

    /// Refuse a change aimed at the caller's own admin record.
    ///
    /// # Errors
    /// `400` with `message` when `admin_id` is the principal's admin.
    pub fn ensure_not_own_admin(&self, admin_id: Uuid, message: &str) -> Result<(), ApiError> {
        if self.admin.as_ref().is_some_and(|admin| admin.id == admin_id) {
            Err(ApiError::bad_request(message))
        } else {
            Ok(())
        }
    }

    /// Refuse a change aimed at the caller's own user.
    ///
    /// # Errors
    /// `400` with `message` when `user_id` is the principal's user.
    pub fn ensure_not_self(&self, user_id: Uuid, message: &str) -> Result<(), ApiError> {
        if self.user_id == user_id {
            Err(ApiError::bad_request(message))
        } else {
            Ok(())
        }
    }
}

/// Resolve a session into a principal without failing when it is missing.
///
/// # Errors
/// Returns an error only when the store fails.
pub async fn authenticate(headers: &HeaderMap, store: &dyn Store) -> Result<Option<Principal>, ApiError> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    let Some(user_id) = store.lookup_session(&token_hash).await? else {
        return Ok(None);
    };
    let Some(record) = store.load_principal(user_id).await? else {
        return Ok(None);
    };
    if !record.user.is_active {
        return Ok(None);
    }
    Ok(Some(record.into()))
}

/// Resolve a session into a principal, or return 401 for missing sessions.
///
/// # Errors
/// `401` without a valid session, `500` when the store fails.
pub async fn require_auth(headers: &HeaderMap, store: &dyn Store) -> Result<Principal, ApiError> {
    authenticate(headers, store)
        .await?
        .ok_or_else(ApiError::unauthenticated)
}

/// Session plus scope `admin` plus membership in the `Root` group.
///
/// # Errors
/// `401` or `403` when any requirement is not met.
pub async fn require_root_admin(
    headers: &HeaderMap,
    store: &dyn Store,
) -> Result<Principal, ApiError> {
    let principal = require_auth(headers, store).await?;
    principal.require_scope(&[Scope::Admin])?;
    principal.ensure_admin_group(ROOT_GROUP)?;
    Ok(principal)
}
