//! Password login, sessions and the authenticated principal.
//!
//! Login verifies an Argon2id hash and issues a random session token. Only the
//! SHA-256 hash of the token is stored; the raw value travels in the
//! `overseer_session` cookie or an `Authorization: Bearer` header.

pub mod login;
pub mod password;
pub mod principal;
pub mod session;
mod state;

pub use principal::{require_auth, require_root_admin, Principal, Scope};
pub use state::AuthConfig;
