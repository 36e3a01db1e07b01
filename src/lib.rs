//! # Overseer (administrative console)
//!
//! `overseer` manages users, admins and the permission grants attached to
//! admins. It exposes a session-authenticated REST API over PostgreSQL and a
//! console layer (form state and an HTTP client) that drives the permission
//! editing screen.
//!
//! ## Authorization
//!
//! A session resolves to a principal carrying scopes derived from its roles:
//! `admin` when the user is linked to an admin record, `account` when it is
//! linked to an account. Management routes additionally require membership in
//! the `Root` admin group. The `root` user itself cannot change its own record
//! through the self-service routes.
//!
//! ## Storage
//!
//! Handlers only see the [`store::Store`] trait. Uniqueness of usernames,
//! emails and permission names is pre-checked and also enforced by database
//! constraints; a violation racing past the pre-check maps to the same `409`.

pub mod api;
pub mod cli;
pub mod console;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
