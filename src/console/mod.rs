//! Console layer: the admin permissions form and the HTTP client that loads
//! and saves it through the REST API.

pub mod client;
pub mod permissions_form;

pub use client::{ClientError, ConsoleClient};
pub use permissions_form::{PermissionsForm, PermissionsView};
