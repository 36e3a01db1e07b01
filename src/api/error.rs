//! Error type shared by every handler.
//!
//! Rendered as `{statusCode, error, message}`; internal failures are logged and
//! returned without detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::store::{Conflict, Rejection};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(&'static str),
    NotFound(&'static str),
    Conflict(&'static str),
    Internal(anyhow::Error),
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self::Unauthorized("Invalid credentials.".to_string())
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::Unauthorized("Missing authentication.".to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<Conflict> for ApiError {
    fn from(conflict: Conflict) -> Self {
        Self::Conflict(match conflict {
            Conflict::Username => "Username already in use.",
            Conflict::Email => "Email already in use.",
            Conflict::AdminUser => "User is already linked to an admin.",
            Conflict::PermissionName => "Permission name already in use.",
            Conflict::PermissionEntry => "Permission entry belongs to another admin.",
        })
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        Self::BadRequest(
            match rejection {
                Rejection::UnknownUser => "User not found.",
                Rejection::UnknownPermission => "Unknown permission.",
                Rejection::UnknownGroup => "Unknown group.",
            }
            .to_string(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(message) | Self::Unauthorized(message) => message,
            Self::Forbidden(message) | Self::NotFound(message) | Self::Conflict(message) => {
                message.to_string()
            }
            Self::Internal(err) => {
                error!("Failed to handle request: {err:#}");
                "An internal server error occurred.".to_string()
            }
        };
        let body = ErrorBody {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
