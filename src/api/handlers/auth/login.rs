//! Login, logout and session introspection.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use super::{
    password::verify_password_blocking,
    principal::authenticate,
    session::{
        clear_session_cookie, extract_session_token, generate_session_token, hash_session_token,
        session_cookie,
    },
    AuthConfig, Principal,
};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        handlers::json_body,
    },
    store::{SharedStore, User},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: User,
    /// Raw session token, also usable as a bearer token.
    pub session: String,
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created.", body = LoginResponse),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 401, description = "Invalid credentials.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(store): Extension<SharedStore>,
    Extension(config): Extension<Arc<AuthConfig>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let login = request.username.trim().to_lowercase();
    if login.is_empty() {
        return Err(ApiError::bad_request("\"username\" is required."));
    }

    let Some(credentials) = store.find_credentials(&login).await? else {
        debug!("login for unknown user");
        return Err(ApiError::invalid_credentials());
    };

    let verified = verify_password_blocking(
        request.password.expose_secret().to_string(),
        credentials.password_hash,
    )
    .await?;
    if !verified || !credentials.user.is_active {
        return Err(ApiError::invalid_credentials());
    }

    let token = generate_session_token()?;
    store
        .insert_session(
            credentials.user.id,
            &hash_session_token(&token),
            config.session_ttl_seconds(),
        )
        .await?;

    let mut headers = HeaderMap::new();
    match session_cookie(&config, &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }

    let response = LoginResponse {
        user: credentials.user,
        session: token,
    };
    Ok((StatusCode::OK, headers, Json(response)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 204, description = "Session cleared.")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    Extension(config): Extension<Arc<AuthConfig>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(err) = store.delete_session(&hash_session_token(&token)).await {
            error!("Failed to delete session: {err}");
        }
    }

    // The cookie is cleared even when the session record was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers)
}

#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Session is active.", body = Principal),
        (status = 204, description = "No active session.")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
) -> Result<Response, ApiError> {
    match authenticate(&headers, store.as_ref()).await? {
        Some(principal) => Ok((StatusCode::OK, Json(principal)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
