//! User management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request and enforce the route's guard.
//! 2) Validate and normalize the payload.
//! 3) Pre-check username and email uniqueness against other users.
//! 4) Write through the store; unique violations racing past step 3 map to
//!    the same `409`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    auth::{password::hash_password_blocking, require_auth, require_root_admin, Scope},
    json_body, non_empty, normalize_email, normalize_username, parse_id, parse_page, parse_sort,
    parse_target_id, query_params, require_password,
};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        paging::Paged,
    },
    store::{
        Conflict, NewUser, Role, SharedStore, Store, User, UserChanges, UserFilter, UserSort,
        Write,
    },
};

const SORT_FIELDS: &[(&str, UserSort)] = &[
    ("id", UserSort::Id),
    ("username", UserSort::Username),
    ("email", UserSort::Email),
    ("isActive", UserSort::IsActive),
];

const SELF_SERVICE: &[Scope] = &[Scope::Admin, Scope::Account];

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Substring match on the username.
    pub username: Option<String>,
    /// `true` for active users, any other value for inactive ones.
    pub is_active: Option<String>,
    /// `admin` or `account`.
    pub role: Option<String>,
    /// `id`, `username`, `email` or `isActive`; prefix with `-` to descend.
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub is_active: bool,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateMyRequest {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PasswordRequest {
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub(crate) fn response() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paged user search.", body = Paged<User>),
        (status = 400, description = "Invalid query.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Paged<User>>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let query = query_params(query)?;

    let filter = UserFilter {
        username: non_empty(query.username.as_deref()).map(str::to_string),
        is_active: non_empty(query.is_active.as_deref()).map(|value| value == "true"),
        role: match non_empty(query.role.as_deref()) {
            Some("admin") => Some(Role::Admin),
            Some("account") => Some(Role::Account),
            _ => None,
        },
    };
    let sort = parse_sort(query.sort.as_deref(), SORT_FIELDS)?;
    let page = parse_page(query.limit.as_deref(), query.page.as_deref())?;

    let found = store.find_users(&filter, sort, page).await?;
    Ok(Json(Paged::new(found, page)))
}

#[utoipa::path(
    get,
    path = "/api/users/my",
    responses(
        (status = 200, description = "The session user.", body = User),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Insufficient scope.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn get_my(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<User>, ApiError> {
    let principal = require_auth(&headers, store.as_ref()).await?;
    principal.require_scope(SELF_SERVICE)?;
    find_or_404(store.as_ref(), principal.user_id).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail.", body = User),
        (status = 400, description = "Invalid id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn get_user(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<User>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_id(&id)?;
    find_or_404(store.as_ref(), id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created.", body = User),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 409, description = "Username or email already in use.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn create_user(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let request = json_body(payload)?;
    let username = normalize_username(&request.username)?;
    let email = normalize_email(&request.email)?;
    require_password(request.password.expose_secret())?;

    ensure_available(store.as_ref(), &username, &email, None).await?;

    let password_hash = hash_password_blocking(request.password.expose_secret().to_string()).await?;
    let created = written(
        store
            .insert_user(NewUser {
                username,
                email,
                password_hash,
            })
            .await?,
    )?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated.", body = User),
        (status = 400, description = "Invalid id, payload or own deactivation.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
        (status = 409, description = "Username or email already in use.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn update_user(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let principal = require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    let request = json_body(payload)?;
    if !request.is_active {
        principal.ensure_not_self(id, "Cannot deactivate your own user.")?;
    }
    let changes = UserChanges {
        username: normalize_username(&request.username)?,
        email: normalize_email(&request.email)?,
        is_active: Some(request.is_active),
    };

    ensure_available(store.as_ref(), &changes.username, &changes.email, Some(id)).await?;
    written(store.update_user(id, changes).await?).map(Json)
}

#[utoipa::path(
    put,
    path = "/api/users/my",
    request_body = UpdateMyRequest,
    responses(
        (status = 200, description = "Own record updated.", body = User),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Insufficient scope or root user.", body = ErrorBody),
        (status = 409, description = "Username or email already in use.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn update_my(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<UpdateMyRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let principal = require_auth(&headers, store.as_ref()).await?;
    principal.require_scope(SELF_SERVICE)?;
    principal.ensure_not_root()?;
    let request = json_body(payload)?;
    let changes = UserChanges {
        username: normalize_username(&request.username)?,
        email: normalize_email(&request.email)?,
        is_active: None,
    };

    ensure_available(
        store.as_ref(),
        &changes.username,
        &changes.email,
        Some(principal.user_id),
    )
    .await?;
    written(store.update_user(principal.user_id, changes).await?).map(Json)
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/password",
    params(("id" = String, Path, description = "User id")),
    request_body = PasswordRequest,
    responses(
        (status = 200, description = "Password updated.", body = User),
        (status = 400, description = "Invalid id or payload.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn set_password(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<PasswordRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    let request = json_body(payload)?;
    change_password(store.as_ref(), id, &request.password)
        .await
        .map(Json)
}

#[utoipa::path(
    put,
    path = "/api/users/my/password",
    request_body = PasswordRequest,
    responses(
        (status = 200, description = "Own password updated.", body = User),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Insufficient scope or root user.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn set_my_password(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<PasswordRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let principal = require_auth(&headers, store.as_ref()).await?;
    principal.require_scope(SELF_SERVICE)?;
    principal.ensure_not_root()?;
    let request = json_body(payload)?;
    change_password(store.as_ref(), principal.user_id, &request.password)
        .await
        .map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted.", body = Success),
        (status = 400, description = "Invalid id or own user.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn delete_user(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<Success>, ApiError> {
    let principal = require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    principal.ensure_not_self(id, "Cannot delete your own user.")?;
    if store.delete_user(id).await? {
        Ok(Success::response())
    } else {
        Err(ApiError::NotFound("User not found."))
    }
}

async fn find_or_404(store: &dyn Store, id: Uuid) -> Result<User, ApiError> {
    store
        .find_user(id)
        .await?
        .ok_or(ApiError::NotFound("User not found."))
}

async fn ensure_available(
    store: &dyn Store,
    username: &str,
    email: &str,
    except: Option<Uuid>,
) -> Result<(), ApiError> {
    if store.username_in_use(username, except).await? {
        return Err(Conflict::Username.into());
    }
    if store.email_in_use(email, except).await? {
        return Err(Conflict::Email.into());
    }
    Ok(())
}

async fn change_password(
    store: &dyn Store,
    id: Uuid,
    password: &SecretString,
) -> Result<User, ApiError> {
    require_password(password.expose_secret())?;
    let password_hash = hash_password_blocking(password.expose_secret().to_string()).await?;
    if !store.set_password(id, &password_hash).await? {
        return Err(ApiError::NotFound("User not found."));
    }
    find_or_404(store, id).await
}

fn written(outcome: Write<User>) -> Result<User, ApiError> {
    match outcome {
        Write::Done(user) => Ok(user),
        Write::NotFound => Err(ApiError::NotFound("User not found.")),
        Write::Conflict(conflict) => Err(conflict.into()),
        Write::Rejected(rejection) => Err(rejection.into()),
    }
}
