use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{auth::require_root_admin, json_body, parse_target_id, users::Success};
use crate::{
    api::error::{ApiError, ErrorBody},
    store::{Permission, SharedStore, Write},
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePermissionRequest {
    pub name: String,
}

#[utoipa::path(
    get,
    path = "/api/permissions",
    responses(
        (status = 200, description = "All permissions, sorted by name.", body = [Permission]),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
    ),
    tag = "permissions"
)]
pub async fn list_permissions(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    Ok(Json(store.list_permissions().await?))
}

#[utoipa::path(
    post,
    path = "/api/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created.", body = Permission),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 409, description = "Permission name already in use.", body = ErrorBody),
    ),
    tag = "permissions"
)]
pub async fn create_permission(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<CreatePermissionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let request = json_body(payload)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("\"name\" is not allowed to be empty."));
    }
    match store.insert_permission(name).await? {
        Write::Done(permission) => Ok((StatusCode::CREATED, Json(permission)).into_response()),
        Write::Conflict(conflict) => Err(conflict.into()),
        Write::Rejected(rejection) => Err(rejection.into()),
        Write::NotFound => Err(ApiError::NotFound("Permission not found.")),
    }
}

#[utoipa::path(
    delete,
    path = "/api/permissions/{id}",
    params(("id" = String, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission deleted with its grants.", body = Success),
        (status = 400, description = "Invalid id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "Permission not found.", body = ErrorBody),
    ),
    tag = "permissions"
)]
pub async fn delete_permission(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<Success>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    if store.delete_permission(id).await? {
        Ok(Success::response())
    } else {
        Err(ApiError::NotFound("Permission not found."))
    }
}
