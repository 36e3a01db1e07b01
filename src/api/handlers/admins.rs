//! Admin records, their group membership and permission entries.
//!
//! Every route requires a root admin. Replacing permission entries or groups
//! swaps the whole set in one transaction and returns the refreshed detail.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    auth::require_root_admin, double_option, json_body, non_empty, parse_id, parse_page,
    parse_sort, parse_target_id, query_params, users::Success,
};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        paging::Paged,
    },
    store::{
        Admin, AdminDetail, AdminGroup, AdminSort, Permission, PermissionGrant, SharedStore,
        Store, UserLink, Write, ROOT_GROUP,
    },
};

const SORT_FIELDS: &[(&str, AdminSort)] = &[("id", AdminSort::Id), ("name", AdminSort::Name)];

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminQuery {
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
    /// `id` or `name`; prefix with `-` to descend.
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateAdminRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAdminRequest {
    pub name: String,
    /// Link a user, or `null` to unlink. Leave out to keep the current link.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub user_id: Option<Option<Uuid>>,
}

impl UpdateAdminRequest {
    fn link(&self) -> UserLink {
        match self.user_id {
            None => UserLink::Keep,
            Some(None) => UserLink::Unlink,
            Some(Some(user_id)) => UserLink::Link(user_id),
        }
    }
}

/// One row of the permissions form as sent back to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PermissionEntryInput {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub permission_id: Uuid,
    pub active: bool,
    /// Echoed by the form; ignored by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<Permission>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SavePermissionsRequest {
    pub permission_entries: Vec<PermissionEntryInput>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveGroupsRequest {
    pub group_ids: Vec<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/admins",
    params(AdminQuery),
    responses(
        (status = 200, description = "Paged admin search.", body = Paged<Admin>),
        (status = 400, description = "Invalid query.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn list_admins(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    query: Result<Query<AdminQuery>, QueryRejection>,
) -> Result<Json<Paged<Admin>>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let query = query_params(query)?;
    let sort = parse_sort(query.sort.as_deref(), SORT_FIELDS)?;
    let page = parse_page(query.limit.as_deref(), query.page.as_deref())?;

    let found = store
        .find_admins(non_empty(query.name.as_deref()), sort, page)
        .await?;
    Ok(Json(Paged::new(found, page)))
}

#[utoipa::path(
    get,
    path = "/api/admins/{id}",
    params(("id" = String, Path, description = "Admin id")),
    responses(
        (status = 200, description = "Admin detail.", body = AdminDetail),
        (status = 400, description = "Invalid id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn get_admin(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<AdminDetail>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_id(&id)?;
    detail_or_404(store.as_ref(), id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/admins",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created.", body = Admin),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn create_admin(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<CreateAdminRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let request = json_body(payload)?;
    let name = required_name(&request.name)?;
    let admin = store.insert_admin(name).await?;
    Ok((StatusCode::CREATED, Json(admin)).into_response())
}

#[utoipa::path(
    put,
    path = "/api/admins/{id}",
    params(("id" = String, Path, description = "Admin id")),
    request_body = UpdateAdminRequest,
    responses(
        (status = 200, description = "Admin updated.", body = Admin),
        (status = 400, description = "Invalid id, payload, unknown user or own link change.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
        (status = 409, description = "User is already linked to an admin.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn update_admin(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<UpdateAdminRequest>, JsonRejection>,
) -> Result<Json<Admin>, ApiError> {
    let principal = require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    let request = json_body(payload)?;
    let name = required_name(&request.name)?;
    let link = request.link();
    let relinks = match link {
        UserLink::Keep => false,
        UserLink::Unlink => true,
        UserLink::Link(user_id) => user_id != principal.user_id,
    };
    if relinks {
        principal.ensure_not_own_admin(id, "Cannot unlink your own admin record.")?;
    }
    written(store.update_admin(id, name, link).await?).map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/admins/{id}",
    params(("id" = String, Path, description = "Admin id")),
    responses(
        (status = 200, description = "Admin deleted.", body = Success),
        (status = 400, description = "Invalid id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn delete_admin(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<Success>, ApiError> {
    let principal = require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    principal.ensure_not_own_admin(id, "Cannot delete your own admin record.")?;
    if store.delete_admin(id).await? {
        Ok(Success::response())
    } else {
        Err(ApiError::NotFound("Admin not found."))
    }
}

#[utoipa::path(
    put,
    path = "/api/admins/{id}/permissions",
    params(("id" = String, Path, description = "Admin id")),
    request_body = SavePermissionsRequest,
    responses(
        (status = 200, description = "Permission entries replaced.", body = AdminDetail),
        (status = 400, description = "Invalid id or entries.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
        (status = 409, description = "Entry id belongs to another admin.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn save_permissions(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<SavePermissionsRequest>, JsonRejection>,
) -> Result<Json<AdminDetail>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    let request = json_body(payload)?;
    let grants = grants_for(id, &request.permission_entries)?;

    written(store.replace_permission_entries(id, &grants).await?)?;
    detail_or_404(store.as_ref(), id).await.map(Json)
}

#[utoipa::path(
    put,
    path = "/api/admins/{id}/groups",
    params(("id" = String, Path, description = "Admin id")),
    request_body = SaveGroupsRequest,
    responses(
        (status = 200, description = "Group membership replaced.", body = AdminDetail),
        (status = 400, description = "Invalid id, unknown group or own Root removal.", body = ErrorBody),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
        (status = 404, description = "Admin not found.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn save_groups(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
    payload: Result<Json<SaveGroupsRequest>, JsonRejection>,
) -> Result<Json<AdminDetail>, ApiError> {
    let principal = require_root_admin(&headers, store.as_ref()).await?;
    let id = parse_target_id(&id)?;
    let request = json_body(payload)?;
    let mut seen = HashSet::new();
    let group_ids: Vec<Uuid> = request
        .group_ids
        .into_iter()
        .filter(|group| seen.insert(*group))
        .collect();

    let root_group = store
        .list_admin_groups()
        .await?
        .into_iter()
        .find(|group| group.name == ROOT_GROUP);
    if root_group.is_some_and(|root| !group_ids.contains(&root.id)) {
        principal.ensure_not_own_admin(id, "Cannot remove your own admin from the Root group.")?;
    }

    written(store.replace_admin_groups(id, &group_ids).await?)?;
    detail_or_404(store.as_ref(), id).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/admin-groups",
    responses(
        (status = 200, description = "All admin groups.", body = [AdminGroup]),
        (status = 401, description = "Missing or invalid session.", body = ErrorBody),
        (status = 403, description = "Root admin required.", body = ErrorBody),
    ),
    tag = "admins"
)]
pub async fn list_admin_groups(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<Vec<AdminGroup>>, ApiError> {
    require_root_admin(&headers, store.as_ref()).await?;
    Ok(Json(store.list_admin_groups().await?))
}

/// Check the submitted entries against the path id and each other.
fn grants_for(
    admin_id: Uuid,
    entries: &[PermissionEntryInput],
) -> Result<Vec<PermissionGrant>, ApiError> {
    let mut permissions = HashSet::new();
    let mut entry_ids = HashSet::new();
    entries
        .iter()
        .map(|entry| {
            if entry.admin_id != admin_id {
                return Err(ApiError::bad_request(
                    "Permission entry belongs to another admin.",
                ));
            }
            if !entry_ids.insert(entry.id) {
                return Err(ApiError::bad_request("Duplicate permission entry."));
            }
            if !permissions.insert(entry.permission_id) {
                return Err(ApiError::bad_request("Duplicate permission."));
            }
            Ok(PermissionGrant {
                id: entry.id,
                permission_id: entry.permission_id,
                active: entry.active,
            })
        })
        .collect()
}

fn required_name(name: &str) -> Result<&str, ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(ApiError::bad_request("\"name\" is not allowed to be empty."))
    } else {
        Ok(trimmed)
    }
}

async fn detail_or_404(store: &dyn Store, id: Uuid) -> Result<AdminDetail, ApiError> {
    store
        .find_admin(id)
        .await?
        .ok_or(ApiError::NotFound("Admin not found."))
}

fn written<T>(outcome: Write<T>) -> Result<T, ApiError> {
    match outcome {
        Write::Done(value) => Ok(value),
        Write::NotFound => Err(ApiError::NotFound("Admin not found.")),
        Write::Conflict(conflict) => Err(conflict.into()),
        Write::Rejected(rejection) => Err(rejection.into()),
    }
}
