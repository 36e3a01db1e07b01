//! API handlers and the input helpers they share.
//!
//! Payloads are parsed with `Result<Json<T>, JsonRejection>` so malformed JSON
//! and unknown fields surface as `400` in the common error envelope instead of
//! axum's plain-text rejections.

pub mod admins;
pub mod auth;
pub mod health;
pub mod permissions;
pub mod users;


use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query,
    },
    Json,
};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use super::error::ApiError;
use crate::store::{PageRequest, Sort};

/// Unwrap a JSON payload, mapping rejections to `400`.
///
/// # Errors
/// Returns `400` with serde's message, which names the offending field.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// # Errors
/// Returns `400` when the query string cannot be decoded.
pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Tell an absent field (`None`) from an explicit `null` (`Some(None)`).
/// Pair with `#[serde(default)]`.
///
/// # Errors
/// Propagates the inner value's deserialization error.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parse a path id; malformed ids are `400 "Invalid id."`.
///
/// # Errors
/// Returns `400` for anything that is not a UUID.
pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request("Invalid id."))
}

/// Like [`parse_id`] but also rejects the nil UUID, used by routes that write.
///
/// # Errors
/// Returns `400` for malformed or nil ids.
pub fn parse_target_id(raw: &str) -> Result<Uuid, ApiError> {
    let id = parse_id(raw)?;
    if id.is_nil() {
        return Err(ApiError::bad_request("Invalid id."));
    }
    Ok(id)
}

/// Usernames are tokens (`[A-Za-z0-9_]+`), stored lowercased.
///
/// # Errors
/// Returns `400` naming the field.
pub fn normalize_username(username: &str) -> Result<String, ApiError> {
    let valid = Regex::new(r"^[A-Za-z0-9_]+$").is_ok_and(|re| re.is_match(username));
    if valid {
        Ok(username.to_lowercase())
    } else {
        Err(ApiError::bad_request(
            "\"username\" must only contain alpha-numeric and underscore characters.",
        ))
    }
}

/// # Errors
/// Returns `400` naming the field.
pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let normalized = email.trim().to_lowercase();
    let valid =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(&normalized));
    if valid {
        Ok(normalized)
    } else {
        Err(ApiError::bad_request("\"email\" must be a valid email."))
    }
}

/// # Errors
/// Returns `400` for an empty password.
pub fn require_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        Err(ApiError::bad_request("\"password\" is not allowed to be empty."))
    } else {
        Ok(())
    }
}

/// Parse `sort`: a field name, optionally prefixed with `-` for descending.
/// Missing or empty input yields the default order.
///
/// # Errors
/// Returns `400` for a field outside `fields`.
pub fn parse_sort<F: Copy + Default>(
    raw: Option<&str>,
    fields: &[(&str, F)],
) -> Result<Sort<F>, ApiError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(Sort::default());
    }
    let (name, descending) = match raw.strip_prefix('-') {
        Some(name) => (name, true),
        None => (raw, false),
    };
    fields
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, field)| Sort {
            field: *field,
            descending,
        })
        .ok_or_else(|| ApiError::bad_request(format!("\"sort\" does not support \"{name}\".")))
}

/// `limit` defaults to 20 and `page` to 1; both must be integers >= 1.
///
/// # Errors
/// Returns `400` naming the offending parameter.
pub fn parse_page(limit: Option<&str>, page: Option<&str>) -> Result<PageRequest, ApiError> {
    Ok(PageRequest {
        limit: positive_param("limit", limit, super::paging::DEFAULT_LIMIT)?,
        page: positive_param("page", page, 1)?,
    })
}

fn positive_param(name: &str, raw: Option<&str>, default: u64) -> Result<u64, ApiError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(default);
    }
    match raw.parse::<u64>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ApiError::bad_request(format!(
            "\"{name}\" must be a number greater than or equal to 1."
        ))),
    }
}

/// Empty strings in query parameters count as absent.
#[must_use]
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
