//! User management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via the session token.
//! 2) Enforce the route's role policy: admin flag for everything except
//!    creation, where a teacher flag admits student-only account creation.
//! 3) Perform the read or allow-listed update, then write the audit row.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::gate::{forbid_self_target, require_policy, require_session};
use super::auth::identity::{CreateOutcome, DynIdentityStore, NewUser, UserChanges, UserRecord};
use super::auth::password::hash_password;
use super::auth::principal::Principal;
use super::auth::role::{AccessPolicy, Role, RoleFlags};
use super::auth::state::AuthState;
use crate::api::audit;

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub roles: RoleFlags,
    pub is_active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserDetail {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub timezone: String,
    pub roles: RoleFlags,
    pub is_active: bool,
    pub access_expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserCreateRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub timezone: Option<String>,
    pub roles: RoleFlags,
    pub is_active: Option<bool>,
    pub access_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub display_name: Option<String>,
    pub timezone: Option<String>,
    pub roles: Option<RoleFlags>,
    pub is_active: Option<bool>,
    /// Absent keeps the stored expiry; an explicit `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub access_expires_at: Option<Option<DateTime<Utc>>>,
}

/// Distinguish a missing field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Creation policy: an admin flag admits any account shape; a teacher flag
/// admits student-only accounts. Both are flag-based on purpose: a teacher
/// currently acting as a student may still register students.
fn creation_allowed(principal: &Principal, requested: RoleFlags) -> bool {
    if principal.flags.admin {
        return true;
    }
    principal.flags.teacher && requested == RoleFlags::new(true, false, false)
}

fn user_detail(record: &UserRecord) -> UserDetail {
    UserDetail {
        id: record.id.to_string(),
        email: record.email.clone(),
        display_name: record.display_name.clone(),
        timezone: record.timezone.clone(),
        roles: record.flags,
        is_active: record.is_active,
        access_expires_at: record.access_expires_at.map(|t| t.to_rfc3339()),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}

#[derive(Debug)]
enum ServiceError {
    Forbidden,
    BadRequest(&'static str),
    Conflict(&'static str),
    NotFound,
    Internal(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            Self::Internal(err) => {
                error!("Failed to handle user request: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "List users (admin flag).", body = [UserSummary]),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<DynIdentityStore>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Admin)) {
        return err.into_response();
    }

    match store.list().await {
        Ok(records) => {
            let list: Vec<UserSummary> = records
                .iter()
                .map(|record| UserSummary {
                    id: record.id.to_string(),
                    email: record.email.clone(),
                    display_name: record.display_name.clone(),
                    roles: record.flags,
                    is_active: record.is_active,
                })
                .collect();
            (StatusCode::OK, Json(list)).into_response()
        }
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created.", body = UserDetail),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Neither admin nor teacher, or a teacher requesting non-student flags."),
        (status = 409, description = "Email already registered."),
    ),
    tag = "users"
)]
pub async fn create_user(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<DynIdentityStore>,
    pool: Extension<PgPool>,
    Json(payload): Json<UserCreateRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    match insert_user(&principal, &store, payload).await {
        Ok(record) => {
            audit::record(
                &pool,
                principal.user_id,
                "user.create",
                "user",
                Some(record.id),
                serde_json::json!({ "email": record.email }),
            )
            .await;
            (StatusCode::CREATED, Json(user_detail(&record))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn insert_user(
    principal: &Principal,
    store: &DynIdentityStore,
    payload: UserCreateRequest,
) -> Result<UserRecord, ServiceError> {
    if !creation_allowed(principal, payload.roles) {
        return Err(ServiceError::Forbidden);
    }
    if !valid_email(payload.email.trim()) {
        return Err(ServiceError::BadRequest("invalid email address"));
    }
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::BadRequest("password is too short"));
    }
    if payload.display_name.trim().is_empty() {
        return Err(ServiceError::BadRequest("display name is required"));
    }

    let password_hash = hash_password(&payload.password).map_err(ServiceError::Internal)?;
    let new_user = NewUser {
        email: payload.email.trim().to_string(),
        display_name: payload.display_name.trim().to_string(),
        password_hash,
        timezone: payload.timezone.unwrap_or_else(|| "UTC".to_string()),
        flags: payload.roles,
        is_active: payload.is_active.unwrap_or(true),
        access_expires_at: payload.access_expires_at,
    };

    match store.create(new_user).await.map_err(ServiceError::Internal)? {
        CreateOutcome::Created(record) => Ok(record),
        CreateOutcome::DuplicateEmail => {
            Err(ServiceError::Conflict("email already registered"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail (admin flag).", body = UserDetail),
        (status = 400, description = "Invalid user id."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<DynIdentityStore>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Admin)) {
        return err.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match store.find_by_id(user_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(user_detail(&record))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user detail: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated (admin flag).", body = UserDetail),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn patch_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<DynIdentityStore>,
    pool: Extension<PgPool>,
    Json(payload): Json<UserUpdateRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Admin)) {
        return err.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let display_name = normalize_optional(payload.display_name);
    let timezone = normalize_optional(payload.timezone);
    if display_name.is_none()
        && timezone.is_none()
        && payload.roles.is_none()
        && payload.is_active.is_none()
        && payload.access_expires_at.is_none()
    {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    let changes = UserChanges {
        display_name,
        timezone,
        password_hash: None,
        flags: payload.roles,
        is_active: payload.is_active,
        access_expires_at: payload.access_expires_at,
    };

    match store.update(user_id, changes).await {
        Ok(Some(record)) => {
            audit::record(
                &pool,
                principal.user_id,
                "user.update",
                "user",
                Some(record.id),
                serde_json::json!({
                    "roles_changed": payload.roles.is_some(),
                    "activation_changed": payload.is_active.is_some(),
                }),
            )
            .await;
            (StatusCode::OK, Json(user_detail(&record))).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    responses(
        (status = 204, description = "User deleted (admin flag)."),
        (status = 400, description = "Invalid user id or self-deletion attempt."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<DynIdentityStore>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Admin)) {
        return err.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    // Self-protection comes before any store access: no mutation may occur.
    if let Err(err) = forbid_self_target(&principal, user_id) {
        return err.into_response();
    }

    match store.delete(user_id).await {
        Ok(true) => {
            audit::record(
                &pool,
                principal.user_id,
                "user.delete",
                "user",
                Some(user_id),
                serde_json::json!({}),
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(flags: RoleFlags, current: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "actor@example.com".to_string(),
            flags,
            current_role: current,
        }
    }

    #[test]
    fn admin_flag_creates_any_account_shape() {
        let admin = principal(RoleFlags::new(false, false, true), Role::Admin);
        assert!(creation_allowed(&admin, RoleFlags::new(true, true, true)));
        assert!(creation_allowed(&admin, RoleFlags::new(false, true, false)));
    }

    #[test]
    fn teacher_flag_creates_student_only_accounts() {
        let teacher = principal(RoleFlags::new(false, true, false), Role::Teacher);
        assert!(creation_allowed(&teacher, RoleFlags::new(true, false, false)));
        assert!(!creation_allowed(&teacher, RoleFlags::new(true, true, false)));
        assert!(!creation_allowed(&teacher, RoleFlags::new(false, false, true)));
        assert!(!creation_allowed(&teacher, RoleFlags::default()));
    }

    #[test]
    fn teacher_creation_right_is_flag_based() {
        // A teacher currently acting as a student may still register students.
        let teacher = principal(RoleFlags::new(true, true, false), Role::Student);
        assert!(creation_allowed(&teacher, RoleFlags::new(true, false, false)));
    }

    #[test]
    fn students_create_nothing() {
        let student = principal(RoleFlags::new(true, false, false), Role::Student);
        assert!(!creation_allowed(&student, RoleFlags::new(true, false, false)));
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn update_request_distinguishes_null_from_absent() {
        let absent: UserUpdateRequest =
            serde_json::from_value(serde_json::json!({ "display_name": "Ana" }))
                .expect("deserialize");
        assert!(absent.access_expires_at.is_none());

        let cleared: UserUpdateRequest =
            serde_json::from_value(serde_json::json!({ "access_expires_at": null }))
                .expect("deserialize");
        assert_eq!(cleared.access_expires_at, Some(None));

        let set: UserUpdateRequest = serde_json::from_value(
            serde_json::json!({ "access_expires_at": "2026-12-31T00:00:00Z" }),
        )
        .expect("deserialize");
        assert!(set.access_expires_at.flatten().is_some());
    }

    #[test]
    fn update_request_rejects_unknown_fields() {
        let result: Result<UserUpdateRequest, _> =
            serde_json::from_value(serde_json::json!({ "password": "nope" }));
        assert!(result.is_err());
    }

    #[test]
    fn normalize_optional_drops_blank_strings() {
        assert_eq!(normalize_optional(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional(Some(" Ana ".to_string())),
            Some("Ana".to_string())
        );
        assert_eq!(normalize_optional(None), None);
    }
}
