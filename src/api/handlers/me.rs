//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via the session token.
//! 2) Resolve the current account through the identity store.
//! 3) Apply allow-listed self-updates (password only).

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::auth::gate::require_session;
use super::auth::identity::{DynIdentityStore, UserChanges};
use super::auth::password::{hash_password, verify_password};
use super::auth::role::{Role, RoleFlags};
use super::auth::state::AuthState;
use crate::api::audit;

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub timezone: String,
    pub roles: RoleFlags,
    pub current_role: Role,
    pub access_expires_at: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = MeResponse),
        (status = 401, description = "Missing or invalid session."),
        (status = 404, description = "Account no longer exists."),
    ),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<DynIdentityStore>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    match store.find_by_id(principal.user_id).await {
        Ok(Some(record)) => {
            let response = MeResponse {
                id: record.id.to_string(),
                email: record.email,
                display_name: record.display_name,
                timezone: record.timezone,
                roles: record.flags,
                current_role: principal.current_role,
                access_expires_at: record.access_expires_at.map(|t| t.to_rfc3339()),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/me/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password updated."),
        (status = 400, description = "Wrong current password or unacceptable new password."),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "me"
)]
pub async fn change_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    store: Extension<DynIdentityStore>,
    pool: Extension<PgPool>,
    Json(payload): Json<PasswordChangeRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    if payload.new_password.len() < MIN_PASSWORD_LENGTH {
        return (StatusCode::BAD_REQUEST, "new password is too short").into_response();
    }

    let record = match store.find_by_id(principal.user_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch account for password change: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !verify_password(&record.password_hash, &payload.current_password) {
        return (StatusCode::BAD_REQUEST, "current password is incorrect").into_response();
    }

    let password_hash = match hash_password(&payload.new_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let changes = UserChanges {
        password_hash: Some(password_hash),
        ..UserChanges::default()
    };
    match store.update(principal.user_id, changes).await {
        Ok(Some(_)) => {
            audit::record(
                &pool,
                principal.user_id,
                "user.password_change",
                "user",
                Some(principal.user_id),
                serde_json::json!({}),
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update password: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn me_response_serializes_roles_and_persona() {
        let response = MeResponse {
            id: "id".to_string(),
            email: "ana@example.com".to_string(),
            display_name: "Ana".to_string(),
            timezone: "Europe/Madrid".to_string(),
            roles: RoleFlags::new(true, true, false),
            current_role: Role::Student,
            access_expires_at: None,
        };
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["current_role"], serde_json::json!("student"));
        assert_eq!(value["roles"]["admin"], serde_json::json!(false));
    }

    #[test]
    fn password_change_request_rejects_unknown_fields() {
        let result: Result<PasswordChangeRequest, _> = serde_json::from_value(serde_json::json!({
            "current_password": "old",
            "new_password": "new-password",
            "role": "admin"
        }));
        assert!(result.is_err());
    }
}
