//! Persona switching for multi-role accounts.
//!
//! Switching validates role possession only; it deliberately does not
//! re-check `is_active` or access expiry; those are login-time and
//! token-lifetime concerns. The endpoint protocol is two-step: this module's
//! `/v1/auth/role` call validates and reports, and the client then commits
//! the new persona through the session-update call in `session.rs`.

use axum::{extract::Extension, http::HeaderMap, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;

use super::error::AuthError;
use super::gate::require_session;
use super::state::AuthState;
use super::token::SessionClaims;
use super::types::{SwitchRoleRequest, SwitchRoleResponse};
use super::role::Role;

/// Re-target claims at another granted role.
///
/// Idempotent: switching to the already-current role returns identical
/// claims. `iat`/`exp` are preserved; switching never extends a session.
///
/// # Errors
/// `InvalidRole` for an unknown role literal, `RoleNotGranted` when the
/// matching flag is false.
pub(crate) fn switch_role(
    claims: &SessionClaims,
    requested: &str,
) -> Result<SessionClaims, AuthError> {
    let Some(role) = Role::parse(requested) else {
        return Err(AuthError::InvalidRole);
    };
    if !claims.roles.allows(role) {
        return Err(AuthError::RoleNotGranted);
    }
    let mut next = claims.clone();
    next.role = role;
    Ok(next)
}

#[utoipa::path(
    post,
    path = "/v1/auth/role",
    request_body = SwitchRoleRequest,
    responses(
        (status = 200, description = "Role switch accepted; commit it via the session update call.", body = SwitchRoleResponse),
        (status = 400, description = "Unknown role name."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Role not granted to this account."),
    ),
    tag = "auth"
)]
pub async fn validate_switch(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<SwitchRoleRequest>,
) -> impl IntoResponse {
    let (_, claims) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    // Validation only: the cookie is untouched until the client commits.
    match switch_role(&claims, &payload.role) {
        Ok(next) => Json(SwitchRoleResponse {
            success: true,
            role: next.role.to_string(),
            message: "role switch accepted".to_string(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}
