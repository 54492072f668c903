//! Credential authentication and the login endpoint.
//!
//! The check order is fixed and every step short-circuits: lookup, active
//! flag, role flags, password, student access expiry. Each failure surfaces
//! its specific reason to the caller.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::error;

use super::error::AuthError;
use super::identity::{DynIdentityStore, IdentityStore, UserRecord};
use super::password::{burn_verification, verify_password};
use super::session::session_cookie;
use super::state::{AuthConfig, AuthState};
use super::token::SessionClaims;
use super::types::{LoginRequest, LoginResponse};

/// Result of a credential check: a session or the specific refusal.
#[derive(Debug)]
pub(crate) enum LoginOutcome {
    Granted(SessionClaims),
    Denied(AuthError),
}

/// Run the login check sequence against the identity store.
///
/// # Errors
/// Returns an error only for store failures; every policy refusal is a
/// `LoginOutcome::Denied`.
pub(crate) async fn authenticate(
    store: &dyn IdentityStore,
    config: &AuthConfig,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<LoginOutcome> {
    let Some(record) = store.find_by_email(email).await? else {
        // Unknown email still pays for a hash verification so the miss is
        // not measurably faster than a wrong password.
        burn_verification(password);
        return Ok(LoginOutcome::Denied(AuthError::InvalidCredentials));
    };

    if !record.is_active {
        return Ok(LoginOutcome::Denied(AuthError::AccountInactive));
    }

    if !record.flags.any() {
        return Ok(LoginOutcome::Denied(AuthError::NoPermissionsAssigned));
    }

    if !verify_password(&record.password_hash, password) {
        return Ok(LoginOutcome::Denied(AuthError::InvalidCredentials));
    }

    // Expiry binds the student flag only; teacher/admin flags never expire.
    if record.flags.student {
        if let Some(expiry) = record.access_expires_at {
            if expiry < now {
                return Ok(LoginOutcome::Denied(AuthError::AccessExpired));
            }
        }
    }

    Ok(LoginOutcome::Granted(issue_claims(&record, config, now)))
}

/// Build fresh claims for a record that passed every login check.
fn issue_claims(record: &UserRecord, config: &AuthConfig, now: DateTime<Utc>) -> SessionClaims {
    // `any()` held above, so a primary role always exists.
    let role = record.flags.primary().unwrap_or(super::role::Role::Student);
    SessionClaims {
        sub: record.id,
        email: record.email.clone(),
        name: record.display_name.clone(),
        timezone: record.timezone.clone(),
        roles: record.flags,
        role,
        access_exp: record.access_expires_at.map(|t| t.timestamp()),
        iat: now.timestamp(),
        exp: (now + TimeDelta::seconds(config.session_ttl_seconds())).timestamp(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued.", body = LoginResponse),
        (status = 400, description = "Malformed payload."),
        (status = 401, description = "Login refused; the body names the reason."),
    ),
    tag = "auth"
)]
pub async fn login(
    store: Extension<DynIdentityStore>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "email and password are required").into_response();
    }

    let now = Utc::now();
    let outcome = match authenticate(
        store.0.as_ref(),
        auth_state.config(),
        &payload.email,
        &payload.password,
        now,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Failed to authenticate: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let claims = match outcome {
        LoginOutcome::Granted(claims) => claims,
        LoginOutcome::Denied(reason) => return reason.into_response(),
    };

    let token = match auth_state.codec().encode(&claims) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to encode session token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token, claims.remaining_seconds(now)) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let response = LoginResponse {
        user_id: claims.sub.to_string(),
        email: claims.email.clone(),
        name: claims.name.clone(),
        role: claims.role,
    };
    (StatusCode::OK, headers, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::role::{Role, RoleFlags};
    use crate::api::handlers::auth::test_support::{user, MemoryIdentityStore};
    use chrono::TimeDelta;

    fn config() -> AuthConfig {
        AuthConfig::new("http://localhost:3000".to_string())
    }

    async fn run(store: &MemoryIdentityStore, email: &str, password: &str) -> LoginOutcome {
        authenticate(store, &config(), email, password, Utc::now())
            .await
            .expect("store should not fail")
    }

    #[tokio::test]
    async fn login_succeeds_for_active_teacher() {
        let store = MemoryIdentityStore::default();
        store.insert(user("a@x.com", "correct", RoleFlags::new(false, true, false)));

        let outcome = run(&store, "a@x.com", "correct").await;
        let LoginOutcome::Granted(claims) = outcome else {
            panic!("expected granted, got {outcome:?}");
        };
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_credentials() {
        let store = MemoryIdentityStore::default();
        let outcome = run(&store, "nobody@x.com", "whatever").await;
        assert!(matches!(
            outcome,
            LoginOutcome::Denied(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let store = MemoryIdentityStore::default();
        store.insert(user("a@x.com", "correct", RoleFlags::new(true, false, false)));
        let outcome = run(&store, "a@x.com", "wrong").await;
        assert!(matches!(
            outcome,
            LoginOutcome::Denied(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn inactive_account_reported_before_password_check() {
        let store = MemoryIdentityStore::default();
        let mut record = user("a@x.com", "correct", RoleFlags::new(true, true, true));
        record.is_active = false;
        store.insert(record);

        // Same reason whether or not the password is right.
        for password in ["correct", "wrong"] {
            let outcome = run(&store, "a@x.com", password).await;
            assert!(matches!(
                outcome,
                LoginOutcome::Denied(AuthError::AccountInactive)
            ));
        }
    }

    #[tokio::test]
    async fn zero_flags_rejected_despite_correct_credentials() {
        let store = MemoryIdentityStore::default();
        store.insert(user("a@x.com", "correct", RoleFlags::default()));
        let outcome = run(&store, "a@x.com", "correct").await;
        assert!(matches!(
            outcome,
            LoginOutcome::Denied(AuthError::NoPermissionsAssigned)
        ));
    }

    #[tokio::test]
    async fn expired_student_access_is_refused() {
        let store = MemoryIdentityStore::default();
        let mut record = user("a@x.com", "correct", RoleFlags::new(true, false, false));
        record.access_expires_at = Some(Utc::now() - TimeDelta::days(1));
        store.insert(record);

        let outcome = run(&store, "a@x.com", "correct").await;
        assert!(matches!(
            outcome,
            LoginOutcome::Denied(AuthError::AccessExpired)
        ));
    }

    #[tokio::test]
    async fn future_or_null_expiry_admits_students() {
        let store = MemoryIdentityStore::default();
        let mut record = user("a@x.com", "correct", RoleFlags::new(true, false, false));
        record.access_expires_at = Some(Utc::now() + TimeDelta::days(30));
        store.insert(record);
        assert!(matches!(
            run(&store, "a@x.com", "correct").await,
            LoginOutcome::Granted(_)
        ));

        let store = MemoryIdentityStore::default();
        store.insert(user("b@x.com", "correct", RoleFlags::new(true, false, false)));
        assert!(matches!(
            run(&store, "b@x.com", "correct").await,
            LoginOutcome::Granted(_)
        ));
    }

    #[tokio::test]
    async fn expiry_never_applies_to_teachers_or_admins() {
        let store = MemoryIdentityStore::default();
        let mut record = user("a@x.com", "correct", RoleFlags::new(false, true, true));
        record.access_expires_at = Some(Utc::now() - TimeDelta::days(365));
        store.insert(record);

        let outcome = run(&store, "a@x.com", "correct").await;
        let LoginOutcome::Granted(claims) = outcome else {
            panic!("expected granted");
        };
        assert_eq!(claims.role, Role::Admin);
    }

    #[tokio::test]
    async fn current_role_is_highest_priority_flag() {
        let cases = [
            (RoleFlags::new(true, true, false), Role::Teacher),
            (RoleFlags::new(true, false, false), Role::Student),
            (RoleFlags::new(true, true, true), Role::Admin),
            (RoleFlags::new(false, false, true), Role::Admin),
        ];
        for (flags, expected) in cases {
            let store = MemoryIdentityStore::default();
            store.insert(user("a@x.com", "correct", flags));
            let LoginOutcome::Granted(claims) = run(&store, "a@x.com", "correct").await else {
                panic!("expected granted for {flags:?}");
            };
            assert_eq!(claims.role, expected, "flags {flags:?}");
        }
    }

    #[tokio::test]
    async fn email_lookup_is_byte_exact() {
        let store = MemoryIdentityStore::default();
        store.insert(user("Ana@X.com", "correct", RoleFlags::new(true, false, false)));
        let outcome = run(&store, "ana@x.com", "correct").await;
        assert!(matches!(
            outcome,
            LoginOutcome::Denied(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn access_expiry_is_copied_into_claims() {
        let store = MemoryIdentityStore::default();
        let expiry = Utc::now() + TimeDelta::days(7);
        let mut record = user("a@x.com", "correct", RoleFlags::new(true, false, false));
        record.access_expires_at = Some(expiry);
        store.insert(record);

        let LoginOutcome::Granted(claims) = run(&store, "a@x.com", "correct").await else {
            panic!("expected granted");
        };
        assert_eq!(claims.access_exp, Some(expiry.timestamp()));
    }
}
