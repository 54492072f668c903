//! The authorization gate: one short-circuiting check sequence for every
//! protected operation.
//!
//! Order is fixed: session presence (401, before any database access), then
//! the operation's role policy (403), then, for resource-scoped mutations,
//! existence (404, which takes precedence over any permission denial) and
//! ownership (403, admin flag bypasses). Self-deletion is refused last (400).

use axum::{http::HeaderMap, http::StatusCode, response::IntoResponse, response::Response};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{error, Instrument};
use uuid::Uuid;

use super::principal::Principal;
use super::role::AccessPolicy;
use super::session::extract_session_token;
use super::state::AuthState;
use super::token::SessionClaims;

/// Authorization failure. Only the category reaches the caller; detail stays
/// in the logs.
#[derive(Debug)]
pub enum GateError {
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidOperation(&'static str),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for GateError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::InvalidOperation(message) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            Self::Internal(err) => {
                error!("Failed to authorize request: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Presence check: a verified, unexpired session token must accompany the
/// request. Purely token-local; no database involved.
///
/// # Errors
/// `Unauthorized` when the token is missing, malformed, tampered, or expired.
pub fn require_session(
    headers: &HeaderMap,
    auth: &AuthState,
    now: DateTime<Utc>,
) -> Result<(Principal, SessionClaims), GateError> {
    let Some(token) = extract_session_token(headers) else {
        return Err(GateError::Unauthorized);
    };
    let claims = auth
        .codec()
        .decode(&token, now)
        .map_err(|_| GateError::Unauthorized)?;
    Ok((Principal::from_claims(&claims), claims))
}

/// Role check for the operation's declared policy.
///
/// # Errors
/// `Forbidden` when the actor does not satisfy the policy.
pub fn require_policy(principal: &Principal, policy: AccessPolicy) -> Result<(), GateError> {
    if principal.satisfies(policy) {
        Ok(())
    } else {
        Err(GateError::Forbidden)
    }
}

/// Resolved relationship between an actor and a specific resource.
#[derive(Clone, Copy, Debug)]
pub struct ResourceAccess {
    pub exists: bool,
    pub actor_linked: bool,
}

/// Ownership check with admin bypass and not-found precedence.
///
/// # Errors
/// `NotFound` when the resource does not exist (checked first so a denial
/// never leaks the existence of an unreachable resource); `Forbidden` when
/// the actor is neither linked to the resource nor admin-flagged.
pub fn ensure_resource(principal: &Principal, access: ResourceAccess) -> Result<(), GateError> {
    if !access.exists {
        return Err(GateError::NotFound);
    }
    if principal.is_admin() || access.actor_linked {
        Ok(())
    } else {
        Err(GateError::Forbidden)
    }
}

/// Self-protection: nobody deletes their own account, whatever their roles.
///
/// # Errors
/// `InvalidOperation` when the target is the actor.
pub fn forbid_self_target(principal: &Principal, target: Uuid) -> Result<(), GateError> {
    if principal.user_id == target {
        Err(GateError::InvalidOperation("cannot delete your own account"))
    } else {
        Ok(())
    }
}

/// Resolve a class and the actor's teacher assignment to it in one read.
///
/// # Errors
/// Returns an error when the query itself fails.
pub async fn class_access(
    pool: &PgPool,
    class_id: Uuid,
    user_id: Uuid,
) -> Result<ResourceAccess, anyhow::Error> {
    let query = r"
        SELECT EXISTS(
            SELECT 1 FROM class_teachers
            WHERE class_id = $1 AND user_id = $2
        ) AS actor_linked
        FROM classes
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(class_id)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .map_err(|err| anyhow::anyhow!("failed to resolve class access: {err}"))?;

    Ok(match row {
        Some(row) => ResourceAccess {
            exists: true,
            actor_linked: row.get("actor_linked"),
        },
        None => ResourceAccess {
            exists: false,
            actor_linked: false,
        },
    })
}
