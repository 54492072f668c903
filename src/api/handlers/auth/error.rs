//! Login-time and switch-time error taxonomy.
//!
//! Login failures surface their specific reason to the caller (an accepted
//! disclosure trade-off so operators can tell a disabled account from a bad
//! password). Authorization failures elsewhere only surface their category;
//! see `gate::GateError`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is inactive")]
    AccountInactive,
    #[error("no permissions assigned to this account")]
    NoPermissionsAssigned,
    #[error("account access has expired")]
    AccessExpired,
    #[error("invalid role")]
    InvalidRole,
    #[error("role not granted")]
    RoleNotGranted,
}

impl AuthError {
    /// Fixed status mapping: login failures are 401, a malformed role name is
    /// a validation failure, and holding-no-such-role is a forbidden.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::AccountInactive
            | Self::NoPermissionsAssigned
            | Self::AccessExpired => StatusCode::UNAUTHORIZED,
            Self::InvalidRole => StatusCode::BAD_REQUEST,
            Self::RoleNotGranted => StatusCode::FORBIDDEN,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthErrorBody {
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = AuthErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_errors_map_to_401() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::AccountInactive,
            AuthError::NoPermissionsAssigned,
            AuthError::AccessExpired,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn switch_errors_keep_their_categories() {
        assert_eq!(AuthError::InvalidRole.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::RoleNotGranted.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn messages_name_the_reason() {
        assert_eq!(
            AuthError::AccountInactive.to_string(),
            "account is inactive"
        );
        assert_eq!(
            AuthError::AccessExpired.to_string(),
            "account access has expired"
        );
    }
}
