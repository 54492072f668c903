//! Session endpoints for cookie and bearer auth.
//!
//! The session is a signed stateless token; these handlers read it, report
//! it, commit role switches into it, and clear it. Committing a switch
//! re-issues the cookie with the new persona but the original absolute
//! expiry; switching never extends a session.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use super::state::{AuthConfig, AuthState};
use super::switch_role::switch_role;
use super::token::SessionClaims;
use super::types::{SessionResponse, SwitchRoleRequest};

const SESSION_COOKIE_NAME: &str = "lernejo_session";

fn session_response(claims: &SessionClaims) -> SessionResponse {
    SessionResponse {
        user_id: claims.sub.to_string(),
        email: claims.email.clone(),
        name: claims.name.clone(),
        timezone: claims.timezone.clone(),
        roles: claims.roles,
        role: claims.role,
        expires_at: claims.exp,
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Missing or invalid tokens are both "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match auth_state.codec().decode(&token, Utc::now()) {
        Ok(claims) => (StatusCode::OK, Json(session_response(&claims))).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/session",
    request_body = SwitchRoleRequest,
    responses(
        (status = 200, description = "Session re-issued with the new role", body = SessionResponse),
        (status = 400, description = "Unknown role name."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Role not granted to this account."),
    ),
    tag = "auth"
)]
pub async fn update_session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<SwitchRoleRequest>,
) -> impl IntoResponse {
    let now = Utc::now();
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let claims = match auth_state.codec().decode(&token, now) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    // The commit step re-runs the possession check; the validate call cannot
    // be used to smuggle a role past it.
    let next = match switch_role(&claims, &payload.role) {
        Ok(next) => next,
        Err(err) => return err.into_response(),
    };

    let token = match auth_state.codec().encode(&next) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to encode session token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token, next.remaining_seconds(now)) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(session_response(&next)),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Stateless sessions: clearing the cookie is the whole logout.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(super) fn session_cookie(
    auth_config: &AuthConfig,
    token: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frontend: &str) -> AuthConfig {
        AuthConfig::new(frontend.to_string())
    }

    #[test]
    fn cookie_extraction_finds_session_among_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; lernejo_session=tok123; lang=eo"),
        );
        assert_eq!(extract_session_token(&headers), Some("tok123".to_string()));
    }

    #[test]
    fn bearer_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("lernejo_session=from-cookie"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn empty_bearer_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn missing_headers_yield_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn session_cookie_marks_secure_only_for_https_frontends() {
        let cookie = session_cookie(&config("https://portal.lernejo.dev"), "tok", 3600)
            .expect("cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.contains("Secure"));
        assert!(value.contains("Max-Age=3600"));
        assert!(value.contains("HttpOnly"));

        let cookie = session_cookie(&config("http://localhost:3000"), "tok", 3600).expect("cookie");
        assert!(!cookie.to_str().expect("ascii").contains("Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let cookie = clear_session_cookie(&config("http://localhost:3000")).expect("cookie");
        assert!(cookie.to_str().expect("ascii").contains("Max-Age=0"));
    }
}
