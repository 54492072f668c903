//! Auth configuration and shared request state.

use std::sync::Arc;

use super::token::TokenCodec;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared state for session handling: configuration plus the token codec.
pub struct AuthState {
    config: AuthConfig,
    codec: Arc<dyn TokenCodec>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, codec: Arc<dyn TokenCodec>) -> Self {
        Self { config, codec }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &dyn TokenCodec {
        self.codec.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::token::Hs256TokenCodec;
    use secrecy::SecretString;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://portal.lernejo.dev".to_string());
        assert_eq!(config.frontend_base_url(), "https://portal.lernejo.dev");
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert!(config.session_cookie_secure());

        let config = config.with_session_ttl_seconds(3600);
        assert_eq!(config.session_ttl_seconds(), 3600);

        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_exposes_config_and_codec() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let codec = Arc::new(Hs256TokenCodec::new(SecretString::from(
            "0123456789abcdef0123456789abcdef".to_string(),
        )));
        let state = AuthState::new(config, codec);
        assert_eq!(state.config().session_ttl_seconds(), 24 * 60 * 60);
    }
}
