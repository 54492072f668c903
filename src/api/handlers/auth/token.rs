//! Stateless session tokens.
//!
//! The session artifact is a compact signed token (base64url header, claims,
//! signature) carried in an `HttpOnly` cookie or bearer header. Signing sits
//! behind [`TokenCodec`] so the mechanism can be swapped without touching the
//! authenticator, role switcher, or gate.
//!
//! Tokens have a fixed absolute lifetime. There is no sliding renewal and no
//! server-side revocation; `exp` is the only terminator.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use super::role::{Role, RoleFlags};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_ALG: &str = "HS256";
const TOKEN_TYP: &str = "JWT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl SessionTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: TOKEN_ALG.to_string(),
            typ: TOKEN_TYP.to_string(),
        }
    }
}

/// Claims carried by every session token.
///
/// `role` is the persona the session is acting as; it is always one of the
/// roles whose flag in `roles` is true. `access_exp` mirrors the account's
/// student access expiry so the value survives into the token unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub timezone: String,
    pub roles: RoleFlags,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_exp: Option<i64>,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Seconds remaining until the absolute expiry, clamped at zero.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.exp - now.timestamp()).max(0)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid token header")]
    InvalidHeader,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

/// Encode/decode boundary for session tokens.
///
/// `decode` must verify integrity and expiry; callers treat its output as an
/// authenticated session.
pub trait TokenCodec: Send + Sync {
    /// Serialize and sign claims into the wire form.
    ///
    /// # Errors
    /// Returns an error if serialization or signing fails.
    fn encode(&self, claims: &SessionClaims) -> Result<String, TokenError>;

    /// Verify a wire token and return its claims.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, the signature does not
    /// verify, or `exp` is not after `now`.
    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError>;
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// HMAC-SHA256 implementation of [`TokenCodec`].
pub struct Hs256TokenCodec {
    key: SecretString,
}

impl Hs256TokenCodec {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|_| TokenError::InvalidKeyLength)
    }
}

impl TokenCodec for Hs256TokenCodec {
    fn encode(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let header = b64e_json(&SessionTokenHeader::hs256())?;
        let payload = b64e_json(claims)?;
        let signing_input = format!("{header}.{payload}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::TokenFormat);
        };

        let parsed_header: SessionTokenHeader = b64d_json(header)?;
        if parsed_header.alg != TOKEN_ALG || parsed_header.typ != TOKEN_TYP {
            return Err(TokenError::InvalidHeader);
        }

        let signature = Base64UrlUnpadded::decode_vec(signature).map_err(|_| TokenError::Base64)?;

        // Constant-time comparison happens inside `verify_slice`.
        let mut mac = self.mac()?;
        mac.update(format!("{header}.{payload}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(payload)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn codec() -> Hs256TokenCodec {
        Hs256TokenCodec::new(SecretString::from(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))
    }

    fn claims(now: DateTime<Utc>) -> SessionClaims {
        SessionClaims {
            sub: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            timezone: "UTC".to_string(),
            roles: RoleFlags::new(true, true, false),
            role: Role::Teacher,
            access_exp: None,
            iat: now.timestamp(),
            exp: (now + TimeDelta::hours(24)).timestamp(),
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let codec = codec();
        let now = Utc::now();
        let claims = claims(now);

        let token = codec.encode(&claims).expect("encode");
        let decoded = codec.decode(&token, now).expect("decode");
        assert_eq!(decoded, claims);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let codec = codec();
        let now = Utc::now();
        let token = codec.encode(&claims(now)).expect("encode");

        let mut parts: Vec<&str> = token.split('.').collect();
        let mut forged = claims(now);
        forged.roles.admin = true;
        forged.role = Role::Admin;
        let forged_payload = b64e_json(&forged).expect("payload");
        parts[1] = &forged_payload;
        let forged_token = parts.join(".");

        assert!(matches!(
            codec.decode(&forged_token, now),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let now = Utc::now();
        let token = codec().encode(&claims(now)).expect("encode");
        let other = Hs256TokenCodec::new(SecretString::from(
            "ffffffffffffffffffffffffffffffff".to_string(),
        ));
        assert!(matches!(
            other.decode(&token, now),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = codec();
        let now = Utc::now();
        let mut claims = claims(now);
        claims.exp = (now - TimeDelta::seconds(1)).timestamp();

        let token = codec.encode(&claims).expect("encode");
        assert!(matches!(
            codec.decode(&token, now),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = codec();
        let now = Utc::now();
        assert!(matches!(
            codec.decode("not-a-token", now),
            Err(TokenError::TokenFormat)
        ));
        assert!(matches!(
            codec.decode("a.b.c.d", now),
            Err(TokenError::TokenFormat)
        ));
        assert!(codec.decode("!!.!!.!!", now).is_err());
    }

    #[test]
    fn remaining_seconds_clamps_at_zero() {
        let now = Utc::now();
        let mut c = claims(now);
        assert_eq!(c.remaining_seconds(now), 24 * 60 * 60);
        c.exp = (now - TimeDelta::hours(1)).timestamp();
        assert_eq!(c.remaining_seconds(now), 0);
    }
}
