//! Auth handlers and the role-aware session core.
//!
//! Three pieces cooperate here:
//!
//! - the **authenticator** (`authenticate.rs`) turns credentials into a
//!   signed session token with a derived current role;
//! - the **role switcher** (`switch_role.rs` + the session-update endpoint)
//!   lets a multi-role account change persona without re-authenticating,
//!   through a two-step validate/commit protocol;
//! - the **gate** (`gate.rs`) applies the fixed check order (presence,
//!   role policy, ownership, self-protection) to every protected route.
//!
//! Sessions are stateless HMAC-signed tokens (`token.rs`); account state is
//! read through the `IdentityStore` boundary (`identity.rs`). Changes to an
//! account's flags or activation do not reach tokens already in the wild;
//! the absolute expiry is the only terminator.

pub(crate) mod authenticate;
pub(crate) mod error;
pub(crate) mod gate;
pub(crate) mod identity;
pub(crate) mod password;
pub(crate) mod principal;
pub(crate) mod role;
pub(crate) mod session;
pub(crate) mod state;
pub(crate) mod switch_role;
pub(crate) mod token;
pub(crate) mod types;

pub use identity::{DynIdentityStore, IdentityStore, PgIdentityStore};
pub use state::{AuthConfig, AuthState};
pub use token::{Hs256TokenCodec, TokenCodec};

#[cfg(test)]
pub(crate) mod test_support;
