//! # Lernejo (Coaching Academy Portal API)
//!
//! `lernejo` is the backend for a coaching-certification academy portal. It
//! handles password authentication, role-aware sessions, and CRUD over users,
//! classes, programs, and class sessions.
//!
//! ## Role Model
//!
//! Accounts carry three independent boolean role flags: `student`, `teacher`,
//! and `admin`. A single account may hold any combination, but needs at least
//! one flag to sign in.
//!
//! - **Current role:** each session acts as exactly one role at a time. On
//!   login it is the highest-privilege flag (admin > teacher > student); a
//!   multi-role account can switch personas without re-authenticating.
//! - **Access expiry:** student-flagged accounts may carry an absolute
//!   expiry timestamp past which login is refused. Teacher and admin flags
//!   are never subject to expiry.
//!
//! ## Sessions
//!
//! Sessions are stateless: an HMAC-signed token carried in an `HttpOnly`
//! cookie (or bearer header), with a fixed absolute lifetime. There is no
//! server-side session table and no revocation list; changes to an account's
//! flags or activation take effect when its outstanding tokens expire.
//!
//! ## Authorization
//!
//! Every protected route runs the same short-circuiting sequence: session
//! presence, then a per-route role policy (some routes check the underlying
//! flag, some the active persona), then resource ownership where the route
//! mutates a specific class. Admin-flagged actors bypass ownership checks,
//! but nobody may delete their own account.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
