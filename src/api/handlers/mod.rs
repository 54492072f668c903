//! API handlers for the portal.
//!
//! Route handlers stay thin: gate checks via `auth::gate`, a storage call,
//! an audit row for mutations, JSON out.

pub mod auth;
pub mod classes;
pub mod health;
pub mod me;
pub mod programs;
pub mod root;
pub mod users;
