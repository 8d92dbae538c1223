//! Authenticated private API.
//!
//! The most capable and the most expensive strategy: every call spends a
//! rate-limiter slot and risks the session. It is tried last.

mod strategy;

pub use strategy::AuthenticatedApiStrategy;
