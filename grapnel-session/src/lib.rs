// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Grapnel Session
//!
//! Credential lifecycle for Grapnel.
//!
//! This crate provides:
//!
//! - **Expiry**: Pure expiry checks over bundles and cookie sets
//! - **SessionManager**: The single active bundle, derived status, callbacks
//! - **SessionValidator**: Presence check plus one live profile probe
//! - **TwoFactorResolver**: Challenge detection, TOTP, SMS wait, backup codes
//! - **SessionRefresher**: Silent refresh with browser re-login fallback
//!
//! ## Usage
//!
//! ```ignore
//! use grapnel_session::{SessionManager, SessionRefresher, HttpSilentRefresh};
//!
//! let manager = Arc::new(SessionManager::from_config(&config));
//! manager.restore(&store, config.account.as_deref()).await?;
//!
//! let refresher = SessionRefresher::new(manager.clone(), config.refresh)
//!     .with_store(store, config.account.clone())
//!     .with_silent(Arc::new(HttpSilentRefresh::new(http, platform, lifetime)));
//!
//! match refresher.schedule_refresh().await {
//!     ScheduleDecision::ScheduledAt(at) => scheduler.wake_at(at),
//!     ScheduleDecision::Immediate(result) => log_result(result),
//!     ScheduleDecision::NotNeeded => {}
//! }
//! ```

pub mod error;
pub mod expiry;
pub mod manager;
pub mod refresher;
pub mod two_factor;
pub mod validator;

pub use error::{SessionError, TwoFactorError};
pub use expiry::{ExpiryReport, check_bundle, check_cookie_expiry, check_expiry};
pub use manager::{ExpiringSoonCallback, SessionInvalidCallback, SessionManager};
pub use refresher::{
    BrowserRelogin, HttpSilentRefresh, RefreshEvent, RefreshMethod, RefreshResult, RefreshState,
    ScheduleDecision, SessionRefresher, SilentRefresh,
};
pub use two_factor::{
    CancelHandle, SmsCodeSource, TOTP_DIGITS, TOTP_STEP_SECS, TwoFactorOutcome,
    TwoFactorResolver, current_totp, detect_challenge_type, detect_challenge_with, generate_totp,
};
pub use validator::{SessionValidator, ValidationOutcome};
