// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Grapnel Fetch
//!
//! Acquisition engine, authenticated API client, and host APIs for Grapnel.
//!
//! ## Host APIs
//!
//! The [`host`] module provides abstractions for system interactions:
//!
//! - [`host::http`] - HTTP transport trait and the reqwest implementation
//! - [`host::browser`] - Headless browser automation seam for re-login
//! - [`host::keychain`] - Secure storage for login credentials and 2FA secrets
//!
//! ## Acquisition
//!
//! - [`strategy::AcquisitionStrategy`] - Trait for one way of getting content
//! - [`orchestrator::Orchestrator`] - Runs strategies with fallback and merging
//! - [`context::FetchContext`] - Provides access to host APIs
//!
//! ## Authenticated API
//!
//! - [`api::ApiClient`] - Session-bearing requests through the rate limiter
//! - [`rate_limit::RateLimiter`] - Sliding-window limiter with minimum spacing
//! - [`classify`] - Detects HTML served where JSON was expected
//!
//! ## Example
//!
//! ```ignore
//! use grapnel_fetch::{FetchContext, Orchestrator};
//!
//! let ctx = FetchContext::builder().build()?;
//! let orchestrator = Orchestrator::with_strategies(vec![
//!     Box::new(EmbedStrategy::new()),
//!     Box::new(AuthenticatedStrategy::new()),
//! ]);
//!
//! let item = orchestrator.resolve(&ctx, &ItemRef::parse("CODE")?).await.into_result()?;
//! ```

pub mod api;
pub mod classify;
pub mod context;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod shapes;
pub mod strategy;

// Errors
pub use error::{
    BrowserError, FetchError, KeychainError, OperatorAction, TransportError, panic_message,
};

// Host APIs
pub use host::{
    BrowserLauncher, BrowserSession, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    MemorySecretStore, ReqwestTransport, SecretStore, SystemKeychain, parse_set_cookie,
};

// Authenticated API
pub use api::{ApiClient, CredentialProvider, StaticCredentials, decode_json};
pub use classify::{Classification, classify, looks_like_html};
pub use rate_limit::RateLimiter;
pub use retry::{Backoff, RetryOutcome, RetryPolicy};
pub use shapes::{RawMedia, ResponseShape};

// Strategy & Orchestration
pub use context::{FetchContext, FetchContextBuilder, FetchSettings};
pub use orchestrator::{Orchestrator, ResolveOutcome, SearchOutcome, StrategyResult};
pub use strategy::{AcquisitionStrategy, DEFAULT_STRATEGY_TIMEOUT, StrategyInfo, StrategyKind};
