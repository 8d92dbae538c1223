// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Grapnel Core
//!
//! Core types, models, and configuration for the Grapnel workspace.
//!
//! This crate provides the foundational abstractions used across all other
//! Grapnel crates, including:
//!
//! - Domain models (items, item references, search pages)
//! - Credential models (cookie records, credential bundles, session status)
//! - Configuration value types
//! - Error types
//!
//! ## Key Types
//!
//! ### Content Types
//! - [`Item`] - A normalized platform item (post, reel, carousel)
//! - [`ItemRef`] - A reference to one item by shortcode, media id, or URL
//! - [`SearchQuery`] / [`SearchPage`] - Keyword search input and partial output
//!
//! ### Credential Types
//! - [`CookieRecord`] - One raw cookie as harvested from a browser or response
//! - [`CredentialBundle`] - The authenticated cookie set plus lifecycle metadata
//! - [`SessionStatus`] / [`Health`] - Derived, never-persisted session health
//!
//! ### Configuration
//! - [`GrapnelConfig`] - Aggregate of every configurable value

pub mod config;
pub mod error;
pub mod models;

// Re-export error types
pub use error::CoreError;

// Re-export configuration types
pub use config::{
    GrapnelConfig, HealthThresholds, LoginSelectors, PlatformConfig, PlatformEndpoints,
    RateLimitConfig, RefreshConfig, RequiredCookieNames, StrategySettings, StrategyToggle,
    TwoFactorConfig, TwoFactorMethod,
};

// Re-export all model types
pub use models::{
    // Content types
    Author,
    Engagement,
    Item,
    ItemRef,
    MediaKind,
    SearchPage,
    SearchQuery,
    media_id_to_shortcode,
    shortcode_to_media_id,
    // Credential types
    CookiePresence,
    CookieRecord,
    CredentialBundle,
    validate_cookie_presence,
    // Two-factor types
    TwoFactorChallenge,
    // Status types
    Health,
    SessionStatus,
};
