//! Core error types for Grapnel.

use thiserror::Error;

/// Core error type for Grapnel models and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An item reference could not be parsed.
    #[error("Invalid item reference: {0}")]
    InvalidItemRef(String),

    /// A shortcode contained characters outside the platform alphabet.
    #[error("Invalid shortcode: {0}")]
    InvalidShortcode(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A credential bundle violated its invariants.
    #[error("Invalid credential bundle: {0}")]
    InvalidBundle(String),

    /// Invalid data from an upstream response.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
