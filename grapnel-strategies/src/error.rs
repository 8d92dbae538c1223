//! Parser error types.

use grapnel_fetch::FetchError;
use thiserror::Error;

/// Errors raised while turning a page or payload into an item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The page carried none of the expected content.
    #[error("No item content found")]
    NoContent,

    /// The payload parsed but held no media node.
    #[error("No media in payload")]
    NoMedia,

    /// A reference could not be turned into the form an endpoint needs.
    #[error("Cannot address item: {0}")]
    Unaddressable(String),

    /// Embedded JSON was malformed.
    #[error("Malformed embedded data: {0}")]
    EmbeddedJson(String),
}

impl From<ParseError> for FetchError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Unaddressable(msg) => FetchError::Validation(msg),
            other => FetchError::Parse(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::EmbeddedJson(err.to_string())
    }
}
