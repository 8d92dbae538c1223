//! Acquisition strategy trait and types.
//!
//! A strategy is one independent way of getting the same content: the
//! public embed page, the public query endpoint, scraping the item page, or
//! the authenticated private API. The orchestrator tries them in priority
//! order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use grapnel_core::{Item, ItemRef, SearchPage, SearchQuery};

use crate::context::FetchContext;
use crate::error::FetchError;

/// Attempt budget used when a strategy does not set one.
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(20);

// ============================================================================
// Strategy Kind
// ============================================================================

/// The acquisition mechanism a strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Public embed page.
    PublicEmbed,
    /// Public GraphQL-style query endpoint.
    PublicQuery,
    /// Scrape of the public item page.
    HtmlScrape,
    /// Authenticated private API.
    AuthenticatedApi,
}

impl StrategyKind {
    /// Returns the display name for this kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PublicEmbed => "Public Embed",
            Self::PublicQuery => "Public Query",
            Self::HtmlScrape => "HTML Scrape",
            Self::AuthenticatedApi => "Authenticated API",
        }
    }

    /// Default priority (higher is tried first).
    pub fn default_priority(&self) -> u32 {
        match self {
            Self::PublicEmbed => 100,
            Self::PublicQuery => 80,
            Self::HtmlScrape => 60,
            Self::AuthenticatedApi => 40,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Acquisition Strategy Trait
// ============================================================================

/// One method of acquiring items.
///
/// ## Implementing a Strategy
///
/// ```ignore
/// struct EmbedStrategy;
///
/// #[async_trait]
/// impl AcquisitionStrategy for EmbedStrategy {
///     fn id(&self) -> &str {
///         "public.embed"
///     }
///
///     fn kind(&self) -> StrategyKind {
///         StrategyKind::PublicEmbed
///     }
///
///     async fn is_available(&self, _ctx: &FetchContext) -> bool {
///         true
///     }
///
///     async fn resolve(&self, ctx: &FetchContext, target: &ItemRef) -> Result<Item, FetchError> {
///         let response = ctx.public_get("/p/CODE/embed/", &[]).await?;
///         // Parse the page into an Item
///     }
/// }
/// ```
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    /// Unique identifier (e.g. "public.embed").
    fn id(&self) -> &str;

    /// The mechanism this strategy uses.
    fn kind(&self) -> StrategyKind;

    /// Human-readable name.
    fn display_name(&self) -> String {
        format!("{} ({})", self.id(), self.kind().display_name())
    }

    /// Priority (higher = try first).
    fn priority(&self) -> u32 {
        self.kind().default_priority()
    }

    /// Time budget for one attempt, retries included.
    fn timeout(&self) -> Duration {
        DEFAULT_STRATEGY_TIMEOUT
    }

    /// Extra tries on transient failures within one attempt.
    fn retries(&self) -> u32 {
        0
    }

    /// Whether [`AcquisitionStrategy::search`] is implemented.
    fn supports_search(&self) -> bool {
        false
    }

    /// Quick, network-free availability check.
    async fn is_available(&self, ctx: &FetchContext) -> bool;

    /// Resolves one item.
    async fn resolve(&self, ctx: &FetchContext, target: &ItemRef) -> Result<Item, FetchError>;

    /// Searches by keyword. Returns a partial page.
    async fn search(
        &self,
        _ctx: &FetchContext,
        _query: &SearchQuery,
    ) -> Result<SearchPage, FetchError> {
        Err(FetchError::Unsupported(self.id().to_string()))
    }
}

// ============================================================================
// Strategy Info
// ============================================================================

/// Information about a strategy (for reporting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    /// Strategy ID.
    pub id: String,
    /// Strategy kind.
    pub kind: StrategyKind,
    /// Whether the strategy is available.
    pub available: bool,
    /// Priority.
    pub priority: u32,
    /// Whether it can search.
    pub searchable: bool,
}

impl StrategyInfo {
    /// Creates strategy info from a strategy implementation.
    pub async fn from_strategy(strategy: &dyn AcquisitionStrategy, ctx: &FetchContext) -> Self {
        Self {
            id: strategy.id().to_string(),
            kind: strategy.kind(),
            available: strategy.is_available(ctx).await,
            priority: strategy.priority(),
            searchable: strategy.supports_search(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
