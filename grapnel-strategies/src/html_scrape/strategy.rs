//! HTML scrape strategy implementation.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

use grapnel_core::{Item, ItemRef, PlatformEndpoints};
use grapnel_fetch::{AcquisitionStrategy, FetchContext, FetchError, StrategyKind};

use super::parser::parse_item_page;
use crate::common::{StrategyTuning, check_page, page_failure, shortcode_for};

/// Resolves items by scraping the public item page.
#[derive(Debug, Clone, Default)]
pub struct HtmlScrapeStrategy {
    tuning: StrategyTuning,
}

impl HtmlScrapeStrategy {
    /// Creates the strategy with default tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy with the given tuning.
    pub fn with_tuning(tuning: StrategyTuning) -> Self {
        Self { tuning }
    }
}

#[async_trait]
impl AcquisitionStrategy for HtmlScrapeStrategy {
    fn id(&self) -> &str {
        "public.html"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::HtmlScrape
    }

    fn timeout(&self) -> Duration {
        self.tuning.timeout
    }

    fn retries(&self) -> u32 {
        self.tuning.retries
    }

    async fn is_available(&self, _ctx: &FetchContext) -> bool {
        true
    }

    #[instrument(skip(self, ctx), fields(strategy = self.id()))]
    async fn resolve(&self, ctx: &FetchContext, target: &ItemRef) -> Result<Item, FetchError> {
        let shortcode = shortcode_for(target)?;
        let path =
            PlatformEndpoints::render(&ctx.platform.endpoints.post_page, "shortcode", &shortcode);

        let response = ctx.public_get(&path, &[]).await?;
        check_page(&path, &response)?;

        let item = parse_item_page(&response.text, &shortcode, self.id())
            .map_err(|e| page_failure(&path, &response.text, e))?;
        debug!(id = %item.id, "Item page parsed");
        Ok(item)
    }
}
