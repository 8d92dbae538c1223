//! Authenticated API strategy implementation.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

use grapnel_core::{Item, ItemRef, PlatformEndpoints, SearchPage, SearchQuery};
use grapnel_fetch::{AcquisitionStrategy, FetchContext, FetchError, ResponseShape, StrategyKind};

use crate::common::StrategyTuning;
use crate::error::ParseError;
use crate::public_query::tag_name;

/// Resolves and searches through the authenticated API.
#[derive(Debug, Clone)]
pub struct AuthenticatedApiStrategy {
    tuning: StrategyTuning,
}

impl AuthenticatedApiStrategy {
    /// Creates the strategy with default tuning.
    pub fn new() -> Self {
        Self {
            tuning: StrategyTuning {
                timeout: Duration::from_secs(30),
                ..StrategyTuning::default()
            },
        }
    }

    /// Creates the strategy with the given tuning.
    pub fn with_tuning(tuning: StrategyTuning) -> Self {
        Self { tuning }
    }

    async fn tag_sections(&self, ctx: &FetchContext, tag: &str) -> Result<SearchPage, FetchError> {
        let api = ctx.api()?;
        let path = PlatformEndpoints::render(&api.platform().endpoints.tag_sections, "tag", tag);
        let form = [("tab", "top"), ("surface", "grid"), ("include_persistent", "0")];

        let value = api.post_form(&path, &form).await?;
        Ok(ResponseShape::from_value(value).into_page(self.id()))
    }
}

impl Default for AuthenticatedApiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcquisitionStrategy for AuthenticatedApiStrategy {
    fn id(&self) -> &str {
        "private.api"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::AuthenticatedApi
    }

    fn timeout(&self) -> Duration {
        self.tuning.timeout
    }

    fn retries(&self) -> u32 {
        self.tuning.retries
    }

    fn supports_search(&self) -> bool {
        true
    }

    async fn is_available(&self, ctx: &FetchContext) -> bool {
        match ctx.api.as_deref() {
            Some(api) => api.has_usable_session().await,
            None => false,
        }
    }

    #[instrument(skip(self, ctx), fields(strategy = self.id()))]
    async fn resolve(&self, ctx: &FetchContext, target: &ItemRef) -> Result<Item, FetchError> {
        let api = ctx.api()?;
        let media_id = target
            .media_id()
            .ok_or_else(|| ParseError::Unaddressable(format!("no media id for {target}")))?;
        let path = PlatformEndpoints::render(&api.platform().endpoints.media_info, "media_id", &media_id);

        let value = api.get(&path, &[]).await?;
        ResponseShape::from_value(value)
            .into_page(self.id())
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::NoMedia.into())
    }

    #[instrument(skip(self, ctx), fields(strategy = self.id()))]
    async fn search(&self, ctx: &FetchContext, query: &SearchQuery) -> Result<SearchPage, FetchError> {
        let api = ctx.api()?;
        let count = query.limit.to_string();
        let path = &api.platform().endpoints.search;

        let value = api
            .get(path, &[("query", query.keyword.as_str()), ("count", count.as_str())])
            .await?;
        let page = ResponseShape::from_value(value).into_page(self.id());
        if !page.items.is_empty() {
            return Ok(page);
        }

        // Keyword search came back empty; single-word queries still have a tag feed.
        let tag = tag_name(&query.keyword);
        if tag.is_empty() || query.keyword.split_whitespace().count() > 1 {
            return Ok(page);
        }
        debug!(tag = %tag, "Falling back to tag sections");
        self.tag_sections(ctx, &tag).await
    }
}
