//! Public query strategy implementation.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

use grapnel_core::{Item, ItemRef, SearchPage, SearchQuery};
use grapnel_fetch::{
    AcquisitionStrategy, FetchContext, FetchError, ResponseShape, StrategyKind, decode_json,
};

use crate::common::{StrategyTuning, shortcode_for};

/// Upper bound on one tag-feed page.
const MAX_PAGE: usize = 50;

/// Variables for the single-item document.
pub fn item_variables(shortcode: &str) -> String {
    json!({ "shortcode": shortcode }).to_string()
}

/// Variables for the tag-feed document.
pub fn tag_variables(tag: &str, first: usize) -> String {
    json!({ "tag_name": tag, "first": first.min(MAX_PAGE) }).to_string()
}

/// Tags are lowercase and carry no whitespace.
pub fn tag_name(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolves and searches through the public query endpoint.
#[derive(Debug, Clone, Default)]
pub struct PublicQueryStrategy {
    tuning: StrategyTuning,
}

impl PublicQueryStrategy {
    /// Creates the strategy with default tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy with the given tuning.
    pub fn with_tuning(tuning: StrategyTuning) -> Self {
        Self { tuning }
    }

    async fn query(
        &self,
        ctx: &FetchContext,
        doc_id: &str,
        variables: &str,
    ) -> Result<ResponseShape, FetchError> {
        let path = &ctx.platform.endpoints.query;
        let response = ctx
            .public_get(path, &[("doc_id", doc_id), ("variables", variables)])
            .await?;
        Ok(ResponseShape::from_value(decode_json(path, &response)?))
    }
}

#[async_trait]
impl AcquisitionStrategy for PublicQueryStrategy {
    fn id(&self) -> &str {
        "public.query"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::PublicQuery
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

    async fn is_available(&self, _ctx: &FetchContext) -> bool {
        true
    }

    #[instrument(skip(self, ctx), fields(strategy = self.id()))]
    async fn resolve(&self, ctx: &FetchContext, target: &ItemRef) -> Result<Item, FetchError> {
        let shortcode = shortcode_for(target)?;
        let doc_id = &ctx.platform.endpoints.item_query_doc_id;

        let shape = self.query(ctx, doc_id, &item_variables(&shortcode)).await?;
        shape
            .into_page(self.id())
            .items
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::EmptyResponse(format!("no media for {shortcode}")))
    }

    #[instrument(skip(self, ctx), fields(strategy = self.id()))]
    async fn search(&self, ctx: &FetchContext, query: &SearchQuery) -> Result<SearchPage, FetchError> {
        let tag = tag_name(&query.keyword);
        if tag.is_empty() {
            return Ok(SearchPage::empty());
        }
        let doc_id = &ctx.platform.endpoints.tag_query_doc_id;

        let page = self
            .query(ctx, doc_id, &tag_variables(&tag, query.limit))
            .await?
            .into_page(self.id());
        debug!(tag = %tag, items = page.items.len(), has_more = page.has_more, "Tag feed page");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name() {
        assert_eq!(tag_name("Golden Hour"), "goldenhour");
        assert_eq!(tag_name("   "), "");
    }

    #[test]
    fn test_variables() {
        assert_eq!(item_variables("Bx"), r#"{"shortcode":"Bx"}"#);
        let vars: serde_json::Value = serde_json::from_str(&tag_variables("cats", 500)).unwrap();
        assert_eq!(vars["first"], 50);
        assert_eq!(vars["tag_name"], "cats");
    }
}
