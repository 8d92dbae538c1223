//! Strategy registry.
//!
//! Builds an orchestrator from strategy settings. Disabled strategies are
//! left out entirely; enabled ones take their time budget and retry count
//! from the settings.

use tracing::debug;

use grapnel_core::{StrategySettings, StrategyToggle};
use grapnel_fetch::{AcquisitionStrategy, Orchestrator, StrategyKind};

use crate::authenticated::AuthenticatedApiStrategy;
use crate::common::StrategyTuning;
use crate::embed::EmbedStrategy;
use crate::html_scrape::HtmlScrapeStrategy;
use crate::public_query::PublicQueryStrategy;

/// Every strategy kind, in default priority order.
pub const ALL_KINDS: [StrategyKind; 4] = [
    StrategyKind::PublicEmbed,
    StrategyKind::PublicQuery,
    StrategyKind::HtmlScrape,
    StrategyKind::AuthenticatedApi,
];

/// Returns the toggle governing a strategy kind.
pub fn toggle_for(settings: &StrategySettings, kind: StrategyKind) -> &StrategyToggle {
    match kind {
        StrategyKind::PublicEmbed => &settings.embed,
        StrategyKind::PublicQuery => &settings.public_query,
        StrategyKind::HtmlScrape => &settings.html_scrape,
        StrategyKind::AuthenticatedApi => &settings.authenticated_api,
    }
}

/// Creates the strategy for a kind with the given tuning.
pub fn create_strategy(kind: StrategyKind, tuning: StrategyTuning) -> Box<dyn AcquisitionStrategy> {
    match kind {
        StrategyKind::PublicEmbed => Box::new(EmbedStrategy::with_tuning(tuning)),
        StrategyKind::PublicQuery => Box::new(PublicQueryStrategy::with_tuning(tuning)),
        StrategyKind::HtmlScrape => Box::new(HtmlScrapeStrategy::with_tuning(tuning)),
        StrategyKind::AuthenticatedApi => Box::new(AuthenticatedApiStrategy::with_tuning(tuning)),
    }
}

/// Builds an orchestrator holding every enabled strategy.
pub fn build_orchestrator(settings: &StrategySettings) -> Orchestrator {
    let strategies = ALL_KINDS
        .into_iter()
        .filter_map(|kind| {
            let toggle = toggle_for(settings, kind);
            if !toggle.enabled {
                debug!(kind = %kind, "Strategy disabled");
                return None;
            }
            Some(create_strategy(kind, StrategyTuning::from(toggle)))
        })
        .collect();

    Orchestrator::with_strategies(strategies)
}
