// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Grapnel Strategies
//!
//! Concrete acquisition strategies for Grapnel.
//!
//! | Strategy | Id | Priority | Session | Resolve | Search |
//! |----------|----|----------|---------|---------|--------|
//! | Public embed | `public.embed` | 100 | no | yes | no |
//! | Public query | `public.query` | 80 | no | yes | tag feed |
//! | HTML scrape | `public.html` | 60 | no | yes | no |
//! | Authenticated API | `private.api` | 40 | yes | yes | keyword |
//!
//! ## Usage
//!
//! ```ignore
//! use grapnel_strategies::build_orchestrator;
//!
//! let orchestrator = build_orchestrator(&config.strategies);
//! let outcome = orchestrator.search(&ctx, &SearchQuery::new("sunset", 20)).await;
//! ```

pub mod common;
pub mod error;
pub mod registry;

// Strategy modules
pub mod authenticated;
pub mod embed;
pub mod html_scrape;
pub mod public_query;


pub use authenticated::AuthenticatedApiStrategy;
pub use common::{StrategyTuning, parse_count};
pub use embed::EmbedStrategy;
pub use error::ParseError;
pub use html_scrape::HtmlScrapeStrategy;
pub use public_query::PublicQueryStrategy;
pub use registry::{ALL_KINDS, build_orchestrator, create_strategy, toggle_for};
