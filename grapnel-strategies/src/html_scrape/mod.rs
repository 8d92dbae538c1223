//! Public item page scrape.

pub mod parser;
mod strategy;

pub use parser::{Description, PageMeta, parse_description, parse_item_page};
pub use strategy::HtmlScrapeStrategy;
