//! Public embed lookup.
//!
//! The captioned embed page is served without a session and is the cheapest
//! way to resolve a single item. It cannot search.

pub mod parser;
mod strategy;

pub use parser::{extract_inline_data, parse_embed};
pub use strategy::EmbedStrategy;
