//! Public query endpoint.
//!
//! The GraphQL-style endpoint answers persisted queries without a session.
//! One document resolves single items, another pages through a tag feed.

mod strategy;

pub use strategy::{PublicQueryStrategy, item_variables, tag_name, tag_variables};
