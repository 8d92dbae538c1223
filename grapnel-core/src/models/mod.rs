//! Domain models for Grapnel.
//!
//! ## Submodules
//!
//! - [`item`] - Content types (Item, ItemRef, SearchQuery, SearchPage)
//! - [`challenge`] - Two-factor challenge description
//! - [`session`] - Credential types (CookieRecord, CredentialBundle)
//! - [`status`] - Derived session health (Health, SessionStatus)

mod challenge;
mod item;
mod session;
mod status;

pub use challenge::TwoFactorChallenge;
pub use item::{
    Author, Engagement, Item, ItemRef, MediaKind, SearchPage, SearchQuery, media_id_to_shortcode,
    shortcode_to_media_id,
};
pub use session::{CookiePresence, CookieRecord, CredentialBundle, validate_cookie_presence};
pub use status::{Health, SessionStatus};
