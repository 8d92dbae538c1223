//! Content types.
//!
//! An [`Item`] is the normalized form every acquisition strategy produces,
//! whichever upstream surface it scraped. Items are keyed by the platform's
//! numeric media id so results from different strategies deduplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::CoreError;

/// Alphabet used by the platform to encode media ids as shortcodes.
const SHORTCODE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// URL path segments that precede a shortcode.
const ITEM_PATH_PREFIXES: &[&str] = &["p", "reel", "reels", "tv"];

// ============================================================================
// Shortcode Conversion
// ============================================================================

fn alphabet_index(c: u8) -> Option<u64> {
    SHORTCODE_ALPHABET
        .iter()
        .position(|&a| a == c)
        .map(|i| i as u64)
}

/// Converts a shortcode into the numeric media id it encodes.
///
/// # Errors
///
/// Returns [`CoreError::InvalidShortcode`] if the code is empty, contains a
/// character outside the alphabet, or does not fit in 64 bits.
pub fn shortcode_to_media_id(shortcode: &str) -> Result<u64, CoreError> {
    if shortcode.is_empty() {
        return Err(CoreError::InvalidShortcode("empty shortcode".to_string()));
    }

    shortcode.bytes().try_fold(0u64, |acc, c| {
        let digit =
            alphabet_index(c).ok_or_else(|| CoreError::InvalidShortcode(shortcode.to_string()))?;
        acc.checked_mul(64)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| CoreError::InvalidShortcode(format!("{shortcode} overflows")))
    })
}

/// Converts a numeric media id into its shortcode.
pub fn media_id_to_shortcode(mut media_id: u64) -> String {
    if media_id == 0 {
        return "A".to_string();
    }

    let mut out = Vec::new();
    while media_id > 0 {
        out.push(SHORTCODE_ALPHABET[(media_id % 64) as usize]);
        media_id /= 64;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn is_shortcode(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|c| alphabet_index(c).is_some())
}

/// Strips the `_<owner>` suffix some endpoints append to media ids.
fn normalize_media_id(raw: &str) -> &str {
    raw.split('_').next().unwrap_or(raw)
}

// ============================================================================
// Item Reference
// ============================================================================

/// A reference to one platform item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ItemRef {
    /// The short alphanumeric code used in public URLs.
    Shortcode(String),
    /// The numeric media id.
    MediaId(String),
}

impl ItemRef {
    /// Parses a bare shortcode, a numeric media id, or an item URL.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidItemRef`] when the input matches none of
    /// the accepted forms.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(CoreError::InvalidItemRef("empty reference".to_string()));
        }

        if input.contains('/') {
            return Self::from_url(input);
        }

        let id = normalize_media_id(input);
        if !id.is_empty() && id.bytes().all(|c| c.is_ascii_digit()) {
            return Ok(Self::MediaId(id.to_string()));
        }

        if is_shortcode(input) {
            return Ok(Self::Shortcode(input.to_string()));
        }

        Err(CoreError::InvalidItemRef(input.to_string()))
    }

    fn from_url(input: &str) -> Result<Self, CoreError> {
        let candidate = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };

        let url =
            Url::parse(&candidate).map_err(|e| CoreError::InvalidItemRef(format!("{input}: {e}")))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        segments
            .windows(2)
            .find(|pair| ITEM_PATH_PREFIXES.contains(&pair[0]) && is_shortcode(pair[1]))
            .map(|pair| Self::Shortcode(pair[1].to_string()))
            .ok_or_else(|| CoreError::InvalidItemRef(format!("no item path in {input}")))
    }

    /// Returns the shortcode, converting from the media id if needed.
    pub fn shortcode(&self) -> Option<String> {
        match self {
            Self::Shortcode(code) => Some(code.clone()),
            Self::MediaId(id) => id.parse::<u64>().ok().map(media_id_to_shortcode),
        }
    }

    /// Returns the numeric media id, converting from the shortcode if needed.
    pub fn media_id(&self) -> Option<String> {
        match self {
            Self::MediaId(id) => Some(id.clone()),
            Self::Shortcode(code) => shortcode_to_media_id(code).ok().map(|id| id.to_string()),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shortcode(code) => write!(f, "shortcode:{code}"),
            Self::MediaId(id) => write!(f, "media:{id}"),
        }
    }
}

// ============================================================================
// Item
// ============================================================================

/// The kind of media an item carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A single image.
    Image,
    /// A single video (including reels).
    Video,
    /// A multi-media carousel.
    Carousel,
    /// Not determinable from the source.
    #[default]
    Unknown,
}

/// The account that published an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Platform user id.
    pub id: Option<String>,
    /// Handle.
    pub username: String,
    /// Display name.
    pub full_name: Option<String>,
}

/// Engagement counters. Absent counters were not exposed by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    /// Like count.
    pub likes: Option<u64>,
    /// Comment count.
    pub comments: Option<u64>,
    /// View or play count (videos only).
    pub views: Option<u64>,
}

/// A normalized platform item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable platform media id. Used as the deduplication key.
    pub id: String,
    /// Public shortcode.
    pub shortcode: Option<String>,
    /// Media kind.
    #[serde(default)]
    pub kind: MediaKind,
    /// Caption text.
    pub caption: Option<String>,
    /// Publishing account.
    pub author: Option<Author>,
    /// Engagement counters.
    #[serde(default)]
    pub metrics: Engagement,
    /// Publication time.
    pub taken_at: Option<DateTime<Utc>>,
    /// Image or cover URL.
    pub display_url: Option<String>,
    /// Video URL (videos only).
    pub video_url: Option<String>,
    /// Identifier of the strategy that produced this item.
    pub source: Option<String>,
}

impl Item {
    /// Creates an item with only its id set.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            id: normalize_media_id(&id).to_string(),
            shortcode: None,
            kind: MediaKind::Unknown,
            caption: None,
            author: None,
            metrics: Engagement::default(),
            taken_at: None,
            display_url: None,
            video_url: None,
            source: None,
        }
    }

    /// Creates an item from a shortcode, deriving the media id.
    ///
    /// # Errors
    ///
    /// Returns an error if the shortcode is not decodable.
    pub fn from_shortcode(shortcode: &str) -> Result<Self, CoreError> {
        let id = shortcode_to_media_id(shortcode)?;
        let mut item = Self::new(id.to_string());
        item.shortcode = Some(shortcode.to_string());
        Ok(item)
    }

    /// Returns the shortcode, deriving it from the id when not set.
    pub fn shortcode(&self) -> Option<String> {
        self.shortcode
            .clone()
            .or_else(|| self.id.parse::<u64>().ok().map(media_id_to_shortcode))
    }

    /// Returns true if this item matches the given reference.
    pub fn matches(&self, target: &ItemRef) -> bool {
        match target {
            ItemRef::MediaId(id) => normalize_media_id(id) == self.id,
            ItemRef::Shortcode(code) => self.shortcode().as_deref() == Some(code.as_str()),
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// A keyword search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Keyword or hashtag (a leading `#` is stripped).
    pub keyword: String,
    /// Maximum number of items wanted.
    pub limit: usize,
}

impl SearchQuery {
    /// Creates a new search query.
    pub fn new(keyword: impl Into<String>, limit: usize) -> Self {
        let keyword = keyword.into();
        Self {
            keyword: keyword.trim().trim_start_matches('#').to_string(),
            limit,
        }
    }
}

/// A partial result from one strategy's search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Items in upstream order.
    pub items: Vec<Item>,
    /// Whether the upstream reported more results.
    pub has_more: bool,
}

impl SearchPage {
    /// Creates a page from items.
    pub fn new(items: Vec<Item>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    /// Returns an empty page.
    pub fn empty() -> Self {
        Self::default()
    }
}

// ============================================================================
// Tests
// ============================================================================
