//! Item page parser.
//!
//! Reads the Open Graph and app-link meta tags of the public item page.
//! The description tag packs counts, the author and the caption into one
//! line: `1,204 likes, 12 comments - alice on May 1, 2024: "caption"`.

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;

use grapnel_core::{Author, Item, MediaKind};

use crate::common::parse_count;
use crate::error::ParseError;

/// Meta tags relevant to an item page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    tags: HashMap<String, String>,
}

impl PageMeta {
    /// Collects `og:*`, `al:*`, `twitter:*` and `description` meta tags.
    pub fn from_html(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let mut tags = HashMap::new();
        let Ok(selector) = Selector::parse("meta[property], meta[name]") else {
            return Self { tags };
        };

        for el in doc.select(&selector) {
            let attrs = el.value();
            let Some(key) = attrs.attr("property").or_else(|| attrs.attr("name")) else {
                continue;
            };
            let relevant =
                key == "description" || ["og:", "al:", "twitter:"].iter().any(|p| key.starts_with(p));
            if !relevant {
                continue;
            }
            if let Some(content) = attrs.attr("content") {
                tags.entry(key.to_string())
                    .or_insert_with(|| content.trim().to_string());
            }
        }
        Self { tags }
    }

    /// Returns one tag's content.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns true if no relevant tag was found.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Fields packed into the description tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    /// Like count.
    pub likes: Option<u64>,
    /// Comment count.
    pub comments: Option<u64>,
    /// Author handle.
    pub username: Option<String>,
    /// Caption text.
    pub caption: Option<String>,
}

/// Splits a description tag into its parts.
pub fn parse_description(text: &str) -> Description {
    let Ok(re) = Regex::new(
        r#"(?s)^\s*(?:(?P<likes>[\d.,]+[KkMmBb]?)\s+likes?,\s*)?(?:(?P<comments>[\d.,]+[KkMmBb]?)\s+comments?\s*)?-\s*(?P<user>[\w.]+)\s+on\s+[^:]+:\s*(?P<caption>.*?)\s*$"#,
    ) else {
        return Description::default();
    };

    let Some(caps) = re.captures(text) else {
        return Description {
            caption: Some(text.trim().to_string()).filter(|c| !c.is_empty()),
            ..Description::default()
        };
    };

    let caption = caps.name("caption").map(|m| {
        let c = m.as_str().trim_end_matches('.');
        c.strip_prefix('"')
            .and_then(|c| c.strip_suffix('"'))
            .unwrap_or(c)
            .to_string()
    });

    Description {
        likes: caps.name("likes").and_then(|m| parse_count(m.as_str())),
        comments: caps.name("comments").and_then(|m| parse_count(m.as_str())),
        username: caps.name("user").map(|m| m.as_str().to_string()),
        caption: caption.filter(|c| !c.is_empty()),
    }
}

/// Extracts the numeric media id from an app link (`...media?id=123`).
fn app_link_media_id(meta: &PageMeta) -> Option<String> {
    let link = meta
        .get("al:ios:url")
        .or_else(|| meta.get("al:android:url"))?;
    let re = Regex::new(r"[?&]id=(\d+)").ok()?;
    Some(re.captures(link)?.get(1)?.as_str().to_string())
}

/// Parses an item page into an item.
///
/// # Errors
///
/// Returns [`ParseError::NoContent`] when the page has no media meta tags,
/// which is what login walls and interstitials look like.
pub fn parse_item_page(html: &str, shortcode: &str, source: &str) -> Result<Item, ParseError> {
    let meta = PageMeta::from_html(html);
    let image = meta.get("og:image").map(str::to_string);
    let video = meta
        .get("og:video:secure_url")
        .or_else(|| meta.get("og:video"))
        .map(str::to_string);

    if image.is_none() && video.is_none() {
        return Err(ParseError::NoContent);
    }

    let mut item = match app_link_media_id(&meta) {
        Some(id) => Item::new(id),
        None => Item::from_shortcode(shortcode)
            .map_err(|e| ParseError::Unaddressable(e.to_string()))?,
    };
    item.shortcode = Some(shortcode.to_string());

    let description = meta
        .get("og:description")
        .or_else(|| meta.get("description"))
        .map(parse_description)
        .unwrap_or_default();

    item.kind = match meta.get("og:type") {
        _ if video.is_some() => MediaKind::Video,
        Some(t) if t.starts_with("video") => MediaKind::Video,
        _ => MediaKind::Image,
    };
    item.caption = description.caption;
    item.author = description.username.map(|username| Author {
        username,
        ..Author::default()
    });
    item.metrics.likes = description.likes;
    item.metrics.comments = description.comments;
    item.display_url = image;
    item.video_url = video;
    item.source = Some(source.to_string());
    Ok(item)
}
