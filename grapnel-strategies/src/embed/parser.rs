//! Embed page parser.
//!
//! The captioned embed page is parsed two ways. Pages that inline the media
//! node through `__additionalDataLoaded` are normalized with the shared
//! media normalizer. Otherwise the rendered markup is read directly.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};

use grapnel_core::{Author, Item, MediaKind};
use grapnel_fetch::ResponseShape;

use crate::common::parse_count;
use crate::error::ParseError;

const MEDIA_CONTAINER: &str = ".Embed[data-media-type], .EmbedFrame[data-media-type]";
const IMAGE: &str = "img.EmbeddedMediaImage";
const VIDEO: &str = "video";
const USERNAME: &str = ".UsernameText, .CaptionUsername";
const CAPTION: &str = ".Caption";
const SOCIAL_PROOF: &str = ".SocialProof";

/// Parses a captioned embed page into an item.
///
/// # Errors
///
/// Returns [`ParseError::NoContent`] when neither inlined data nor
/// recognizable markup is present.
pub fn parse_embed(html: &str, shortcode: &str, source: &str) -> Result<Item, ParseError> {
    if let Some(data) = extract_inline_data(html)? {
        if let Some(mut item) = ResponseShape::from_value(json!({ "data": data }))
            .into_page(source)
            .items
            .into_iter()
            .next()
        {
            item.shortcode.get_or_insert_with(|| shortcode.to_string());
            return Ok(item);
        }
    }

    parse_markup(html, shortcode, source)
}

/// Returns the object passed to `__additionalDataLoaded`, if any.
pub fn extract_inline_data(html: &str) -> Result<Option<Value>, ParseError> {
    let Ok(re) = Regex::new(r"(?s)__additionalDataLoaded\(\s*'[^']*'\s*,\s*(\{.*?\})\s*\);") else {
        return Ok(None);
    };
    let Some(raw) = re.captures(html).and_then(|c| c.get(1)) else {
        return Ok(None);
    };

    let value: Value = serde_json::from_str(raw.as_str())?;
    Ok(value.get("shortcode_media").is_some().then_some(value))
}

fn select<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector).next()
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Caption text without the username link and the comment block.
fn caption_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(elem) = ElementRef::wrap(child) {
            let class = elem.value().attr("class").unwrap_or_default();
            if class.contains("CaptionUsername") || class.contains("CaptionComments") {
                continue;
            }
            if elem.value().name() == "br" {
                out.push('\n');
            } else {
                out.extend(elem.text());
            }
        }
    }
    out.trim().to_string()
}

fn media_kind(container: Option<ElementRef<'_>>, has_video: bool) -> MediaKind {
    match container.and_then(|el| el.value().attr("data-media-type")) {
        Some(t) if t.ends_with("Sidecar") => MediaKind::Carousel,
        Some(t) if t.ends_with("Video") => MediaKind::Video,
        Some(t) if t.ends_with("Image") => MediaKind::Image,
        _ if has_video => MediaKind::Video,
        _ => MediaKind::Unknown,
    }
}

fn parse_likes(text: &str) -> Option<u64> {
    let re = Regex::new(r"(?i)([\d.,]+[kmb]?)\s+likes?").ok()?;
    parse_count(re.captures(text)?.get(1)?.as_str())
}

fn parse_markup(html: &str, shortcode: &str, source: &str) -> Result<Item, ParseError> {
    let doc = Html::parse_document(html);

    let display_url = select(&doc, IMAGE)
        .and_then(|el| el.value().attr("src"))
        .map(str::to_string);
    let video_url = select(&doc, VIDEO)
        .and_then(|el| el.value().attr("src"))
        .map(str::to_string);
    let username = select(&doc, USERNAME)
        .map(text_of)
        .filter(|u| !u.is_empty());
    let caption = select(&doc, CAPTION)
        .map(caption_text)
        .filter(|c| !c.is_empty());

    if display_url.is_none() && video_url.is_none() && username.is_none() && caption.is_none() {
        return Err(ParseError::NoContent);
    }

    let mut item = Item::from_shortcode(shortcode)
        .map_err(|e| ParseError::Unaddressable(e.to_string()))?;
    item.kind = media_kind(select(&doc, MEDIA_CONTAINER), video_url.is_some());
    item.caption = caption;
    item.author = username.map(|username| Author {
        username,
        ..Author::default()
    });
    item.metrics.likes = select(&doc, SOCIAL_PROOF).and_then(|el| parse_likes(&text_of(el)));
    item.display_url = display_url;
    item.video_url = video_url;
    item.source = Some(source.to_string());
    Ok(item)
}
