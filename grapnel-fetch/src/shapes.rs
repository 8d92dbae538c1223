//! Known upstream response shapes.
//!
//! The platform returns media lists in several envelopes depending on the
//! endpoint. Each is modelled as a variant of [`ResponseShape`] and resolved
//! by exhaustive match; anything unrecognized becomes [`ResponseShape::Empty`]
//! instead of being probed field by field.
//!
//! Media nodes share one normalizer, [`RawMedia::into_item`], which accepts
//! both the REST and the GraphQL field families. A malformed node inside a
//! recognized envelope is dropped on its own and the rest of the page kept.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use grapnel_core::{Author, Engagement, Item, MediaKind, SearchPage};

// ============================================================================
// Shape Union
// ============================================================================

/// A recognized response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponseShape {
    /// Tag and search pages: media grouped into layout sections.
    Sectioned(SectionedResponse),
    /// Ranked feed.
    Ranked(RankedResponse),
    /// Flat item list (media info, user feeds).
    Items(ItemsResponse),
    /// GraphQL `data` envelope.
    GraphQl(GraphQlResponse),
    /// No recognized shape.
    #[serde(skip)]
    Empty,
}

impl ResponseShape {
    /// Resolves a JSON value to a shape.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(Self::Empty)
    }

    /// Returns true for the empty variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Normalizes every media node into a page, tagging items with `source`.
    pub fn into_page(self, source: &str) -> SearchPage {
        let (nodes, has_more) = match self {
            Self::Sectioned(r) => {
                let nodes = r
                    .sections
                    .into_iter()
                    .chain(r.media_grid.into_iter().flat_map(|g| g.sections))
                    .filter_map(Lenient::into_inner)
                    .flat_map(|s| s.layout_content.medias)
                    .filter_map(|m| m.into_inner().map(|m| m.media))
                    .collect::<Vec<_>>();
                (nodes, r.more_available)
            }
            Self::Ranked(r) => (Lenient::collect(r.ranked_items), r.more_available),
            Self::Items(r) => (Lenient::collect(r.items), r.more_available),
            Self::GraphQl(r) => r.data.into_nodes(),
            Self::Empty => (Vec::new(), false),
        };

        let items = nodes
            .into_iter()
            .filter_map(|node| node.into_item(source))
            .collect();
        SearchPage::new(items, has_more)
    }
}

/// List element that swallows its own decode failure.
#[derive(Debug, Clone)]
struct Lenient<T>(Option<T>);

impl<T> Lenient<T> {
    fn into_inner(self) -> Option<T> {
        self.0
    }

    fn collect(list: Vec<Self>) -> Vec<T> {
        list.into_iter().filter_map(Self::into_inner).collect()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(Self(serde_json::from_value(value).ok()))
    }
}

/// `{"sections": [...], "more_available": bool}`
#[derive(Debug, Clone, Deserialize)]
pub struct SectionedResponse {
    sections: Vec<Lenient<Section>>,
    #[serde(default)]
    media_grid: Option<MediaGrid>,
    #[serde(default)]
    more_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaGrid {
    #[serde(default)]
    sections: Vec<Lenient<Section>>,
}

#[derive(Debug, Clone, Deserialize)]
struct Section {
    #[serde(default)]
    layout_content: LayoutContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LayoutContent {
    #[serde(default)]
    medias: Vec<Lenient<MediaWrapper>>,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaWrapper {
    media: RawMedia,
}

/// `{"ranked_items": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct RankedResponse {
    ranked_items: Vec<Lenient<RawMedia>>,
    #[serde(default)]
    more_available: bool,
}

/// `{"items": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct ItemsResponse {
    items: Vec<Lenient<RawMedia>>,
    #[serde(default)]
    more_available: bool,
}

/// `{"data": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse {
    data: GraphQlData,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphQlData {
    #[serde(default)]
    shortcode_media: Option<RawMedia>,
    #[serde(default)]
    xdt_shortcode_media: Option<RawMedia>,
    #[serde(default)]
    hashtag: Option<GraphQlHashtag>,
}

impl GraphQlData {
    fn into_nodes(self) -> (Vec<RawMedia>, bool) {
        if let Some(node) = self.xdt_shortcode_media.or(self.shortcode_media) {
            return (vec![node], false);
        }

        let Some(tag) = self.hashtag else {
            return (Vec::new(), false);
        };

        let mut has_more = false;
        let mut nodes = Vec::new();
        for conn in [tag.edge_hashtag_to_top_posts, tag.edge_hashtag_to_media]
            .into_iter()
            .flatten()
        {
            has_more |= conn.page_info.is_some_and(|p| p.has_next_page);
            nodes.extend(Lenient::collect(conn.edges).into_iter().map(|e| e.node));
        }
        (nodes, has_more)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GraphQlHashtag {
    #[serde(default)]
    edge_hashtag_to_media: Option<EdgeConnection<RawMedia>>,
    #[serde(default)]
    edge_hashtag_to_top_posts: Option<EdgeConnection<RawMedia>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct EdgeConnection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Lenient<Edge<T>>>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
}

// ============================================================================
// Media Node
// ============================================================================

/// Accepts ids sent either as strings or as numbers.
fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct Count {
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TextNode {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UrlNode {
    url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<UrlNode>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawUser {
    #[serde(default, deserialize_with = "de_opt_id")]
    pk: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

/// One media node in either REST or GraphQL spelling.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMedia {
    #[serde(default, deserialize_with = "de_opt_id")]
    pk: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    shortcode: Option<String>,

    #[serde(default)]
    media_type: Option<u8>,
    #[serde(default, rename = "__typename")]
    typename: Option<String>,
    #[serde(default)]
    is_video: Option<bool>,
    #[serde(default)]
    product_type: Option<String>,

    #[serde(default)]
    caption: Option<TextNode>,
    #[serde(default)]
    edge_media_to_caption: Option<EdgeConnection<TextNode>>,

    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    owner: Option<RawUser>,

    #[serde(default)]
    like_count: Option<u64>,
    #[serde(default)]
    edge_media_preview_like: Option<Count>,
    #[serde(default)]
    edge_liked_by: Option<Count>,
    #[serde(default)]
    comment_count: Option<u64>,
    #[serde(default)]
    edge_media_to_comment: Option<Count>,
    #[serde(default)]
    play_count: Option<u64>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    video_view_count: Option<u64>,

    #[serde(default)]
    taken_at: Option<i64>,
    #[serde(default)]
    taken_at_timestamp: Option<i64>,

    #[serde(default)]
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default)]
    video_versions: Option<Vec<UrlNode>>,
    #[serde(default)]
    video_url: Option<String>,
}

impl RawMedia {
    fn kind(&self) -> MediaKind {
        match (self.media_type, self.typename.as_deref()) {
            (Some(1), _) => MediaKind::Image,
            (Some(2), _) => MediaKind::Video,
            (Some(8), _) => MediaKind::Carousel,
            (_, Some(t)) if t.ends_with("Sidecar") => MediaKind::Carousel,
            (_, Some(t)) if t.ends_with("Video") => MediaKind::Video,
            (_, Some(t)) if t.ends_with("Image") => MediaKind::Image,
            _ if self.is_video == Some(true) => MediaKind::Video,
            _ if self.product_type.as_deref() == Some("clips") => MediaKind::Video,
            _ if self.is_video == Some(false) => MediaKind::Image,
            _ => MediaKind::Unknown,
        }
    }

    /// Normalizes this node. Returns `None` if it carries no usable id.
    pub fn into_item(self, source: &str) -> Option<Item> {
        let kind = self.kind();
        let shortcode = self.code.or(self.shortcode);

        let mut item = match self.pk.or(self.id) {
            Some(id) => Item::new(id),
            None => Item::from_shortcode(shortcode.as_deref()?).ok()?,
        };
        item.shortcode = shortcode.or(item.shortcode);
        item.kind = kind;

        item.caption = self.caption.and_then(|c| c.text).or_else(|| {
            self.edge_media_to_caption
                .and_then(|conn| Lenient::collect(conn.edges).into_iter().next())
                .and_then(|e| e.node.text)
        });

        item.author = self.user.or(self.owner).and_then(|u| {
            Some(Author {
                id: u.pk.or(u.id),
                username: u.username?,
                full_name: u.full_name.filter(|n| !n.is_empty()),
            })
        });

        item.metrics = Engagement {
            likes: self.like_count.or_else(|| {
                self.edge_media_preview_like
                    .or(self.edge_liked_by)
                    .and_then(|c| c.count)
            }),
            comments: self
                .comment_count
                .or_else(|| self.edge_media_to_comment.and_then(|c| c.count)),
            views: self.play_count.or(self.view_count).or(self.video_view_count),
        };

        item.taken_at = self
            .taken_at
            .or(self.taken_at_timestamp)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        item.display_url = self
            .image_versions2
            .and_then(|v| v.candidates.into_iter().next())
            .map(|c| c.url)
            .or(self.display_url);
        item.video_url = self
            .video_versions
            .and_then(|v| v.into_iter().next())
            .map(|v| v.url)
            .or(self.video_url);
        item.source = Some(source.to_string());

        Some(item)
    }
}

// ============================================================================
// Tests
// ============================================================================
