//! Instagram Graph API client for the account's own media
//!
//! The Graph API is cursor-paginated and gives no total, and its rate limit
//! is tight, so this feed is served from the file cache: [`CollectionSource`]
//! walks every page once per refresh and the cache keeps the result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::fallback::FallbackProvider;
use super::http::{require_credential, Upstream};
use super::{non_empty, MediaItem, MediaType};
use crate::cache::CollectionSource;
use crate::error::{ApiError, ConfigError};
use crate::pagination::{clamp_page_size, UpstreamEnvelope};
use crate::schema::{validate_collection, CollectionSchema, Field, FieldKind, Schema};

/// Environment variable holding the long-lived access token
pub const ACCESS_TOKEN_VAR: &str = "INSTAGRAM_ACCESS_TOKEN";

/// Cache key of the media artifact
pub const MEDIA_CACHE_KEY: &str = "instagram-media";

const INSTAGRAM_BASE_URL: &str = "https://graph.instagram.com";

const SERVICE: &str = "instagram";

const MEDIA_FIELDS: &str = "id,caption,media_type,media_url,thumbnail_url,permalink,timestamp";

/// Graph API timestamps use a colon-less offset, e.g. `+0000`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Records requested per page during a full walk
const WALK_PAGE_SIZE: u32 = 50;

/// Upper bound on pages fetched by one full walk
const MAX_WALK_PAGES: usize = 10;

const MEDIA: CollectionSchema = CollectionSchema {
    envelope: Schema {
        name: "instagram.media",
        fields: &[
            Field::optional("/paging", FieldKind::Object),
            Field::optional("/paging/cursors", FieldKind::Object),
            Field::optional("/paging/cursors/before", FieldKind::Text),
            Field::optional("/paging/cursors/after", FieldKind::Text),
            Field::optional("/paging/next", FieldKind::Text),
        ],
    },
    items: "/data",
    item: Schema {
        name: "instagram.media_item",
        fields: &[
            Field::required("/id", FieldKind::Text),
            Field::optional("/media_type", FieldKind::Text),
            Field::optional("/caption", FieldKind::Text),
            Field::optional("/media_url", FieldKind::Text),
            Field::optional("/thumbnail_url", FieldKind::Text),
            Field::optional("/permalink", FieldKind::Text),
            Field::optional("/timestamp", FieldKind::DateTime(TIMESTAMP_FORMAT)),
        ],
    },
};

#[derive(Debug, Default, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    paging: Option<RawPaging>,
}

#[derive(Debug, Deserialize)]
struct RawPaging {
    #[serde(default)]
    cursors: Option<RawCursors>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCursors {
    #[serde(default)]
    before: Option<String>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    id: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Client for the Instagram media feed
#[derive(Debug, Clone)]
pub struct InstagramClient {
    upstream: Upstream,
    access_token: String,
    base_url: String,
    fallback: Arc<dyn FallbackProvider>,
}

impl InstagramClient {
    /// Creates a client, failing immediately if the access token is absent
    pub fn new(
        access_token: Option<String>,
        fallback: Arc<dyn FallbackProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            upstream: Upstream::new(SERVICE),
            access_token: require_credential(ACCESS_TOKEN_VAR, access_token)?,
            base_url: INSTAGRAM_BASE_URL.to_string(),
            fallback,
        })
    }

    /// Points the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetches one page of media, continuing after the given opaque cursor
    ///
    /// The returned envelope carries a `next_token` only when the upstream
    /// reports a following page.
    pub async fn media_page(
        &self,
        after: Option<&str>,
        limit: u32,
    ) -> Result<UpstreamEnvelope<MediaItem>, ApiError> {
        let limit = clamp_page_size(limit).to_string();
        let mut request = self
            .upstream
            .get(&format!("{}/me/media", self.base_url.trim_end_matches('/')))
            .query(&[
                ("fields", MEDIA_FIELDS),
                ("access_token", self.access_token.as_str()),
                ("limit", limit.as_str()),
            ]);
        if let Some(after) = after {
            request = request.query(&[("after", after)]);
        }

        let payload = self.upstream.fetch_json(request, MEDIA.envelope.name).await?;
        let collection =
            validate_collection(payload, &MEDIA).map_err(|f| self.upstream.mismatch(f))?;
        let degraded = collection.degraded_count();
        if degraded > 0 {
            debug!(service = SERVICE, degraded, "optional fields nulled");
        }

        let envelope: RawEnvelope = self.upstream.decode(MEDIA.envelope.name, collection.envelope)?;

        let media = collection
            .items
            .into_iter()
            .map(|record| {
                self.upstream
                    .decode::<RawMedia>(MEDIA.item.name, record)
                    .map(|raw| self.to_media_item(raw))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (next, prev) = match envelope.paging {
            Some(paging) => {
                let cursors = paging.cursors;
                let has_next = paging.next.is_some();
                let (before, after) = cursors
                    .map(|c| (c.before, c.after))
                    .unwrap_or((None, None));
                (after.filter(|_| has_next), before)
            }
            None => (None, None),
        };

        Ok(UpstreamEnvelope::page(media).with_tokens(next, prev))
    }

    fn to_media_item(&self, raw: RawMedia) -> MediaItem {
        let media_type = MediaType::from_upstream(raw.media_type.as_deref());
        let media_url = non_empty(raw.media_url);
        let thumbnail_url = non_empty(raw.thumbnail_url);

        // Videos display their poster frame
        let display = match media_type {
            MediaType::Video => thumbnail_url.clone().or(media_url),
            _ => media_url.or_else(|| thumbnail_url.clone()),
        };

        MediaItem {
            media_url: display.unwrap_or_else(|| self.fallback.fallback_image(&raw.id)),
            id: raw.id,
            media_type,
            caption: non_empty(raw.caption),
            thumbnail_url,
            permalink: non_empty(raw.permalink),
            timestamp: raw
                .timestamp
                .and_then(|ts| DateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).ok())
                .map(|ts| ts.with_timezone(&Utc)),
        }
    }
}

impl CollectionSource for InstagramClient {
    type Item = MediaItem;

    fn name(&self) -> &'static str {
        SERVICE
    }

    /// Walks the media feed from the newest post until the last page
    async fn fetch_all(&self) -> Result<Vec<MediaItem>, ApiError> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        for _ in 0..MAX_WALK_PAGES {
            let page = self.media_page(after.as_deref(), WALK_PAGE_SIZE).await?;
            items.extend(page.items);
            match page.next_token {
                Some(next) => after = Some(next),
                None => return Ok(items),
            }
        }

        warn!(
            service = SERVICE,
            pages = MAX_WALK_PAGES,
            items = items.len(),
            "stopped walking media feed at page limit"
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fallback::FixedFallback;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(base_url: &str) -> InstagramClient {
        InstagramClient::new(
            Some("token".to_string()),
            Arc::new(FixedFallback("/img/fallback.jpg".to_string())),
        )
        .unwrap()
        .with_base_url(base_url)
    }

    #[test]
    fn test_missing_token_fails_at_construction() {
        let err = InstagramClient::new(None, Arc::new(FixedFallback(String::new()))).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential(ACCESS_TOKEN_VAR));
    }

    #[tokio::test]
    async fn test_media_page_maps_items_and_cursor() {
        let mut server = Server::new_async().await;
        let body = json!({
            "data": [
                {
                    "id": "1",
                    "media_type": "IMAGE",
                    "caption": "Sunset",
                    "media_url": "https://cdn/1.jpg",
                    "permalink": "https://instagram.com/p/1",
                    "timestamp": "2024-03-01T18:30:00+0000"
                },
                {
                    "id": "2",
                    "media_type": "VIDEO",
                    "media_url": "https://cdn/2.mp4",
                    "thumbnail_url": "https://cdn/2.jpg",
                    "timestamp": "2024-02-01T10:00:00+0000"
                },
                {"id": "3", "media_type": "CAROUSEL_ALBUM"}
            ],
            "paging": {
                "cursors": {"before": "b1", "after": "a1"},
                "next": "https://graph.instagram.com/me/media?after=a1"
            }
        });
        let mock = server
            .mock("GET", "/me/media")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("access_token".into(), "token".into()),
                Matcher::UrlEncoded("limit".into(), "3".into()),
                Matcher::UrlEncoded("fields".into(), MEDIA_FIELDS.into()),
            ]))
            .with_body(body.to_string())
            .create_async()
            .await;

        let page = client(&server.url()).media_page(None, 3).await.unwrap();

        mock.assert_async().await;
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.next_token.as_deref(), Some("a1"));
        assert_eq!(page.prev_token.as_deref(), Some("b1"));

        assert_eq!(page.items[0].media_url, "https://cdn/1.jpg");
        assert_eq!(page.items[0].timestamp.unwrap().timestamp(), 1_709_317_800);
        assert_eq!(page.items[1].media_url, "https://cdn/2.jpg");
        assert_eq!(page.items[2].media_url, "/img/fallback.jpg");
        assert!(page.items[2].timestamp.is_none());
    }

    #[tokio::test]
    async fn test_last_page_has_no_next_token() {
        let mut server = Server::new_async().await;
        let body = json!({
            "data": [{"id": "9"}],
            "paging": {"cursors": {"before": "b", "after": "a"}}
        });
        server
            .mock("GET", "/me/media")
            .match_query(Matcher::Any)
            .with_body(body.to_string())
            .create_async()
            .await;

        let page = client(&server.url()).media_page(Some("a0"), 10).await.unwrap();
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_follows_cursors() {
        let mut server = Server::new_async().await;
        let first = json!({
            "data": [{"id": "1"}, {"id": "2"}],
            "paging": {"cursors": {"after": "c2"}, "next": "https://next"}
        });
        let second = json!({
            "data": [{"id": "3"}],
            "paging": {"cursors": {"before": "c2", "after": "c3"}}
        });
        let first_mock = server
            .mock("GET", "/me/media")
            .match_query(Matcher::Regex("limit=50$".into()))
            .with_body(first.to_string())
            .create_async()
            .await;
        let second_mock = server
            .mock("GET", "/me/media")
            .match_query(Matcher::UrlEncoded("after".into(), "c2".into()))
            .with_body(second.to_string())
            .create_async()
            .await;

        let items = client(&server.url()).fetch_all().await.unwrap();

        first_mock.assert_async().await;
        second_mock.assert_async().await;
        let ids: Vec<&str> = items.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_media_without_id_is_schema_mismatch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me/media")
            .match_query(Matcher::Any)
            .with_body(json!({"data": [{"caption": "no id"}]}).to_string())
            .create_async()
            .await;

        let err = client(&server.url()).media_page(None, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::SchemaMismatch { .. }));
    }
}
