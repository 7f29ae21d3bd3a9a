//! YouTube Data API client for playlist contents
//!
//! Playlist pages are addressed by opaque page tokens. The client forwards
//! the caller's token untouched and hands back the upstream's next and
//! previous tokens in the envelope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::fallback::FallbackProvider;
use super::http::{require_credential, require_param, Upstream};
use super::{non_empty, Video};
use crate::error::{ApiError, ConfigError};
use crate::pagination::{clamp_page, clamp_page_size, UpstreamEnvelope};
use crate::schema::{lenient, validate_collection, CollectionSchema, Field, FieldKind, Schema};

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "YOUTUBE_API_KEY";

const YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

const SERVICE: &str = "youtube";

/// Largest `maxResults` the API accepts
const MAX_RESULTS: u32 = 50;

/// Thumbnail sizes from best to worst
const THUMBNAIL_PREFERENCE: &[&str] = &["maxres", "standard", "high", "medium", "default"];

const PLAYLIST_ITEMS: CollectionSchema = CollectionSchema {
    envelope: Schema {
        name: "youtube.playlistItems",
        fields: &[
            Field::required("/pageInfo/totalResults", FieldKind::Numeric),
            Field::optional("/pageInfo/resultsPerPage", FieldKind::Numeric),
            Field::optional("/nextPageToken", FieldKind::Text),
            Field::optional("/prevPageToken", FieldKind::Text),
        ],
    },
    items: "/items",
    item: Schema {
        name: "youtube.playlistItem",
        fields: &[
            Field::required("/snippet/title", FieldKind::Text),
            Field::required("/snippet/resourceId/videoId", FieldKind::Text),
            Field::optional("/snippet/description", FieldKind::Text),
            Field::optional("/snippet/publishedAt", FieldKind::Rfc3339),
            Field::optional("/snippet/position", FieldKind::Numeric),
            Field::optional("/snippet/thumbnails", FieldKind::Object),
        ],
    },
};

/// Parameters for a playlist items request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistQuery {
    pub playlist_id: String,
    /// Opaque token from a previous envelope
    pub page_token: Option<String>,
    /// Page number the caller is on, reported back in the envelope
    pub page: u32,
    pub page_size: u32,
}

impl PlaylistQuery {
    pub fn new(playlist_id: impl Into<String>) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            page_token: None,
            page: 1,
            page_size: 25,
        }
    }

    pub fn with_page_token(mut self, page_token: Option<String>, page: u32) -> Self {
        self.page_token = page_token;
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    page_info: RawPageInfo,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    prev_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPageInfo {
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    total_results: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    results_per_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylistItem {
    snippet: RawSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnippet {
    title: String,
    resource_id: RawResourceId,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    position: Option<u64>,
    #[serde(default)]
    thumbnails: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResourceId {
    video_id: String,
}

/// Client for YouTube playlist contents
#[derive(Debug, Clone)]
pub struct YoutubeClient {
    upstream: Upstream,
    api_key: String,
    base_url: String,
    fallback: Arc<dyn FallbackProvider>,
}

impl YoutubeClient {
    /// Creates a client, failing immediately if the API key is absent
    pub fn new(
        api_key: Option<String>,
        fallback: Arc<dyn FallbackProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            upstream: Upstream::new(SERVICE),
            api_key: require_credential(API_KEY_VAR, api_key)?,
            base_url: YOUTUBE_BASE_URL.to_string(),
            fallback,
        })
    }

    /// Points the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetches one page of a playlist
    pub async fn playlist_items(
        &self,
        query: &PlaylistQuery,
    ) -> Result<UpstreamEnvelope<Video>, ApiError> {
        let playlist_id = require_param("playlist id", &query.playlist_id)?;
        let max_results = clamp_page_size(query.page_size).min(MAX_RESULTS);
        let max_results_param = max_results.to_string();

        let mut request = self
            .upstream
            .get(&format!(
                "{}/playlistItems",
                self.base_url.trim_end_matches('/')
            ))
            .query(&[
                ("part", "snippet"),
                ("playlistId", playlist_id),
                ("maxResults", max_results_param.as_str()),
                ("key", self.api_key.as_str()),
            ]);
        if let Some(token) = query.page_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.query(&[("pageToken", token)]);
        }

        let payload = self
            .upstream
            .fetch_json(request, PLAYLIST_ITEMS.envelope.name)
            .await?;
        let collection = validate_collection(payload, &PLAYLIST_ITEMS)
            .map_err(|f| self.upstream.mismatch(f))?;
        let degraded = collection.degraded_count();
        if degraded > 0 {
            debug!(service = SERVICE, degraded, "optional fields nulled");
        }

        let envelope: RawEnvelope = self
            .upstream
            .decode(PLAYLIST_ITEMS.envelope.name, collection.envelope)?;

        let videos = collection
            .items
            .into_iter()
            .map(|record| {
                self.upstream
                    .decode::<RawPlaylistItem>(PLAYLIST_ITEMS.item.name, record)
                    .map(|raw| self.to_video(raw.snippet))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let page_size = envelope
            .page_info
            .results_per_page
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .or(Some(max_results));

        debug!(
            service = SERVICE,
            page = clamp_page(query.page),
            items = videos.len(),
            "playlist page fetched"
        );

        Ok(UpstreamEnvelope::page(videos)
            .with_total(envelope.page_info.total_results)
            .with_page_size(page_size)
            .with_tokens(
                non_empty(envelope.next_page_token),
                non_empty(envelope.prev_page_token),
            ))
    }

    fn to_video(&self, snippet: RawSnippet) -> Video {
        let thumbnail_url = snippet
            .thumbnails
            .as_ref()
            .and_then(best_thumbnail)
            .unwrap_or_else(|| self.fallback.fallback_image(&snippet.resource_id.video_id));

        Video {
            id: snippet.resource_id.video_id,
            title: snippet.title,
            description: non_empty(snippet.description),
            published_at: snippet
                .published_at
                .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            thumbnail_url,
            position: snippet.position,
        }
    }
}

fn best_thumbnail(thumbnails: &Map<String, Value>) -> Option<String> {
    THUMBNAIL_PREFERENCE
        .iter()
        .filter_map(|size| thumbnails.get(*size))
        .filter_map(|thumb| thumb.get("url").and_then(Value::as_str))
        .find(|url| !url.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fallback::FixedFallback;
    use crate::pagination::normalize;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(base_url: &str) -> YoutubeClient {
        YoutubeClient::new(
            Some("yt-key".to_string()),
            Arc::new(FixedFallback("/img/video.jpg".to_string())),
        )
        .unwrap()
        .with_base_url(base_url)
    }

    fn item(video_id: &str, position: u64) -> Value {
        json!({
            "kind": "youtube#playlistItem",
            "id": format!("PLI{}", position),
            "snippet": {
                "publishedAt": "2024-01-10T12:00:00Z",
                "title": format!("Video {}", position),
                "description": "",
                "thumbnails": {
                    "default": {"url": "https://i.ytimg.com/default.jpg"},
                    "high": {"url": format!("https://i.ytimg.com/{}/hq.jpg", video_id)}
                },
                "position": position,
                "resourceId": {"kind": "youtube#video", "videoId": video_id}
            }
        })
    }

    #[test]
    fn test_missing_key_fails_at_construction() {
        let err = YoutubeClient::new(None, Arc::new(FixedFallback(String::new()))).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential(API_KEY_VAR));
    }

    #[test]
    fn test_best_thumbnail_prefers_largest() {
        let thumbs = json!({
            "default": {"url": "d"},
            "maxres": {"url": "m"},
            "high": {"url": "h"}
        });
        assert_eq!(best_thumbnail(thumbs.as_object().unwrap()), Some("m".to_string()));
        assert_eq!(best_thumbnail(json!({}).as_object().unwrap()), None);
    }

    #[tokio::test]
    async fn test_playlist_items_passes_token_through() {
        let mut server = Server::new_async().await;
        let body = json!({
            "nextPageToken": "CAoQAA",
            "prevPageToken": "CAUQAQ",
            "pageInfo": {"totalResults": 12, "resultsPerPage": 5},
            "items": [item("abc", 5), item("def", 6)]
        });
        let mock = server
            .mock("GET", "/playlistItems")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("playlistId".into(), "PL123".into()),
                Matcher::UrlEncoded("pageToken".into(), "CAUQAA".into()),
                Matcher::UrlEncoded("maxResults".into(), "5".into()),
                Matcher::UrlEncoded("key".into(), "yt-key".into()),
            ]))
            .with_body(body.to_string())
            .create_async()
            .await;

        let query = PlaylistQuery::new("PL123")
            .with_page_token(Some("CAUQAA".to_string()), 2)
            .with_page_size(5);
        let upstream = client(&server.url()).playlist_items(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(upstream.items.len(), 2);
        assert_eq!(upstream.items[0].id, "abc");
        assert_eq!(upstream.items[0].thumbnail_url, "https://i.ytimg.com/abc/hq.jpg");
        assert!(upstream.items[0].description.is_none());
        assert_eq!(upstream.items[1].position, Some(6));

        let envelope = normalize(upstream, query.page, query.page_size);
        assert_eq!(envelope.total, 12);
        assert_eq!(envelope.total_pages, 3);
        assert_eq!(envelope.next_page_token.as_deref(), Some("CAoQAA"));
        assert_eq!(envelope.prev_page_token.as_deref(), Some("CAUQAQ"));
    }

    #[tokio::test]
    async fn test_deleted_video_gets_placeholder_thumbnail() {
        let mut server = Server::new_async().await;
        let body = json!({
            "pageInfo": {"totalResults": 1, "resultsPerPage": 25},
            "items": [{
                "snippet": {
                    "title": "Deleted video",
                    "description": "This video is unavailable.",
                    "thumbnails": {},
                    "resourceId": {"videoId": "gone"}
                }
            }]
        });
        server
            .mock("GET", "/playlistItems")
            .match_query(Matcher::Any)
            .with_body(body.to_string())
            .create_async()
            .await;

        let upstream = client(&server.url())
            .playlist_items(&PlaylistQuery::new("PL123"))
            .await
            .unwrap();

        assert_eq!(upstream.items[0].thumbnail_url, "/img/video.jpg");
        assert!(upstream.items[0].published_at.is_none());
    }

    #[tokio::test]
    async fn test_empty_playlist_id_is_rejected() {
        let server = Server::new_async().await;
        let err = client(&server.url())
            .playlist_items(&PlaylistQuery::new(""))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_forbidden_is_upstream_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/playlistItems")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "quotaExceeded"}}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .playlist_items(&PlaylistQuery::new("PL123"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_missing_results_per_page_uses_effective_max_results() {
        let mut server = Server::new_async().await;
        let body = json!({
            "pageInfo": {"totalResults": 120},
            "items": [item("abc", 0)]
        });
        let mock = server
            .mock("GET", "/playlistItems")
            .match_query(Matcher::UrlEncoded("maxResults".into(), "50".into()))
            .with_body(body.to_string())
            .create_async()
            .await;

        let query = PlaylistQuery::new("PL123").with_page_size(100);
        let upstream = client(&server.url()).playlist_items(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(upstream.page_size, Some(50));

        let envelope = normalize(upstream, query.page, query.page_size);
        assert_eq!(envelope.page_size, 50);
        assert_eq!(envelope.total_pages, 3);
    }
}
