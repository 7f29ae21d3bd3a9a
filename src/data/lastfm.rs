//! Last.fm scrobble client
//!
//! Fetches a user's recent tracks from the Last.fm 2.0 API. Pagination
//! metadata arrives as digit strings under `recenttracks/@attr`, and a track
//! that is currently playing is prepended beyond the requested limit.

use std::sync::Arc;

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::fallback::FallbackProvider;
use super::http::{require_credential, require_param, Upstream};
use super::{non_empty, Track};
use crate::error::{ApiError, ConfigError};
use crate::pagination::{clamp_page, clamp_page_size, UpstreamEnvelope};
use crate::schema::{lenient, validate_collection, CollectionSchema, Field, FieldKind, Schema};

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "LASTFM_API_KEY";

const LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

const SERVICE: &str = "last.fm";

/// Largest page Last.fm serves
const MAX_LIMIT: u32 = 200;

/// Image hash Last.fm substitutes when a release has no artwork
const BLANK_ARTWORK: &str = "2a96cbd8b46e442fc41c2b86b821562f";

const RECENT_TRACKS: CollectionSchema = CollectionSchema {
    envelope: Schema {
        name: "lastfm.recenttracks",
        fields: &[
            Field::required("/recenttracks/@attr/page", FieldKind::Numeric),
            Field::required("/recenttracks/@attr/total", FieldKind::Numeric),
            Field::optional("/recenttracks/@attr/perPage", FieldKind::Numeric),
            Field::optional("/recenttracks/@attr/totalPages", FieldKind::Numeric),
        ],
    },
    items: "/recenttracks/track",
    item: Schema {
        name: "lastfm.track",
        fields: &[
            Field::required("/name", FieldKind::Text),
            Field::required("/artist/#text", FieldKind::Text),
            Field::optional("/album", FieldKind::Object),
            Field::optional("/album/#text", FieldKind::Text),
            Field::optional("/image", FieldKind::Array),
            Field::optional("/url", FieldKind::Text),
            Field::optional("/date", FieldKind::Object),
            Field::optional("/date/uts", FieldKind::Numeric),
            Field::optional("/@attr", FieldKind::Object),
            Field::optional("/@attr/nowplaying", FieldKind::Text),
        ],
    },
};

/// Parameters for a recent tracks request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentTracksQuery {
    pub user: String,
    pub page: u32,
    pub limit: u32,
}

impl RecentTracksQuery {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            page: 1,
            limit: 50,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    recenttracks: RawRecentTracks,
}

#[derive(Debug, Deserialize)]
struct RawRecentTracks {
    #[serde(rename = "@attr")]
    attr: RawPageAttr,
}

#[derive(Debug, Deserialize)]
struct RawPageAttr {
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    name: String,
    artist: RawText,
    #[serde(default)]
    album: Option<RawOptionalText>,
    #[serde(default)]
    image: Option<Vec<Value>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    date: Option<RawDate>,
    #[serde(default, rename = "@attr")]
    attr: Option<RawTrackAttr>,
}

#[derive(Debug, Deserialize)]
struct RawText {
    #[serde(rename = "#text")]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawOptionalText {
    #[serde(default, rename = "#text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDate {
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    uts: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTrackAttr {
    #[serde(default)]
    nowplaying: Option<String>,
}

/// Client for the Last.fm recent tracks feed
#[derive(Debug, Clone)]
pub struct LastfmClient {
    upstream: Upstream,
    api_key: String,
    base_url: String,
    fallback: Arc<dyn FallbackProvider>,
}

impl LastfmClient {
    /// Creates a client, failing immediately if the API key is absent
    pub fn new(
        api_key: Option<String>,
        fallback: Arc<dyn FallbackProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            upstream: Upstream::new(SERVICE),
            api_key: require_credential(API_KEY_VAR, api_key)?,
            base_url: LASTFM_BASE_URL.to_string(),
            fallback,
        })
    }

    /// Points the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetches one page of a user's recent tracks
    pub async fn recent_tracks(
        &self,
        query: &RecentTracksQuery,
    ) -> Result<UpstreamEnvelope<Track>, ApiError> {
        let user = require_param("user", &query.user)?;
        let page = clamp_page(query.page).to_string();
        let page_size = clamp_page_size(query.limit).min(MAX_LIMIT);
        let limit = page_size.to_string();

        let request = self.upstream.get(&self.base_url).query(&[
            ("method", "user.getrecenttracks"),
            ("user", user),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("page", page.as_str()),
            ("limit", limit.as_str()),
        ]);

        let payload = self
            .upstream
            .fetch_json(request, RECENT_TRACKS.envelope.name)
            .await?;

        if let Some(code) = payload.get("error").and_then(Value::as_u64) {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ApiError::UpstreamUnavailable {
                service: SERVICE,
                status: None,
                reason: format!("error {}: {}", code, message),
            });
        }

        let collection =
            validate_collection(payload, &RECENT_TRACKS).map_err(|f| self.upstream.mismatch(f))?;
        let degraded = collection.degraded_count();
        if degraded > 0 {
            debug!(service = SERVICE, degraded, "optional fields nulled");
        }

        let envelope: RawEnvelope = self
            .upstream
            .decode(RECENT_TRACKS.envelope.name, collection.envelope)?;

        let tracks = collection
            .items
            .into_iter()
            .map(|record| {
                self.upstream
                    .decode::<RawTrack>(RECENT_TRACKS.item.name, record)
                    .map(|raw| self.to_track(raw))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UpstreamEnvelope::page(tracks)
            .with_total(envelope.recenttracks.attr.total)
            .with_page_size(Some(page_size)))
    }

    fn to_track(&self, raw: RawTrack) -> Track {
        let now_playing = raw
            .attr
            .and_then(|attr| attr.nowplaying)
            .is_some_and(|flag| flag == "true");

        let played_at = raw
            .date
            .and_then(|date| date.uts)
            .and_then(|uts| DateTime::from_timestamp(uts as i64, 0));

        let image_url = raw
            .image
            .as_deref()
            .and_then(largest_artwork)
            .unwrap_or_else(|| {
                self.fallback
                    .fallback_image(&format!("{}/{}", raw.artist.text, raw.name))
            });

        Track {
            name: raw.name,
            artist: raw.artist.text,
            album: non_empty(raw.album.and_then(|album| album.text)),
            image_url,
            url: non_empty(raw.url),
            played_at: if now_playing { None } else { played_at },
            now_playing,
        }
    }
}

/// Picks the last (largest) non-blank artwork URL
fn largest_artwork(images: &[Value]) -> Option<String> {
    images
        .iter()
        .rev()
        .filter_map(|image| image.get("#text").and_then(Value::as_str))
        .find(|url| !url.trim().is_empty() && !url.contains(BLANK_ARTWORK))
        .map(str::to_string)
}
