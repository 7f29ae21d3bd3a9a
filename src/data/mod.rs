//! Normalized domain objects and the upstream clients that produce them
//!
//! Every client validates the raw payload against its declared schema before
//! reshaping it, so nothing in this module's output depends on unchecked
//! upstream fields. Domain objects carry no fetch timestamps: identical
//! upstream data always serializes to identical bytes.

pub mod fallback;
mod http;
pub mod instagram;
pub mod lastfm;
pub mod setlistfm;
pub mod youtube;

pub use fallback::{FallbackProvider, FixedFallback, SeededFallback};
pub use http::require_credential;
pub use instagram::{InstagramClient, MEDIA_CACHE_KEY};
pub use lastfm::{LastfmClient, RecentTracksQuery};
pub use setlistfm::{AttendedShowsQuery, SetlistClient};
pub use youtube::{PlaylistQuery, YoutubeClient};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A scrobbled track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    /// Largest artwork offered, or a placeholder
    pub image_url: String,
    pub url: Option<String>,
    /// When the scrobble happened; `None` while the track is playing
    pub played_at: Option<DateTime<Utc>>,
    pub now_playing: bool,
}

/// A concert the user attended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    pub id: String,
    pub artist: String,
    pub venue: String,
    pub city: String,
    pub country: String,
    pub country_code: Option<String>,
    pub event_date: NaiveDate,
    pub tour: Option<String>,
    pub url: Option<String>,
}

/// Kind of a social media post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Video,
    CarouselAlbum,
    Unknown,
}

impl MediaType {
    /// Maps the upstream media type, tolerating values added later
    pub fn from_upstream(value: Option<&str>) -> Self {
        match value {
            Some("IMAGE") => MediaType::Image,
            Some("VIDEO") => MediaType::Video,
            Some("CAROUSEL_ALBUM") => MediaType::CarouselAlbum,
            _ => MediaType::Unknown,
        }
    }
}

/// A social media post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub media_type: MediaType,
    pub caption: Option<String>,
    /// Image (or video poster) to display, or a placeholder
    pub media_url: String,
    pub thumbnail_url: Option<String>,
    pub permalink: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// An entry of a video playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Best thumbnail offered, or a placeholder
    pub thumbnail_url: String,
    pub position: Option<u64>,
}

/// Turns an empty or whitespace-only string into `None`
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
