//! Request surface over every feed
//!
//! [`respond`] is the one place where client errors are logged and turned into
//! an empty page plus an [`ErrorBody`]. Raw upstream text never leaves this
//! module; callers only see the fixed message for the error kind.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CollectionSource, FeedCache, RefreshOutcome};
use crate::cli::Settings;
use crate::data::{
    AttendedShowsQuery, InstagramClient, LastfmClient, MediaItem, PlaylistQuery,
    RecentTracksQuery, SetlistClient, Show, Track, Video, YoutubeClient,
};
use crate::error::{ApiError, ConfigError, ErrorBody, ErrorKind};
use crate::pagination::{normalize, PageEnvelope, UpstreamEnvelope};

/// A page of one resource, or an empty page with the reason it is empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse<T> {
    #[serde(flatten)]
    pub envelope: PageEnvelope<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ResourceResponse<T> {
    pub fn ok(envelope: PageEnvelope<T>) -> Self {
        Self {
            envelope,
            error: None,
        }
    }

    /// An empty page for the request, tagged with `kind`
    pub fn failed(kind: ErrorKind, page: u32, page_size: u32) -> Self {
        Self {
            envelope: PageEnvelope::empty(page, page_size),
            error: Some(ErrorBody::from(kind)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Converts a client result into a response for `resource`
pub fn respond<T>(
    result: Result<UpstreamEnvelope<T>, ApiError>,
    page: u32,
    page_size: u32,
    resource: &str,
) -> ResourceResponse<T> {
    match result {
        Ok(upstream) => {
            let envelope = normalize(upstream, page, page_size);
            debug!(resource, total = envelope.total, items = envelope.items.len(), "served page");
            ResourceResponse::ok(envelope)
        }
        Err(err) => {
            match &err {
                ApiError::SchemaMismatch { service, failure } => warn!(
                    resource,
                    service = *service,
                    schema = failure.schema,
                    issues = failure.issues.len(),
                    error = %err,
                    "rejected upstream payload"
                ),
                ApiError::UpstreamUnavailable { service, status, .. } => warn!(
                    resource,
                    service = *service,
                    status = ?status,
                    error = %err,
                    "upstream request failed"
                ),
                ApiError::InvalidRequest(_) => warn!(resource, error = %err, "invalid request"),
            }
            ResourceResponse::failed(err.kind(), page, page_size)
        }
    }
}

/// Serves a page of a cached collection
///
/// Nothing cached yet is an empty page without error; an unreadable artifact
/// is an empty page tagged `cache_io_error`.
pub fn serve_cached<S: CollectionSource>(
    cache: &FeedCache<S>,
    page: u32,
    page_size: u32,
) -> ResourceResponse<S::Item> {
    match cache.read_entry() {
        Ok(entry) => {
            let items = entry.map(|entry| entry.items).unwrap_or_default();
            ResourceResponse::ok(normalize(UpstreamEnvelope::full(items), page, page_size))
        }
        Err(err) => {
            warn!(resource = cache.source().name(), key = cache.key(), error = %err, "cache unreadable");
            ResourceResponse::failed(ErrorKind::CacheIoError, page, page_size)
        }
    }
}

/// Parameters for [`Dashboard::overview`]
#[derive(Debug, Clone)]
pub struct OverviewRequest {
    pub tracks: RecentTracksQuery,
    pub shows: AttendedShowsQuery,
    pub videos: PlaylistQuery,
    pub media_page: u32,
    pub media_page_size: u32,
}

/// Every feed's current page, fetched together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub tracks: ResourceResponse<Track>,
    pub shows: ResourceResponse<Show>,
    pub videos: ResourceResponse<Video>,
    pub media: ResourceResponse<MediaItem>,
}

/// All configured clients plus the media cache
#[derive(Debug)]
pub struct Dashboard {
    lastfm: LastfmClient,
    setlist: SetlistClient,
    youtube: YoutubeClient,
    media: Arc<FeedCache<InstagramClient>>,
}

impl Dashboard {
    /// Builds every client, failing on the first missing credential
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::from_parts(
            settings.lastfm()?,
            settings.setlist()?,
            settings.youtube()?,
            Arc::new(settings.media_cache()?),
        ))
    }

    pub fn from_parts(
        lastfm: LastfmClient,
        setlist: SetlistClient,
        youtube: YoutubeClient,
        media: Arc<FeedCache<InstagramClient>>,
    ) -> Self {
        Self {
            lastfm,
            setlist,
            youtube,
            media,
        }
    }

    /// Shared handle to the media cache, e.g. for a refresh job
    pub fn media_cache(&self) -> Arc<FeedCache<InstagramClient>> {
        Arc::clone(&self.media)
    }

    pub async fn tracks(&self, query: &RecentTracksQuery) -> ResourceResponse<Track> {
        respond(
            self.lastfm.recent_tracks(query).await,
            query.page,
            query.limit,
            "tracks",
        )
    }

    /// setlist.fm dictates its page size, so the requested one only shapes
    /// the empty page returned on error
    pub async fn shows(&self, query: &AttendedShowsQuery, page_size: u32) -> ResourceResponse<Show> {
        respond(
            self.setlist.attended_shows(query).await,
            query.page,
            page_size,
            "shows",
        )
    }

    pub async fn videos(&self, query: &PlaylistQuery) -> ResourceResponse<Video> {
        respond(
            self.youtube.playlist_items(query).await,
            query.page,
            query.page_size,
            "videos",
        )
    }

    /// Serves a page of the cached media without contacting Instagram
    pub fn media(&self, page: u32, page_size: u32) -> ResourceResponse<MediaItem> {
        serve_cached(&self.media, page, page_size)
    }

    pub async fn refresh_media(&self) -> RefreshOutcome {
        self.media.refresh().await
    }

    /// Fetches the live feeds concurrently and reads the media cache
    pub async fn overview(&self, request: &OverviewRequest) -> Overview {
        let (tracks, shows, videos) = futures::join!(
            self.tracks(&request.tracks),
            self.shows(&request.shows, request.media_page_size),
            self.videos(&request.videos),
        );

        Overview {
            tracks,
            shows,
            videos,
            media: self.media(request.media_page, request.media_page_size),
        }
    }
}
