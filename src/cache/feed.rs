//! Refreshable cache for feeds too expensive to fetch per request

use std::future::Future;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::manager::{ArtifactStore, CachedCollection};
use crate::error::{ApiError, CacheError};

/// Something that can produce a complete collection in one call
pub trait CollectionSource: Send + Sync {
    type Item: Serialize + DeserializeOwned + Send + Sync;

    /// Service name used in log events
    fn name(&self) -> &'static str;

    /// Fetches the whole collection, or fails without partial results
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<Self::Item>, ApiError>> + Send;
}

/// Result of a refresh, suitable for a scheduled job to log
///
/// `message` is a fixed sentence per outcome; failure detail goes only to
/// the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub success: bool,
    pub message: String,
}

impl RefreshOutcome {
    fn succeeded(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

/// A collection fetched from a [`CollectionSource`] and kept on disk
///
/// `refresh` replaces the artifact wholesale; nothing is merged with the
/// previous contents. A failed refresh leaves the last good artifact in place.
/// Staleness is unbounded: the artifact changes only when `refresh` is called.
#[derive(Debug)]
pub struct FeedCache<S> {
    source: S,
    store: ArtifactStore,
    key: String,
    /// Serializes refreshes of this resource
    refresh_lock: Mutex<()>,
}

impl<S: CollectionSource> FeedCache<S> {
    pub fn new(source: S, store: ArtifactStore, key: impl Into<String>) -> Self {
        Self {
            source,
            store,
            key: key.into(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetches the full collection and replaces the cached artifact
    pub async fn refresh(&self) -> RefreshOutcome {
        let _writer = self.refresh_lock.lock().await;
        let service = self.source.name();

        let items = match self.source.fetch_all().await {
            Ok(items) => items,
            Err(err) => {
                warn!(service, key = %self.key, error = %err, "refresh failed, keeping cached copy");
                return RefreshOutcome::failed(format!("Refresh failed: {}", err.kind().message()));
            }
        };

        match self.store.write(&self.key, &items) {
            Ok(()) => {
                info!(service, key = %self.key, items = items.len(), "cache refreshed");
                RefreshOutcome::succeeded(format!("Cached {} items", items.len()))
            }
            Err(err) => {
                warn!(service, key = %self.key, error = %err, "cache write failed");
                RefreshOutcome::failed("Could not write cache.".to_string())
            }
        }
    }

    /// Returns the cached collection, or an empty one if none is available
    pub fn read(&self) -> Vec<S::Item> {
        match self.read_entry() {
            Ok(Some(entry)) => entry.items,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(key = %self.key, error = %err, "cache unreadable, serving empty collection");
                Vec::new()
            }
        }
    }

    /// Returns the cached collection with its write time
    ///
    /// `Ok(None)` means nothing has been cached yet.
    pub fn read_entry(&self) -> Result<Option<CachedCollection<S::Item>>, CacheError> {
        self.store.read(&self.key)
    }
}
