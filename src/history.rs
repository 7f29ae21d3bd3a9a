//! Locally persisted visit history
//!
//! Keeps the most recently visited entities (e.g. cities from attended shows)
//! in one JSON array per history kind. The list is loaded once when opened and
//! saved in full after every mutation.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::ArtifactStore;
use crate::data::Show;
use crate::error::CacheError;

/// Maximum number of entries kept per history
pub const HISTORY_CAPACITY: usize = 20;

/// Storage key for the visited-city history
pub const VISITED_CITIES_KEY: &str = "visited-cities";

/// One remembered visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedEntity {
    pub primary_key: String,
    pub secondary_key: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl VisitedEntity {
    fn is_same(&self, primary_key: &str, secondary_key: &str) -> bool {
        self.primary_key == primary_key && self.secondary_key == secondary_key
    }
}

/// Most-recent-first list of unique visits, capped at [`HISTORY_CAPACITY`]
#[derive(Debug)]
pub struct VisitHistory {
    store: ArtifactStore,
    key: String,
    entries: Vec<VisitedEntity>,
}

impl VisitHistory {
    /// Opens the history stored under `key`, loading whatever was saved
    ///
    /// A missing or unreadable artifact starts an empty history. Repeated
    /// pairs in a hand-edited file keep only their first (most recent) entry.
    pub fn open(store: ArtifactStore, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut entries = match store.read::<VisitedEntity>(&key) {
            Ok(Some(saved)) => saved.items,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(key = %key, error = %err, "visit history unreadable, starting empty");
                Vec::new()
            }
        };
        let mut seen = HashSet::new();
        entries.retain(|entry| {
            seen.insert((entry.primary_key.clone(), entry.secondary_key.clone()))
        });
        entries.truncate(HISTORY_CAPACITY);

        Self {
            store,
            key,
            entries,
        }
    }

    /// Entries, most recently visited first
    pub fn list(&self) -> &[VisitedEntity] {
        &self.entries
    }

    /// Records a visit now
    pub fn record_visit(
        &mut self,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<(), CacheError> {
        self.record_visit_at(primary_key, secondary_key, Utc::now().timestamp_millis())
    }

    /// Records a visit at the given time
    ///
    /// Any earlier entry for the same pair is removed, the new entry goes to
    /// the front, and the oldest entries beyond capacity are dropped. The list
    /// is updated in memory even if saving it fails.
    pub fn record_visit_at(
        &mut self,
        primary_key: &str,
        secondary_key: &str,
        timestamp: i64,
    ) -> Result<(), CacheError> {
        self.entries
            .retain(|entry| !entry.is_same(primary_key, secondary_key));
        self.entries.insert(
            0,
            VisitedEntity {
                primary_key: primary_key.to_string(),
                secondary_key: secondary_key.to_string(),
                timestamp,
            },
        );
        self.entries.truncate(HISTORY_CAPACITY);

        if let Err(err) = self.store.write(&self.key, &self.entries) {
            warn!(key = %self.key, error = %err, "could not save visit history");
            return Err(err);
        }
        Ok(())
    }

    /// Records the city of a show as visited now
    pub fn record_show(&mut self, show: &Show) -> Result<(), CacheError> {
        self.record_visit(&show.city, &show.country)
    }
}
