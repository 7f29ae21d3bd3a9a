//! Cache module for storing fetched collections to disk
//!
//! This module provides an artifact store that persists collections as flat
//! JSON arrays, and a feed cache that refreshes one such artifact from an
//! upstream client. Reads never fail for a missing cache: they fall back to an
//! empty collection so callers can render an empty state.

mod feed;
mod manager;

pub use feed::{CollectionSource, FeedCache, RefreshOutcome};
pub use manager::{ArtifactStore, CachedCollection};
