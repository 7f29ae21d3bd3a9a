//! feedboard library
//!
//! Aggregates several external data services behind one normalized,
//! paginated interface, with a file cache for feeds too expensive to fetch
//! per request and a small locally persisted visit history.

pub mod app;
pub mod cache;
pub mod cli;
pub mod data;
pub mod error;
pub mod history;
pub mod pagination;
pub mod refresh;
pub mod schema;

pub use app::{respond, serve_cached, Dashboard, Overview, OverviewRequest, ResourceResponse};
pub use error::{ApiError, CacheError, ConfigError, ErrorBody, ErrorKind};
pub use pagination::{normalize, PageEnvelope, UpstreamEnvelope};
