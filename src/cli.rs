//! Command-line interface parsing for feedboard
//!
//! Credentials and directories are read from flags or the environment. Every
//! subcommand prints one JSON document on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::cache::{ArtifactStore, FeedCache};
use crate::data::fallback::{DEFAULT_IMAGES, DEFAULT_SEED};
use crate::data::{
    instagram, lastfm, setlistfm, youtube, FallbackProvider, InstagramClient, LastfmClient,
    SeededFallback, SetlistClient, YoutubeClient, MEDIA_CACHE_KEY,
};
use crate::error::ConfigError;
use crate::history::{VisitHistory, VISITED_CITIES_KEY};
use crate::pagination::DEFAULT_PAGE_SIZE;

/// feedboard - Normalized feeds from music, concert, social and video services
#[derive(Parser, Debug)]
#[command(name = "feedboard")]
#[command(about = "Normalized, paginated feeds from Last.fm, setlist.fm, Instagram and YouTube")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub credentials: Credentials,

    /// Directory holding cached feeds (defaults to the XDG cache directory)
    #[arg(long, env = "FEEDBOARD_CACHE_DIR", global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory holding local history (defaults to the XDG data directory)
    #[arg(long, env = "FEEDBOARD_DATA_DIR", global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seed for choosing placeholder images
    #[arg(long, env = "FEEDBOARD_FALLBACK_SEED", global = true, default_value_t = DEFAULT_SEED)]
    pub fallback_seed: u64,

    #[command(subcommand)]
    pub command: Command,
}

/// Upstream credentials; each is only required by the commands that use it
#[derive(Args, Debug, Clone, Default)]
pub struct Credentials {
    /// Last.fm API key
    #[arg(long, env = lastfm::API_KEY_VAR, hide_env_values = true, global = true)]
    pub lastfm_api_key: Option<String>,

    /// setlist.fm API key
    #[arg(long, env = setlistfm::API_KEY_VAR, hide_env_values = true, global = true)]
    pub setlistfm_api_key: Option<String>,

    /// Instagram Graph API access token
    #[arg(long, env = instagram::ACCESS_TOKEN_VAR, hide_env_values = true, global = true)]
    pub instagram_access_token: Option<String>,

    /// YouTube Data API key
    #[arg(long, env = youtube::API_KEY_VAR, hide_env_values = true, global = true)]
    pub youtube_api_key: Option<String>,
}

/// Page selection shared by the paginated commands
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Items per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recently played tracks of a Last.fm user
    Tracks {
        #[arg(long)]
        user: String,
        #[command(flatten)]
        paging: Paging,
    },

    /// Concerts a setlist.fm user attended
    Shows {
        #[arg(long)]
        user: String,
        /// 1-based page number (setlist.fm fixes the page size)
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Add the cities of the listed shows to the visit history
        #[arg(long)]
        remember_cities: bool,
    },

    /// Videos in a YouTube playlist
    Videos {
        #[arg(long)]
        playlist: String,
        /// Token from a previous page's nextPageToken or prevPageToken
        #[arg(long)]
        page_token: Option<String>,
        #[command(flatten)]
        paging: Paging,
    },

    /// Instagram media from the local cache
    Media {
        #[command(flatten)]
        paging: Paging,
    },

    /// Fetch all Instagram media and replace the cached copy
    RefreshMedia,

    /// Refresh the Instagram cache periodically until interrupted
    Watch {
        /// Seconds between refreshes
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },

    /// Record a visit to a city
    Visit {
        #[arg(long)]
        city: String,
        #[arg(long)]
        country: String,
    },

    /// List visited cities, most recent first
    Visits,

    /// Every feed at once
    Overview {
        #[arg(long)]
        lastfm_user: String,
        #[arg(long)]
        setlist_user: String,
        #[arg(long)]
        playlist: String,
        #[command(flatten)]
        paging: Paging,
    },
}

/// Runtime configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub cache_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub fallback_seed: u64,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            credentials: cli.credentials.clone(),
            cache_dir: cli.cache_dir.clone(),
            data_dir: cli.data_dir.clone(),
            fallback_seed: cli.fallback_seed,
        }
    }

    /// Placeholder provider shared by every client
    pub fn fallback(&self) -> Arc<dyn FallbackProvider> {
        Arc::new(SeededFallback::new(
            DEFAULT_IMAGES.iter().map(|s| s.to_string()).collect(),
            self.fallback_seed,
        ))
    }

    pub fn lastfm(&self) -> Result<LastfmClient, ConfigError> {
        LastfmClient::new(self.credentials.lastfm_api_key.clone(), self.fallback())
    }

    pub fn setlist(&self) -> Result<SetlistClient, ConfigError> {
        SetlistClient::new(self.credentials.setlistfm_api_key.clone())
    }

    pub fn youtube(&self) -> Result<YoutubeClient, ConfigError> {
        YoutubeClient::new(self.credentials.youtube_api_key.clone(), self.fallback())
    }

    pub fn instagram(&self) -> Result<InstagramClient, ConfigError> {
        InstagramClient::new(
            self.credentials.instagram_access_token.clone(),
            self.fallback(),
        )
    }

    /// Store for cached feeds
    pub fn cache_store(&self) -> Result<ArtifactStore, ConfigError> {
        match &self.cache_dir {
            Some(dir) => Ok(ArtifactStore::with_dir(dir.clone())),
            None => ArtifactStore::cache().ok_or(ConfigError::MissingDirectory("cache")),
        }
    }

    /// Store for local history
    pub fn data_store(&self) -> Result<ArtifactStore, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(ArtifactStore::with_dir(dir.clone())),
            None => ArtifactStore::data().ok_or(ConfigError::MissingDirectory("data")),
        }
    }

    /// The cached Instagram media feed
    pub fn media_cache(&self) -> Result<FeedCache<InstagramClient>, ConfigError> {
        Ok(FeedCache::new(
            self.instagram()?,
            self.cache_store()?,
            MEDIA_CACHE_KEY,
        ))
    }

    /// The visited-city history, loaded from disk
    pub fn visit_history(&self) -> Result<VisitHistory, ConfigError> {
        Ok(VisitHistory::open(self.data_store()?, VISITED_CITIES_KEY))
    }
}
