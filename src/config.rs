//! Configuration for the fetch pipeline.
//!
//! The API key comes from the environment (`LASTFM_API_KEY`), as does an
//! optional override of the API endpoint (`LASTFM_API_URL`). Fetch tuning has
//! defaults matching Last.fm's published rate limits and can be overridden by
//! the command line.

use crate::retry::RetryConfig;
use crate::{HeatmapError, Result};
use std::env;
use std::time::Duration;

/// Environment variable holding the Last.fm API key.
pub const API_KEY_VAR: &str = "LASTFM_API_KEY";

/// Environment variable overriding the API endpoint.
pub const API_URL_VAR: &str = "LASTFM_API_URL";

/// Public Last.fm web service endpoint.
pub const DEFAULT_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Tuning for the paginated fetch.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Scrobbles requested per page (`limit`, Last.fm allows at most 200)
    pub page_size: u32,
    /// Exclusive upper bound on page numbers; pages at or above it are never requested
    pub page_cap: u32,
    /// Maximum number of scrobbles kept from one run
    pub max_events: usize,
    /// Maximum number of requests in flight at once
    pub max_concurrent_requests: usize,
    /// A pacing pause follows every page number that is a multiple of this
    pub pacing_interval: u32,
    /// Length of the pacing pause
    pub pacing_delay: Duration,
    /// Per-page retry policy
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            page_cap: 100,
            max_events: 10_000,
            max_concurrent_requests: 10,
            pacing_interval: 10,
            pacing_delay: Duration::from_secs(1),
            retry: RetryConfig::default(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct HeatmapConfig {
    pub api_key: String,
    pub api_url: String,
    pub fetch: FetchConfig,
}

impl HeatmapConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            fetch: FetchConfig::default(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Fails with [`HeatmapError::Config`] when `LASTFM_API_KEY` is missing or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                HeatmapError::Config(format!("{API_KEY_VAR} environment variable not set"))
            })?;

        let mut config = Self::new(api_key);
        if let Some(url) = lookup(API_URL_VAR).filter(|url| !url.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }

        Ok(config)
    }

    /// Check that the configuration can be used for fetching.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(HeatmapError::Config("API key is empty".to_string()));
        }
        if self.fetch.page_size == 0 {
            return Err(HeatmapError::Config("page size must be positive".to_string()));
        }
        if self.fetch.max_concurrent_requests == 0 {
            return Err(HeatmapError::Config(
                "concurrency limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
