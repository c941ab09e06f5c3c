pub mod aggregator;
pub mod api;
pub mod config;
pub mod daily;
pub mod error;
pub mod fetcher;
pub mod jobs;
pub mod matrix;
pub mod palette;
pub mod pipeline;
pub mod render;
pub mod retry;
pub mod scrobble;

pub use aggregator::{AggregateResult, PageAggregator};
pub use api::{LastFmApiClient, LastFmApiClientImpl, RecentTracksQuery};
pub use config::{FetchConfig, HeatmapConfig};
pub use daily::{count_daily, DailyCounts, ParseMode};
pub use error::HeatmapError;
pub use fetcher::{FetchOutcome, PageFetcher};
pub use jobs::{
    heatmap_key, DirectoryStore, JobId, JobQueue, JobRequest, JobStatus, MemoryStore, ResultStore,
};
pub use matrix::{build_matrix, Cell, HeatmapMatrix, YearMonth};
pub use palette::{Palette, Rgb, Scheme};
pub use pipeline::HeatmapPipeline;
pub use render::{HeatmapImage, HeatmapRenderer, RenderOptions};
pub use retry::{Backoff, RetryConfig};
pub use scrobble::{Scrobble, ScrobblePage};

// Re-export the mock client for downstream tests
#[cfg(feature = "mock")]
pub use api::MockLastFmApiClient;

pub type Result<T> = std::result::Result<T, HeatmapError>;
