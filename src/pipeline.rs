use crate::aggregator::PageAggregator;
use crate::api::{LastFmApiClient, LastFmApiClientImpl};
use crate::config::HeatmapConfig;
use crate::daily::{count_daily, ParseMode};
use crate::matrix::build_matrix;
use crate::palette::Palette;
use crate::render::{HeatmapImage, HeatmapRenderer};
use crate::Result;
use http_client::HttpClient;
use std::sync::Arc;

/// Fetch, count, pivot and render, end to end.
///
/// # Examples
///
/// ```rust,no_run
/// use lastfm_heatmap::{HeatmapConfig, HeatmapPipeline, Palette};
///
/// # tokio_test::block_on(async {
/// let config = HeatmapConfig::from_env()?;
/// let pipeline = HeatmapPipeline::from_config(&config)?;
/// let image = pipeline.run("someone", Palette::default()).await?;
/// std::fs::write("someone_heatmap.png", &image.png)?;
/// # Ok::<(), lastfm_heatmap::HeatmapError>(())
/// # });
/// ```
pub struct HeatmapPipeline<C: ?Sized> {
    aggregator: PageAggregator<C>,
    parse_mode: ParseMode,
    renderer: HeatmapRenderer,
}

impl HeatmapPipeline<LastFmApiClientImpl> {
    /// Build a pipeline talking to Last.fm over the default native HTTP client.
    #[cfg(feature = "curl")]
    pub fn from_config(config: &HeatmapConfig) -> Result<Self> {
        Self::from_config_with_http(config, Box::new(http_client::native::NativeClient::new()))
    }

    /// Build a pipeline on top of any HTTP client implementation.
    ///
    /// Fails with [`crate::HeatmapError::Config`] before any request is made
    /// if the configuration is unusable.
    pub fn from_config_with_http(
        config: &HeatmapConfig,
        http: Box<dyn HttpClient + Send + Sync>,
    ) -> Result<Self> {
        config.validate()?;
        let client = LastFmApiClientImpl::with_base_url(http, &config.api_url)?;
        let aggregator = PageAggregator::new(
            Arc::new(client),
            config.api_key.clone(),
            config.fetch.clone(),
        );
        Ok(Self::new(aggregator, HeatmapRenderer::default()))
    }
}

impl<C: LastFmApiClient + ?Sized> HeatmapPipeline<C> {
    pub fn new(aggregator: PageAggregator<C>, renderer: HeatmapRenderer) -> Self {
        Self {
            aggregator,
            parse_mode: ParseMode::default(),
            renderer,
        }
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    pub fn parse_mode(&self) -> ParseMode {
        self.parse_mode
    }

    /// Produce the heatmap for `username`.
    ///
    /// A user without any history gets a blank heatmap rather than an error.
    pub async fn run(&self, username: &str, palette: Palette) -> Result<HeatmapImage> {
        let scrobbles = self.aggregator.fetch_all_scrobbles(username).await?;
        let daily_counts = count_daily(&scrobbles, self.parse_mode)?;
        log::info!(
            "Counted {} scrobbles over {} days for '{}'",
            daily_counts.total(),
            daily_counts.len(),
            username
        );

        let matrix = build_matrix(&daily_counts);
        self.renderer.render(&matrix, &heatmap_title(username), palette)
    }
}

pub fn heatmap_title(username: &str) -> String {
    format!("{username}'s Last.fm Listening Heatmap")
}
