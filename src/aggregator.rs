//! Drives the page fetcher across a user's whole listening history.
//!
//! Page 1 is fetched alone to learn the page count. The remaining pages are
//! fetched in windows that end on multiples of the pacing interval
//! (2-10, 11-20, ...). Inside a window requests run concurrently, bounded by
//! a semaphore, and a pacing pause follows each completed window. Results
//! land in a slot per page so the final list is always in page order, no
//! matter which request finished first.

use crate::api::{LastFmApiClient, RecentTracksQuery};
use crate::config::FetchConfig;
use crate::fetcher::{FetchOutcome, PageFetcher};
use crate::scrobble::{Scrobble, ScrobblePage};
use crate::{HeatmapError, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Everything one aggregation run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    /// Scrobbles in ascending page order
    pub scrobbles: Vec<Scrobble>,
    /// Total page count reported by the first page (0 if there was none)
    pub total_pages: u32,
    /// Pages that were fetched successfully, including page 1
    pub pages_fetched: u32,
    /// Pages that were skipped after exhausting retries
    pub pages_failed: u32,
    /// Whether the event cap stopped the run early
    pub truncated: bool,
}

impl AggregateResult {
    pub fn is_empty(&self) -> bool {
        self.scrobbles.is_empty()
    }
}

/// How one page of a window ended.
enum PageSlot {
    Fetched(ScrobblePage),
    /// Retries were exhausted
    Failed,
    /// Never requested, or dropped after the event cap was reached
    Pending,
}

/// Fetches all pages of a user's recent tracks.
pub struct PageAggregator<C: ?Sized> {
    fetcher: PageFetcher<C>,
    api_key: String,
    config: FetchConfig,
}

impl<C: LastFmApiClient + ?Sized> PageAggregator<C> {
    pub fn new(client: Arc<C>, api_key: impl Into<String>, config: FetchConfig) -> Self {
        let fetcher = PageFetcher::new(client, config.retry.clone());
        Self {
            fetcher,
            api_key: api_key.into(),
            config,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch every scrobble of `username`, flattened in page order.
    pub async fn fetch_all_scrobbles(&self, username: &str) -> Result<Vec<Scrobble>> {
        Ok(self.fetch_all(username).await?.scrobbles)
    }

    /// Fetch every scrobble of `username` together with run statistics.
    ///
    /// The only error is a missing API key, reported before any request is
    /// made. A missing or malformed first page means the user has no history
    /// and yields an empty result.
    pub async fn fetch_all(&self, username: &str) -> Result<AggregateResult> {
        if self.api_key.trim().is_empty() {
            return Err(HeatmapError::Config(
                "Last.fm API key is required to fetch scrobbles".to_string(),
            ));
        }

        let query = RecentTracksQuery::new(username, self.api_key.as_str(), self.config.page_size);

        log::info!("Fetching first page of recent tracks for '{username}'");
        let first_page = match self.fetcher.fetch_page_outcome(&query, 1).await {
            FetchOutcome::Page(page) => page,
            FetchOutcome::Malformed => {
                log::info!("No tracks found for '{username}' or invalid data structure");
                return Ok(AggregateResult::default());
            }
            FetchOutcome::Failed => {
                log::warn!(
                    "Could not fetch first page for '{username}', treating history as empty"
                );
                return Ok(AggregateResult::default());
            }
        };

        let total_pages = first_page.total_pages.unwrap_or(1).max(1);
        let last_page = total_pages.min(self.config.page_cap.saturating_sub(1)).max(1);
        log::info!("Total pages: {total_pages}, fetching pages 1-{last_page}");

        let max_events = self.config.max_events;
        let mut result = AggregateResult {
            scrobbles: first_page.scrobbles,
            total_pages,
            pages_fetched: 1,
            ..AggregateResult::default()
        };

        let mut next_page = 2;
        loop {
            if result.scrobbles.len() >= max_events {
                result.truncated |= result.scrobbles.len() > max_events || next_page <= last_page;
                result.scrobbles.truncate(max_events);
                log::info!("Reached the cap of {max_events} scrobbles");
                break;
            }
            if next_page > last_page {
                break;
            }

            let window_end = self.window_end(next_page, last_page);
            log::debug!("Fetching pages {next_page}-{window_end}");

            let budget = max_events - result.scrobbles.len();
            for slot in self.fetch_window(&query, next_page, window_end, budget).await {
                match slot {
                    PageSlot::Fetched(page) => {
                        result.pages_fetched += 1;
                        result.scrobbles.extend(page.scrobbles);
                    }
                    PageSlot::Failed => result.pages_failed += 1,
                    PageSlot::Pending => result.truncated = true,
                }
            }

            next_page = window_end + 1;
            if next_page <= last_page
                && result.scrobbles.len() < max_events
                && self.is_pacing_boundary(window_end)
            {
                log::debug!("Pausing {:?} after page {window_end}", self.config.pacing_delay);
                tokio::time::sleep(self.config.pacing_delay).await;
            }
        }

        log::info!(
            "Fetched {} scrobbles for '{}' from {} pages ({} failed)",
            result.scrobbles.len(),
            username,
            result.pages_fetched,
            result.pages_failed
        );

        Ok(result)
    }

    /// Last page of the window starting at `start`.
    fn window_end(&self, start: u32, last_page: u32) -> u32 {
        let interval = self.config.pacing_interval;
        if interval == 0 {
            return last_page;
        }
        let boundary = ((start - 1) / interval + 1) * interval;
        boundary.min(last_page)
    }

    fn is_pacing_boundary(&self, page: u32) -> bool {
        self.config.pacing_interval > 0 && page % self.config.pacing_interval == 0
    }

    /// Fetch pages `start..=end` concurrently and return them indexed by page.
    ///
    /// Once the leading run of settled pages holds `budget` scrobbles, the
    /// remaining requests are dropped and their slots stay `Pending`.
    async fn fetch_window(
        &self,
        query: &RecentTracksQuery,
        start: u32,
        end: u32,
        budget: usize,
    ) -> Vec<PageSlot> {
        let limiter = Semaphore::new(self.config.max_concurrent_requests.max(1));
        let mut slots: Vec<PageSlot> = (start..=end).map(|_| PageSlot::Pending).collect();
        let mut settled = 0;
        let mut settled_events = 0;

        let mut pending: FuturesUnordered<_> = (start..=end)
            .map(|page| {
                let limiter = &limiter;
                async move {
                    // The semaphore is never closed, so acquire cannot fail.
                    let _permit = limiter.acquire().await.ok();
                    (page, self.fetcher.fetch_page(query, page).await)
                }
            })
            .collect();

        while let Some((page, fetched)) = pending.next().await {
            slots[(page - start) as usize] = match fetched {
                Some(page) => PageSlot::Fetched(page),
                None => PageSlot::Failed,
            };

            while let Some(slot) = slots.get(settled) {
                match slot {
                    PageSlot::Pending => break,
                    PageSlot::Fetched(page) => settled_events += page.len(),
                    PageSlot::Failed => {}
                }
                settled += 1;
            }

            if settled_events >= budget && settled < slots.len() {
                log::debug!(
                    "Event cap reached at page {}, skipping pages {}-{end}",
                    start + settled as u32 - 1,
                    start + settled as u32
                );
                for slot in &mut slots[settled..] {
                    *slot = PageSlot::Pending;
                }
                break;
            }
        }

        slots
    }
}
