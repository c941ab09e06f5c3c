#![allow(dead_code)]
use async_trait::async_trait;
use lastfm_heatmap::{
    FetchConfig, HeatmapError, LastFmApiClient, RecentTracksQuery, Result, RetryConfig, Scrobble,
    ScrobblePage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Number of failures a page produces before it starts succeeding.
pub const ALWAYS_FAIL: u32 = u32::MAX;

/// In-process stand-in for the Last.fm API.
///
/// Serves `total_pages` pages of `per_page` scrobbles each. Lower page
/// numbers answer more slowly, so concurrent requests complete out of order.
/// Every request and the peak number of requests in flight are recorded.
pub struct FakeLastFm {
    total_pages: u32,
    per_page: usize,
    latency_step: Duration,
    failures: Mutex<HashMap<u32, u32>>,
    dates: Mutex<HashMap<u32, Vec<String>>>,
    requested: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeLastFm {
    pub fn new(total_pages: u32, per_page: usize) -> Self {
        Self {
            total_pages,
            per_page,
            latency_step: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
            dates: Mutex::new(HashMap::new()),
            requested: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Page `p` takes `(total_pages - p + 1) * step` to answer.
    pub fn with_latency_step(mut self, step: Duration) -> Self {
        self.latency_step = step;
        self
    }

    /// Make `page` fail `times` times before succeeding.
    pub fn failing(self, page: u32, times: u32) -> Self {
        self.failures.lock().unwrap().insert(page, times);
        self
    }

    /// Serve exactly these scrobble dates on `page`.
    pub fn with_dates(self, page: u32, dates: &[&str]) -> Self {
        self.dates
            .lock()
            .unwrap()
            .insert(page, dates.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        let mut pages = self.requested.lock().unwrap().clone();
        pages.sort_unstable();
        pages
    }

    pub fn requests_for(&self, page: u32) -> usize {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|&&p| p == page)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, page: u32) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&page) {
            Some(0) | None => false,
            Some(remaining) => {
                if *remaining != ALWAYS_FAIL {
                    *remaining -= 1;
                }
                true
            }
        }
    }

    fn page(&self, page: u32) -> ScrobblePage {
        let dates = self.dates.lock().unwrap().get(&page).cloned();
        let scrobbles = match dates {
            Some(dates) => dates
                .into_iter()
                .enumerate()
                .map(|(i, date)| scrobble(page, i, &date))
                .collect(),
            None => (0..self.per_page)
                .map(|i| scrobble(page, i, "15 Mar 2024, 12:00"))
                .collect(),
        };
        ScrobblePage {
            scrobbles,
            page_number: page,
            total_pages: Some(self.total_pages),
        }
    }
}

fn scrobble(page: u32, index: usize, date: &str) -> Scrobble {
    Scrobble {
        name: format!("Track {page}-{index}"),
        artist: "Artist".to_string(),
        album: None,
        date_text: Some(date.to_string()),
        uts: None,
        page,
    }
}

#[async_trait]
impl LastFmApiClient for FakeLastFm {
    async fn get_recent_tracks_page(
        &self,
        _query: &RecentTracksQuery,
        page: u32,
    ) -> Result<ScrobblePage> {
        self.requested.lock().unwrap().push(page);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self
            .latency_step
            .saturating_mul(self.total_pages.saturating_sub(page) + 1);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        // Yield so that other requests get a chance to start
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if page > self.total_pages {
            return Err(HeatmapError::MalformedResponse(format!("no page {page}")));
        }
        if self.should_fail(page) {
            return Err(HeatmapError::Status { status: 500, api_code: None });
        }
        Ok(self.page(page))
    }
}

/// Fetch config without waits between retries or windows.
pub fn quick_config() -> FetchConfig {
    FetchConfig {
        retry: RetryConfig::immediate(3),
        pacing_delay: Duration::ZERO,
        ..FetchConfig::default()
    }
}
