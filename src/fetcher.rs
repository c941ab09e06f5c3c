use crate::api::{LastFmApiClient, RecentTracksQuery};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::scrobble::ScrobblePage;
use crate::HeatmapError;
use std::sync::Arc;

/// What a single page request finally produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was fetched and parsed
    Page(ScrobblePage),
    /// Page 1 arrived without the recent tracks structure, so there is no history
    Malformed,
    /// Every attempt failed
    Failed,
}

impl FetchOutcome {
    pub fn into_page(self) -> Option<ScrobblePage> {
        match self {
            FetchOutcome::Page(page) => Some(page),
            FetchOutcome::Malformed | FetchOutcome::Failed => None,
        }
    }
}

/// Fetches single pages with the configured retry policy.
///
/// Failures never escape as errors: after the last attempt the page is
/// reported as missing and the caller carries on without it.
pub struct PageFetcher<C: ?Sized> {
    client: Arc<C>,
    retry: RetryConfig,
}

impl<C: ?Sized> Clone for PageFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            retry: self.retry.clone(),
        }
    }
}

impl<C: LastFmApiClient + ?Sized> PageFetcher<C> {
    pub fn new(client: Arc<C>, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Fetch one page, returning `None` once retries are exhausted.
    pub async fn fetch_page(&self, query: &RecentTracksQuery, page: u32) -> Option<ScrobblePage> {
        self.fetch_page_outcome(query, page).await.into_page()
    }

    /// Fetch one page and report how it ended.
    ///
    /// Every non-success status, transport error and unreadable body is
    /// retried. A malformed body on page 1 is not: it means the user has no
    /// history. On later pages it is retried like any other failure.
    pub async fn fetch_page_outcome(&self, query: &RecentTracksQuery, page: u32) -> FetchOutcome {
        let operation_name = format!("recent tracks page {page}");
        let max_attempts = self.retry.max_attempts.max(1);

        let result = retry_with_backoff(
            &self.retry,
            &operation_name,
            |error| {
                error.is_retryable()
                    || (page > 1 && matches!(error, HeatmapError::MalformedResponse(_)))
            },
            || self.client.get_recent_tracks_page(query, page),
            |attempt, error| {
                log::warn!(
                    "Error fetching page {page} for '{}' (attempt {attempt}/{max_attempts}): {error}",
                    query.user
                );
            },
        )
        .await;

        match result {
            Ok(retry_result) => FetchOutcome::Page(retry_result.result),
            Err(HeatmapError::MalformedResponse(reason)) if page == 1 => {
                log::debug!("Page {page} for '{}' is malformed: {reason}", query.user);
                FetchOutcome::Malformed
            }
            Err(_) => FetchOutcome::Failed,
        }
    }
}
