mod common;

use common::{quick_config, FakeLastFm, ALWAYS_FAIL};
use lastfm_heatmap::{FetchConfig, PageAggregator};
use std::sync::Arc;
use std::time::Duration;

#[test_log::test(tokio::test(start_paused = true))]
async fn test_out_of_order_completion_keeps_page_order() {
    let fake = Arc::new(FakeLastFm::new(12, 3).with_latency_step(Duration::from_millis(10)));
    let aggregator = PageAggregator::new(fake.clone(), "key", quick_config());

    let result = aggregator.fetch_all("someone").await.unwrap();

    assert_eq!(result.total_pages, 12);
    assert_eq!(result.pages_fetched, 12);
    assert_eq!(result.scrobbles.len(), 36);

    let pages: Vec<u32> = result.scrobbles.iter().map(|s| s.page).collect();
    let mut sorted = pages.clone();
    sorted.sort_unstable();
    assert_eq!(pages, sorted, "scrobbles must be in page order");

    assert_eq!(result.scrobbles[0].name, "Track 1-0");
    assert_eq!(result.scrobbles[35].name, "Track 12-2");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_page_cap_is_never_reached() {
    let fake = Arc::new(FakeLastFm::new(150, 1));
    let config = FetchConfig {
        page_cap: 100,
        ..quick_config()
    };
    let aggregator = PageAggregator::new(fake.clone(), "key", config);

    let result = aggregator.fetch_all("someone").await.unwrap();

    assert_eq!(result.total_pages, 150);
    assert_eq!(fake.requested_pages(), (1..=99).collect::<Vec<_>>());
    assert_eq!(result.scrobbles.len(), 99);
    assert!(result.scrobbles.iter().all(|s| s.page < 100));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_concurrency_is_bounded() {
    let fake = Arc::new(FakeLastFm::new(10, 1).with_latency_step(Duration::from_millis(50)));
    let config = FetchConfig {
        max_concurrent_requests: 3,
        ..quick_config()
    };
    let aggregator = PageAggregator::new(fake.clone(), "key", config);

    let result = aggregator.fetch_all("someone").await.unwrap();

    assert_eq!(result.pages_fetched, 10);
    assert_eq!(fake.max_in_flight(), 3);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_pacing_pauses_after_every_tenth_page() {
    let fake = Arc::new(FakeLastFm::new(25, 1));
    let config = FetchConfig {
        pacing_delay: Duration::from_secs(1),
        ..quick_config()
    };
    let aggregator = PageAggregator::new(fake.clone(), "key", config);

    let start = tokio::time::Instant::now();
    let result = aggregator.fetch_all("someone").await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(result.pages_fetched, 25);
    // One pause after page 10 and one after page 20, none at the end
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_event_cap_truncates() {
    let fake = Arc::new(FakeLastFm::new(10, 100));
    let config = FetchConfig {
        max_events: 450,
        ..quick_config()
    };
    let aggregator = PageAggregator::new(fake.clone(), "key", config);

    let result = aggregator.fetch_all("someone").await.unwrap();

    assert_eq!(result.scrobbles.len(), 450);
    assert!(result.truncated);
    assert_eq!(result.scrobbles[449].name, "Track 5-49");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_event_cap_stops_requests_inside_a_window() {
    let fake = Arc::new(FakeLastFm::new(10, 100));
    let config = FetchConfig {
        max_events: 250,
        max_concurrent_requests: 1,
        ..quick_config()
    };
    let aggregator = PageAggregator::new(fake.clone(), "key", config);

    let result = aggregator.fetch_all("someone").await.unwrap();

    assert_eq!(result.scrobbles.len(), 250);
    assert!(result.truncated);
    assert_eq!(result.scrobbles[249].name, "Track 3-49");
    let requested = fake.requested_pages();
    assert!(!requested.contains(&5), "requested {requested:?}");
    assert!(!requested.contains(&10), "requested {requested:?}");
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_failed_pages_are_retried_then_skipped() {
    let fake = Arc::new(
        FakeLastFm::new(6, 2)
            .failing(3, 2)
            .failing(5, ALWAYS_FAIL),
    );
    let aggregator = PageAggregator::new(fake.clone(), "key", quick_config());

    let result = aggregator.fetch_all("someone").await.unwrap();

    assert_eq!(fake.requests_for(3), 3);
    assert_eq!(fake.requests_for(5), 3);
    assert_eq!(result.pages_fetched, 5);
    assert_eq!(result.pages_failed, 1);
    assert_eq!(result.scrobbles.len(), 10);
    assert!(result.scrobbles.iter().any(|s| s.page == 3));
    assert!(result.scrobbles.iter().all(|s| s.page != 5));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_retry_waits_between_attempts() {
    let fake = Arc::new(FakeLastFm::new(1, 1).failing(1, 2));
    let config = FetchConfig {
        retry: lastfm_heatmap::RetryConfig::default(),
        ..quick_config()
    };
    let aggregator = PageAggregator::new(fake.clone(), "key", config);

    let start = tokio::time::Instant::now();
    let result = aggregator.fetch_all("someone").await.unwrap();

    assert_eq!(result.scrobbles.len(), 1);
    assert_eq!(fake.requests_for(1), 3);
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[test_log::test(tokio::test)]
async fn test_user_without_history() {
    let fake = Arc::new(FakeLastFm::new(0, 1));
    let aggregator = PageAggregator::new(fake.clone(), "key", quick_config());

    let result = aggregator.fetch_all("nobody").await.unwrap();

    assert!(result.is_empty());
    assert_eq!(fake.requested_pages(), vec![1]);
}
