mod common;

use common::{quick_config, FakeLastFm};
use lastfm_heatmap::jobs::status_key;
use lastfm_heatmap::{
    heatmap_key, DirectoryStore, HeatmapPipeline, HeatmapRenderer, JobQueue, JobRequest,
    JobStatus, PageAggregator, Palette, ResultStore,
};
use std::sync::Arc;
use std::time::Duration;

#[test_log::test(tokio::test)]
async fn test_job_result_lands_in_directory_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryStore::new(dir.path()));

    let pipeline = HeatmapPipeline::new(
        PageAggregator::new(Arc::new(FakeLastFm::new(3, 5)), "key", quick_config()),
        HeatmapRenderer::default(),
    );
    let queue = JobQueue::new(Arc::new(pipeline), Arc::clone(&store));

    let id = queue
        .submit(JobRequest::new("someone", "viridis".parse::<Palette>().unwrap()))
        .await
        .unwrap();

    let mut status = queue.poll(&id).await.unwrap();
    for _ in 0..500 {
        if status.is_done() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        status = queue.poll(&id).await.unwrap();
    }

    assert_eq!(
        status,
        JobStatus::Finished {
            result_key: heatmap_key("someone")
        }
    );

    // The status record is plain JSON in the store
    let raw = store.get(&status_key(&id)).await.unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(json["state"], "finished");

    let png = queue.result(&id).await.unwrap().unwrap();
    assert!(png.starts_with(b"\x89PNG"));

    // A second queue over the same directory sees the same job
    let other = JobQueue::new(
        Arc::new(HeatmapPipeline::new(
            PageAggregator::new(Arc::new(FakeLastFm::new(0, 0)), "key", quick_config()),
            HeatmapRenderer::default(),
        )),
        Arc::new(DirectoryStore::new(dir.path())),
    );
    assert_eq!(other.poll(&id).await.unwrap(), status);
    assert_eq!(other.result(&id).await.unwrap(), Some(png));
}
