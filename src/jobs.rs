//! Background heatmap jobs.
//!
//! Callers submit a job and poll for it later. Job status and the finished
//! PNG both live in a [`ResultStore`], keyed by job id and by username
//! respectively; the queue itself keeps no per-job state.

use crate::api::LastFmApiClient;
use crate::palette::Palette;
use crate::pipeline::HeatmapPipeline;
use crate::{HeatmapError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Store key for a user's rendered heatmap.
pub fn heatmap_key(username: &str) -> String {
    format!("{username}_heatmap")
}

/// Store key for a job's status record.
pub fn status_key(id: &JobId) -> String {
    format!("job:{id}")
}

/// Key-value storage with atomic per-key get and set.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// In-memory storage implementation, mostly for tests
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// File-based storage: one file per key under a root directory.
///
/// Writes go to a temporary file that is renamed into place, so readers
/// never observe a partially written value.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Store under the user cache directory, e.g. `~/.cache/lastfm-heatmap`.
    pub fn default_location() -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| HeatmapError::Store("Cannot determine cache directory".to_string()))?;
        Ok(Self::new(cache_dir.join("lastfm-heatmap")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(urlencoding::encode(key).as_ref())
    }
}

#[async_trait]
impl ResultStore for DirectoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HeatmapError::Store(format!("Failed to read '{key}': {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            HeatmapError::Store(format!("Failed to create {}: {e}", self.root.display()))
        })?;

        let path = self.path_for(key);
        let tmp_path = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        let written = match tokio::fs::write(&tmp_path, value).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path)
                .await
                .map_err(|e| HeatmapError::Store(format!("Failed to store '{key}': {e}"))),
            Err(e) => Err(HeatmapError::Store(format!("Failed to write '{key}': {e}"))),
        };
        if written.is_err() {
            // Leave no partial file behind
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
        written
    }
}

/// Identifier handed out by [`JobQueue::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of a heatmap job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub username: String,
    pub palette: Palette,
}

impl JobRequest {
    pub fn new(username: impl Into<String>, palette: Palette) -> Self {
        Self {
            username: username.into(),
            palette,
        }
    }
}

/// Where a job currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Finished { result_key: String },
    Failed { message: String },
    /// No job with this id was ever submitted
    Unknown,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, JobStatus::Finished { .. } | JobStatus::Failed { .. })
    }
}

/// Runs heatmap pipelines in the background and tracks them in a store.
pub struct JobQueue<C: ?Sized, S: ?Sized> {
    pipeline: Arc<HeatmapPipeline<C>>,
    store: Arc<S>,
}

impl<C: ?Sized, S: ?Sized> Clone for JobQueue<C, S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            store: Arc::clone(&self.store),
        }
    }
}

impl<C, S> JobQueue<C, S>
where
    C: LastFmApiClient + ?Sized + 'static,
    S: ResultStore + ?Sized + 'static,
{
    pub fn new(pipeline: Arc<HeatmapPipeline<C>>, store: Arc<S>) -> Self {
        Self { pipeline, store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Record a new job and start it in the background.
    ///
    /// Returns as soon as the job is queued; use [`poll`](Self::poll) to
    /// follow it.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId> {
        let id = JobId::generate();
        write_status(self.store.as_ref(), &id, &JobStatus::Queued).await?;
        log::info!("Queued heatmap job {} for '{}'", id, request.username);

        let pipeline = Arc::clone(&self.pipeline);
        let store = Arc::clone(&self.store);
        let job_id = id.clone();
        tokio::spawn(async move {
            let status = run_job(pipeline.as_ref(), store.as_ref(), &job_id, &request).await;
            if let Err(e) = write_status(store.as_ref(), &job_id, &status).await {
                log::error!("Failed to record status of job {job_id}: {e}");
            }
        });

        Ok(id)
    }

    /// Current status of a job.
    pub async fn poll(&self, id: &JobId) -> Result<JobStatus> {
        match self.store.get(&status_key(id)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(JobStatus::Unknown),
        }
    }

    /// PNG bytes of a finished job, `None` while it is not finished.
    pub async fn result(&self, id: &JobId) -> Result<Option<Vec<u8>>> {
        match self.poll(id).await? {
            JobStatus::Finished { result_key } => self.store.get(&result_key).await,
            _ => Ok(None),
        }
    }
}

async fn write_status<S: ResultStore + ?Sized>(
    store: &S,
    id: &JobId,
    status: &JobStatus,
) -> Result<()> {
    let bytes = serde_json::to_vec(status)?;
    store.set(&status_key(id), &bytes).await
}

async fn run_job<C, S>(
    pipeline: &HeatmapPipeline<C>,
    store: &S,
    id: &JobId,
    request: &JobRequest,
) -> JobStatus
where
    C: LastFmApiClient + ?Sized,
    S: ResultStore + ?Sized,
{
    if let Err(e) = write_status(store, id, &JobStatus::Running).await {
        log::warn!("Failed to mark job {id} as running: {e}");
    }

    let outcome = async {
        let image = pipeline.run(&request.username, request.palette).await?;
        let result_key = heatmap_key(&request.username);
        store.set(&result_key, &image.png).await?;
        Ok::<_, HeatmapError>(result_key)
    }
    .await;

    match outcome {
        Ok(result_key) => {
            log::info!("Job {id} finished, heatmap stored under '{result_key}'");
            JobStatus::Finished { result_key }
        }
        Err(e) => {
            log::warn!("Job {id} for '{}' failed: {e}", request.username);
            JobStatus::Failed {
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::PageAggregator;
    use crate::api::MockLastFmApiClient;
    use crate::config::FetchConfig;
    use crate::render::HeatmapRenderer;
    use crate::retry::RetryConfig;
    use crate::scrobble::{Scrobble, ScrobblePage};
    use std::time::Duration;

    fn pipeline_with(
        mock: MockLastFmApiClient,
        api_key: &str,
    ) -> Arc<HeatmapPipeline<MockLastFmApiClient>> {
        let config = FetchConfig {
            retry: RetryConfig::immediate(1),
            ..FetchConfig::default()
        };
        Arc::new(HeatmapPipeline::new(
            PageAggregator::new(Arc::new(mock), api_key, config),
            HeatmapRenderer::default(),
        ))
    }

    async fn wait_until_done<C, S>(queue: &JobQueue<C, S>, id: &JobId) -> JobStatus
    where
        C: LastFmApiClient + ?Sized + 'static,
        S: ResultStore + ?Sized + 'static,
    {
        for _ in 0..500 {
            let status = queue.poll(id).await.unwrap();
            if status.is_done() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn test_submit_then_poll_until_finished() {
        let mut mock = MockLastFmApiClient::new();
        mock.expect_get_recent_tracks_page().returning(|_, page| {
            Ok(ScrobblePage {
                scrobbles: vec![Scrobble {
                    name: "Track".to_string(),
                    artist: "Artist".to_string(),
                    album: None,
                    date_text: Some("03 Mar 2024, 10:00".to_string()),
                    uts: None,
                    page,
                }],
                page_number: page,
                total_pages: Some(1),
            })
        });

        let store = Arc::new(MemoryStore::new());
        let queue = JobQueue::new(pipeline_with(mock, "key"), Arc::clone(&store));

        let id = queue
            .submit(JobRequest::new("someone", Palette::default()))
            .await
            .unwrap();
        assert_ne!(queue.poll(&id).await.unwrap(), JobStatus::Unknown);

        let status = wait_until_done(&queue, &id).await;
        assert_eq!(
            status,
            JobStatus::Finished {
                result_key: "someone_heatmap".to_string()
            }
        );

        let png = queue.result(&id).await.unwrap().unwrap();
        assert!(png.starts_with(b"\x89PNG"));
        assert_eq!(store.get("someone_heatmap").await.unwrap(), Some(png));
    }

    #[tokio::test]
    async fn test_failed_job_reports_message() {
        let mut mock = MockLastFmApiClient::new();
        mock.expect_get_recent_tracks_page().never();

        let queue = JobQueue::new(pipeline_with(mock, ""), Arc::new(MemoryStore::new()));
        let id = queue
            .submit(JobRequest::new("someone", Palette::default()))
            .await
            .unwrap();

        match wait_until_done(&queue, &id).await {
            JobStatus::Failed { message } => assert!(message.contains("API key")),
            other => panic!("Expected failure, got: {other:?}"),
        }
        assert_eq!(queue.result(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let queue = JobQueue::new(
            pipeline_with(MockLastFmApiClient::new(), "key"),
            Arc::new(MemoryStore::new()),
        );
        let id = JobId::from("does-not-exist".to_string());
        assert_eq!(queue.poll(&id).await.unwrap(), JobStatus::Unknown);
        assert_eq!(queue.result(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_directory_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("results"));

        assert_eq!(store.get("someone_heatmap").await.unwrap(), None);
        store.set("someone_heatmap", b"first").await.unwrap();
        store.set("someone_heatmap", b"second").await.unwrap();
        assert_eq!(
            store.get("someone_heatmap").await.unwrap(),
            Some(b"second".to_vec())
        );

        store.set("job:a/b", b"{}").await.unwrap();
        assert_eq!(store.get("job:a/b").await.unwrap(), Some(b"{}".to_vec()));
        assert!(dir.path().join("results").join("job%3Aa%2Fb").exists());
    }

    #[tokio::test]
    async fn test_failed_set_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        // A non-empty directory where the value should go makes the rename fail
        let occupied = dir.path().join("someone_heatmap");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("keep"), b"x").unwrap();

        let err = store.set("someone_heatmap", b"png").await.unwrap_err();
        assert!(matches!(err, HeatmapError::Store(_)));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "leftovers {leftovers:?}");
    }

    #[test]
    fn test_default_location_is_named_after_the_tool() {
        if let Ok(store) = DirectoryStore::default_location() {
            assert!(store.root().ends_with("lastfm-heatmap"));
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Finished {
            result_key: "x_heatmap".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"finished","result_key":"x_heatmap"}"#);
        assert_eq!(
            serde_json::from_str::<JobStatus>(r#"{"state":"queued"}"#).unwrap(),
            JobStatus::Queued
        );
    }
}
