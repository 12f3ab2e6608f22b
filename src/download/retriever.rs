//! Retrieval engine: fetches a remote video into local storage.
//!
//! At most [`config::download::MAX_CONCURRENT_RETRIEVALS`] retrievals are in
//! the downloading phase at once; extra callers wait for a slot. Each call is
//! registered in the job table for its whole lifetime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use url::Url;

use crate::core::config::{self, Config};
use crate::core::disk;
use crate::core::retry::RetryConfig;
use crate::core::utils::clean_filename;
use crate::download::error::PipelineError;
use crate::download::jobs::{JobId, JobStatus, JobTable, RetrievalJob};
use crate::download::progress::ProgressCallback;
use crate::download::quality::{FormatInfo, QualityTier, formats_by_tier};
use crate::download::source::http::HttpSource;
use crate::download::source::ytdlp::YtDlpSource;
use crate::download::source::{DownloadRequest, SourceRegistry};

/// Metadata of a remote video, without downloading it.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub title: String,
    pub duration_secs: u32,
    pub uploader: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Best format per tier the source offers
    pub formats: BTreeMap<QualityTier, FormatInfo>,
}

/// Checks that `raw` is an absolute http(s) URL with a host.
pub fn validate_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw.trim()).map_err(|e| PipelineError::InvalidInput(format!("malformed URL {:?}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::InvalidInput(format!(
            "unsupported scheme {:?} in {}",
            url.scheme(),
            raw
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(PipelineError::InvalidInput(format!("URL has no host: {}", raw)));
    }
    Ok(url)
}

pub struct Retriever {
    registry: SourceRegistry,
    ytdlp: Arc<YtDlpSource>,
    permits: Arc<Semaphore>,
    jobs: JobTable,
    max_file_size: u64,
}

impl Retriever {
    /// Builds a retriever with the yt-dlp and direct-stream backends.
    pub fn new(config: &Config, jobs: JobTable) -> Self {
        let ytdlp = Arc::new(YtDlpSource::new(config.ytdl_bin.clone(), config.download_timeout));
        let http = Arc::new(HttpSource::new(RetryConfig::retrieval()));
        Self::with_sources(ytdlp, http, config.max_file_size, jobs)
    }

    /// Builds a retriever from explicit backends.
    pub fn with_sources(ytdlp: Arc<YtDlpSource>, http: Arc<HttpSource>, max_file_size: u64, jobs: JobTable) -> Self {
        let mut registry = SourceRegistry::new();
        registry.register(ytdlp.clone());
        registry.register(http);

        Self {
            registry,
            ytdlp,
            permits: Arc::new(Semaphore::new(config::download::MAX_CONCURRENT_RETRIEVALS)),
            jobs,
            max_file_size,
        }
    }

    /// Downloads `url` into `dest_dir` at the requested quality.
    ///
    /// Returns the path of the written file, with a sanitized file name.
    pub async fn retrieve(
        &self,
        url: &str,
        dest_dir: &Path,
        tier: QualityTier,
        on_progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, PipelineError> {
        let url = validate_url(url)?;
        let job = self.jobs.register(url.as_str(), tier);

        fs_err::tokio::create_dir_all(dest_dir).await?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::Cancelled)?;
        if job.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        job.set_status(JobStatus::Downloading);

        let source = self
            .registry
            .resolve(&url)
            .ok_or_else(|| PipelineError::InvalidInput(format!("no backend accepts {}", url)))?;
        log::info!("⬇️  Job {} via {}: {} ({})", job.id(), source.name(), url, tier);

        let request = DownloadRequest {
            url: &url,
            dest_dir,
            tier,
            max_file_size: self.max_file_size,
            job: &job,
            progress: on_progress,
        };

        let result = match source.download(&request).await {
            Ok(path) => normalize_filename(&path).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(path) => {
                job.set_progress(100);
                job.set_status(JobStatus::Completed);
                log::info!("✅ Job {} done: {}", job.id(), path.display());
            }
            Err(e) => {
                job.set_status(match e {
                    PipelineError::Cancelled => JobStatus::Cancelled,
                    PipelineError::Io(_) => JobStatus::Error,
                    _ => JobStatus::Failed,
                });
                log::warn!("❌ Job {} failed [{}]: {}", job.id(), e.subcategory(), e);
            }
        }
        result
    }

    /// Title, duration, uploader, thumbnail and per-tier formats of `url`.
    pub async fn video_info(&self, url: &str) -> Result<VideoInfo, PipelineError> {
        let url = validate_url(url)?;
        let info = self.ytdlp.fetch_info(&url).await?;

        Ok(VideoInfo {
            title: info.title.clone().unwrap_or_else(|| "Unknown".to_string()),
            duration_secs: info.duration.map(|d| d.max(0.0).round() as u32).unwrap_or(0),
            uploader: info.uploader.clone(),
            thumbnail_url: info.thumbnail.clone(),
            formats: formats_by_tier(&info.formats),
        })
    }

    /// Removes `.part`/`.tmp`/`.ytdl` leftovers from `dir`.
    pub async fn cleanup_partial_files(&self, dir: &Path) -> usize {
        disk::cleanup_partial_files(dir).await
    }

    /// Requests cancellation of a running job.
    pub fn cancel(&self, id: JobId) -> bool {
        self.jobs.cancel(id)
    }

    pub fn active_jobs(&self) -> Vec<RetrievalJob> {
        self.jobs.snapshot()
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

/// Renames `path` in place if its file name is not already clean.
async fn normalize_filename(path: &Path) -> Result<PathBuf, PipelineError> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(path.to_path_buf());
    };
    let clean = clean_filename(name);
    if clean == name {
        return Ok(path.to_path_buf());
    }

    let target = path.with_file_name(&clean);
    fs_err::tokio::rename(path, &target).await?;
    log::debug!("Renamed {} → {}", name, clean);
    Ok(target)
}
