//! HttpSource: direct video file downloads over HTTP(S).
//!
//! Handles URLs whose path ends in a video extension
//! (e.g., `https://cdn.example.com/film.mp4`).
//! - Declared `Content-Length` over the limit fails before anything is written
//! - Body is streamed to disk chunk by chunk; the limit is enforced on the
//!   measured size too
//! - Transient failures are retried with linear backoff
//! - Cancellation is checked between chunks and between attempts

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use url::Url;

use crate::core::config;
use crate::core::disk::safe_delete_file;
use crate::core::retry::{RetryConfig, retry};
use crate::core::utils::{clean_filename, generate_code};
use crate::download::error::PipelineError;
use crate::download::jobs::JobGuard;
use crate::download::progress::{Progress, ProgressThrottle};
use crate::download::source::{DownloadRequest, DownloadSource, has_video_extension};

/// Download source for direct HTTP file downloads.
pub struct HttpSource {
    client: Client,
    retry: RetryConfig,
}

impl HttpSource {
    pub fn new(retry: RetryConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("Mozilla/5.0 (compatible; cinevault/", env!("CARGO_PKG_VERSION"), ")"))
            .connect_timeout(config::download::connect_timeout())
            .build()
            .unwrap_or_else(|e| {
                log::warn!("HTTP client build failed ({}), using defaults", e);
                Client::new()
            });

        Self { client, retry }
    }

    /// File name for a URL: last path segment, URL-decoded and sanitized.
    ///
    /// URLs without a usable segment get `video_<code>.mp4`.
    pub fn filename_for(url: &Url) -> String {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
            .map(|name| clean_filename(&name))
            .filter(|name| name != "unnamed_file")
            .unwrap_or_else(|| format!("video_{}.mp4", generate_code(6)))
    }

    async fn attempt(&self, request: &DownloadRequest<'_>, path: &Path, attempt: u32) -> Result<u64, PipelineError> {
        if request.job.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if attempt > 1 {
            log::info!("📥 Retrying {} (attempt {})", request.url, attempt);
        }

        let response = self.client.get(request.url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, request.url));
        }

        let declared = response.content_length();
        check_declared_size(declared, request.max_file_size)?;

        let mut throttle = ProgressThrottle::new(request.progress.clone(), 5);
        let stream = response.bytes_stream();

        let result = stream_to_file(stream, path, declared, request.max_file_size, request.job, &mut throttle).await;
        if result.is_err() {
            safe_delete_file(path).await;
        }
        result
    }
}

#[async_trait]
impl DownloadSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn supports_url(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && has_video_extension(url)
    }

    async fn download(&self, request: &DownloadRequest<'_>) -> Result<PathBuf, PipelineError> {
        log::info!("📥 HTTP direct download: {}", request.url);

        let path = request.dest_dir.join(Self::filename_for(request.url));
        let outcome = retry(&self.retry, |attempt| self.attempt(request, &path, attempt)).await;
        let attempts = outcome.attempts;

        match outcome.into_result() {
            Ok(size) => {
                log::info!(
                    "✅ HTTP download complete: {} ({:.2} MB)",
                    path.display(),
                    size as f64 / (1024.0 * 1024.0)
                );
                Ok(path)
            }
            Err(e) => {
                log::warn!("HTTP download of {} failed after {} attempt(s): {}", request.url, attempts, e);
                // Exhausted retries surface as a network failure
                Err(match e {
                    PipelineError::Timeout(msg) => PipelineError::Network(format!("timed out: {}", msg)),
                    PipelineError::RetryAfter(d) => PipelineError::Network(format!("server asked to wait {:?}", d)),
                    other => other,
                })
            }
        }
    }
}

fn status_error(status: StatusCode, url: &Url) -> PipelineError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => PipelineError::NotFound(format!("HTTP {} for {}", status, url)),
        _ => PipelineError::Network(format!("HTTP {} for {}", status, url)),
    }
}

/// Rejects a response whose declared length is over `max`.
pub fn check_declared_size(declared: Option<u64>, max: u64) -> Result<(), PipelineError> {
    match declared {
        Some(size) if size > max => Err(PipelineError::Oversize { size, max }),
        _ => Ok(()),
    }
}

/// Writes a byte stream to `path`, enforcing `max` on the measured size.
///
/// The caller deletes the file on error.
pub async fn stream_to_file<S, E>(
    stream: S,
    path: &Path,
    total: Option<u64>,
    max: u64,
    job: &JobGuard,
    throttle: &mut ProgressThrottle,
) -> Result<u64, PipelineError>
where
    S: Stream<Item = Result<Bytes, E>>,
    PipelineError: From<E>,
{
    let mut stream = std::pin::pin!(stream);
    let file = fs_err::tokio::File::create(path).await?;
    let mut writer = BufWriter::with_capacity(config::download::CHUNK_SIZE, file);
    let mut downloaded: u64 = 0;

    throttle.report(Progress::Bytes { done: 0, total });

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        downloaded += chunk.len() as u64;
        if downloaded > max {
            return Err(PipelineError::Oversize { size: downloaded, max });
        }

        writer.write_all(&chunk).await?;

        if job.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let progress = Progress::Bytes { done: downloaded, total };
        if let Some(percent) = progress.percent() {
            job.set_progress(percent);
        }
        throttle.report(progress);
    }

    writer.flush().await?;
    Ok(downloaded)
}
