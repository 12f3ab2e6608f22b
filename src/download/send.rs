//! Relay engine: pushes a local file to the archive channel.
//!
//! - Preconditions are checked before any network I/O
//! - Videos get a generated thumbnail, duration and dimensions
//! - Files over [`config::upload::DOCUMENT_THRESHOLD_BYTES`] go as documents
//! - Transient failures are retried with linear backoff; flood waits honor
//!   the server's delay
//! - The thumbnail is deleted on every exit path

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::MessageId;

use crate::core::config;
use crate::core::disk::safe_delete_file;
use crate::core::retry::{RetryConfig, retry};
use crate::core::utils::truncate_chars;
use crate::download::error::PipelineError;
use crate::download::progress::{Progress, ProgressCallback, ProgressThrottle};
use crate::media::{MediaAsset, MediaProcessor};
use crate::telegram::archive::{ArchiveTransport, Upload, UploadProgress};

const PROGRESS_TICK: Duration = Duration::from_secs(1);

pub struct Relayer {
    transport: Arc<dyn ArchiveTransport>,
    media: Arc<MediaProcessor>,
    max_file_size: u64,
    retry: RetryConfig,
}

impl Relayer {
    pub fn new(transport: Arc<dyn ArchiveTransport>, media: Arc<MediaProcessor>, max_file_size: u64) -> Self {
        Self::with_retry(transport, media, max_file_size, RetryConfig::upload())
    }

    pub fn with_retry(
        transport: Arc<dyn ArchiveTransport>,
        media: Arc<MediaProcessor>,
        max_file_size: u64,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            media,
            max_file_size,
            retry,
        }
    }

    pub fn transport(&self) -> &Arc<dyn ArchiveTransport> {
        &self.transport
    }

    /// Uploads `path` to the archive channel and returns the message id.
    pub async fn relay(
        &self,
        path: &Path,
        caption: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<MessageId, PipelineError> {
        check_preconditions(path, self.max_file_size).await?;
        let asset = self.media.inspect(path).await?;
        self.relay_asset(&asset, caption, on_progress).await
    }

    /// [`relay`](Self::relay) for a file the caller already inspected.
    pub async fn relay_asset(
        &self,
        asset: &MediaAsset,
        caption: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<MessageId, PipelineError> {
        let path = asset.path.as_path();
        let size = check_preconditions(path, self.max_file_size).await?;

        let thumbnail = if asset.is_video {
            self.media
                .thumbnail_for(asset, config::media::THUMBNAIL_OFFSET_SECS)
                .await
        } else {
            None
        };

        let as_document = !asset.is_video || size > config::upload::DOCUMENT_THRESHOLD_BYTES;
        let upload = Upload {
            path: path.to_path_buf(),
            caption: truncate_chars(caption, config::upload::MAX_CAPTION_CHARS),
            thumbnail: thumbnail.clone(),
            duration_secs: asset.duration_secs,
            width: asset.width,
            height: asset.height,
            progress: UploadProgress::new(),
        };

        log::info!(
            "📤 Relaying {} ({:.2} MB) as {}",
            path.display(),
            size as f64 / (1024.0 * 1024.0),
            if as_document { "document" } else { "video" }
        );

        let ticker = on_progress.map(|cb| spawn_progress_ticker(cb, upload.progress.clone(), size));
        let outcome = retry(&self.retry, |attempt| {
            let upload = &upload;
            async move {
                if attempt > 1 {
                    log::info!("📤 Retrying upload of {} (attempt {})", upload.path.display(), attempt);
                    upload.progress.reset();
                }
                if as_document {
                    self.transport.send_document(upload).await
                } else {
                    self.transport.send_video(upload).await
                }
            }
        })
        .await;
        if let Some(ticker) = ticker {
            ticker.abort();
        }

        if let Some(thumb) = &thumbnail {
            safe_delete_file(thumb).await;
        }

        let attempts = outcome.attempts;
        match outcome.into_result() {
            Ok(message_id) => {
                log::info!("✅ Relayed {} as message {} ({} attempt(s))", path.display(), message_id.0, attempts);
                Ok(message_id)
            }
            Err(e) => {
                log::error!("❌ Relay of {} failed after {} attempt(s): {}", path.display(), attempts, e);
                Err(e)
            }
        }
    }
}

/// Checks that `path` is a non-empty file within `max` bytes; returns its size.
pub async fn check_preconditions(path: &Path, max: u64) -> Result<u64, PipelineError> {
    let metadata = fs_err::tokio::metadata(path)
        .await
        .map_err(|_| PipelineError::NotFound(path.display().to_string()))?;
    if !metadata.is_file() {
        return Err(PipelineError::NotFound(format!("{} is not a file", path.display())));
    }

    let size = metadata.len();
    if size == 0 {
        return Err(PipelineError::InvalidInput(format!("{} is empty", path.display())));
    }
    if size > max {
        return Err(PipelineError::Oversize { size, max });
    }
    Ok(size)
}

fn spawn_progress_ticker(cb: ProgressCallback, progress: UploadProgress, total: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut throttle = ProgressThrottle::new(Some(cb), 5);
        let mut interval = tokio::time::interval(PROGRESS_TICK);
        loop {
            interval.tick().await;
            throttle.report(Progress::Bytes {
                done: progress.bytes_sent().min(total),
                total: Some(total),
            });
        }
    })
}
