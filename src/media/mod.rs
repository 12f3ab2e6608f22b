//! Media post-processing: thumbnails, duration and dimensions.
//!
//! Each question is answered by the first strategy in an ordered list that
//! succeeds. Thumbnails fail only when every strategy fails; metadata never
//! fails and degrades to zeros.

pub mod decoder;
pub mod ffmpeg;
pub mod probe;
pub mod thumbnail;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::core::config::Config;
use crate::core::disk::safe_delete_file;
use crate::core::utils::{is_video_file, mime_type};
use crate::core::worker_pool::{WorkerError, WorkerPool};
use crate::download::error::PipelineError;

pub use decoder::DecoderStrategy;
pub use ffmpeg::FfmpegStrategy;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("external tool failed: {0}")]
    Tool(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Duration and frame size of a video. Zero means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaProbe {
    pub duration_secs: u32,
    pub width: u32,
    pub height: u32,
}

/// A local file ready for upload, with what we know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub size: u64,
    pub duration_secs: u32,
    pub width: u32,
    pub height: u32,
    pub mime: mime::Mime,
    pub is_video: bool,
}

/// One way of looking inside a video file.
#[async_trait]
pub trait MediaStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Writes one frame taken at `offset_secs` to `output`.
    async fn extract_frame(&self, video: &Path, offset_secs: u32, output: &Path) -> Result<(), MediaError>;

    async fn probe(&self, video: &Path) -> Result<MediaProbe, MediaError>;
}

pub struct MediaProcessor {
    strategies: Vec<Box<dyn MediaStrategy>>,
    pool: WorkerPool,
    thumb_dir: PathBuf,
}

impl MediaProcessor {
    /// ffmpeg first, in-process decoder second.
    pub fn new(config: &Config, pool: WorkerPool) -> Self {
        let strategies: Vec<Box<dyn MediaStrategy>> = vec![
            Box::new(FfmpegStrategy::new(config.ffmpeg_bin.clone(), config.ffprobe_bin.clone())),
            Box::new(DecoderStrategy::new(pool.clone())),
        ];
        Self::with_strategies(strategies, pool, config.temp_path.clone())
    }

    pub fn with_strategies(strategies: Vec<Box<dyn MediaStrategy>>, pool: WorkerPool, thumb_dir: PathBuf) -> Self {
        Self {
            strategies,
            pool,
            thumb_dir,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Produces a normalized JPEG thumbnail from the frame at `offset_secs`.
    ///
    /// Returns `None` when no strategy could produce one. The caller owns the
    /// returned file and deletes it.
    pub async fn make_thumbnail(&self, video: &Path, offset_secs: u32) -> Option<PathBuf> {
        let duration = self.duration(video).await;
        self.thumbnail_within(video, offset_secs, duration).await
    }

    /// [`make_thumbnail`](Self::make_thumbnail) for an inspected asset, without probing again.
    pub async fn thumbnail_for(&self, asset: &MediaAsset, offset_secs: u32) -> Option<PathBuf> {
        self.thumbnail_within(&asset.path, offset_secs, asset.duration_secs).await
    }

    async fn thumbnail_within(&self, video: &Path, offset_secs: u32, duration: u32) -> Option<PathBuf> {
        if let Err(e) = fs_err::tokio::create_dir_all(&self.thumb_dir).await {
            log::warn!("Cannot create thumbnail dir: {}", e);
            return None;
        }
        let output = thumbnail::thumbnail_path_for(video, &self.thumb_dir);

        // Short clips have no frame at the default offset
        let offset_secs = if duration > 0 && offset_secs >= duration {
            duration / 2
        } else {
            offset_secs
        };

        for strategy in &self.strategies {
            match self.thumbnail_with(strategy.as_ref(), video, offset_secs, &output).await {
                Ok((w, h)) => {
                    log::info!("🖼️ Thumbnail via {} ({}x{}): {}", strategy.name(), w, h, output.display());
                    return Some(output);
                }
                Err(e) => {
                    log::warn!("Thumbnail via {} failed for {}: {}", strategy.name(), video.display(), e);
                    safe_delete_file(&output).await;
                }
            }
        }

        log::warn!("No thumbnail for {}", video.display());
        None
    }

    async fn thumbnail_with(
        &self,
        strategy: &dyn MediaStrategy,
        video: &Path,
        offset_secs: u32,
        output: &Path,
    ) -> Result<(u32, u32), MediaError> {
        strategy.extract_frame(video, offset_secs, output).await?;
        let path = output.to_path_buf();
        self.pool.run(move || thumbnail::normalize(&path)).await?
    }

    /// Duration in whole seconds, 0 if no strategy knows.
    pub async fn duration(&self, video: &Path) -> u32 {
        self.first_probe(video, |p| p.duration_secs > 0)
            .await
            .map(|p| p.duration_secs)
            .unwrap_or(0)
    }

    /// Frame width and height, `(0, 0)` if no strategy knows.
    pub async fn dimensions(&self, video: &Path) -> (u32, u32) {
        self.first_probe(video, |p| p.width > 0 && p.height > 0)
            .await
            .map(|p| (p.width, p.height))
            .unwrap_or((0, 0))
    }

    async fn first_probe(&self, video: &Path, accept: impl Fn(&MediaProbe) -> bool) -> Option<MediaProbe> {
        for strategy in &self.strategies {
            match strategy.probe(video).await {
                Ok(probe) if accept(&probe) => return Some(probe),
                Ok(_) => log::debug!("{} knows nothing useful about {}", strategy.name(), video.display()),
                Err(e) => log::debug!("Probe via {} failed for {}: {}", strategy.name(), video.display(), e),
            }
        }
        None
    }

    /// Asks each strategy once, keeping the first non-zero duration and
    /// dimensions; stops as soon as both are known.
    async fn merged_probe(&self, video: &Path) -> MediaProbe {
        let mut merged = MediaProbe::default();
        for strategy in &self.strategies {
            match strategy.probe(video).await {
                Ok(probe) => {
                    if merged.duration_secs == 0 {
                        merged.duration_secs = probe.duration_secs;
                    }
                    if merged.width == 0 || merged.height == 0 {
                        (merged.width, merged.height) = (probe.width, probe.height);
                    }
                }
                Err(e) => log::debug!("Probe via {} failed for {}: {}", strategy.name(), video.display(), e),
            }
            if merged.duration_secs > 0 && merged.width > 0 && merged.height > 0 {
                break;
            }
        }
        merged
    }

    /// Size, type and, for videos, duration and dimensions of `path`.
    ///
    /// Probes at most once per strategy.
    pub async fn inspect(&self, path: &Path) -> Result<MediaAsset, PipelineError> {
        let metadata = fs_err::tokio::metadata(path)
            .await
            .map_err(|_| PipelineError::NotFound(path.display().to_string()))?;

        let is_video = is_video_file(path);
        let probe = if is_video {
            self.merged_probe(path).await
        } else {
            MediaProbe::default()
        };
        let MediaProbe {
            duration_secs,
            width,
            height,
        } = probe;

        Ok(MediaAsset {
            path: path.to_path_buf(),
            size: metadata.len(),
            duration_secs,
            width,
            height,
            mime: mime_type(path),
            is_video,
        })
    }
}
