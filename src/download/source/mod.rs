//! Retrieval backends.
//!
//! Provides the `DownloadSource` trait for pluggable backends and a
//! `SourceRegistry` that routes a URL to the first backend claiming it.
//!
//! Built-in backends, in routing order:
//! - `YtDlpSource`: known video platforms and any URL that is not a direct
//!   video file link
//! - `HttpSource`: direct video file URLs, streamed with retries

pub mod http;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::core::config;
use crate::download::error::PipelineError;
use crate::download::jobs::JobGuard;
use crate::download::progress::ProgressCallback;
use crate::download::quality::QualityTier;

/// Parameters of one retrieval.
pub struct DownloadRequest<'a> {
    pub url: &'a Url,
    /// Directory the file is written into
    pub dest_dir: &'a Path,
    pub tier: QualityTier,
    pub max_file_size: u64,
    /// Job entry for cancellation checks and progress bookkeeping
    pub job: &'a JobGuard,
    pub progress: Option<ProgressCallback>,
}

/// A retrieval backend.
#[async_trait]
pub trait DownloadSource: Send + Sync {
    /// Human-readable name of this source (e.g., "yt-dlp", "http")
    fn name(&self) -> &str;

    /// Whether this source can handle the given URL.
    fn supports_url(&self, url: &Url) -> bool;

    /// Fetches the URL into `request.dest_dir` and returns the written file.
    async fn download(&self, request: &DownloadRequest<'_>) -> Result<PathBuf, PipelineError>;
}

/// True if the URL path ends in one of the recognized video extensions.
pub fn has_video_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    config::download::VIDEO_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext)))
}

/// Routes URLs to the appropriate download source.
///
/// Sources are tried in order; the first one that claims the URL wins.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn DownloadSource>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    /// Register a download source. Sources are tried in insertion order.
    pub fn register(&mut self, source: Arc<dyn DownloadSource>) {
        self.sources.push(source);
    }

    /// Find the first source that supports the given URL.
    pub fn resolve(&self, url: &Url) -> Option<Arc<dyn DownloadSource>> {
        self.sources.iter().find(|s| s.supports_url(url)).cloned()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
