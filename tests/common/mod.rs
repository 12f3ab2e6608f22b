//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teloxide::types::{ChatId, MessageId};

use cinevault::context::AppContext;
use cinevault::core::config::Config;
use cinevault::core::retry::RetryConfig;
use cinevault::core::worker_pool::WorkerPool;
use cinevault::download::error::PipelineError;
use cinevault::download::jobs::JobTable;
use cinevault::download::retriever::Retriever;
use cinevault::download::send::Relayer;
use cinevault::download::source::http::HttpSource;
use cinevault::download::source::ytdlp::YtDlpSource;
use cinevault::media::{MediaError, MediaProbe, MediaProcessor, MediaStrategy};
use cinevault::storage::MemoryCatalog;
use cinevault::telegram::archive::{ArchiveTransport, Upload};

pub const ADMIN_ID: i64 = 111;
pub const CHANNEL_ID: i64 = -100123;

/// Configuration rooted in `dir`, with tool binaries that do not exist.
pub fn test_config(dir: &Path) -> Config {
    let mut env = HashMap::new();
    env.insert("BOT_TOKEN", "123456:TEST".to_string());
    env.insert("BOT_USERNAME", "cinevault_bot".to_string());
    env.insert("PRIVATE_CHANNEL_ID", CHANNEL_ID.to_string());
    env.insert("ADMIN_IDS", ADMIN_ID.to_string());
    env.insert("TEMP_PATH", dir.join("temp").display().to_string());
    env.insert("DOWNLOADS_PATH", dir.join("downloads").display().to_string());
    env.insert("YTDL_BIN", "/nonexistent/yt-dlp".to_string());
    env.insert("FFMPEG_BIN", "/nonexistent/ffmpeg".to_string());
    env.insert("FFPROBE_BIN", "/nonexistent/ffprobe".to_string());
    Config::from_lookup(|key| env.get(key).cloned()).unwrap()
}

/// Three attempts with millisecond backoff.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .max_attempts(3)
        .base_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(50))
}

pub fn fast_retriever(ytdl_bin: &str, max_file_size: u64) -> Retriever {
    let ytdlp = Arc::new(YtDlpSource::new(ytdl_bin, Duration::from_secs(30)));
    let http = Arc::new(HttpSource::new(fast_retry()));
    Retriever::with_sources(ytdlp, http, max_file_size, JobTable::new())
}

/// Strategy that always yields a 1280x720 frame and a two-minute probe.
pub struct FakeFrames;

#[async_trait]
impl MediaStrategy for FakeFrames {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn extract_frame(&self, _video: &Path, _offset_secs: u32, output: &Path) -> Result<(), MediaError> {
        RgbImage::from_pixel(1280, 720, Rgb([200, 40, 40])).save_with_format(output, image::ImageFormat::Png)?;
        Ok(())
    }

    async fn probe(&self, _video: &Path) -> Result<MediaProbe, MediaError> {
        Ok(MediaProbe {
            duration_secs: 120,
            width: 1280,
            height: 720,
        })
    }
}

/// [`FakeFrames`] that counts probe calls.
pub struct CountingProbes(pub Arc<AtomicUsize>);

#[async_trait]
impl MediaStrategy for CountingProbes {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn extract_frame(&self, video: &Path, offset_secs: u32, output: &Path) -> Result<(), MediaError> {
        FakeFrames.extract_frame(video, offset_secs, output).await
    }

    async fn probe(&self, video: &Path) -> Result<MediaProbe, MediaError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        FakeFrames.probe(video).await
    }
}

pub fn media(dir: &Path, strategies: Vec<Box<dyn MediaStrategy>>) -> Arc<MediaProcessor> {
    Arc::new(MediaProcessor::with_strategies(strategies, WorkerPool::new(1), dir.join("thumbs")))
}

/// What the transport saw for one upload attempt.
#[derive(Debug, Clone)]
pub struct SentUpload {
    pub kind: &'static str,
    pub path: PathBuf,
    pub caption: String,
    pub thumbnail: Option<PathBuf>,
    pub thumbnail_existed: bool,
    pub duration_secs: u32,
    pub width: u32,
    pub height: u32,
}

/// In-memory archive channel. Scripted failures are consumed first.
#[derive(Default)]
pub struct MockTransport {
    failures: Mutex<VecDeque<PipelineError>>,
    pub uploads: Mutex<Vec<SentUpload>>,
    pub copies: Mutex<Vec<(ChatId, MessageId)>>,
    next_id: AtomicI32,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI32::new(100),
            ..Default::default()
        })
    }

    pub fn failing_with(errors: Vec<PipelineError>) -> Arc<Self> {
        let transport = Self::new();
        transport.failures.lock().unwrap().extend(errors);
        transport
    }

    pub fn uploads(&self) -> Vec<SentUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn copies(&self) -> Vec<(ChatId, MessageId)> {
        self.copies.lock().unwrap().clone()
    }

    fn record(&self, kind: &'static str, upload: &Upload) -> Result<MessageId, PipelineError> {
        self.uploads.lock().unwrap().push(SentUpload {
            kind,
            path: upload.path.clone(),
            caption: upload.caption.clone(),
            thumbnail: upload.thumbnail.clone(),
            thumbnail_existed: upload.thumbnail.as_ref().is_some_and(|p| p.exists()),
            duration_secs: upload.duration_secs,
            width: upload.width,
            height: upload.height,
        });
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl ArchiveTransport for MockTransport {
    async fn send_video(&self, upload: &Upload) -> Result<MessageId, PipelineError> {
        self.record("video", upload)
    }

    async fn send_document(&self, upload: &Upload) -> Result<MessageId, PipelineError> {
        self.record("document", upload)
    }

    async fn copy_to(&self, chat: ChatId, message_id: MessageId) -> Result<MessageId, PipelineError> {
        self.copies.lock().unwrap().push((chat, message_id));
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Context over a mock transport, an in-memory catalog and the fake frame strategy.
pub fn test_context(dir: &Path, transport: Arc<MockTransport>) -> (AppContext, Arc<MemoryCatalog>) {
    let config = test_config(dir);
    let media = media(dir, vec![Box::new(FakeFrames)]);
    let relayer = Arc::new(Relayer::with_retry(
        transport,
        media.clone(),
        config.max_file_size,
        fast_retry(),
    ));
    let retriever = Arc::new(fast_retriever(&config.ytdl_bin, config.max_file_size));
    let catalog = Arc::new(MemoryCatalog::new());
    let ctx = AppContext::from_parts(Arc::new(config), retriever, media, relayer, catalog.clone());
    (ctx, catalog)
}

/// Lists regular files in `dir`, empty if it does not exist.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.flatten().map(|e| e.path()).filter(|p| p.is_file()).collect())
        .unwrap_or_default()
}
