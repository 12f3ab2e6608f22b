//! Upload transport to the private archive channel.
//!
//! [`ArchiveTransport`] is the seam the relay engine talks to; the
//! production implementation is [`TelegramArchive`] over a teloxide `Bot`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode};
use teloxide::RequestError;
use tokio::io::{AsyncRead, ReadBuf};

use crate::download::error::PipelineError;

/// Counts bytes handed to the HTTP client during an upload.
#[derive(Clone, Default)]
pub struct UploadProgress {
    bytes_sent: Arc<AtomicU64>,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Starts over, for a new attempt.
    pub fn reset(&self) {
        self.bytes_sent.store(0, Ordering::Relaxed);
    }
}

/// An `AsyncRead` wrapper that reports what it reads to an [`UploadProgress`].
pub struct ProgressReader<R> {
    inner: R,
    progress: UploadProgress,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, progress: UploadProgress) -> Self {
        Self { inner, progress }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let after = buf.filled().len();
            if after > before {
                self.progress.add_bytes(after - before);
            }
        }
        poll
    }
}

/// Opens `path` as an upload body that feeds `progress`.
pub async fn input_file_with_progress(path: &Path, progress: UploadProgress) -> Result<InputFile, RequestError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|err| RequestError::Io(Arc::new(err)))?;
    let mut input_file = InputFile::read(ProgressReader::new(file, progress));
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        input_file = input_file.file_name(name.to_string());
    }
    Ok(input_file)
}

/// Everything needed to push one file to the archive channel.
#[derive(Clone)]
pub struct Upload {
    pub path: PathBuf,
    pub caption: String,
    pub thumbnail: Option<PathBuf>,
    pub duration_secs: u32,
    pub width: u32,
    pub height: u32,
    pub progress: UploadProgress,
}

#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    /// Sends a playable video with metadata and optional thumbnail.
    async fn send_video(&self, upload: &Upload) -> Result<MessageId, PipelineError>;

    /// Sends the file as a generic document.
    async fn send_document(&self, upload: &Upload) -> Result<MessageId, PipelineError>;

    /// Copies an archived message to `chat`, returning the new message id.
    async fn copy_to(&self, chat: ChatId, message_id: MessageId) -> Result<MessageId, PipelineError>;
}

pub struct TelegramArchive {
    bot: Bot,
    channel: ChatId,
}

impl TelegramArchive {
    pub fn new(bot: Bot, channel_id: i64) -> Self {
        Self {
            bot,
            channel: ChatId(channel_id),
        }
    }

    pub fn channel(&self) -> ChatId {
        self.channel
    }
}

#[async_trait]
impl ArchiveTransport for TelegramArchive {
    async fn send_video(&self, upload: &Upload) -> Result<MessageId, PipelineError> {
        let input_file = input_file_with_progress(&upload.path, upload.progress.clone()).await?;
        let mut request = self
            .bot
            .send_video(self.channel, input_file)
            .caption(upload.caption.clone())
            .parse_mode(ParseMode::Html)
            .supports_streaming(true);

        if upload.duration_secs > 0 {
            request = request.duration(upload.duration_secs);
        }
        if upload.width > 0 && upload.height > 0 {
            request = request.width(upload.width).height(upload.height);
        }
        if let Some(thumb) = upload.thumbnail.as_ref().filter(|p| p.exists()) {
            request = request.thumbnail(InputFile::file(thumb.clone()));
        }

        let message = request.await?;
        Ok(message.id)
    }

    async fn send_document(&self, upload: &Upload) -> Result<MessageId, PipelineError> {
        let input_file = input_file_with_progress(&upload.path, upload.progress.clone()).await?;
        let mut request = self
            .bot
            .send_document(self.channel, input_file)
            .caption(upload.caption.clone())
            .parse_mode(ParseMode::Html);

        if let Some(thumb) = upload.thumbnail.as_ref().filter(|p| p.exists()) {
            request = request.thumbnail(InputFile::file(thumb.clone()));
        }

        let message = request.await?;
        Ok(message.id)
    }

    async fn copy_to(&self, chat: ChatId, message_id: MessageId) -> Result<MessageId, PipelineError> {
        Ok(self.bot.copy_message(chat, self.channel, message_id).await?)
    }
}
