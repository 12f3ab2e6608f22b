//! External-tool strategy: ffmpeg for frames, ffprobe for metadata.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::core::config;
use crate::media::probe::run_ffprobe;
use crate::media::{MediaError, MediaProbe, MediaStrategy};

pub struct FfmpegStrategy {
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

impl FfmpegStrategy {
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }
}

#[async_trait]
impl MediaStrategy for FfmpegStrategy {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn extract_frame(&self, video: &Path, offset_secs: u32, output: &Path) -> Result<(), MediaError> {
        let scale = format!("scale={}:-2", config::media::THUMBNAIL_MAX_SIDE);

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-ss"])
            .arg(offset_secs.to_string())
            .arg("-i")
            .arg(video)
            .args(["-vframes", "1", "-vf"])
            .arg(&scale)
            .args(["-q:v", "2"])
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let result = tokio::time::timeout(config::media::tool_timeout(), cmd.output())
            .await
            .map_err(|_| MediaError::Timeout(format!("ffmpeg frame from {}", video.display())))?
            .map_err(|e| MediaError::Tool(format!("cannot run {}: {}", self.ffmpeg_bin, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            log::debug!("ffmpeg thumbnail error: {}", stderr);
            return Err(MediaError::Tool(format!("ffmpeg exited with {}: {}", result.status, stderr.trim())));
        }

        // Seeking past the end exits 0 without writing anything
        match fs_err::tokio::metadata(output).await {
            Ok(m) if m.len() > 0 => Ok(()),
            _ => Err(MediaError::Tool(format!(
                "ffmpeg wrote no frame at {}s of {}",
                offset_secs,
                video.display()
            ))),
        }
    }

    async fn probe(&self, video: &Path) -> Result<MediaProbe, MediaError> {
        run_ffprobe(&self.ffprobe_bin, video).await
    }
}
