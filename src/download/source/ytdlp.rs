//! YtDlpSource: platform extraction powered by yt-dlp.
//!
//! Flow for one retrieval:
//!   `yt-dlp -J` (format inventory) → pick format for the tier → size gate →
//!   `yt-dlp -f <format>` with progress on `--newline` lines → final path from
//!   `--print after_move:filepath`
//!
//! Every invocation holds one process-wide gate, so at most one yt-dlp child
//! runs at a time. The whole extraction is bounded by the download timeout;
//! on expiry the child is killed.
//!
//! yt-dlp writes into a per-job staging directory under the destination. Only
//! a finished file is moved out of it; the staging directory is removed on
//! every exit path, so killed or failed runs leave nothing behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use url::Url;

use crate::core::config;
use crate::core::disk::remove_dir_quietly;
use crate::download::error::PipelineError;
use crate::download::progress::{Progress, ProgressThrottle, parse_progress};
use crate::download::quality::{ExtractorInfo, select_format};
use crate::download::source::{DownloadRequest, DownloadSource, has_video_extension};

/// Known platform domains routed to yt-dlp even when the path looks like a file.
const YTDLP_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "youtube-nocookie.com",
    "m.youtube.com",
    "music.youtube.com",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "tiktok.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "reddit.com",
    "bilibili.com",
    "ok.ru",
    "vk.com",
    "rutube.ru",
    "aparat.com",
];

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 5;

/// Download source powered by yt-dlp for extracting media from supported sites.
pub struct YtDlpSource {
    bin: String,
    timeout: Duration,
    gate: Arc<Mutex<()>>,
}

impl YtDlpSource {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Check if a domain matches any known yt-dlp domain.
    pub fn is_known_domain(url: &Url) -> bool {
        if let Some(host) = url.host_str() {
            let host_lower = host.to_lowercase();
            YTDLP_DOMAINS
                .iter()
                .any(|d| host_lower == *d || host_lower.ends_with(&format!(".{}", d)))
        } else {
            false
        }
    }

    /// Fetches the format inventory without downloading.
    pub async fn fetch_info(&self, url: &Url) -> Result<ExtractorInfo, PipelineError> {
        let _gate = self.gate.lock().await;
        tokio::time::timeout(config::download::info_timeout(), self.dump_json(url))
            .await
            .map_err(|_| {
                PipelineError::Timeout(format!(
                    "yt-dlp metadata for {} took longer than {:?}",
                    url,
                    config::download::info_timeout()
                ))
            })?
    }

    async fn dump_json(&self, url: &Url) -> Result<ExtractorInfo, PipelineError> {
        let output = Command::new(&self.bin)
            .args(["-J", "--no-playlist", "--no-warnings", url.as_str()])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::Extraction(format!("cannot run {}: {}", self.bin, e)))?;

        if !output.status.success() {
            return Err(PipelineError::Extraction(format!(
                "yt-dlp -J exited with {}: {}",
                output.status,
                tail(&String::from_utf8_lossy(&output.stderr))
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(PipelineError::Extraction(format!("yt-dlp returned no metadata for {}", url)));
        }

        serde_json::from_str(&stdout)
            .map_err(|e| PipelineError::Extraction(format!("unreadable yt-dlp metadata: {}", e)))
    }

    async fn extract(&self, request: &DownloadRequest<'_>, staging: &Path) -> Result<PathBuf, PipelineError> {
        let info = self.dump_json(request.url).await?;
        if info.formats.is_empty() {
            return Err(PipelineError::Extraction(format!("no formats offered for {}", request.url)));
        }

        let format = select_format(&info.formats, request.tier)
            .ok_or_else(|| PipelineError::Extraction(format!("no video formats offered for {}", request.url)))?;

        if let Some(size) = info.size_for(format) {
            if size > request.max_file_size {
                return Err(PipelineError::Oversize {
                    size,
                    max: request.max_file_size,
                });
            }
        }

        log::info!(
            "🎬 yt-dlp: {} → format {} ({}p) for tier {}",
            request.url,
            format.format_id,
            format.height.unwrap_or(0),
            request.tier
        );

        if request.job.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let started = SystemTime::now();
        let printed = self.run_download(request, staging, &format.selector()).await?;

        match printed {
            Some(path) if path.exists() => Ok(path),
            _ => find_downloaded_file(staging, info.title.as_deref(), started)
                .await
                .ok_or_else(|| PipelineError::Extraction(format!("yt-dlp produced no file for {}", request.url))),
        }
    }

    /// Runs the download, returning the path yt-dlp printed after moving the file.
    async fn run_download(
        &self,
        request: &DownloadRequest<'_>,
        staging: &Path,
        selector: &str,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let template = staging.join("%(title)s.%(ext)s");
        let mut child = Command::new(&self.bin)
            .arg("-f")
            .arg(selector)
            .args(["--newline", "--progress", "--no-playlist"])
            .args(["--merge-output-format", "mp4"])
            .arg("--max-filesize")
            .arg(request.max_file_size.to_string())
            .args(["--print", "after_move:filepath"])
            .arg("-o")
            .arg(&template)
            .arg(request.url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Extraction(format!("cannot run {}: {}", self.bin, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Extraction("yt-dlp stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::Extraction("yt-dlp stderr not captured".to_string()))?;

        let mut throttle = ProgressThrottle::new(request.progress.clone(), 5);
        let mut printed_path = None;
        let mut stderr_tail: Vec<String> = Vec::new();

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                line = out_lines.next_line(), if out_open => match line? {
                    Some(line) => {
                        if let Some(info) = parse_progress(&line) {
                            request.job.set_progress(info.percent);
                            throttle.report(Progress::Extractor(info));
                        } else if !line.trim().is_empty() && !line.starts_with('[') {
                            printed_path = Some(PathBuf::from(line.trim()));
                        }
                    }
                    None => out_open = false,
                },
                line = err_lines.next_line(), if err_open => match line? {
                    Some(line) => {
                        if let Some(info) = parse_progress(&line) {
                            request.job.set_progress(info.percent);
                            throttle.report(Progress::Extractor(info));
                        } else {
                            log::debug!("yt-dlp: {}", line);
                            stderr_tail.push(line);
                            if stderr_tail.len() > STDERR_TAIL_LINES {
                                stderr_tail.remove(0);
                            }
                        }
                    }
                    None => err_open = false,
                },
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(PipelineError::Extraction(format!(
                "yt-dlp exited with {}: {}",
                status,
                stderr_tail.join(" | ")
            )));
        }

        Ok(printed_path)
    }
}

#[async_trait]
impl DownloadSource for YtDlpSource {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn supports_url(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        // Known platforms first; otherwise anything that is not a direct video file
        Self::is_known_domain(url) || !has_video_extension(url)
    }

    async fn download(&self, request: &DownloadRequest<'_>) -> Result<PathBuf, PipelineError> {
        if request.job.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let staging = staging_dir(request.dest_dir, request.job.id());
        fs_err::tokio::create_dir_all(&staging).await?;

        let _gate = self.gate.lock().await;
        let extracted = tokio::time::timeout(self.timeout, self.extract(request, &staging))
            .await
            .map_err(|_| {
                log::error!("yt-dlp timed out after {:?} for {}, killing", self.timeout, request.url);
                PipelineError::Timeout(format!("extraction exceeded {:?}", self.timeout))
            })
            .and_then(|result| result);

        let result = match extracted {
            Ok(_) if request.job.is_cancelled() => Err(PipelineError::Cancelled),
            Ok(path) => move_into(&path, request.dest_dir).await,
            Err(e) => Err(e),
        };
        remove_dir_quietly(&staging).await;
        result
    }
}

/// Staging directory of job `id` inside `dest_dir`.
pub fn staging_dir(dest_dir: &Path, id: u64) -> PathBuf {
    dest_dir.join(format!(".ytdlp-{}", id))
}

async fn move_into(path: &Path, dest_dir: &Path) -> Result<PathBuf, PipelineError> {
    let name = path
        .file_name()
        .ok_or_else(|| PipelineError::Extraction(format!("yt-dlp printed a path without a file name: {}", path.display())))?;
    let target = dest_dir.join(name);
    fs_err::tokio::rename(path, &target).await?;
    Ok(target)
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ")
}

/// Locates the file yt-dlp wrote when it did not print the final path.
///
/// Prefers a file whose stem starts with the video title, otherwise the newest
/// complete file written since `since`.
pub async fn find_downloaded_file(dir: &Path, title: Option<&str>, since: SystemTime) -> Option<PathBuf> {
    let mut entries = fs_err::tokio::read_dir(dir).await.ok()?;
    let mut candidates: Vec<(PathBuf, SystemTime)> = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| config::download::PARTIAL_EXTENSIONS.contains(&ext));
        if is_partial {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((path, modified));
    }

    if let Some(title) = title.filter(|t| !t.is_empty()) {
        let by_title = candidates.iter().find(|(path, _)| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.starts_with(title))
        });
        if let Some((path, _)) = by_title {
            return Some(path.clone());
        }
    }

    candidates
        .into_iter()
        .filter(|(_, modified)| *modified >= since)
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}
