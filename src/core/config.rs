//! Runtime configuration.
//!
//! Values that change between deployments are read once from the environment
//! into [`Config`]. Tuning constants that never change at runtime live in the
//! nested modules below, grouped by the subsystem that uses them.

use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::AppError;

/// Default maximum size of a retrieved or relayed file (4 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Default hard limit for one extraction, in seconds
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Deployment configuration, loaded from environment variables.
///
/// Mandatory: `BOT_TOKEN`, `PRIVATE_CHANNEL_ID`, `ADMIN_IDS`. Everything else
/// has a default.
#[derive(Debug)]
pub struct Config {
    pub bot_token: SecretString,
    pub bot_username: String,
    /// Archive channel every uploaded file lands in
    pub private_channel_id: i64,
    pub admin_ids: Vec<i64>,
    pub max_file_size: u64,
    pub download_timeout: Duration,
    /// Requests allowed per `rate_window`
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub temp_path: PathBuf,
    pub downloads_path: PathBuf,
    pub ytdl_bin: String,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    /// Custom Bot API server (e.g. a local telegram-bot-api instance)
    pub bot_api_url: Option<String>,
    pub log_file_path: String,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// `from_env` is a thin wrapper around this; tests feed a map instead of
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or_else(|| AppError::Config("BOT_TOKEN is not set".to_string()))?;

        let private_channel_id = get("PRIVATE_CHANNEL_ID")
            .ok_or_else(|| AppError::Config("PRIVATE_CHANNEL_ID is not set".to_string()))?
            .parse::<i64>()
            .map_err(|e| AppError::Config(format!("PRIVATE_CHANNEL_ID is not a number: {}", e)))?;
        if private_channel_id == 0 {
            return Err(AppError::Config("PRIVATE_CHANNEL_ID must not be 0".to_string()));
        }

        let admin_ids = parse_admin_ids(&get("ADMIN_IDS").unwrap_or_default())?;
        if admin_ids.is_empty() {
            return Err(AppError::Config("ADMIN_IDS must list at least one user id".to_string()));
        }

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            bot_username: get("BOT_USERNAME").unwrap_or_default().trim_start_matches('@').to_string(),
            private_channel_id,
            admin_ids,
            max_file_size: parse_or(&get, "MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            download_timeout: Duration::from_secs(parse_or(
                &get,
                "DOWNLOAD_TIMEOUT",
                DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            )?),
            rate_limit: parse_or(&get, "RATE_LIMIT", rate_limit::DEFAULT_MAX_REQUESTS)?,
            rate_window: Duration::from_secs(parse_or(&get, "RATE_WINDOW", rate_limit::DEFAULT_WINDOW_SECS)?),
            temp_path: PathBuf::from(get("TEMP_PATH").unwrap_or_else(|| "temp".to_string())),
            downloads_path: PathBuf::from(get("DOWNLOADS_PATH").unwrap_or_else(|| "downloads".to_string())),
            ytdl_bin: get("YTDL_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_bin: get("FFPROBE_BIN").unwrap_or_else(|| "ffprobe".to_string()),
            bot_api_url: get("BOT_API_URL"),
            log_file_path: get("LOG_FILE_PATH").unwrap_or_else(|| "cinevault.log".to_string()),
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{} has an invalid value {:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

/// Parses a comma separated list of Telegram user ids, skipping blanks.
pub fn parse_admin_ids(raw: &str) -> Result<Vec<i64>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|e| AppError::Config(format!("ADMIN_IDS entry {:?} is not a number: {}", s, e)))
        })
        .collect()
}

/// Retrieval tuning
pub mod download {
    use super::Duration;

    /// Retrievals allowed to be in the downloading phase at once
    pub const MAX_CONCURRENT_RETRIEVALS: usize = 3;

    /// Attempts for a direct stream before giving up
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay of the linear backoff between direct-stream attempts
    pub const RETRY_BASE_DELAY_SECS: u64 = 2;

    /// Read buffer size for direct streams
    pub const CHUNK_SIZE: usize = 8192;

    /// Connect timeout for direct streams
    pub const CONNECT_TIMEOUT_SECS: u64 = 30;

    /// Metadata probe (`yt-dlp -J`) timeout
    pub const INFO_TIMEOUT_SECS: u64 = 120;

    /// Video containers a URL path may end in to be fetched directly
    pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "flv", "webm"];

    /// Leftovers yt-dlp and interrupted streams leave behind
    pub const PARTIAL_EXTENSIONS: &[&str] = &["part", "tmp", "ytdl"];

    pub fn retry_base_delay() -> Duration {
        Duration::from_secs(RETRY_BASE_DELAY_SECS)
    }

    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    pub fn info_timeout() -> Duration {
        Duration::from_secs(INFO_TIMEOUT_SECS)
    }
}

/// Relay (upload) tuning
pub mod upload {
    use super::Duration;

    /// Files above this are sent as documents instead of native video
    pub const DOCUMENT_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

    /// Telegram caption limit, in characters
    pub const MAX_CAPTION_CHARS: usize = 1024;

    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay of the linear backoff between upload attempts
    pub const RETRY_BASE_DELAY_SECS: u64 = 2;

    pub const CONNECT_TIMEOUT_SECS: u64 = 60;

    /// Read/write timeout for multipart uploads
    pub const REQUEST_TIMEOUT_SECS: u64 = 300;

    pub fn retry_base_delay() -> Duration {
        Duration::from_secs(RETRY_BASE_DELAY_SECS)
    }

    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    pub fn request_timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Thumbnail and probe tuning
pub mod media {
    use super::Duration;

    /// Seek position for thumbnails, in seconds
    pub const THUMBNAIL_OFFSET_SECS: u32 = 10;

    /// Bounding box of a normalized thumbnail
    pub const THUMBNAIL_MAX_SIDE: u32 = 320;

    pub const THUMBNAIL_JPEG_QUALITY: u8 = 85;

    /// Hard limit for each ffmpeg/ffprobe invocation
    pub const TOOL_TIMEOUT_SECS: u64 = 30;

    /// Blocking decode/normalize jobs allowed to run at once
    pub const WORKER_POOL_SIZE: usize = 2;

    pub fn tool_timeout() -> Duration {
        Duration::from_secs(TOOL_TIMEOUT_SECS)
    }
}

/// Per-user request limiting
pub mod rate_limit {
    use super::Duration;

    pub const DEFAULT_MAX_REQUESTS: usize = 10;

    pub const DEFAULT_WINDOW_SECS: u64 = 60;

    /// How often stale identities are swept
    pub const SWEEP_INTERVAL_SECS: u64 = 300;

    /// Timestamps older than this are dropped by the sweep
    pub const RETENTION_SECS: u64 = 3600;

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }

    pub fn retention() -> Duration {
        Duration::from_secs(RETENTION_SECS)
    }
}

/// Disk janitor
pub mod cleanup {
    use super::Duration;

    /// Files in temp/download dirs older than this are removed
    pub const MAX_FILE_AGE_SECS: u64 = 24 * 3600;

    pub const INTERVAL_SECS: u64 = 3600;

    pub fn max_file_age() -> Duration {
        Duration::from_secs(MAX_FILE_AGE_SECS)
    }

    pub fn interval() -> Duration {
        Duration::from_secs(INTERVAL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("BOT_TOKEN", "123:abc"),
            ("PRIVATE_CHANNEL_ID", "-1001234567890"),
            ("ADMIN_IDS", "42, 43"),
        ]
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&required())).unwrap();
        assert_eq!(config.bot_token.expose_secret(), "123:abc");
        assert_eq!(config.private_channel_id, -1001234567890);
        assert_eq!(config.admin_ids, vec![42, 43]);
        assert_eq!(config.max_file_size, 4_294_967_296);
        assert_eq!(config.download_timeout, Duration::from_secs(3600));
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.temp_path, PathBuf::from("temp"));
        assert_eq!(config.downloads_path, PathBuf::from("downloads"));
        assert_eq!(config.ytdl_bin, "yt-dlp");
        assert!(config.bot_api_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = required();
        pairs.push(("MAX_FILE_SIZE", "1024"));
        pairs.push(("DOWNLOAD_TIMEOUT", "5"));
        pairs.push(("BOT_USERNAME", "@vault_bot"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.download_timeout, Duration::from_secs(5));
        assert_eq!(config.bot_username, "vault_bot");
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let pairs: Vec<_> = required().into_iter().filter(|(k, _)| *k != "BOT_TOKEN").collect();
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_zero_channel_rejected() {
        let mut pairs: Vec<_> = required()
            .into_iter()
            .filter(|(k, _)| *k != "PRIVATE_CHANNEL_ID")
            .collect();
        pairs.push(("PRIVATE_CHANNEL_ID", "0"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_empty_admins_rejected() {
        let mut pairs: Vec<_> = required().into_iter().filter(|(k, _)| *k != "ADMIN_IDS").collect();
        pairs.push(("ADMIN_IDS", " , "));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_bad_number_reports_key() {
        let mut pairs = required();
        pairs.push(("MAX_FILE_SIZE", "lots"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("MAX_FILE_SIZE"));
    }

    #[test]
    fn test_is_admin() {
        let config = Config::from_lookup(lookup(&required())).unwrap();
        assert!(config.is_admin(42));
        assert!(!config.is_admin(7));
    }
}
