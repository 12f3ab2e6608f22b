//! Naming, formatting and path helpers shared across the pipeline.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use rand::rngs::OsRng;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::core::config;

/// Alphabet of share codes
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a share code
pub const CODE_LENGTH: usize = 9;

/// Deep-link payload prefix for video codes
pub const DEEPLINK_PREFIX: &str = "v_";

/// Longest file name `clean_filename` produces, extension included
pub const MAX_FILENAME_CHARS: usize = 200;

/// Byte ceiling of a cleaned name in UTF-8, below the usual 255-byte limit
pub const MAX_FILENAME_BYTES: usize = 240;

static FORBIDDEN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("forbidden chars regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Generates a share code of [`CODE_LENGTH`] characters from `A-Z0-9`.
///
/// Characters are drawn from the OS CSPRNG, so codes are not guessable from
/// earlier ones.
///
/// # Example
///
/// ```
/// use cinevault::core::utils::generate_unique_code;
///
/// let code = generate_unique_code();
/// assert_eq!(code.len(), 9);
/// assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
/// ```
pub fn generate_unique_code() -> String {
    generate_code(CODE_LENGTH)
}

/// Generates a code of arbitrary length from the share-code alphabet.
pub fn generate_code(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Makes a file name safe for every common filesystem.
///
/// Reserved characters are replaced by `_`, whitespace runs collapse to one
/// space, leading/trailing dots and spaces are trimmed, and names longer than
/// [`MAX_FILENAME_CHARS`] characters or [`MAX_FILENAME_BYTES`] bytes are cut on
/// a character boundary while keeping the extension. An empty result becomes
/// `unnamed_file`.
///
/// # Example
///
/// ```
/// use cinevault::core::utils::clean_filename;
///
/// assert_eq!(clean_filename("Movie: The  Sequel?.mp4"), "Movie_ The Sequel_.mp4");
/// assert_eq!(clean_filename("   "), "unnamed_file");
/// ```
pub fn clean_filename(filename: &str) -> String {
    let replaced = FORBIDDEN_CHARS.replace_all(filename, "_");
    let collapsed = WHITESPACE_RUN.replace_all(&replaced, " ");
    let trimmed = collapsed.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if trimmed.is_empty() {
        return "unnamed_file".to_string();
    }

    if trimmed.chars().count() <= MAX_FILENAME_CHARS && trimmed.len() <= MAX_FILENAME_BYTES {
        return trimmed.to_string();
    }

    let (stem, ext) = match trimmed.rfind('.') {
        // Only treat a short dotted suffix as an extension
        Some(idx) if trimmed.len() - idx <= 10 && idx > 0 => (&trimmed[..idx], &trimmed[idx..]),
        _ => (trimmed, ""),
    };
    let keep_chars = MAX_FILENAME_CHARS.saturating_sub(ext.chars().count());
    let keep_bytes = MAX_FILENAME_BYTES.saturating_sub(ext.len());

    let mut end = 0;
    for (count, (idx, c)) in stem.char_indices().enumerate() {
        if count >= keep_chars || idx + c.len_utf8() > keep_bytes {
            break;
        }
        end = idx + c.len_utf8();
    }
    let mut cut = stem[..end].trim_end_matches(|c: char| c.is_whitespace() || c == '.').to_string();
    cut.push_str(ext);
    cut
}

/// Formats a byte count with binary units, e.g. `1.50 MB`.
///
/// # Example
///
/// ```
/// use cinevault::core::utils::format_file_size;
///
/// assert_eq!(format_file_size(0), "0 B");
/// assert_eq!(format_file_size(1536), "1.50 KB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Formats seconds as `H:MM:SS`, or `M:SS` under an hour.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Builds the `t.me` deep link that opens the bot with a video code.
pub fn generate_deeplink(bot_username: &str, code: &str) -> String {
    format!(
        "https://t.me/{}?start={}{}",
        bot_username.trim_start_matches('@'),
        DEEPLINK_PREFIX,
        code
    )
}

/// Extracts the video code from a `/start` payload.
///
/// Returns `None` for payloads that are not video links or carry an empty code.
pub fn parse_deeplink(payload: &str) -> Option<String> {
    payload
        .trim()
        .strip_prefix(DEEPLINK_PREFIX)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

/// Escapes Telegram HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Escapes special characters for Telegram MarkdownV2.
///
/// # Example
///
/// ```
/// use cinevault::core::utils::escape_markdown;
///
/// assert_eq!(escape_markdown("Hello. World!"), "Hello\\. World\\!");
/// ```
pub fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|' | '{' | '}' | '.'
            | '!' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Lower-cased extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

/// True if the extension is one of the recognized video containers.
pub fn is_video_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| config::download::VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Guesses a MIME type from the file extension.
pub fn mime_type(path: &Path) -> mime::Mime {
    let guess = match extension_of(path).as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("webm") => "video/webm",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("srt") => "application/x-subrip",
        _ => "application/octet-stream",
    };
    guess.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Facts about a file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub name: String,
    pub stem: String,
    pub extension: Option<String>,
    pub mime: String,
    pub modified: Option<DateTime<Utc>>,
    pub is_video: bool,
}

/// Collects [`FileInfo`] for an existing file.
pub async fn file_info(path: &Path) -> std::io::Result<FileInfo> {
    let metadata = fs_err::tokio::metadata(path).await?;
    Ok(FileInfo {
        path: path.to_path_buf(),
        size: metadata.len(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        stem: path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        extension: extension_of(path),
        mime: mime_type(path).to_string(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        is_video: is_video_file(path),
    })
}
