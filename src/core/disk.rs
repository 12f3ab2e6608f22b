//! File cleanup on local storage
//!
//! Every function here tolerates files disappearing underneath it: another
//! task may delete the same file concurrently, so a missing file is a no-op
//! and per-file failures are logged and skipped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use crate::core::config;

/// Removes a file if it exists.
///
/// Returns `true` if this call removed it. Missing files and removal errors
/// return `false`; errors are logged.
pub async fn safe_delete_file(path: &Path) -> bool {
    match fs_err::tokio::remove_file(path).await {
        Ok(()) => {
            log::debug!("Deleted {}", path.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Failed to delete {}: {}", path.display(), e);
            false
        }
    }
}

/// Removes a directory and everything in it.
///
/// Same contract as [`safe_delete_file`]: `true` only if this call removed it.
pub async fn remove_dir_quietly(dir: &Path) -> bool {
    match fs_err::tokio::remove_dir_all(dir).await {
        Ok(()) => {
            log::debug!("Removed {}", dir.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Failed to remove {}: {}", dir.display(), e);
            false
        }
    }
}

/// Deletes download leftovers (`.part`, `.tmp`, `.ytdl`) directly inside `dir`.
///
/// Returns the number of files removed.
pub async fn cleanup_partial_files(dir: &Path) -> usize {
    let files = match list_files(dir).await {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Cannot scan {} for partial files: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for path in files {
        if is_partial(&path) && safe_delete_file(&path).await {
            removed += 1;
        }
    }
    if removed > 0 {
        log::info!("🧹 Removed {} partial file(s) from {}", removed, dir.display());
    }
    removed
}

/// Deletes files older than `max_age` directly inside each of `dirs`.
///
/// Missing directories are skipped. Returns the number of files removed.
pub async fn cleanup_temp_files(dirs: &[PathBuf], max_age: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;

    for dir in dirs {
        let files = match list_files(dir).await {
            Ok(files) => files,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                log::warn!("Cannot scan {}: {}", dir.display(), e);
                continue;
            }
        };

        for path in files {
            let modified = match fs_err::tokio::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age && safe_delete_file(&path).await {
                removed += 1;
            }
        }
    }

    if removed > 0 {
        log::info!("🧹 Removed {} stale file(s) older than {:?}", removed, max_age);
    }
    removed
}

/// Starts the hourly janitor that prunes stale files in `dirs`.
///
/// Set `stop` to end the loop after its current sleep.
pub fn start_cleanup_task(dirs: Vec<PathBuf>, stop: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "🧹 Temp janitor started (interval: {:?}, max age: {:?})",
            config::cleanup::interval(),
            config::cleanup::max_file_age()
        );

        loop {
            cleanup_temp_files(&dirs, config::cleanup::max_file_age()).await;
            tokio::time::sleep(config::cleanup::interval()).await;

            if stop.load(Ordering::SeqCst) {
                log::info!("Temp janitor stopped");
                break;
            }
        }
    })
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| config::download::PARTIAL_EXTENSIONS.contains(&ext))
}

async fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs_err::tokio::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    Ok(files)
}
