//! Relay engine against a scripted archive transport.
//!
//! Run with: cargo test --test relay_test

mod common;

use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cinevault::core::config;
use cinevault::download::error::PipelineError;
use cinevault::download::send::Relayer;
use cinevault::media::MediaStrategy;
use common::{CountingProbes, FakeFrames, MockTransport, fast_retry, files_in, media};

fn relayer(dir: &Path, transport: Arc<MockTransport>, strategies: Vec<Box<dyn MediaStrategy>>, max: u64) -> Relayer {
    Relayer::with_retry(transport, media(dir, strategies), max, fast_retry())
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_video_goes_out_with_thumbnail_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let video = write_file(dir.path(), "episode.mp4", &[1u8; 4096]);
    let transport = MockTransport::new();
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(FakeFrames)], 1 << 30);

    let id = relayer.relay(&video, "<b>Episode</b>", None).await.unwrap();
    assert_eq!(id.0, 100);

    let uploads = transport.uploads();
    assert_eq!(uploads.len(), 1);
    let sent = &uploads[0];
    assert_eq!(sent.kind, "video");
    assert_eq!(sent.caption, "<b>Episode</b>");
    assert_eq!((sent.duration_secs, sent.width, sent.height), (120, 1280, 720));
    assert!(sent.thumbnail_existed, "thumbnail should exist during the upload");

    // Thumbnail is gone afterwards, the source file is not touched
    assert!(!sent.thumbnail.as_ref().unwrap().exists());
    assert!(files_in(&dir.path().join("thumbs")).is_empty());
    assert!(video.exists());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let video = write_file(dir.path(), "movie.mkv", &[2u8; 2048]);
    let transport = MockTransport::failing_with(vec![
        PipelineError::Network("connection reset".into()),
        PipelineError::RetryAfter(Duration::from_millis(20)),
    ]);
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(FakeFrames)], 1 << 30);

    let id = relayer.relay(&video, "caption", None).await.unwrap();

    let uploads = transport.uploads();
    assert_eq!(uploads.len(), 3);
    assert_eq!(id.0, 100);
    // Every attempt reuses the same thumbnail
    assert!(uploads.iter().all(|u| u.thumbnail_existed));
    assert!(files_in(&dir.path().join("thumbs")).is_empty());
}

#[tokio::test]
async fn test_gives_up_after_three_attempts_and_cleans_thumbnail() {
    let dir = tempfile::tempdir().unwrap();
    let video = write_file(dir.path(), "movie.mp4", &[2u8; 2048]);
    let transport = MockTransport::failing_with(vec![
        PipelineError::Timeout("slow".into()),
        PipelineError::Network("down".into()),
        PipelineError::Network("still down".into()),
    ]);
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(FakeFrames)], 1 << 30);

    let err = relayer.relay(&video, "caption", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Network(ref m) if m == "still down"), "{:?}", err);
    assert_eq!(transport.uploads().len(), 3);
    assert!(files_in(&dir.path().join("thumbs")).is_empty());
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let video = write_file(dir.path(), "movie.mp4", &[2u8; 2048]);
    let transport = MockTransport::failing_with(vec![PipelineError::InvalidInput("Bad Request: wrong file".into())]);
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(FakeFrames)], 1 << 30);

    let err = relayer.relay(&video, "caption", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)), "{:?}", err);
    assert_eq!(transport.uploads().len(), 1);
}

#[tokio::test]
async fn test_large_video_is_sent_as_document() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("big.mp4");
    let file = std::fs::File::create(&video).unwrap();
    file.set_len(config::upload::DOCUMENT_THRESHOLD_BYTES + 1).unwrap();
    let transport = MockTransport::new();
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(FakeFrames)], 1 << 30);

    relayer.relay(&video, "caption", None).await.unwrap();

    let uploads = transport.uploads();
    assert_eq!(uploads[0].kind, "document");
    assert!(uploads[0].thumbnail_existed);
}

#[tokio::test]
async fn test_non_video_is_a_document_without_thumbnail() {
    let dir = tempfile::tempdir().unwrap();
    let notes = write_file(dir.path(), "subtitles.srt", b"1\n00:00:01,000 --> 00:00:02,000\nHi\n");
    let transport = MockTransport::new();
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(FakeFrames)], 1 << 30);

    relayer.relay(&notes, "caption", None).await.unwrap();

    let sent = &transport.uploads()[0];
    assert_eq!(sent.kind, "document");
    assert!(sent.thumbnail.is_none());
    assert_eq!((sent.duration_secs, sent.width, sent.height), (0, 0, 0));
}

#[tokio::test]
async fn test_video_without_any_strategy_still_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let video = write_file(dir.path(), "clip.mp4", &[9u8; 512]);
    let transport = MockTransport::new();
    let relayer = relayer(dir.path(), transport.clone(), Vec::new(), 1 << 30);

    relayer.relay(&video, "caption", None).await.unwrap();

    let sent = &transport.uploads()[0];
    assert_eq!(sent.kind, "video");
    assert!(sent.thumbnail.is_none());
    assert_eq!(sent.duration_secs, 0);
}

#[tokio::test]
async fn test_caption_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let video = write_file(dir.path(), "clip.mp4", &[9u8; 512]);
    let transport = MockTransport::new();
    let relayer = relayer(dir.path(), transport.clone(), Vec::new(), 1 << 30);

    let caption = "ж".repeat(config::upload::MAX_CAPTION_CHARS + 50);
    relayer.relay(&video, &caption, None).await.unwrap();

    let sent = &transport.uploads()[0];
    assert_eq!(sent.caption.chars().count(), config::upload::MAX_CAPTION_CHARS);
}

#[tokio::test]
async fn test_preconditions_fail_before_upload() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(FakeFrames)], 1000);

    let missing = relayer.relay(&dir.path().join("nope.mp4"), "c", None).await.unwrap_err();
    assert!(matches!(missing, PipelineError::NotFound(_)), "{:?}", missing);

    let empty = write_file(dir.path(), "empty.mp4", b"");
    let err = relayer.relay(&empty, "c", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)), "{:?}", err);

    let big = write_file(dir.path(), "big.mp4", &[0u8; 1001]);
    let err = relayer.relay(&big, "c", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Oversize { size: 1001, max: 1000 }), "{:?}", err);

    assert!(transport.uploads().is_empty());
    assert!(files_in(&dir.path().join("thumbs")).is_empty());
}

#[tokio::test]
async fn test_video_is_probed_once_per_relay() {
    let dir = tempfile::tempdir().unwrap();
    let video = write_file(dir.path(), "episode.mp4", &[1u8; 4096]);
    let probes = Arc::new(AtomicUsize::new(0));
    let transport = MockTransport::new();
    let relayer = relayer(dir.path(), transport.clone(), vec![Box::new(CountingProbes(probes.clone()))], 1 << 30);

    relayer.relay(&video, "caption", None).await.unwrap();

    assert_eq!(probes.load(Ordering::SeqCst), 1);
    let sent = &transport.uploads()[0];
    assert_eq!((sent.duration_secs, sent.width, sent.height), (120, 1280, 720));
    assert!(sent.thumbnail_existed);
}
