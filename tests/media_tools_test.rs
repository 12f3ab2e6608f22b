//! Thumbnail and probe strategies on a real H.264 clip.
//!
//! The clip is generated with ffmpeg; every test returns early when ffmpeg
//! (with libx264) is not installed.
//!
//! Run with: cargo test --test media_tools_test

mod common;

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cinevault::core::config;
use cinevault::core::worker_pool::WorkerPool;
use cinevault::download::quality::QualityTier;
use cinevault::download::send::Relayer;
use cinevault::media::decoder::DecoderStrategy;
use cinevault::media::ffmpeg::FfmpegStrategy;
use cinevault::media::{MediaProcessor, MediaStrategy};
use common::{MockTransport, fast_retriever, fast_retry, files_in};

/// Renders a 4 second 640x360 test pattern, or `None` without ffmpeg.
fn make_clip(dir: &Path) -> Option<PathBuf> {
    let path = dir.join("pattern.mp4");
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "lavfi", "-i", "testsrc=duration=4:size=640x360:rate=25"])
        .args(["-c:v", "libx264", "-profile:v", "baseline", "-pix_fmt", "yuv420p", "-g", "25"])
        .arg(&path)
        .status()
        .ok()?;
    if !status.success() {
        eprintln!("ffmpeg could not render the test clip, skipping");
        return None;
    }
    Some(path)
}

fn processor(dir: &Path, strategy: Box<dyn MediaStrategy>) -> MediaProcessor {
    MediaProcessor::with_strategies(vec![strategy], WorkerPool::new(1), dir.join("thumbs"))
}

fn assert_bounded_jpeg(path: &Path) {
    let image = image::open(path).unwrap();
    let max = config::media::THUMBNAIL_MAX_SIDE;
    assert_eq!(image.width().max(image.height()), max);
    assert_eq!((image.width(), image.height()), (max, max * 9 / 16));
    assert_eq!(
        image::ImageFormat::from_path(path).unwrap(),
        image::ImageFormat::Jpeg
    );
}

#[tokio::test]
async fn test_ffmpeg_strategy_thumbnail_and_probe() {
    let dir = tempfile::tempdir().unwrap();
    let Some(clip) = make_clip(dir.path()) else { return };
    let media = processor(dir.path(), Box::new(FfmpegStrategy::new("ffmpeg", "ffprobe")));

    assert_eq!(media.duration(&clip).await, 4);
    assert_eq!(media.dimensions(&clip).await, (640, 360));

    // The default offset is past the end of the clip
    let thumb = media
        .make_thumbnail(&clip, config::media::THUMBNAIL_OFFSET_SECS)
        .await
        .unwrap();
    assert_bounded_jpeg(&thumb);
}

#[tokio::test]
async fn test_decoder_strategy_thumbnail_and_probe() {
    let dir = tempfile::tempdir().unwrap();
    let Some(clip) = make_clip(dir.path()) else { return };
    let media = processor(dir.path(), Box::new(DecoderStrategy::new(WorkerPool::new(1))));

    assert_eq!(media.duration(&clip).await, 4);
    assert_eq!(media.dimensions(&clip).await, (640, 360));

    let thumb = media.make_thumbnail(&clip, 1).await.unwrap();
    assert_bounded_jpeg(&thumb);
}

#[tokio::test]
async fn test_inspect_reports_video_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let Some(clip) = make_clip(dir.path()) else { return };
    let media = processor(dir.path(), Box::new(DecoderStrategy::new(WorkerPool::new(1))));

    let asset = media.inspect(&clip).await.unwrap();
    assert!(asset.is_video);
    assert_eq!(asset.size, std::fs::metadata(&clip).unwrap().len());
    assert_eq!((asset.duration_secs, asset.width, asset.height), (4, 640, 360));
    assert_eq!(asset.mime.essence_str(), "video/mp4");
}

#[tokio::test]
async fn test_direct_mp4_from_url_to_archive() {
    let dir = tempfile::tempdir().unwrap();
    let Some(clip) = make_clip(dir.path()) else { return };

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/pattern.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(std::fs::read(&clip).unwrap()))
        .mount(&server)
        .await;

    let downloads = dir.path().join("downloads");
    let retriever = fast_retriever("/nonexistent/yt-dlp", 1 << 30);
    let file = retriever
        .retrieve(&format!("{}/media/pattern.mp4", server.uri()), &downloads, QualityTier::P720, None)
        .await
        .unwrap();
    assert_eq!(file.file_name().unwrap(), "pattern.mp4");

    let media = Arc::new(processor(dir.path(), Box::new(FfmpegStrategy::new("ffmpeg", "ffprobe"))));
    let transport = MockTransport::new();
    let relayer = Relayer::with_retry(transport.clone(), media, 1 << 30, fast_retry());
    relayer.relay(&file, "<b>Pattern</b>", None).await.unwrap();

    let sent = &transport.uploads()[0];
    assert_eq!(sent.kind, "video");
    assert_eq!((sent.duration_secs, sent.width, sent.height), (4, 640, 360));
    assert!(sent.thumbnail_existed);
    assert!(files_in(&dir.path().join("thumbs")).is_empty());
}
