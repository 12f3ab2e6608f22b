//! In-process fallback: MP4 demuxing with `mp4`, H.264 decoding with `openh264`.
//!
//! Used when ffmpeg/ffprobe are missing or fail. Only MP4 containers with an
//! H.264 video track are understood; anything else is a [`MediaError::Decode`].

use async_trait::async_trait;
use image::RgbImage;
use mp4::{MediaType, Mp4Reader, Mp4Track, TrackType};
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::worker_pool::WorkerPool;
use crate::media::thumbnail::write_jpeg;
use crate::media::{MediaError, MediaProbe, MediaStrategy};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

type Mp4File = Mp4Reader<BufReader<std::fs::File>>;

pub struct DecoderStrategy {
    pool: WorkerPool,
}

impl DecoderStrategy {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaStrategy for DecoderStrategy {
    fn name(&self) -> &'static str {
        "decoder"
    }

    async fn extract_frame(&self, video: &Path, offset_secs: u32, output: &Path) -> Result<(), MediaError> {
        let video = video.to_path_buf();
        let output = output.to_path_buf();
        self.pool
            .run(move || -> Result<(), MediaError> {
                let frame = decode_frame(&video, offset_secs)?;
                write_jpeg(&frame, &output)
            })
            .await?
    }

    async fn probe(&self, video: &Path) -> Result<MediaProbe, MediaError> {
        let video: PathBuf = video.to_path_buf();
        self.pool.run(move || probe_mp4(&video)).await?
    }
}

fn open_mp4(path: &Path) -> Result<Mp4File, MediaError> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    Mp4Reader::read_header(BufReader::new(file), size)
        .map_err(|e| MediaError::Decode(format!("not a readable MP4 ({}): {}", path.display(), e)))
}

fn video_track(reader: &Mp4File) -> Result<&Mp4Track, MediaError> {
    reader
        .tracks()
        .values()
        .find(|t| matches!(t.track_type(), Ok(TrackType::Video)))
        .ok_or_else(|| MediaError::Decode("no video track".to_string()))
}

/// Duration and dimensions from the container headers.
fn probe_mp4(path: &Path) -> Result<MediaProbe, MediaError> {
    let reader = open_mp4(path)?;
    let duration = reader.duration().as_secs_f64().round() as u32;
    let (width, height) = video_track(&reader)
        .map(|t| (u32::from(t.width()), u32::from(t.height())))
        .unwrap_or((0, 0));

    Ok(MediaProbe {
        duration_secs: duration,
        width,
        height,
    })
}

/// Decodes the frame nearest to `offset_secs`.
///
/// Decoding starts at the closest sync sample at or before the target and
/// runs forward, so the returned frame is complete.
fn decode_frame(path: &Path, offset_secs: u32) -> Result<RgbImage, MediaError> {
    let mut reader = open_mp4(path)?;

    let (track_id, sample_count, duration, header, sync) = {
        let track = video_track(&reader)?;
        match track.media_type() {
            Ok(MediaType::H264) => {}
            Ok(other) => return Err(MediaError::Decode(format!("unsupported codec {:?}", other))),
            Err(e) => return Err(MediaError::Decode(format!("unknown codec: {}", e))),
        }

        let sps = track
            .sequence_parameter_set()
            .map_err(|e| MediaError::Decode(format!("missing SPS: {}", e)))?;
        let pps = track
            .picture_parameter_set()
            .map_err(|e| MediaError::Decode(format!("missing PPS: {}", e)))?;
        let mut header = Vec::with_capacity(sps.len() + pps.len() + 8);
        header.extend_from_slice(&START_CODE);
        header.extend_from_slice(sps);
        header.extend_from_slice(&START_CODE);
        header.extend_from_slice(pps);

        let sync = track.trak.mdia.minf.stbl.stss.as_ref().map(|stss| stss.entries.clone());
        (track.track_id(), track.sample_count(), track.duration(), header, sync)
    };

    if sample_count == 0 {
        return Err(MediaError::Decode("video track has no samples".to_string()));
    }

    let target = target_sample(offset_secs, duration, sample_count);
    let start = sync_sample_at_or_before(target, sync.as_deref());
    log::debug!(
        "Decoding samples {}..={} of {} from {}",
        start,
        target,
        sample_count,
        path.display()
    );

    let mut decoder = Decoder::new().map_err(|e| MediaError::Decode(format!("openh264 init: {}", e)))?;
    let mut frame = None;
    let mut packet = Vec::new();

    for sample_id in start..=target {
        let sample = reader
            .read_sample(track_id, sample_id)
            .map_err(|e| MediaError::Decode(format!("sample {}: {}", sample_id, e)))?;
        let Some(sample) = sample else { continue };

        packet.clear();
        if sample_id == start {
            packet.extend_from_slice(&header);
        }
        avcc_to_annexb(&sample.bytes, &mut packet)?;

        match decoder.decode(&packet) {
            Ok(Some(yuv)) => {
                let (w, h) = yuv.dimensions();
                let mut rgb = vec![0u8; w * h * 3];
                yuv.write_rgb8(&mut rgb);
                frame = RgbImage::from_raw(w as u32, h as u32, rgb);
            }
            Ok(None) => {}
            Err(e) => log::debug!("openh264 rejected sample {}: {}", sample_id, e),
        }
    }

    frame.ok_or_else(|| MediaError::Decode(format!("no frame decoded from {}", path.display())))
}

/// 1-based sample index for `offset_secs`, assuming a constant frame rate.
///
/// Offsets at or past the end fall back to the middle of the video.
pub fn target_sample(offset_secs: u32, duration: Duration, sample_count: u32) -> u32 {
    let total = duration.as_secs_f64();
    if sample_count == 0 || total <= 0.0 {
        return 1;
    }
    let at = if f64::from(offset_secs) >= total {
        total / 2.0
    } else {
        f64::from(offset_secs)
    };
    let index = (at / total * f64::from(sample_count)).floor() as u32 + 1;
    index.clamp(1, sample_count)
}

/// Closest sync sample at or before `target`.
///
/// Without a sync sample table every sample is a sync sample.
pub fn sync_sample_at_or_before(target: u32, sync: Option<&[u32]>) -> u32 {
    match sync {
        None => target,
        Some(entries) => entries.iter().copied().filter(|s| *s <= target).max().unwrap_or(1),
    }
}

/// Rewrites length-prefixed NAL units as Annex B, appending to `out`.
pub fn avcc_to_annexb(data: &[u8], out: &mut Vec<u8>) -> Result<(), MediaError> {
    let mut pos = 0usize;
    while pos + 4 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;
        let end = pos
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| MediaError::Decode("truncated NAL unit".to_string()))?;
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(&data[pos..end]);
        pos = end;
    }
    Ok(())
}
