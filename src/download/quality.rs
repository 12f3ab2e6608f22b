//! Quality tiers and yt-dlp format selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Target resolution of a retrieval.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum QualityTier {
    #[strum(to_string = "480p")]
    #[serde(rename = "480p")]
    P480,
    #[default]
    #[strum(to_string = "720p")]
    #[serde(rename = "720p")]
    P720,
    #[strum(to_string = "1080p")]
    #[serde(rename = "1080p")]
    P1080,
    #[strum(to_string = "1440p")]
    #[serde(rename = "1440p")]
    P1440,
    #[strum(to_string = "4k", serialize = "2160p")]
    #[serde(rename = "4k", alias = "2160p")]
    P2160,
}

impl QualityTier {
    /// Pixel height of the tier
    pub fn height(self) -> u32 {
        match self {
            QualityTier::P480 => 480,
            QualityTier::P720 => 720,
            QualityTier::P1080 => 1080,
            QualityTier::P1440 => 1440,
            QualityTier::P2160 => 2160,
        }
    }

    /// Buckets a pixel height into the lowest tier that is at least as tall.
    ///
    /// Anything up to 480 (including unknown, `0`) is 480p; anything above
    /// 1440 is 4k.
    pub fn from_height(height: u32) -> Self {
        QualityTier::iter()
            .find(|tier| height <= tier.height())
            .unwrap_or(QualityTier::P2160)
    }
}

/// One entry of the `formats` array in `yt-dlp -J` output.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FormatInfo {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub filesize: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub tbr: Option<f64>,
    #[serde(default)]
    pub format_note: Option<String>,
}

impl FormatInfo {
    /// Anything yt-dlp does not mark as audio-only. Generic extractors often
    /// leave out both `vcodec` and `height`.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(codec) if codec != "none")
    }

    /// Exact size if known, otherwise yt-dlp's estimate.
    pub fn size_bytes(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx).map(|s| s.max(0.0) as u64)
    }

    /// Format selector to pass to `yt-dlp -f`.
    ///
    /// Video-only formats are merged with the best audio track when one
    /// exists, and downloaded bare otherwise.
    pub fn selector(&self) -> String {
        if self.has_audio() {
            self.format_id.clone()
        } else {
            format!("{}+bestaudio/{}", self.format_id, self.format_id)
        }
    }
}

/// The subset of `yt-dlp -J` output the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractorInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub filesize: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    #[serde(default)]
    pub formats: Vec<FormatInfo>,
}

impl ExtractorInfo {
    /// Size estimate for `format`, falling back to the top-level fields.
    pub fn size_for(&self, format: &FormatInfo) -> Option<u64> {
        format
            .size_bytes()
            .or_else(|| self.filesize.or(self.filesize_approx).map(|s| s.max(0.0) as u64))
    }
}

/// Picks the format to download for `tier`.
///
/// The candidate is the tallest video format not above the tier height; if
/// every format is taller, the shortest one is used. Among equal heights an
/// mp4 with audio wins, then the higher bitrate. When no video format reports
/// a height, the best-ranked heightless one is taken.
pub fn select_format(formats: &[FormatInfo], tier: QualityTier) -> Option<&FormatInfo> {
    let video: Vec<&FormatInfo> = formats.iter().filter(|f| f.has_video()).collect();
    let target = tier.height();

    let chosen_height = video
        .iter()
        .filter_map(|f| f.height)
        .filter(|h| *h <= target)
        .max()
        .or_else(|| video.iter().filter_map(|f| f.height).min());

    video
        .into_iter()
        .filter(|f| f.height == chosen_height)
        .max_by(|a, b| rank(a).partial_cmp(&rank(b)).unwrap_or(std::cmp::Ordering::Equal))
}

fn rank(format: &FormatInfo) -> (bool, bool, f64) {
    (
        format.ext.as_deref() == Some("mp4"),
        format.has_audio(),
        format.tbr.unwrap_or(0.0),
    )
}

/// Best format per tier, for tiers the source actually offers.
///
/// Formats are bucketed by [`QualityTier::from_height`], heightless ones into
/// 480p; inside a bucket the taller format wins, then the same ranking as
/// [`select_format`].
pub fn formats_by_tier(formats: &[FormatInfo]) -> BTreeMap<QualityTier, FormatInfo> {
    let mut best: BTreeMap<QualityTier, FormatInfo> = BTreeMap::new();
    for format in formats.iter().filter(|f| f.has_video()) {
        let tier = QualityTier::from_height(format.height.unwrap_or(0));
        let replace = match best.get(&tier) {
            None => true,
            Some(current) => (format.height, rank(format)) > (current.height, rank(current)),
        };
        if replace {
            best.insert(tier, format.clone());
        }
    }
    best
}
