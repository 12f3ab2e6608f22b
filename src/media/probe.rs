//! ffprobe invocation and output parsing.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::core::config;
use crate::media::{MediaError, MediaProbe};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Parses `ffprobe -of json` output into duration and dimensions.
///
/// Container duration wins over stream duration; fractional seconds are
/// rounded. Missing values become 0.
pub fn parse_ffprobe_json(json: &str) -> Result<MediaProbe, MediaError> {
    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| MediaError::Tool(format!("unreadable ffprobe output: {}", e)))?;

    let stream = output.streams.first();
    let duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| stream.and_then(|s| s.duration.as_deref()))
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d.round() as u32)
        .unwrap_or(0);

    Ok(MediaProbe {
        duration_secs: duration,
        width: stream.and_then(|s| s.width).unwrap_or(0),
        height: stream.and_then(|s| s.height).unwrap_or(0),
    })
}

/// Runs ffprobe on the first video stream of `video`.
pub async fn run_ffprobe(bin: &str, video: &Path) -> Result<MediaProbe, MediaError> {
    let output = tokio::time::timeout(
        config::media::tool_timeout(),
        Command::new(bin)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "format=duration:stream=width,height,duration",
                "-of",
                "json",
            ])
            .arg(video)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| MediaError::Timeout(format!("ffprobe on {}", video.display())))?
    .map_err(|e| MediaError::Tool(format!("cannot run {}: {}", bin, e)))?;

    if !output.status.success() {
        return Err(MediaError::Tool(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_output() {
        let json = r#"{
            "programs": [],
            "streams": [{"width": 1920, "height": 1080, "duration": "12.000000"}],
            "format": {"duration": "12.480000"}
        }"#;
        let probe = parse_ffprobe_json(json).unwrap();
        assert_eq!(probe.duration_secs, 12);
        assert_eq!((probe.width, probe.height), (1920, 1080));
    }

    #[test]
    fn test_stream_duration_fallback() {
        let json = r#"{"streams": [{"width": 640, "height": 360, "duration": "59.6"}], "format": {}}"#;
        assert_eq!(parse_ffprobe_json(json).unwrap().duration_secs, 60);
    }

    #[test]
    fn test_missing_values_are_zero() {
        let probe = parse_ffprobe_json("{}").unwrap();
        assert_eq!(probe, MediaProbe::default());

        let json = r#"{"streams": [], "format": {"duration": "N/A"}}"#;
        assert_eq!(parse_ffprobe_json(json).unwrap().duration_secs, 0);
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(parse_ffprobe_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let err = run_ffprobe("/nonexistent/ffprobe", Path::new("x.mp4")).await.unwrap_err();
        assert!(matches!(err, MediaError::Tool(_)));
    }
}
