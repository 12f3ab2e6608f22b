//! Progress reporting for retrievals and uploads.

use std::fmt;
use std::sync::Arc;

use crate::core::utils::format_file_size;

/// Parsed yt-dlp progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    pub percent: u8,
    pub speed_mbs: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub current_size: Option<u64>,
    pub total_size: Option<u64>,
}

/// A progress event delivered to callers of `retrieve` and `relay`.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// Byte counts from a direct stream or an upload
    Bytes { done: u64, total: Option<u64> },
    /// Parsed extractor output
    Extractor(ProgressInfo),
}

impl Progress {
    /// Completion in percent, if the total is known.
    pub fn percent(&self) -> Option<u8> {
        match self {
            Progress::Bytes { done, total } => match total {
                Some(total) if *total > 0 => Some(((*done as f64 / *total as f64) * 100.0).clamp(0.0, 100.0) as u8),
                _ => None,
            },
            Progress::Extractor(info) => Some(info.percent),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Bytes { done, total: Some(total) } => write!(
                f,
                "{} / {} ({}%)",
                format_file_size(*done),
                format_file_size(*total),
                self.percent().unwrap_or(0)
            ),
            Progress::Bytes { done, total: None } => write!(f, "{}", format_file_size(*done)),
            Progress::Extractor(info) => {
                write!(f, "{}%", info.percent)?;
                if let Some(total) = info.total_size {
                    write!(f, " of {}", format_file_size(total))?;
                }
                if let Some(speed) = info.speed_mbs {
                    write!(f, " at {:.2} MB/s", speed)?;
                }
                if let Some(eta) = info.eta_seconds {
                    write!(f, ", ETA {}", crate::core::utils::format_duration(eta))?;
                }
                Ok(())
            }
        }
    }
}

/// Progress sink. Called from the task doing the work; must not block.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Forwards progress in steps of at least `step` percent.
///
/// Events without a known percentage are forwarded at most once per
/// `unknown_step_bytes`.
pub struct ProgressThrottle {
    callback: Option<ProgressCallback>,
    step: u8,
    last_percent: Option<u8>,
    unknown_step_bytes: u64,
    last_bytes: u64,
}

impl ProgressThrottle {
    pub fn new(callback: Option<ProgressCallback>, step: u8) -> Self {
        Self {
            callback,
            step: step.max(1),
            last_percent: None,
            unknown_step_bytes: 5 * 1024 * 1024,
            last_bytes: 0,
        }
    }

    pub fn report(&mut self, progress: Progress) {
        let Some(callback) = &self.callback else {
            return;
        };

        match progress.percent() {
            Some(percent) => {
                let due = match self.last_percent {
                    None => true,
                    Some(last) => percent >= last.saturating_add(self.step) || (percent == 100 && last != 100),
                };
                if due {
                    self.last_percent = Some(percent);
                    callback(&progress);
                }
            }
            None => {
                if let Progress::Bytes { done, .. } = progress {
                    if done >= self.last_bytes + self.unknown_step_bytes {
                        self.last_bytes = done;
                        callback(&progress);
                    }
                }
            }
        }
    }
}

/// Parses progress from a yt-dlp output line
/// Example: "[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10"
pub fn parse_progress(line: &str) -> Option<ProgressInfo> {
    if !line.contains("[download]") {
        return None;
    }

    if !line.contains('%') {
        // e.g. "[download] Destination: ..."
        log::trace!("Download line without percent: {}", line);
        return None;
    }

    let mut percent = None;
    let mut speed_mbs = None;
    let mut eta_seconds = None;
    let mut total_size = None;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if part.ends_with('%') {
            if let Ok(p) = part.trim_end_matches('%').parse::<f32>() {
                percent = Some(p.clamp(0.0, 100.0) as u8);
            }
        }

        let next = parts.get(i + 1);

        // "of 10.00MiB" or "of ~10.00MiB" for estimates
        if *part == "of" {
            if let Some(size_bytes) = next.and_then(|s| parse_size(s.trim_start_matches('~'))) {
                total_size = Some(size_bytes);
            }
        }

        // "at 500.00KiB/s"
        if *part == "at" {
            if let Some(speed) = next.and_then(|s| parse_size(s)) {
                speed_mbs = Some(speed as f64 / (1024.0 * 1024.0));
            }
        }

        // "ETA 00:10" or "ETA 1:02:03"
        if *part == "ETA" {
            if let Some(eta) = next.and_then(|s| parse_eta(s)) {
                eta_seconds = Some(eta);
            }
        }
    }

    let p = percent?;
    let current_size = total_size.map(|total| (total as f64 * (p as f64 / 100.0)) as u64);

    Some(ProgressInfo {
        percent: p,
        speed_mbs,
        eta_seconds,
        current_size,
        total_size,
    })
}

/// Parses sizes like "10.00MiB", "500.00KiB/s" or "1.2GiB"
fn parse_size(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim_end_matches("/s");
    let units: [(&str, f64); 4] = [
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("B", 1.0),
    ];
    units.iter().find_map(|(suffix, factor)| {
        size_str
            .strip_suffix(suffix)
            .and_then(|n| n.parse::<f64>().ok())
            .map(|n| (n * factor) as u64)
    })
}

/// Parses ETA like "00:10" or "1:02:03"
fn parse_eta(eta_str: &str) -> Option<u64> {
    eta_str
        .split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|v| acc * 60 + v))
        .filter(|_| eta_str.contains(':'))
}
