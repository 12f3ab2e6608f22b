use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::download::quality::QualityTier;

#[derive(Parser)]
#[command(name = "cinevault")]
#[command(author, version, about = "Telegram bot that archives movies and series and serves them by share codes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot (long polling)
    Run,

    /// Download a URL to a local directory without uploading it
    Download {
        /// Video URL (platform page or direct file link)
        url: String,

        /// Quality tier: 480p, 720p, 1080p, 1440p or 4k
        #[arg(short, long, default_value = "720p")]
        quality: QualityTier,

        /// Output directory
        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,

        /// yt-dlp binary
        #[arg(long, default_value = "yt-dlp")]
        ytdl_bin: String,
    },

    /// Show title, duration and available qualities of a URL
    Info {
        url: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// yt-dlp binary
        #[arg(long, default_value = "yt-dlp")]
        ytdl_bin: String,
    },

    /// Probe a local video and optionally write a thumbnail
    Probe {
        file: PathBuf,

        /// Write a thumbnail into this directory
        #[arg(short, long)]
        thumbnail: Option<PathBuf>,

        #[arg(long, default_value = "ffmpeg")]
        ffmpeg_bin: String,

        #[arg(long, default_value = "ffprobe")]
        ffprobe_bin: String,
    },

    /// Generate share codes
    Code {
        /// How many codes to print
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Print deep links for this bot instead of bare codes
        #[arg(long)]
        bot: Option<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
