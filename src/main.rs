use anyhow::Result;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use teloxide::prelude::*;

use cinevault::cli::{Cli, Commands};
use cinevault::context::AppContext;
use cinevault::core::config::{self, Config};
use cinevault::core::logging::{init_logger, level_from_env, log_tool_availability};
use cinevault::core::retry::RetryConfig;
use cinevault::core::utils::{format_duration, format_file_size, generate_deeplink, generate_unique_code};
use cinevault::core::worker_pool::WorkerPool;
use cinevault::core::disk;
use cinevault::download::jobs::JobTable;
use cinevault::download::progress::{Progress, ProgressCallback};
use cinevault::download::quality::QualityTier;
use cinevault::download::retriever::Retriever;
use cinevault::download::source::http::HttpSource;
use cinevault::download::source::ytdlp::YtDlpSource;
use cinevault::media::decoder::DecoderStrategy;
use cinevault::media::ffmpeg::FfmpegStrategy;
use cinevault::media::{MediaProcessor, MediaStrategy};
use cinevault::storage::MemoryCatalog;
use cinevault::telegram::{TelegramArchive, create_bot, schema, setup_bot_commands};

/// Parses CLI arguments and dispatches to the subcommand.
///
/// Without a subcommand the bot runs.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    let log_file = std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "cinevault.log".to_string());
    init_logger(&log_file, level_from_env())?;

    match cli.command {
        Some(Commands::Run) | None => run_bot().await,
        Some(Commands::Download {
            url,
            quality,
            output,
            ytdl_bin,
        }) => run_cli_download(url, quality, output, ytdl_bin).await,
        Some(Commands::Info { url, json, ytdl_bin }) => run_cli_info(url, json, ytdl_bin).await,
        Some(Commands::Probe {
            file,
            thumbnail,
            ffmpeg_bin,
            ffprobe_bin,
        }) => run_cli_probe(file, thumbnail, ffmpeg_bin, ffprobe_bin).await,
        Some(Commands::Code { count, bot }) => {
            for _ in 0..count {
                let code = generate_unique_code();
                match &bot {
                    Some(name) => println!("{}", generate_deeplink(name.trim_start_matches('@'), &code)),
                    None => println!("{}", code),
                }
            }
            Ok(())
        }
    }
}

async fn run_bot() -> Result<()> {
    let config = Config::from_env()?;
    log::info!("Starting cinevault as @{}", config.bot_username);

    log_tool_availability(&[
        (config.ytdl_bin.as_str(), "--version"),
        (config.ffmpeg_bin.as_str(), "-version"),
        (config.ffprobe_bin.as_str(), "-version"),
    ])
    .await;

    for dir in [&config.downloads_path, &config.temp_path] {
        fs_err::tokio::create_dir_all(dir).await?;
        let removed = disk::cleanup_partial_files(dir).await;
        if removed > 0 {
            log::info!("Removed {} partial file(s) from {}", removed, dir.display());
        }
    }

    let bot = create_bot(&config)?;
    let transport = Arc::new(TelegramArchive::new(bot.clone(), config.private_channel_id));
    let catalog = Arc::new(MemoryCatalog::new());
    let janitor_dirs = vec![config.downloads_path.clone(), config.temp_path.clone()];
    let ctx = AppContext::new(config, transport, catalog);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to publish bot commands: {}", e);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let janitor = disk::start_cleanup_task(janitor_dirs, stop.clone());

    log::info!("Bot is running (long polling). Press Ctrl+C to stop.");
    Dispatcher::builder(bot, schema(ctx))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Dispatcher shutdown gracefully");
    stop.store(true, Ordering::SeqCst);
    janitor.abort();
    Ok(())
}

fn offline_retriever(ytdl_bin: String) -> Retriever {
    let ytdlp = Arc::new(YtDlpSource::new(
        ytdl_bin,
        std::time::Duration::from_secs(config::DEFAULT_DOWNLOAD_TIMEOUT_SECS),
    ));
    let http = Arc::new(HttpSource::new(RetryConfig::retrieval()));
    Retriever::with_sources(ytdlp, http, config::DEFAULT_MAX_FILE_SIZE, JobTable::new())
}

async fn run_cli_download(url: String, quality: QualityTier, output: PathBuf, ytdl_bin: String) -> Result<()> {
    let retriever = offline_retriever(ytdl_bin);
    let on_progress: ProgressCallback = Arc::new(|p: &Progress| eprintln!("⬇️  {}", p));

    let path = retriever.retrieve(&url, &output, quality, Some(on_progress)).await?;
    let size = fs_err::tokio::metadata(&path).await?.len();
    println!("{} ({})", path.display(), format_file_size(size));
    Ok(())
}

async fn run_cli_info(url: String, json: bool, ytdl_bin: String) -> Result<()> {
    let info = offline_retriever(ytdl_bin).video_info(&url).await?;

    if json {
        let formats: serde_json::Map<String, serde_json::Value> = info
            .formats
            .iter()
            .map(|(tier, f)| {
                (
                    tier.to_string(),
                    serde_json::json!({
                        "format_id": f.format_id,
                        "ext": f.ext,
                        "height": f.height,
                        "filesize": f.filesize.or(f.filesize_approx),
                    }),
                )
            })
            .collect();
        let out = serde_json::json!({
            "title": info.title,
            "duration_secs": info.duration_secs,
            "uploader": info.uploader,
            "thumbnail": info.thumbnail_url,
            "formats": formats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Title: {}", info.title);
    if let Some(uploader) = &info.uploader {
        println!("Uploader: {}", uploader);
    }
    println!("Duration: {}", format_duration(u64::from(info.duration_secs)));
    for (tier, format) in &info.formats {
        let size = format
            .filesize
            .or(format.filesize_approx)
            .map(|s| format_file_size(s.max(0.0) as u64))
            .unwrap_or_else(|| "?".to_string());
        println!("  {:>6}  {} ({})", tier.to_string(), format.format_id, size);
    }
    Ok(())
}

async fn run_cli_probe(file: PathBuf, thumbnail: Option<PathBuf>, ffmpeg_bin: String, ffprobe_bin: String) -> Result<()> {
    let pool = WorkerPool::new(config::media::WORKER_POOL_SIZE);
    let strategies: Vec<Box<dyn MediaStrategy>> = vec![
        Box::new(FfmpegStrategy::new(ffmpeg_bin, ffprobe_bin)),
        Box::new(DecoderStrategy::new(pool.clone())),
    ];
    let thumb_dir = thumbnail.clone().unwrap_or_else(std::env::temp_dir);
    let media = MediaProcessor::with_strategies(strategies, pool, thumb_dir);

    let asset = media.inspect(&file).await?;
    println!("File: {}", asset.path.display());
    println!("Size: {}", format_file_size(asset.size));
    println!("Type: {}", asset.mime);
    if asset.is_video {
        println!("Duration: {}", format_duration(u64::from(asset.duration_secs)));
        println!("Dimensions: {}x{}", asset.width, asset.height);
    }

    if thumbnail.is_some() {
        match media
            .make_thumbnail(&file, config::media::THUMBNAIL_OFFSET_SECS)
            .await
        {
            Some(path) => println!("Thumbnail: {}", path.display()),
            None => println!("Thumbnail: none (no strategy could extract a frame)"),
        }
    }
    Ok(())
}
