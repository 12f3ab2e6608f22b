//! Dispatcher schema and command handlers.
//!
//! The surface is deliberately thin: parse, gate (admin / rate limit), call
//! into [`crate::download::pipeline`], report.

use futures_util::FutureExt;
use std::str::FromStr;
use std::sync::Arc;
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{Message, MessageId, ParseMode};
use teloxide::utils::command::BotCommands;

use crate::context::AppContext;
use crate::core::utils::{escape_html, format_file_size, generate_deeplink, parse_deeplink};
use crate::download::error::PipelineError;
use crate::download::jobs::RetrievalJob;
use crate::download::pipeline::{IngestRequest, Stage, StageCallback, deliver, ingest};
use crate::download::quality::QualityTier;
use crate::storage::Video;
use crate::telegram::bot::Command;
use crate::telegram::messages::{self, Lang, failure_text};
use crate::telegram::status::StatusEditor;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn schema(ctx: AppContext) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let ctx = ctx.clone();
            async move { handle_command(&bot, &msg, cmd, &ctx).await }
        },
    ))
}

pub async fn handle_command(bot: &Bot, msg: &Message, cmd: Command, ctx: &AppContext) -> Result<(), HandlerError> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0;
    let lang = Lang::from_code(user.language_code.as_deref());
    let admin = i64::try_from(user_id).is_ok_and(|id| ctx.config.is_admin(id));
    log::info!("🎯 {:?} from user {} in chat {}", cmd, user_id, msg.chat.id);

    if !admin && !ctx.allow_request(user_id).await {
        log::warn!("Rate limit hit by user {}", user_id);
        bot.send_message(msg.chat.id, messages::rate_limited(lang)).await?;
        return Ok(());
    }

    match cmd {
        Command::Start(payload) => match parse_deeplink(&payload) {
            Some(code) => handle_delivery(bot, msg, ctx, &code, lang).await?,
            None => {
                bot.send_message(msg.chat.id, messages::welcome(lang)).await?;
            }
        },
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Collection(id) => show_collection(bot, msg, ctx, id.trim(), lang).await?,
        Command::Upload(_) | Command::Jobs | Command::Cancel(_) | Command::Stats if !admin => {
            bot.send_message(msg.chat.id, messages::admin_only(lang)).await?;
        }
        Command::Upload(args) => start_upload(bot, msg, ctx, &args, user_id as i64, lang).await?,
        Command::Jobs => {
            let jobs = ctx.retriever.active_jobs();
            let text = if jobs.is_empty() {
                "No downloads running.".to_string()
            } else {
                jobs.iter().map(format_job).collect::<Vec<_>>().join("\n")
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Cancel(arg) => {
            let text = match arg.trim().trim_start_matches('#').parse::<u64>() {
                Ok(id) if ctx.retriever.cancel(id) => format!("🛑 Job #{} will stop at the next checkpoint.", id),
                Ok(id) => format!("No running job #{}.", id),
                Err(_) => "Usage: /cancel <job id>".to_string(),
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Stats => {
            let stats = ctx.catalog.stats().await?;
            let mut text = format!(
                "📊 Collections: {}\nVideos: {}\nDownloads today: {}",
                stats.total_collections, stats.total_videos, stats.today_downloads
            );
            for (name, downloads) in &stats.popular_collections {
                text.push_str(&format!("\n• {}: {}", name, downloads));
            }
            bot.send_message(msg.chat.id, text).await?;
        }
    }
    Ok(())
}

async fn handle_delivery(bot: &Bot, msg: &Message, ctx: &AppContext, code: &str, lang: Lang) -> Result<(), HandlerError> {
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or_default();
    if let Err(e) = deliver(ctx, code, user_id, msg.chat.id).await {
        log::warn!("Delivery of {} to {} failed [{}]: {}", code, user_id, e.subcategory(), e);
        bot.send_message(msg.chat.id, failure_text(&e, lang)).await?;
    }
    Ok(())
}

async fn show_collection(bot: &Bot, msg: &Message, ctx: &AppContext, id: &str, lang: Lang) -> Result<(), HandlerError> {
    let Some(collection) = ctx.catalog.get_collection(id).await? else {
        let err = PipelineError::NotFound(format!("collection {}", id));
        bot.send_message(msg.chat.id, failure_text(&err, lang)).await?;
        return Ok(());
    };
    if let Err(e) = ctx.catalog.increment_collection_views(&collection.id).await {
        log::warn!("View counter for {} not updated: {}", collection.id, e);
    }

    let mut text = format!("🎬 <b>{}</b>", escape_html(&collection.name));
    if let Some(year) = collection.year {
        text.push_str(&format!(" ({})", year));
    }
    if !collection.genre.is_empty() {
        text.push_str(&format!("\n🎭 {}", escape_html(&collection.genre)));
    }
    if let Some(rating) = collection.imdb_rating {
        text.push_str(&format!("\n⭐ {:.1}", rating));
    }
    if !collection.description.is_empty() {
        text.push_str(&format!("\n\n{}", escape_html(&collection.description)));
    }

    let videos = ctx.catalog.collection_videos(&collection.id).await?;
    if !videos.is_empty() {
        text.push('\n');
    }
    for video in &videos {
        let link = generate_deeplink(&ctx.config.bot_username, &video.unique_code);
        text.push_str(&format!(
            "\n<a href=\"{}\">{}</a> · {} · {}",
            link,
            escape_html(&video.display_title(&collection.name)),
            video.quality,
            format_file_size(video.file_size)
        ));
    }

    bot.send_message(msg.chat.id, text).parse_mode(ParseMode::Html).await?;
    Ok(())
}

/// Arguments of `/upload <collection_id> <quality> <url> [season] [episode]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadArgs {
    pub collection_id: String,
    pub tier: QualityTier,
    pub url: String,
    pub season: u32,
    pub episode: u32,
}

pub fn parse_upload_args(raw: &str) -> Result<UploadArgs, String> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    let [collection_id, quality, url, rest @ ..] = parts.as_slice() else {
        return Err(messages::UPLOAD_USAGE.to_string());
    };
    if rest.len() > 2 {
        return Err(messages::UPLOAD_USAGE.to_string());
    }

    let tier = QualityTier::from_str(quality).map_err(|_| format!("Unknown quality {:?}", quality))?;
    let number = |raw: Option<&&str>, what: &str| -> Result<u32, String> {
        match raw {
            None => Ok(1),
            Some(s) => s
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| format!("{} must be a positive number", what)),
        }
    };

    Ok(UploadArgs {
        collection_id: collection_id.to_string(),
        tier,
        url: url.to_string(),
        season: number(rest.first(), "Season")?,
        episode: number(rest.get(1), "Episode")?,
    })
}

async fn start_upload(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    raw: &str,
    admin_id: i64,
    lang: Lang,
) -> Result<(), HandlerError> {
    let args = match parse_upload_args(raw) {
        Ok(args) => args,
        Err(usage) => {
            bot.send_message(msg.chat.id, usage).await?;
            return Ok(());
        }
    };

    let status = bot
        .send_message(msg.chat.id, format!("⏳ Queued {} ({})", args.url, args.tier))
        .await?;
    let request = IngestRequest {
        collection_id: args.collection_id,
        url: args.url,
        tier: args.tier,
        season: args.season,
        episode: args.episode,
        admin_id,
    };

    let bot = bot.clone();
    let ctx = ctx.clone();
    let chat = msg.chat.id;
    tokio::spawn(async move {
        run_upload(bot, ctx, chat, status.id, request, lang).await;
    });
    Ok(())
}

async fn run_upload(bot: Bot, ctx: AppContext, chat: ChatId, status: MessageId, request: IngestRequest, lang: Lang) {
    let edit_bot = bot.clone();
    let editor = StatusEditor::spawn(Arc::new(move |text: String| {
        let bot = edit_bot.clone();
        async move {
            if let Err(e) = bot.edit_message_text(chat, status, text).await {
                log::debug!("Status edit skipped: {}", e);
            }
        }
        .boxed()
    }));

    let publisher = editor.publisher();
    let on_progress: StageCallback = Arc::new(move |stage, progress| {
        let icon = match stage {
            Stage::Download => "⬇️",
            Stage::Upload => "📤",
        };
        publisher.publish(format!("{} {}: {}", icon, stage, progress));
    });

    let result = ingest(&ctx, &request, Some(on_progress)).await;
    if let Err(e) = &result {
        log::error!("Ingest of {} failed [{}]: {}", request.url, e.subcategory(), e);
    }
    editor
        .finish(upload_result_text(&result, &ctx.config.bot_username, lang))
        .await;
}

/// Final status text of an `/upload`, in the admin's language on failure.
pub fn upload_result_text(result: &Result<Video, PipelineError>, bot_username: &str, lang: Lang) -> String {
    match result {
        Ok(video) => format!(
            "✅ Archived\nCode: {}\nLink: {}",
            video.unique_code,
            generate_deeplink(bot_username, &video.unique_code)
        ),
        Err(e) => format!("{}\n{}", failure_text(e, lang), e),
    }
}

/// One line of `/jobs` output.
pub fn format_job(job: &RetrievalJob) -> String {
    format!(
        "#{} [{}] {}% {} {} ({}s)",
        job.id,
        job.status,
        job.progress,
        job.tier,
        job.url,
        job.started.elapsed().as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::jobs::JobStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_upload_args_full() {
        let args = parse_upload_args("abc123 1080p https://cdn.example.com/ep.mp4 2 7").unwrap();
        assert_eq!(
            args,
            UploadArgs {
                collection_id: "abc123".into(),
                tier: QualityTier::P1080,
                url: "https://cdn.example.com/ep.mp4".into(),
                season: 2,
                episode: 7,
            }
        );
    }

    #[test]
    fn test_parse_upload_args_defaults() {
        let args = parse_upload_args("  abc  4K  https://youtu.be/x ").unwrap();
        assert_eq!(args.tier, QualityTier::P2160);
        assert_eq!((args.season, args.episode), (1, 1));
    }

    #[test]
    fn test_parse_upload_args_errors() {
        assert!(parse_upload_args("").is_err());
        assert!(parse_upload_args("abc 720p").is_err());
        assert!(parse_upload_args("abc 999p https://x.org/a.mp4").is_err());
        assert!(parse_upload_args("abc 720p https://x.org/a.mp4 0").is_err());
        assert!(parse_upload_args("abc 720p https://x.org/a.mp4 1 x").is_err());
        assert!(parse_upload_args("abc 720p https://x.org/a.mp4 1 2 3").is_err());
    }

    #[test]
    fn test_format_job() {
        let job = RetrievalJob {
            id: 4,
            url: "https://x.org/a.mp4".into(),
            tier: QualityTier::P720,
            status: JobStatus::Downloading,
            progress: 42,
            started: tokio::time::Instant::now(),
        };
        assert_eq!(format_job(&job), "#4 [downloading] 42% 720p https://x.org/a.mp4 (0s)");
    }

    #[test]
    fn test_upload_failure_text_follows_admin_language() {
        let result: Result<Video, PipelineError> = Err(PipelineError::NotFound("Video unavailable".into()));

        let fa = upload_result_text(&result, "cinevault_bot", Lang::Fa);
        assert!(fa.starts_with("❌ یافت نشد"), "{}", fa);
        assert!(fa.contains("Video unavailable"));

        let en = upload_result_text(&result, "cinevault_bot", Lang::En);
        assert!(en.starts_with("❌ Not found"), "{}", en);
    }

    #[test]
    fn test_upload_success_text_has_deeplink() {
        let video = Video {
            id: "1".into(),
            collection_id: "abc".into(),
            unique_code: "ABCDEFGH1".into(),
            season: 1,
            episode: 1,
            quality: QualityTier::P720,
            file_size: 1024,
            duration_secs: 60,
            message_id: 10,
            channel_id: -1001,
            file_name: "ep.mp4".into(),
            original_url: "https://cdn.example.com/ep.mp4".into(),
            download_count: 0,
            status: Default::default(),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(
            upload_result_text(&Ok(video), "cinevault_bot", Lang::Fa),
            "✅ Archived\nCode: ABCDEFGH1\nLink: https://t.me/cinevault_bot?start=v_ABCDEFGH1"
        );
    }
}
