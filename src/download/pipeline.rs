//! End-to-end flows built from the retrieval, relay and catalog pieces.
//!
//! - [`ingest`]: admin URL → local file → archive channel → catalog entry
//! - [`deliver`]: share code → catalog entry → copy into the user's chat

use std::sync::Arc;
use teloxide::types::{ChatId, MessageId};

use crate::context::AppContext;
use crate::core::disk::safe_delete_file;
use crate::core::utils::{escape_html, format_duration, format_file_size, generate_unique_code};
use crate::download::error::PipelineError;
use crate::download::progress::{Progress, ProgressCallback};
use crate::download::quality::QualityTier;
use crate::storage::{AdminLog, DownloadLog, RecordStatus, Video};

/// Attempts at drawing a share code that is not taken yet.
const CODE_ATTEMPTS: usize = 5;

/// Which half of an ingest a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Download,
    Upload,
}

pub type StageCallback = Arc<dyn Fn(Stage, &Progress) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub collection_id: String,
    pub url: String,
    pub tier: QualityTier,
    pub season: u32,
    pub episode: u32,
    pub admin_id: i64,
}

fn stage_callback(on_progress: &Option<StageCallback>, stage: Stage) -> Option<ProgressCallback> {
    on_progress.clone().map(|cb| -> ProgressCallback { Arc::new(move |p: &Progress| cb(stage, p)) })
}

/// Downloads `request.url`, archives it and records it in its collection.
///
/// The local copy is removed whether or not the upload succeeds.
pub async fn ingest(
    ctx: &AppContext,
    request: &IngestRequest,
    on_progress: Option<StageCallback>,
) -> Result<Video, PipelineError> {
    let collection = ctx
        .catalog
        .get_collection(&request.collection_id)
        .await?
        .filter(|c| c.status != RecordStatus::Deleted)
        .ok_or_else(|| PipelineError::NotFound(format!("collection {}", request.collection_id)))?;

    let path = ctx
        .retriever
        .retrieve(
            &request.url,
            &ctx.config.downloads_path,
            request.tier,
            stage_callback(&on_progress, Stage::Download),
        )
        .await?;

    let result = archive(ctx, request, &collection.name, &path, on_progress).await;
    safe_delete_file(&path).await;
    let video = result?;

    let entry = AdminLog::new(
        request.admin_id,
        "upload_video",
        "video",
        &video.id,
        format!("{} added to {}", video.unique_code, collection.name),
    )
    .with_detail("url", request.url.clone())
    .with_detail("quality", request.tier.to_string())
    .with_detail("file_size", video.file_size);
    if let Err(e) = ctx.catalog.log_admin_action(entry).await {
        log::warn!("Admin log for {} not written: {}", video.unique_code, e);
    }

    Ok(video)
}

async fn archive(
    ctx: &AppContext,
    request: &IngestRequest,
    collection_name: &str,
    path: &std::path::Path,
    on_progress: Option<StageCallback>,
) -> Result<Video, PipelineError> {
    let asset = ctx.media.inspect(path).await?;

    let mut draft = Video {
        id: String::new(),
        collection_id: request.collection_id.clone(),
        unique_code: String::new(),
        season: request.season.max(1),
        episode: request.episode.max(1),
        quality: request.tier,
        file_size: asset.size,
        duration_secs: asset.duration_secs,
        message_id: 0,
        channel_id: ctx.config.private_channel_id,
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        original_url: request.url.clone(),
        download_count: 0,
        status: RecordStatus::Active,
        created_at: chrono::Utc::now(),
    };

    let caption = build_caption(&draft.display_title(collection_name), &draft);
    let message_id = ctx
        .relayer
        .relay_asset(&asset, &caption, stage_callback(&on_progress, Stage::Upload))
        .await?;

    draft.message_id = message_id.0;
    draft.unique_code = fresh_code(ctx).await?;
    draft.id = ctx.catalog.create_video(draft.clone()).await?;
    log::info!("📦 {} archived as {} (message {})", draft.file_name, draft.unique_code, draft.message_id);
    Ok(draft)
}

async fn fresh_code(ctx: &AppContext) -> Result<String, PipelineError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_unique_code();
        if ctx.catalog.get_video_by_code(&code).await?.is_none() {
            return Ok(code);
        }
        log::warn!("Share code collision on {}, drawing again", code);
    }
    Err(PipelineError::Persistence("could not draw an unused share code".to_string()))
}

/// HTML caption for the archive channel.
pub fn build_caption(title: &str, video: &Video) -> String {
    let mut caption = format!("<b>{}</b>\n🎞 {}", escape_html(title), video.quality);
    if video.file_size > 0 {
        caption.push_str(&format!(" · {}", format_file_size(video.file_size)));
    }
    if video.duration_secs > 0 {
        caption.push_str(&format!(" · {}", format_duration(u64::from(video.duration_secs))));
    }
    caption
}

/// Sends the video behind `code` to `chat` and records the download.
pub async fn deliver(ctx: &AppContext, code: &str, user_id: i64, chat: ChatId) -> Result<Video, PipelineError> {
    let code = code.trim().to_ascii_uppercase();
    let video = ctx
        .catalog
        .get_video_by_code(&code)
        .await?
        .filter(|v| v.status == RecordStatus::Active)
        .ok_or_else(|| PipelineError::NotFound(format!("video code {}", code)))?;

    ctx.relayer
        .transport()
        .copy_to(chat, MessageId(video.message_id))
        .await?;

    // Counters are best effort once the user has the file
    if let Err(e) = ctx.catalog.increment_video_downloads(&video.id).await {
        log::warn!("Download counter for {} not updated: {}", video.unique_code, e);
    }
    if let Err(e) = ctx.catalog.increment_collection_downloads(&video.collection_id).await {
        log::warn!("Collection counter for {} not updated: {}", video.collection_id, e);
    }
    let entry = DownloadLog {
        user_id,
        video_id: video.id.clone(),
        collection_id: video.collection_id.clone(),
        quality: video.quality,
        file_size: video.file_size,
        downloaded_at: chrono::Utc::now(),
    };
    if let Err(e) = ctx.catalog.log_download(entry).await {
        log::warn!("Download log for {} not written: {}", video.unique_code, e);
    }

    log::info!("🎬 Delivered {} to user {}", video.unique_code, user_id);
    Ok(video)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption() {
        let video = Video {
            id: String::new(),
            collection_id: "c".into(),
            unique_code: String::new(),
            season: 1,
            episode: 1,
            quality: QualityTier::P1080,
            file_size: 1536,
            duration_secs: 3725,
            message_id: 0,
            channel_id: 0,
            file_name: String::new(),
            original_url: String::new(),
            download_count: 0,
            status: RecordStatus::Active,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(
            build_caption("Tom & Jerry", &video),
            "<b>Tom &amp; Jerry</b>\n🎞 1080p · 1.50 KB · 1:02:05"
        );
    }
}
