use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::download::error::PipelineError;
use crate::storage::{
    AdminLog, CatalogResult, CatalogStats, CatalogStore, Collection, CollectionUpdate, ContentType, DownloadLog,
    RecordStatus, Video,
};

const POPULAR_LIMIT: usize = 5;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    videos: HashMap<String, Video>,
    /// unique code -> video id
    codes: HashMap<String, String>,
    admin_logs: Vec<AdminLog>,
    download_logs: Vec<DownloadLog>,
}

/// In-process catalog. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn admin_logs(&self) -> Vec<AdminLog> {
        self.inner.read().await.admin_logs.clone()
    }

    pub async fn download_logs(&self) -> Vec<DownloadLog> {
        self.inner.read().await.download_logs.clone()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn create_collection(&self, mut collection: Collection) -> CatalogResult<String> {
        collection.validate()?;
        let id = new_id();
        let now = Utc::now();
        collection.id = id.clone();
        collection.created_at = now;
        collection.updated_at = now;

        log::info!("📁 Collection '{}' created: {}", collection.name, id);
        self.inner.write().await.collections.insert(id.clone(), collection);
        Ok(id)
    }

    async fn get_collection(&self, id: &str) -> CatalogResult<Option<Collection>> {
        Ok(self.inner.read().await.collections.get(id).cloned())
    }

    async fn list_collections(
        &self,
        skip: usize,
        limit: usize,
        content_type: Option<ContentType>,
        status: RecordStatus,
    ) -> CatalogResult<Vec<Collection>> {
        let inner = self.inner.read().await;
        let mut found: Vec<Collection> = inner
            .collections
            .values()
            .filter(|c| c.status == status)
            .filter(|c| content_type.is_none_or(|t| c.content_type == t))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn update_collection(&self, id: &str, update: CollectionUpdate) -> CatalogResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(collection) = inner.collections.get_mut(id) else {
            return Ok(false);
        };

        let mut updated = collection.clone();
        update.apply(&mut updated);
        updated.validate()?;
        *collection = updated;
        Ok(true)
    }

    async fn delete_collection(&self, id: &str, soft: bool) -> CatalogResult<bool> {
        let mut inner = self.inner.write().await;
        if soft {
            let Some(collection) = inner.collections.get_mut(id) else {
                return Ok(false);
            };
            collection.status = RecordStatus::Deleted;
            collection.updated_at = Utc::now();
            return Ok(true);
        }

        if inner.collections.remove(id).is_none() {
            return Ok(false);
        }
        let orphaned: Vec<(String, String)> = inner
            .videos
            .values()
            .filter(|v| v.collection_id == id)
            .map(|v| (v.id.clone(), v.unique_code.clone()))
            .collect();
        for (video_id, code) in orphaned {
            inner.videos.remove(&video_id);
            inner.codes.remove(&code);
        }
        Ok(true)
    }

    async fn create_video(&self, mut video: Video) -> CatalogResult<String> {
        let mut inner = self.inner.write().await;
        if !inner.collections.contains_key(&video.collection_id) {
            return Err(PipelineError::NotFound(format!("collection {}", video.collection_id)));
        }
        if inner.codes.contains_key(&video.unique_code) {
            return Err(PipelineError::Persistence(format!(
                "unique code {} already exists",
                video.unique_code
            )));
        }

        let id = new_id();
        video.id = id.clone();
        video.created_at = Utc::now();
        inner.codes.insert(video.unique_code.clone(), id.clone());
        log::info!("🎥 Video '{}' created: {}", video.unique_code, id);
        inner.videos.insert(id.clone(), video);
        Ok(id)
    }

    async fn get_video_by_code(&self, code: &str) -> CatalogResult<Option<Video>> {
        let inner = self.inner.read().await;
        Ok(inner.codes.get(code).and_then(|id| inner.videos.get(id)).cloned())
    }

    async fn collection_videos(&self, collection_id: &str) -> CatalogResult<Vec<Video>> {
        let inner = self.inner.read().await;
        let mut videos: Vec<Video> = inner
            .videos
            .values()
            .filter(|v| v.collection_id == collection_id && v.status == RecordStatus::Active)
            .cloned()
            .collect();
        videos.sort_by_key(|v| (v.season, v.episode));
        Ok(videos)
    }

    async fn increment_collection_views(&self, collection_id: &str) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        let collection = inner
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| PipelineError::NotFound(format!("collection {}", collection_id)))?;
        collection.total_views += 1;
        Ok(())
    }

    async fn increment_collection_downloads(&self, collection_id: &str) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        let collection = inner
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| PipelineError::NotFound(format!("collection {}", collection_id)))?;
        collection.total_downloads += 1;
        Ok(())
    }

    async fn increment_video_downloads(&self, video_id: &str) -> CatalogResult<()> {
        let mut inner = self.inner.write().await;
        let video = inner
            .videos
            .get_mut(video_id)
            .ok_or_else(|| PipelineError::NotFound(format!("video {}", video_id)))?;
        video.download_count += 1;
        Ok(())
    }

    async fn log_admin_action(&self, entry: AdminLog) -> CatalogResult<()> {
        log::info!(
            "🔧 Admin {} {} {} {}",
            entry.admin_id,
            entry.action,
            entry.target_type,
            entry.target_id
        );
        self.inner.write().await.admin_logs.push(entry);
        Ok(())
    }

    async fn log_download(&self, entry: DownloadLog) -> CatalogResult<()> {
        self.inner.write().await.download_logs.push(entry);
        Ok(())
    }

    async fn stats(&self) -> CatalogResult<CatalogStats> {
        let inner = self.inner.read().await;
        let today = Utc::now().date_naive();

        let mut popular: Vec<(String, u64)> = inner
            .collections
            .values()
            .filter(|c| c.status == RecordStatus::Active)
            .map(|c| (c.name.clone(), c.total_downloads))
            .collect();
        popular.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        popular.truncate(POPULAR_LIMIT);

        Ok(CatalogStats {
            total_collections: inner
                .collections
                .values()
                .filter(|c| c.status == RecordStatus::Active)
                .count(),
            total_videos: inner
                .videos
                .values()
                .filter(|v| v.status == RecordStatus::Active)
                .count(),
            today_downloads: inner
                .download_logs
                .iter()
                .filter(|l| l.downloaded_at.date_naive() == today)
                .count(),
            popular_collections: popular,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::quality::QualityTier;
    use pretty_assertions::assert_eq;

    fn video(collection_id: &str, code: &str, season: u32, episode: u32) -> Video {
        Video {
            id: String::new(),
            collection_id: collection_id.to_string(),
            unique_code: code.to_string(),
            season,
            episode,
            quality: QualityTier::P720,
            file_size: 1024,
            duration_secs: 60,
            message_id: 10,
            channel_id: -1001,
            file_name: "ep.mp4".to_string(),
            original_url: "https://cdn.example.com/ep.mp4".to_string(),
            download_count: 0,
            status: RecordStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let catalog = MemoryCatalog::new();
        let id = catalog
            .create_collection(Collection::new("Dark", ContentType::Series, 1))
            .await
            .unwrap();

        let fetched = catalog.get_collection(&id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Dark");

        let update = CollectionUpdate {
            genre: Some("thriller".into()),
            ..Default::default()
        };
        assert!(catalog.update_collection(&id, update).await.unwrap());
        assert!(!catalog.update_collection("nope", CollectionUpdate::default()).await.unwrap());

        let bad = CollectionUpdate {
            year: Some(1800),
            ..Default::default()
        };
        assert!(catalog.update_collection(&id, bad).await.is_err());
        assert_eq!(catalog.get_collection(&id).await.unwrap().unwrap().year, None);

        assert!(catalog.delete_collection(&id, true).await.unwrap());
        let listed = catalog
            .list_collections(0, 10, None, RecordStatus::Active)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_collection_rejected() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .create_collection(Collection::new("X", ContentType::Movie, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_videos_by_code_and_order() {
        let catalog = MemoryCatalog::new();
        let cid = catalog
            .create_collection(Collection::new("Dark", ContentType::Series, 1))
            .await
            .unwrap();

        catalog.create_video(video(&cid, "CODE00002", 1, 2)).await.unwrap();
        catalog.create_video(video(&cid, "CODE00001", 1, 1)).await.unwrap();
        catalog.create_video(video(&cid, "CODE00003", 2, 1)).await.unwrap();

        let dup = catalog.create_video(video(&cid, "CODE00001", 3, 1)).await;
        assert!(matches!(dup, Err(PipelineError::Persistence(_))));

        let orphan = catalog.create_video(video("missing", "CODE00009", 1, 1)).await;
        assert!(matches!(orphan, Err(PipelineError::NotFound(_))));

        let found = catalog.get_video_by_code("CODE00003").await.unwrap().unwrap();
        assert_eq!((found.season, found.episode), (2, 1));
        assert!(catalog.get_video_by_code("NOPE").await.unwrap().is_none());

        let order: Vec<_> = catalog
            .collection_videos(&cid)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.unique_code)
            .collect();
        assert_eq!(order, vec!["CODE00001", "CODE00002", "CODE00003"]);

        assert!(catalog.delete_collection(&cid, false).await.unwrap());
        assert!(catalog.get_video_by_code("CODE00001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counters_and_stats() {
        let catalog = MemoryCatalog::new();
        let a = catalog
            .create_collection(Collection::new("Alpha", ContentType::Movie, 1))
            .await
            .unwrap();
        let b = catalog
            .create_collection(Collection::new("Beta", ContentType::Movie, 1))
            .await
            .unwrap();
        let vid = catalog.create_video(video(&b, "BETA00001", 1, 1)).await.unwrap();

        catalog.increment_collection_views(&a).await.unwrap();
        for _ in 0..3 {
            catalog.increment_collection_downloads(&b).await.unwrap();
            catalog.increment_video_downloads(&vid).await.unwrap();
            catalog
                .log_download(DownloadLog {
                    user_id: 5,
                    video_id: vid.clone(),
                    collection_id: b.clone(),
                    quality: QualityTier::P720,
                    file_size: 1024,
                    downloaded_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert!(catalog.increment_video_downloads("nope").await.is_err());

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.total_collections, 2);
        assert_eq!(stats.total_videos, 1);
        assert_eq!(stats.today_downloads, 3);
        assert_eq!(stats.popular_collections[0], ("Beta".to_string(), 3));

        let alpha = catalog.get_collection(&a).await.unwrap().unwrap();
        assert_eq!(alpha.total_views, 1);
        assert_eq!(catalog.get_video_by_code("BETA00001").await.unwrap().unwrap().download_count, 3);
    }
}
