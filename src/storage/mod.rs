//! Catalog persistence.
//!
//! The bot only talks to [`CatalogStore`]; a database engine is an external
//! concern. [`MemoryCatalog`] keeps everything in process.

pub mod memory;
pub mod models;

use async_trait::async_trait;

use crate::download::error::PipelineError;

pub use memory::MemoryCatalog;
pub use models::{
    AdminLog, CatalogStats, Collection, CollectionUpdate, ContentType, DownloadLog, RecordStatus, Video,
};

pub type CatalogResult<T> = Result<T, PipelineError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Validates and stores `collection`, returning its new id.
    async fn create_collection(&self, collection: Collection) -> CatalogResult<String>;

    async fn get_collection(&self, id: &str) -> CatalogResult<Option<Collection>>;

    /// Collections with `status`, newest first, optionally of one type.
    async fn list_collections(
        &self,
        skip: usize,
        limit: usize,
        content_type: Option<ContentType>,
        status: RecordStatus,
    ) -> CatalogResult<Vec<Collection>>;

    /// Returns false if no such collection exists.
    async fn update_collection(&self, id: &str, update: CollectionUpdate) -> CatalogResult<bool>;

    /// Soft delete marks the collection deleted; hard delete removes it and its videos.
    async fn delete_collection(&self, id: &str, soft: bool) -> CatalogResult<bool>;

    /// Stores `video`, returning its new id. Duplicate unique codes are rejected.
    async fn create_video(&self, video: Video) -> CatalogResult<String>;

    async fn get_video_by_code(&self, code: &str) -> CatalogResult<Option<Video>>;

    /// Active videos of a collection ordered by season, then episode.
    async fn collection_videos(&self, collection_id: &str) -> CatalogResult<Vec<Video>>;

    async fn increment_collection_views(&self, collection_id: &str) -> CatalogResult<()>;

    async fn increment_collection_downloads(&self, collection_id: &str) -> CatalogResult<()>;

    async fn increment_video_downloads(&self, video_id: &str) -> CatalogResult<()>;

    async fn log_admin_action(&self, entry: AdminLog) -> CatalogResult<()>;

    async fn log_download(&self, entry: DownloadLog) -> CatalogResult<()>;

    async fn stats(&self) -> CatalogResult<CatalogStats>;
}
