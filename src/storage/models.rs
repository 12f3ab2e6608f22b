//! Catalog records: collections, videos and the audit logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::download::error::PipelineError;
use crate::download::quality::QualityTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Movie,
    Series,
    MiniSeries,
    Documentary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
    Deleted,
    Pending,
}

/// A movie, series or documentary grouping one or more videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub content_type: ContentType,
    pub year: Option<i32>,
    pub genre: String,
    pub imdb_rating: Option<f32>,
    pub description: String,
    pub cover_file_id: Option<String>,
    pub trailer_file_id: Option<String>,
    pub tags: Vec<String>,
    pub age_rating: String,
    pub subtitle_languages: Vec<String>,
    pub status: RecordStatus,
    pub created_by: i64,
    pub total_views: u64,
    pub total_downloads: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    /// A fresh, active collection. The id is assigned by the store.
    pub fn new(name: impl Into<String>, content_type: ContentType, created_by: i64) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            content_type,
            year: None,
            genre: String::new(),
            imdb_rating: None,
            description: String::new(),
            cover_file_id: None,
            trailer_file_id: None,
            tags: Vec::new(),
            age_rating: "PG".to_string(),
            subtitle_languages: Vec::new(),
            status: RecordStatus::Active,
            created_by,
            total_views: 0,
            total_downloads: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name of at least 2 characters, year in 1900..=2030, rating in 0..=10.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().chars().count() < 2 {
            return Err(PipelineError::InvalidInput("collection name is too short".to_string()));
        }
        if let Some(year) = self.year
            && !(1900..=2030).contains(&year)
        {
            return Err(PipelineError::InvalidInput(format!("year {} is out of range", year)));
        }
        if let Some(rating) = self.imdb_rating
            && !(0.0..=10.0).contains(&rating)
        {
            return Err(PipelineError::InvalidInput(format!("rating {} is out of range", rating)));
        }
        Ok(())
    }
}

/// Partial update of a collection; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct CollectionUpdate {
    pub name: Option<String>,
    pub content_type: Option<ContentType>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub imdb_rating: Option<f32>,
    pub description: Option<String>,
    pub cover_file_id: Option<String>,
    pub trailer_file_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<RecordStatus>,
}

impl CollectionUpdate {
    pub fn apply(self, collection: &mut Collection) {
        if let Some(v) = self.name {
            collection.name = v;
        }
        if let Some(v) = self.content_type {
            collection.content_type = v;
        }
        if let Some(v) = self.year {
            collection.year = Some(v);
        }
        if let Some(v) = self.genre {
            collection.genre = v;
        }
        if let Some(v) = self.imdb_rating {
            collection.imdb_rating = Some(v);
        }
        if let Some(v) = self.description {
            collection.description = v;
        }
        if let Some(v) = self.cover_file_id {
            collection.cover_file_id = Some(v);
        }
        if let Some(v) = self.trailer_file_id {
            collection.trailer_file_id = Some(v);
        }
        if let Some(v) = self.tags {
            collection.tags = v;
        }
        if let Some(v) = self.status {
            collection.status = v;
        }
        collection.updated_at = Utc::now();
    }
}

/// One archived file, addressable by its unique code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub collection_id: String,
    pub unique_code: String,
    pub season: u32,
    pub episode: u32,
    pub quality: QualityTier,
    pub file_size: u64,
    pub duration_secs: u32,
    /// Message id inside the archive channel
    pub message_id: i32,
    pub channel_id: i64,
    pub file_name: String,
    pub original_url: String,
    pub download_count: u64,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

impl Video {
    /// `Name - S01E02` for episodes, plain name for single films.
    pub fn display_title(&self, collection_name: &str) -> String {
        if self.season > 1 || self.episode > 1 {
            format!("{} - S{:02}E{:02}", collection_name, self.season, self.episode)
        } else {
            collection_name.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadLog {
    pub user_id: i64,
    pub video_id: String,
    pub collection_id: String,
    pub quality: QualityTier,
    pub file_size: u64,
    pub downloaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminLog {
    pub admin_id: i64,
    pub action: String,
    /// `collection`, `video` or `user`
    pub target_type: String,
    pub target_id: String,
    pub description: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AdminLog {
    pub fn new(admin_id: i64, action: &str, target_type: &str, target_id: &str, description: impl Into<String>) -> Self {
        Self {
            admin_id,
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
            description: description.into(),
            details: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(map) = &mut self.details {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total_collections: usize,
    pub total_videos: usize,
    pub today_downloads: usize,
    /// Top collections by downloads: (name, downloads)
    pub popular_collections: Vec<(String, u64)>,
}
