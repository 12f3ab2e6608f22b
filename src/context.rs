//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::core::config::{self, Config};
use crate::core::rate_limiter::RateLimiter;
use crate::core::worker_pool::WorkerPool;
use crate::download::jobs::JobTable;
use crate::download::retriever::Retriever;
use crate::download::send::Relayer;
use crate::media::MediaProcessor;
use crate::storage::CatalogStore;
use crate::telegram::archive::ArchiveTransport;

/// Owns every long-lived service. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub retriever: Arc<Retriever>,
    pub media: Arc<MediaProcessor>,
    pub relayer: Arc<Relayer>,
    pub rate_limiter: RateLimiter,
    pub catalog: Arc<dyn CatalogStore>,
}

impl AppContext {
    /// Wires the pipeline around an upload transport and a catalog.
    pub fn new(config: Config, transport: Arc<dyn ArchiveTransport>, catalog: Arc<dyn CatalogStore>) -> Self {
        let pool = WorkerPool::new(config::media::WORKER_POOL_SIZE);
        let retriever = Arc::new(Retriever::new(&config, JobTable::new()));
        let media = Arc::new(MediaProcessor::new(&config, pool));
        let relayer = Arc::new(Relayer::new(transport, media.clone(), config.max_file_size));

        Self {
            config: Arc::new(config),
            retriever,
            media,
            relayer,
            rate_limiter: RateLimiter::new(),
            catalog,
        }
    }

    /// Builds a context from explicitly constructed services.
    pub fn from_parts(
        config: Arc<Config>,
        retriever: Arc<Retriever>,
        media: Arc<MediaProcessor>,
        relayer: Arc<Relayer>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            config,
            retriever,
            media,
            relayer,
            rate_limiter: RateLimiter::new(),
            catalog,
        }
    }

    /// Applies the configured per-user request limit.
    pub async fn allow_request(&self, user_id: u64) -> bool {
        self.rate_limiter
            .allow(user_id, self.config.rate_limit, self.config.rate_window)
            .await
    }
}
