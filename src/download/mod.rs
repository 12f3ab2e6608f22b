//! Retrieval, relay and the flows that combine them

pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod retriever;
pub mod send;
pub mod source;

// Re-exports for convenience
pub use error::PipelineError;
pub use jobs::{JobId, JobStatus, JobTable, RetrievalJob};
pub use pipeline::{IngestRequest, deliver, ingest};
pub use progress::{Progress, ProgressCallback};
pub use quality::QualityTier;
pub use retriever::{Retriever, VideoInfo};
pub use send::Relayer;
