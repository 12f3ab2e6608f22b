//! Core utilities, configuration, and common functionality

pub mod config;
pub mod disk;
pub mod error;
pub mod logging;
pub mod rate_limiter;
pub mod retry;
pub mod utils;
pub mod worker_pool;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use logging::init_logger;
