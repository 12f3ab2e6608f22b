use thiserror::Error;

use crate::download::error::PipelineError;

/// Application-level errors.
///
/// Per-request pipeline failures are carried as [`PipelineError`] and only
/// folded into this enum at the bot/CLI edge.
///
/// # Example
///
/// ```no_run
/// use cinevault::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed configuration; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Retrieval/relay/catalog failures
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_converts() {
        let err: AppError = PipelineError::NotFound("code ABC".into()).into();
        assert!(matches!(err, AppError::Pipeline(PipelineError::NotFound(_))));
        assert!(err.to_string().contains("code ABC"));
    }

    #[test]
    fn test_config_error_display() {
        let err = AppError::Config("BOT_TOKEN is not set".into());
        assert_eq!(err.to_string(), "Configuration error: BOT_TOKEN is not set");
    }
}
