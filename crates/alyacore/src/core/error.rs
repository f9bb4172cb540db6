use thiserror::Error;

use crate::download::error::DownloadError;

/// Centralized error types for the application
///
/// Component-level failures (`DownloadError`, `CookieError`) stay typed inside
/// their modules; this enum is what the binary and any embedding command layer
/// deal with.
///
/// # Example
///
/// ```no_run
/// use alyacore::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Media resolution errors
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Cookie store errors
    #[error("Cookies error: {0}")]
    Cookies(#[from] crate::download::cookies::CookieError),

    /// HTTP/Fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Cookies that failed validation or could not be restored
    #[error("Cookies rejected: {0}")]
    CookiesRejected(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
