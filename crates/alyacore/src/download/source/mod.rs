//! Download backends behind a common trait.
//!
//! The pipeline holds one primary and one fallback source and never looks at
//! their concrete types. Built-in backends:
//! - `ApiSource`: the HTTP stream API, quota-limited
//! - `YtDlpSource`: yt-dlp with a cookie credential

pub mod api;
pub mod ytdlp;

use crate::download::error::DownloadError;
use crate::download::reference::{CachedArtifact, FetchRequest};
use async_trait::async_trait;

pub use api::{ApiConfig, ApiSource, ApiStatus};
pub use ytdlp::YtDlpSource;

/// Trait for download source implementations.
///
/// Implementations convert every internal failure into a [`DownloadError`]
/// and never panic.
#[async_trait]
pub trait DownloadSource: Send + Sync {
    /// Human-readable name of this source (e.g., "api", "yt-dlp")
    fn name(&self) -> &str;

    /// Cheap pre-check run before `download`; `false` skips this source.
    async fn is_available(&self) -> bool;

    /// Fetch the media into the download directory.
    ///
    /// On success the returned artifact exists and is non-empty.
    async fn download(&self, request: &FetchRequest) -> Result<CachedArtifact, DownloadError>;
}
