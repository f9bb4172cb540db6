//! Media acquisition: references, sources, cookies and the download cache
//!
//! - `reference`: link parsing and request/artifact types
//! - `source`: primary API and yt-dlp backends behind `DownloadSource`
//! - `cookies`: the credential store used by the yt-dlp backend
//! - `janitor`: retention sweep of the download directory
//! - `pipeline`: primary-then-fallback resolution

pub mod cookies;
pub mod error;
pub mod janitor;
pub mod pipeline;
pub mod reference;
pub mod source;
pub mod ytdlp;

pub use cookies::{CookieConfig, CookieError, CookieStore};
pub use error::DownloadError;
pub use janitor::{CacheJanitor, JanitorConfig, SweepReport};
pub use pipeline::ResolutionPipeline;
pub use reference::{ArtifactOrigin, CachedArtifact, FetchRequest, MediaKind, MediaReference};
pub use source::{ApiConfig, ApiSource, DownloadSource, YtDlpSource};
