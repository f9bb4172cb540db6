//! Resolution pipeline: primary API first, yt-dlp as the last word.
//!
//! ```text
//! reference ─► parse ─► janitor running ─► plain id and primary.is_available?
//!                                               │ yes         │ no
//!                                               ▼             │
//!                                   evict target, primary ────┤ error
//!                                               │ ok          ▼
//!                                               ▼        evict target, fallback
//!                                           artifact
//! ```
//!
//! There is no retry loop and no per-identifier lock: two concurrent calls
//! for the same identifier race on the same target path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::PipelineConfig;
use crate::download::cookies::CookieStore;
use crate::download::error::DownloadError;
use crate::download::janitor::{CacheJanitor, JanitorConfig};
use crate::download::reference::{CachedArtifact, FetchRequest, MediaKind, MediaReference};
use crate::download::source::{ApiConfig, ApiSource, DownloadSource, YtDlpSource};
use crate::download::ytdlp::YtDlp;

pub struct ResolutionPipeline {
    primary: Arc<dyn DownloadSource>,
    fallback: Arc<dyn DownloadSource>,
    janitor: Arc<CacheJanitor>,
}

impl ResolutionPipeline {
    /// The download directory is the one the janitor sweeps.
    pub fn new(primary: Arc<dyn DownloadSource>, fallback: Arc<dyn DownloadSource>, janitor: Arc<CacheJanitor>) -> Self {
        Self {
            primary,
            fallback,
            janitor,
        }
    }

    /// Stream API as primary and yt-dlp with `cookies` as fallback.
    pub fn from_config(config: &PipelineConfig, cookies: Arc<CookieStore>) -> Result<Self, DownloadError> {
        let primary = ApiSource::new(ApiConfig::from_pipeline(config))?;
        let fallback = YtDlpSource::new(YtDlp::new(&config.ytdl_bin), cookies, &config.download_dir);
        let janitor = CacheJanitor::new(JanitorConfig::new(&config.download_dir));

        Ok(Self::new(Arc::new(primary), Arc::new(fallback), Arc::new(janitor)))
    }

    pub fn download_dir(&self) -> &Path {
        &self.janitor.config().dir
    }

    pub fn janitor(&self) -> &Arc<CacheJanitor> {
        &self.janitor
    }

    pub async fn resolve_audio(&self, link: &str) -> Result<CachedArtifact, DownloadError> {
        self.resolve(link, MediaKind::Audio).await
    }

    pub async fn resolve_video(&self, link: &str) -> Result<CachedArtifact, DownloadError> {
        self.resolve(link, MediaKind::Video).await
    }

    /// Resolves a link or bare identifier to a file in the download directory.
    pub async fn resolve(&self, link: &str, kind: MediaKind) -> Result<CachedArtifact, DownloadError> {
        self.janitor.start();

        let reference = MediaReference::parse(link)
            .inspect_err(|_| log::error!("❌ [{}] Invalid video ID in: {:?}", kind.label(), link))?;
        let request = FetchRequest::new(reference, kind);
        log::info!("🎵 [{}] Starting download for: {}", kind.label(), request.identifier());

        let dir = self.download_dir().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        if !request.reference.is_plain_id() {
            log::info!(
                "🔗 [{}] {} is not a plain id, handing it to {}",
                kind.label(),
                request.identifier(),
                self.fallback.name()
            );
        } else if self.primary.is_available().await {
            match self.try_primary(&request, &dir).await {
                Ok(artifact) => return Ok(artifact),
                Err(e) if e.is_recoverable() => {
                    log::error!(
                        "❌ [{}] {} failed for {} ({}): {}",
                        kind.label(),
                        self.primary.name(),
                        request.identifier(),
                        e.subcategory(),
                        e
                    );
                    log::info!("🔄 Switching to {}...", self.fallback.name());
                }
                Err(e) => return Err(e),
            }
        } else {
            log::error!(
                "❌ {} check failed. Using {} directly.",
                self.primary.name(),
                self.fallback.name()
            );
        }

        self.try_fallback(&request, &dir).await
    }

    async fn try_primary(&self, request: &FetchRequest, dir: &Path) -> Result<CachedArtifact, DownloadError> {
        let target: PathBuf = request.target_path(dir);
        if let Err(e) = self.janitor.evict(&target).await {
            log::warn!("Could not evict {}: {}", target.display(), e);
        }

        log::info!("🔗 [{}] Using {} for {}", request.kind.label(), self.primary.name(), request.identifier());
        self.primary.download(request).await
    }

    async fn try_fallback(&self, request: &FetchRequest, dir: &Path) -> Result<CachedArtifact, DownloadError> {
        let target = request.fallback_path(dir);
        if let Err(e) = self.janitor.evict(&target).await {
            log::warn!("Could not evict {}: {}", target.display(), e);
        }

        self.fallback.download(request).await
    }

    /// Stops the janitor and waits for it.
    pub async fn shutdown(&self) {
        self.janitor.stop().await;
    }
}
