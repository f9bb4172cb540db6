//! YtDlpSource: fallback backend running yt-dlp with a cookie credential.
//!
//! Audio is extracted to mp3, video is merged to mp4 at most 720p. The tool
//! prints the final path (`--print after_move:filepath`), which is checked
//! on disk before the artifact is reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::download::cookies::CookieStore;
use crate::download::error::DownloadError;
use crate::download::reference::{ArtifactOrigin, CachedArtifact, FetchRequest, MediaKind};
use crate::download::source::DownloadSource;
use crate::download::ytdlp::{audio_args, reported_path, video_args, FormatInfo, YtDlp};

/// Download source powered by yt-dlp.
pub struct YtDlpSource {
    tool: YtDlp,
    cookies: Arc<CookieStore>,
    download_dir: PathBuf,
}

impl YtDlpSource {
    pub fn new(tool: YtDlp, cookies: Arc<CookieStore>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            cookies,
            download_dir: download_dir.into(),
        }
    }

    pub fn tool(&self) -> &YtDlp {
        &self.tool
    }

    async fn credential(&self) -> Result<PathBuf, DownloadError> {
        match self.cookies.credential_for_extractor().await {
            Some(path) => {
                log::info!("🍪 Using cookie file: {}", path.display());
                Ok(path)
            }
            None => {
                log::error!("❌ [FALLBACK] No cookie file available");
                Err(DownloadError::NoCredential)
            }
        }
    }

    pub async fn extract_info(&self, link: &str) -> Result<serde_json::Value, DownloadError> {
        let cookies = self.credential().await?;
        self.tool.extract_info(&cookies, link).await
    }

    pub async fn list_formats(&self, link: &str) -> Result<Vec<FormatInfo>, DownloadError> {
        let cookies = self.credential().await?;
        self.tool.list_formats(&cookies, link).await
    }

    pub async fn estimate_size(&self, link: &str) -> Result<Option<u64>, DownloadError> {
        let cookies = self.credential().await?;
        self.tool.estimate_size(&cookies, link).await
    }

    pub async fn playlist_ids(&self, link: &str, limit: u32) -> Result<Vec<String>, DownloadError> {
        let cookies = self.credential().await?;
        self.tool.playlist_ids(&cookies, link, limit).await
    }

    /// Runs the extraction and returns the path of the finished file.
    async fn run_download(&self, request: &FetchRequest) -> Result<PathBuf, DownloadError> {
        let cookies = self.credential().await?;
        let stem = request.file_stem();
        let link = request.reference.watch_url();

        let args = match request.kind {
            MediaKind::Audio => audio_args(&cookies, &self.download_dir, &stem, &link),
            MediaKind::Video => video_args(&cookies, &self.download_dir, &stem, &link),
        };

        let output = self.tool.run(&args, self.tool.download_timeout()).await?;

        let expected = request.fallback_path(&self.download_dir);
        let path = match (request.kind, reported_path(&output.stdout)) {
            // The extractor reports the pre-conversion name on some versions
            (MediaKind::Audio, Some(reported)) => reported.with_extension("mp3"),
            (MediaKind::Video, Some(reported)) => reported,
            (_, None) => expected,
        };

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DownloadError::ExtractionTool(format!(
                "output file not created: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

async fn verified_artifact(path: PathBuf, kind: MediaKind) -> Result<CachedArtifact, DownloadError> {
    let size = tokio::fs::metadata(&path).await?.len();
    if size == 0 {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(DownloadError::EmptyArtifact(file_label(&path)));
    }
    Ok(CachedArtifact {
        path,
        size_bytes: size,
        kind,
        origin: ArtifactOrigin::YtDlp,
    })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[async_trait]
impl DownloadSource for YtDlpSource {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn is_available(&self) -> bool {
        self.cookies.credential_for_extractor().await.is_some()
    }

    async fn download(&self, request: &FetchRequest) -> Result<CachedArtifact, DownloadError> {
        log::info!(
            "🔄 [FALLBACK {}] Starting fallback download for: {}",
            request.kind.label(),
            request.identifier()
        );

        let result = match self.run_download(request).await {
            Ok(path) => verified_artifact(path, request.kind).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(artifact) => log::info!(
                "✅ [FALLBACK] Successfully downloaded: {} ({:.2} MB)",
                artifact.path.display(),
                artifact.size_mb()
            ),
            Err(e) => log::error!("❌ [FALLBACK] {} failed: {}", request.identifier(), e),
        }
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::download::cookies::CookieConfig;
    use crate::download::reference::MediaReference;
    use crate::testing::{fake_tool, sample_cookies};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Writes `<template with ext>` files the way yt-dlp would and prints the path.
    const FAKE_DOWNLOADER: &str = r#"
out=""
merge=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    --merge-output-format) merge="$2"; shift ;;
  esac
  shift
done
if [ -n "$merge" ]; then
  file=$(echo "$out" | sed "s/%(ext)s/$merge/")
  printf 'video' > "$file"
else
  file=$(echo "$out" | sed 's/%(ext)s/webm/')
  printf 'audio' > "$(echo "$out" | sed 's/%(ext)s/mp3/')"
fi
echo "$file"
"#;

    struct Fixture {
        _dir: TempDir,
        download_dir: PathBuf,
        source: YtDlpSource,
    }

    fn fixture(script: &str, with_cookies: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "yt-dlp", script);
        let download_dir = dir.path().join("downloads");
        std::fs::create_dir_all(&download_dir).unwrap();

        let cookies_file = dir.path().join("cookies.txt");
        if with_cookies {
            std::fs::write(&cookies_file, sample_cookies()).unwrap();
        }
        let store = CookieStore::new(CookieConfig::new(cookies_file, dir.path().join("backups"))).unwrap();

        let source = YtDlpSource::new(YtDlp::new(tool.to_string_lossy()), Arc::new(store), &download_dir);
        Fixture {
            _dir: dir,
            download_dir,
            source,
        }
    }

    fn request(kind: MediaKind) -> FetchRequest {
        FetchRequest::new(MediaReference::parse("https://youtu.be/abc123?x=1").unwrap(), kind)
    }

    #[tokio::test]
    async fn test_audio_download_resolves_mp3() {
        let fx = fixture(FAKE_DOWNLOADER, true);
        let artifact = fx.source.download(&request(MediaKind::Audio)).await.unwrap();
        assert_eq!(artifact.path, fx.download_dir.join("abc123.mp3"));
        assert_eq!(artifact.size_bytes, 5);
        assert_eq!(artifact.origin, ArtifactOrigin::YtDlp);
    }

    #[tokio::test]
    async fn test_video_download_uses_reported_path() {
        let fx = fixture(FAKE_DOWNLOADER, true);
        let artifact = fx.source.download(&request(MediaKind::Video)).await.unwrap();
        assert_eq!(artifact.path, fx.download_dir.join("abc123.mp4"));
        assert_eq!(artifact.kind, MediaKind::Video);
    }

    #[tokio::test]
    async fn test_unrecognized_link_passed_whole() {
        let fx = fixture(FAKE_DOWNLOADER, true);
        let reference = MediaReference::parse("https://www.youtube.com/shorts/abc123xyz").unwrap();
        let artifact = fx
            .source
            .download(&FetchRequest::new(reference, MediaKind::Audio))
            .await
            .unwrap();
        assert_eq!(
            artifact.path,
            fx.download_dir.join("https___www_youtube_com_shorts_abc123xyz.mp3")
        );
    }

    #[tokio::test]
    async fn test_no_credential() {
        let fx = fixture(FAKE_DOWNLOADER, false);
        assert!(!fx.source.is_available().await);
        let err = fx.source.download(&request(MediaKind::Audio)).await.unwrap_err();
        assert!(matches!(err, DownloadError::NoCredential));
    }

    #[tokio::test]
    async fn test_tool_failure_is_extraction_error() {
        let fx = fixture("echo 'ERROR: Private video' >&2\nexit 1", true);
        let err = fx.source.download(&request(MediaKind::Video)).await.unwrap_err();
        assert!(matches!(err, DownloadError::ExtractionTool(_)));
    }

    #[tokio::test]
    async fn test_missing_output_is_extraction_error() {
        let fx = fixture("echo /nowhere/abc123.mp4", true);
        let err = fx.source.download(&request(MediaKind::Video)).await.unwrap_err();
        assert!(matches!(err, DownloadError::ExtractionTool(msg) if msg.contains("not created")));
    }

    #[tokio::test]
    async fn test_empty_output_is_removed() {
        let fx = fixture(FAKE_DOWNLOADER.replace("printf 'video'", "printf ''").as_str(), true);
        let err = fx.source.download(&request(MediaKind::Video)).await.unwrap_err();
        assert!(matches!(err, DownloadError::EmptyArtifact(_)));
        assert!(!fx.download_dir.join("abc123.mp4").exists());
    }

    #[tokio::test]
    async fn test_formats_through_credential() {
        let fx = fixture(
            r#"echo '{"formats": [{"format": "18 - 360p", "format_id": "18", "ext": "mp4"}]}'"#,
            true,
        );
        let formats = fx.source.list_formats("https://youtube.com/watch?v=abc123&list=PL1").await.unwrap();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].yturl, "https://youtube.com/watch?v=abc123");
    }
}
