//! ApiSource: the primary stream API.
//!
//! - `GET {base}/stream/{id}?direct=1` serves audio as webm
//! - `GET {base}/video_stream/{id}` serves mp4
//! - `GET {base}/api/status` reports the remaining request quota
//!
//! Every request carries `Authorization: Bearer <key>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::core::config;
use crate::core::logging::mask_secret;
use crate::download::error::DownloadError;
use crate::download::reference::{ArtifactOrigin, CachedArtifact, FetchRequest, MediaKind};
use crate::download::source::DownloadSource;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub download_dir: PathBuf,
    /// Total deadline for a stream request, body included
    pub request_timeout: Duration,
    pub status_timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            download_dir: download_dir.into(),
            request_timeout: config::api::download_timeout(),
            status_timeout: config::api::status_timeout(),
        }
    }

    pub fn from_pipeline(pipeline: &config::PipelineConfig) -> Self {
        Self::new(&pipeline.api_url, pipeline.api_key.clone(), &pipeline.download_dir)
    }
}

/// Body of `/api/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub requests_remaining: i64,
    /// Any other fields the API reports (plan, reset time, ...)
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Download source backed by the stream API.
pub struct ApiSource {
    config: ApiConfig,
    client: Client,
}

impl ApiSource {
    pub fn new(config: ApiConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(config::api::USER_AGENT)
            .connect_timeout(config::api::connect_timeout())
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, request: &FetchRequest) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match request.kind {
            MediaKind::Audio => format!("{}/stream/{}?direct=1", base, request.identifier()),
            MediaKind::Video => format!("{}/video_stream/{}", base, request.identifier()),
        }
    }

    /// Fetches the key's usage information.
    pub async fn usage_info(&self) -> Result<ApiStatus, DownloadError> {
        let url = format!("{}/api/status", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .timeout(self.config.status_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            log::error!("❌ Failed to get API status: {}", status);
            return Err(DownloadError::HttpStatus(status.as_u16(), "status request rejected".to_string()));
        }

        let body = response.text().await?;
        let info: ApiStatus =
            serde_json::from_str(&body).map_err(|e| DownloadError::MalformedResponse(e.to_string()))?;
        log::info!("📊 API status: {} requests remaining", info.requests_remaining);
        Ok(info)
    }

    /// True when the key works and has requests left.
    pub async fn check_quota(&self) -> bool {
        match self.usage_info().await {
            Ok(info) if info.requests_remaining > 0 => true,
            Ok(_) => {
                log::error!("❌ API key has no remaining requests");
                false
            }
            Err(e) => {
                log::error!("❌ Failed to check API key status: {}", e);
                false
            }
        }
    }

    /// Streams the media into `<download_dir>/<id>.<webm|mp4>`.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<CachedArtifact, DownloadError> {
        let endpoint = self.endpoint(request);
        let file_path = request.target_path(&self.config.download_dir);

        log::info!(
            "📥 {} download from {} (key {})",
            request.kind.label(),
            endpoint,
            mask_secret(self.config.api_key.expose_secret())
        );

        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .timeout(self.config.request_timeout)
            .send()
            .await
            .inspect_err(|e| log::error!("🌐 Request for {} failed: {}", request.identifier(), e))?;

        let status = response.status();
        log::info!("📡 Response status: {}", status);
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                log::error!("❌ Authentication failed: invalid API key");
                return Err(DownloadError::AuthFailure("invalid API key".to_string()));
            }
            StatusCode::FORBIDDEN => {
                log::error!("❌ Forbidden: API key expired or no requests remaining");
                return Err(DownloadError::QuotaExhausted("API key expired or no requests remaining".to_string()));
            }
            other => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<serde_json::Value>(&body) {
                    Ok(json) => log::error!("❌ API error {}: {}", other, json),
                    Err(_) => log::error!("❌ Download failed with status: {}", other),
                }
                return Err(DownloadError::HttpStatus(other.as_u16(), body.chars().take(200).collect()));
            }
        }

        if let Some(len) = response.content_length() {
            log::info!("📊 Expected file size: {:.2} MB", len as f64 / (1024.0 * 1024.0));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        remove_existing(&file_path).await?;

        let size = match stream_to_file(response, &file_path).await {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&file_path).await;
                log::error!("❌ Download of {} interrupted: {}", request.identifier(), e);
                return Err(e);
            }
        };

        if size == 0 {
            log::error!("❌ Downloaded file is empty: {}", request.file_name());
            let _ = tokio::fs::remove_file(&file_path).await;
            return Err(DownloadError::EmptyArtifact(request.file_name()));
        }

        if !content_type.contains(request.kind.content_type_family()) {
            log::warn!(
                "⚠️ Unexpected content type for {}: {:?}",
                request.kind.content_type_family(),
                content_type
            );
        }

        let artifact = CachedArtifact {
            path: file_path,
            size_bytes: size,
            kind: request.kind,
            origin: ArtifactOrigin::PrimaryApi,
        };
        log::info!("✅ Successfully downloaded: {} ({:.2} MB)", request.file_name(), artifact.size_mb());
        Ok(artifact)
    }
}

async fn remove_existing(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::info!("🗑️ Removed existing file: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, DownloadError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

#[async_trait]
impl DownloadSource for ApiSource {
    fn name(&self) -> &str {
        "api"
    }

    async fn is_available(&self) -> bool {
        self.check_quota().await
    }

    async fn download(&self, request: &FetchRequest) -> Result<CachedArtifact, DownloadError> {
        self.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::reference::MediaReference;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer, dir: &TempDir) -> ApiSource {
        let config = ApiConfig::new(server.uri(), SecretString::from("test-key"), dir.path());
        ApiSource::new(config).unwrap()
    }

    fn request(kind: MediaKind) -> FetchRequest {
        FetchRequest::new(MediaReference::parse("abc123").unwrap(), kind)
    }

    async fn mount_status(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_check_quota_with_requests_left() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_status(&server, serde_json::json!({"requests_remaining": 500, "plan": "pro"})).await;

        let source = source_for(&server, &dir);
        let info = source.usage_info().await.unwrap();
        assert_eq!(info.requests_remaining, 500);
        assert_eq!(info.extra.get("plan"), Some(&serde_json::json!("pro")));
        assert!(source.check_quota().await);
    }

    #[tokio::test]
    async fn test_check_quota_exhausted_or_missing() {
        for body in [
            serde_json::json!({"requests_remaining": 0}),
            serde_json::json!({"requests_remaining": -3}),
            serde_json::json!({"plan": "free"}),
        ] {
            let server = MockServer::start().await;
            let dir = TempDir::new().unwrap();
            mount_status(&server, body).await;
            assert!(!source_for(&server, &dir).check_quota().await);
        }
    }

    #[tokio::test]
    async fn test_check_quota_on_error_status() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = source_for(&server, &dir);
        assert!(matches!(source.usage_info().await, Err(DownloadError::HttpStatus(500, _))));
        assert!(!source.check_quota().await);
    }

    #[tokio::test]
    async fn test_fetch_audio_streams_to_webm() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/stream/abc123"))
            .and(query_param("direct", "1"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/webm")
                    .set_body_bytes(vec![7u8; 64 * 1024]),
            )
            .mount(&server)
            .await;

        // Stale artifact from an earlier run is replaced
        std::fs::write(dir.path().join("abc123.webm"), b"stale").unwrap();

        let artifact = source_for(&server, &dir).fetch(&request(MediaKind::Audio)).await.unwrap();
        assert_eq!(artifact.path, dir.path().join("abc123.webm"));
        assert_eq!(artifact.size_bytes, 64 * 1024);
        assert_eq!(artifact.origin, ArtifactOrigin::PrimaryApi);
        assert_eq!(std::fs::metadata(&artifact.path).unwrap().len(), 64 * 1024);
    }

    #[tokio::test]
    async fn test_fetch_video_with_unexpected_content_type_still_succeeds() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/video_stream/abc123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"mp4-bytes".to_vec()),
            )
            .mount(&server)
            .await;

        let artifact = source_for(&server, &dir).fetch(&request(MediaKind::Video)).await.unwrap();
        assert_eq!(artifact.path, dir.path().join("abc123.mp4"));
        assert_eq!(artifact.size_bytes, 9);
    }

    #[tokio::test]
    async fn test_fetch_maps_auth_and_quota_statuses() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/stream/abc123"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/video_stream/abc123"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = source_for(&server, &dir);
        let audio = source.fetch(&request(MediaKind::Audio)).await.unwrap_err();
        let video = source.fetch(&request(MediaKind::Video)).await.unwrap_err();
        assert!(matches!(audio, DownloadError::AuthFailure(_)));
        assert!(matches!(video, DownloadError::QuotaExhausted(_)));
        assert!(!dir.path().join("abc123.webm").exists());
    }

    #[tokio::test]
    async fn test_fetch_other_status_keeps_body() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/stream/abc123"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "boom"})))
            .mount(&server)
            .await;

        let err = source_for(&server, &dir).fetch(&request(MediaKind::Audio)).await.unwrap_err();
        match err {
            DownloadError::HttpStatus(code, body) => {
                assert_eq!(code, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_empty_body_removes_file() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/stream/abc123"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "audio/webm"))
            .mount(&server)
            .await;

        let err = source_for(&server, &dir).fetch(&request(MediaKind::Audio)).await.unwrap_err();
        assert!(matches!(err, DownloadError::EmptyArtifact(_)));
        assert!(!dir.path().join("abc123.webm").exists());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_server_is_network_error() {
        let dir = TempDir::new().unwrap();
        let config = ApiConfig::new("http://127.0.0.1:9", SecretString::from("k"), dir.path());
        let err = ApiSource::new(config)
            .unwrap()
            .fetch(&request(MediaKind::Audio))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Network(_) | DownloadError::Timeout(_)));
    }
}
