//! Common test utilities
//!
//! Shared by the integration tests: a throwaway workspace with a mock stream
//! API, a fake yt-dlp and a cookie store wired like production.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alyacore::download::{CookieConfig, CookieStore, ResolutionPipeline};
use alyacore::PipelineConfig;
use secrecy::SecretString;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "integration-key";

/// Fake yt-dlp: records each call, writes the file named by `-o` and prints it.
/// Like the real tool it leaves an existing output file alone.
///
/// `%s` is replaced by the call log path.
const FAKE_YTDLP: &str = r#"#!/bin/sh
echo "$@" >> "%s"
out=""
merge=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    --merge-output-format) merge="$2"; shift ;;
  esac
  shift
done
case "$out" in
  "") echo "fake title"; exit 0 ;;
esac
if [ -n "$merge" ]; then
  file=$(echo "$out" | sed "s/%(ext)s/$merge/")
else
  file=$(echo "$out" | sed 's/%(ext)s/mp3/')
fi
if [ ! -f "$file" ]; then
  printf 'fallback-media' > "$file"
fi
echo "$file"
"#;

/// Netscape jar above the plausibility threshold.
pub fn sample_cookies() -> String {
    let mut content = String::from("# Netscape HTTP Cookie File\n");
    for name in ["SID", "HSID", "SSID", "APISID", "SAPISID"] {
        content.push_str(&format!(
            ".youtube.com\tTRUE\t/\tTRUE\t9999999999\t{}\tvalue_{}\n",
            name, name
        ));
    }
    content
}

pub struct TestEnvironment {
    pub dir: TempDir,
    pub server: MockServer,
    pub config: PipelineConfig,
    pub cookies: Arc<CookieStore>,
    pub tool_log: PathBuf,
}

impl TestEnvironment {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let tool_log = dir.path().join("yt-dlp.calls");
        let tool = write_fake_tool(dir.path(), &tool_log);

        let config = PipelineConfig {
            download_dir: dir.path().join("downloads"),
            api_url: server.uri(),
            api_key: SecretString::from(API_KEY),
            ytdl_bin: tool.to_string_lossy().into_owned(),
            cookies_file: dir.path().join("cookies.txt"),
            cookies_backup_dir: dir.path().join("cookies_backup"),
            cookies_pool_dir: None,
            log_file_path: dir.path().join("alya.log"),
        };
        let cookies = Arc::new(CookieStore::new(CookieConfig::from_pipeline(&config)).unwrap());

        Self {
            dir,
            server,
            config,
            cookies,
            tool_log,
        }
    }

    pub fn pipeline(&self) -> ResolutionPipeline {
        ResolutionPipeline::from_config(&self.config, self.cookies.clone()).unwrap()
    }

    pub fn install_cookies(&self) {
        std::fs::write(&self.config.cookies_file, sample_cookies()).unwrap();
    }

    pub async fn mount_quota(&self, remaining: i64) {
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "requests_remaining": remaining
            })))
            .mount(&self.server)
            .await;
    }

    /// Number of times the fake yt-dlp ran.
    pub fn tool_calls(&self) -> usize {
        std::fs::read_to_string(&self.tool_log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

fn write_fake_tool(dir: &Path, log: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("yt-dlp");
    std::fs::write(&path, FAKE_YTDLP.replacen("%s", &log.to_string_lossy(), 1)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
