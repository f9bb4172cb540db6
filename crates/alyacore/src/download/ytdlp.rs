//! yt-dlp invocation: argument builders, output parsing and the info-only modes.
//!
//! Every call passes `--cookies`; the caller decides which cookie file.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::core::config;
use crate::core::process::{first_stderr_line, run_with_timeout};
use crate::download::error::DownloadError;

/// One downloadable format as reported by `-J`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatInfo {
    pub format: String,
    pub format_id: String,
    pub ext: String,
    pub format_note: Option<String>,
    pub filesize: Option<u64>,
    /// Link the formats were listed for
    pub yturl: String,
}

/// Thin async wrapper around the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: String,
    download_timeout: Duration,
    info_timeout: Duration,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            download_timeout: config::ytdlp::download_timeout(),
            info_timeout: config::ytdlp::info_timeout(),
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn download_timeout(&self) -> Duration {
        self.download_timeout
    }

    /// Runs yt-dlp and returns its output; a non-zero exit is an `ExtractionTool` error.
    pub async fn run(&self, args: &[String], timeout: Duration) -> Result<Output, DownloadError> {
        log::debug!("{} {}", self.bin, args.join(" "));

        let mut cmd = Command::new(&self.bin);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = run_with_timeout(&mut cmd, timeout).await?;
        if !output.status.success() {
            return Err(DownloadError::ExtractionTool(format!(
                "exit {}: {}",
                output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                first_stderr_line(&output)
            )));
        }
        Ok(output)
    }

    /// Full metadata (`-J`) for a link.
    pub async fn extract_info(&self, cookies: &Path, link: &str) -> Result<serde_json::Value, DownloadError> {
        let args = vec![
            "--cookies".to_string(),
            cookies.to_string_lossy().into_owned(),
            "-J".to_string(),
            link.to_string(),
        ];
        let output = self.run(&args, self.info_timeout).await?;
        serde_json::from_slice(&output.stdout).map_err(|e| DownloadError::MalformedResponse(e.to_string()))
    }

    /// Non-DASH formats of a link. Anything after `&` in the link is dropped.
    pub async fn list_formats(&self, cookies: &Path, link: &str) -> Result<Vec<FormatInfo>, DownloadError> {
        let link = link.split('&').next().unwrap_or(link);
        let info = self.extract_info(cookies, link).await?;
        Ok(parse_formats(&info, link))
    }

    /// Sum of the reported format sizes, `None` when no formats are listed.
    pub async fn estimate_size(&self, cookies: &Path, link: &str) -> Result<Option<u64>, DownloadError> {
        let info = self.extract_info(cookies, link).await?;
        Ok(total_filesize(&info))
    }

    /// First `limit` entry ids of a playlist, unavailable entries skipped.
    pub async fn playlist_ids(&self, cookies: &Path, link: &str, limit: u32) -> Result<Vec<String>, DownloadError> {
        let args = vec![
            "-i".to_string(),
            "--get-id".to_string(),
            "--flat-playlist".to_string(),
            "--cookies".to_string(),
            cookies.to_string_lossy().into_owned(),
            "--playlist-end".to_string(),
            limit.to_string(),
            "--skip-download".to_string(),
            link.to_string(),
        ];

        let mut cmd = Command::new(&self.bin);
        cmd.args(&args).stdout(Stdio::piped()).stderr(Stdio::piped());
        let output = run_with_timeout(&mut cmd, self.info_timeout).await?;

        // `-i` keeps going past broken entries and may still exit non-zero
        let ids = parse_lines(&output.stdout);
        if ids.is_empty() && !output.status.success() {
            return Err(DownloadError::ExtractionTool(first_stderr_line(&output)));
        }
        Ok(ids)
    }
}

/// Arguments for an mp3 extraction into `<dir>/<stem>.%(ext)s`.
pub fn audio_args(cookies: &Path, dir: &Path, stem: &str, link: &str) -> Vec<String> {
    let mut args = vec![
        "--cookies".to_string(),
        cookies.to_string_lossy().into_owned(),
        "-f".to_string(),
        "bestaudio/best".to_string(),
        "-x".to_string(),
        "--audio-format".to_string(),
        "mp3".to_string(),
        "--audio-quality".to_string(),
        config::ytdlp::AUDIO_QUALITY.to_string(),
    ];
    push_output_args(&mut args, dir, stem, link);
    args
}

/// Arguments for an mp4 download capped at the configured height.
pub fn video_args(cookies: &Path, dir: &Path, stem: &str, link: &str) -> Vec<String> {
    let height = config::ytdlp::MAX_VIDEO_HEIGHT;
    let mut args = vec![
        "--cookies".to_string(),
        cookies.to_string_lossy().into_owned(),
        "-f".to_string(),
        format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]", h = height),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
    ];
    push_output_args(&mut args, dir, stem, link);
    args
}

fn push_output_args(args: &mut Vec<String>, dir: &Path, stem: &str, link: &str) {
    args.extend([
        "-o".to_string(),
        dir.join(format!("{}.%(ext)s", stem)).to_string_lossy().into_owned(),
        "--no-simulate".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        link.to_string(),
    ]);
}

/// Last non-empty stdout line, the final path printed by `after_move:filepath`.
pub fn reported_path(stdout: &[u8]) -> Option<PathBuf> {
    parse_lines(stdout).pop().map(PathBuf::from)
}

fn parse_lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts the non-DASH formats from `-J` output.
pub fn parse_formats(info: &serde_json::Value, link: &str) -> Vec<FormatInfo> {
    let Some(formats) = info.get("formats").and_then(|f| f.as_array()) else {
        return Vec::new();
    };

    formats
        .iter()
        .filter_map(|f| {
            let format = f.get("format")?.as_str()?;
            if format.to_lowercase().contains("dash") {
                return None;
            }
            Some(FormatInfo {
                format: format.to_string(),
                format_id: f.get("format_id")?.as_str()?.to_string(),
                ext: f.get("ext")?.as_str()?.to_string(),
                format_note: f.get("format_note").and_then(|n| n.as_str()).map(str::to_string),
                filesize: f.get("filesize").and_then(|s| s.as_u64()),
                yturl: link.to_string(),
            })
        })
        .collect()
}

/// Sum of every `filesize` in `-J` output; formats without one count as zero.
pub fn total_filesize(info: &serde_json::Value) -> Option<u64> {
    let formats = info.get("formats").and_then(|f| f.as_array())?;
    if formats.is_empty() {
        return None;
    }
    Some(
        formats
            .iter()
            .filter_map(|f| f.get("filesize").and_then(|s| s.as_u64()))
            .sum(),
    )
}
