//! YouTube cookies management for yt-dlp
//!
//! This module provides functionality to:
//! - Check and validate the active cookies file
//! - Back up, list and restore cookie snapshots
//! - Swap in new cookies with automatic rollback when they fail validation
//! - Pick a credential for the yt-dlp fallback, rotating through a pool

use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::core::config;
use crate::core::process::{first_stderr_line, run_with_timeout, ProcessError};

/// Errors surfaced by [`CookieStore::backup_cookies`].
#[derive(Error, Debug)]
pub enum CookieError {
    #[error("no cookies file to back up: {0}")]
    NotFound(PathBuf),

    #[error("backup already exists: {0}")]
    BackupExists(String),

    #[error("invalid backup name: {0}")]
    InvalidName(String),

    #[error("cookie store IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reason why cookies validation failed
#[derive(Debug, Clone, PartialEq)]
pub enum CookieInvalidReason {
    /// File not found or below the plausibility threshold
    FileNotFound,
    /// File format is corrupted
    FileCorrupted,
    /// Cookies were rotated by YouTube (security measure)
    RotatedByYouTube,
    /// Session expired - need to login again
    SessionExpired,
    /// Bot detection triggered - need fresh cookies from human session
    BotDetected,
    /// Rate limited by YouTube
    RateLimited,
    /// yt-dlp did not finish within the validation timeout
    TimedOut,
    /// yt-dlp exited successfully but printed nothing
    EmptyOutput,
    /// Generic/unknown error
    Unknown(String),
}

impl CookieInvalidReason {
    /// Parse yt-dlp stderr to determine the reason
    pub fn from_ytdlp_error(stderr: &str) -> Self {
        let stderr_lower = stderr.to_lowercase();

        if stderr_lower.contains("cookies are no longer valid")
            || stderr_lower.contains("cookies have likely been rotated")
            || stderr_lower.contains("cookies have expired")
        {
            return Self::RotatedByYouTube;
        }

        // Bot detection is checked before the generic sign-in case: both say "sign in"
        if stderr_lower.contains("confirm you're not a bot")
            || stderr_lower.contains("confirm you’re not a bot")
            || stderr_lower.contains("unusual traffic")
        {
            return Self::BotDetected;
        }

        if (stderr_lower.contains("login") && stderr_lower.contains("required"))
            || stderr_lower.contains("please sign in")
            || stderr_lower.contains("sign in to confirm your age")
        {
            return Self::SessionExpired;
        }

        if stderr_lower.contains("rate limit")
            || stderr_lower.contains("too many requests")
            || stderr_lower.contains("429")
        {
            return Self::RateLimited;
        }

        if (stderr_lower.contains("cookie") && stderr_lower.contains("invalid"))
            || stderr_lower.contains("could not read")
            || stderr_lower.contains("malformed")
        {
            return Self::FileCorrupted;
        }

        Self::Unknown(stderr.lines().next().unwrap_or("unknown").to_string())
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match self {
            Self::FileNotFound => "Cookies file not found or too small".to_string(),
            Self::FileCorrupted => "Cookies file is corrupted or not in Netscape format".to_string(),
            Self::RotatedByYouTube => "YouTube rotated the cookies; export them again from the browser".to_string(),
            Self::SessionExpired => "Session expired, YouTube requires a new login".to_string(),
            Self::BotDetected => "YouTube flagged the session as a bot; fresh cookies needed".to_string(),
            Self::RateLimited => "Rate limited by YouTube".to_string(),
            Self::TimedOut => "Validation timed out".to_string(),
            Self::EmptyOutput => "yt-dlp printed nothing".to_string(),
            Self::Unknown(msg) => format!("Unknown error: {}", msg),
        }
    }
}

/// Result of cookie validation with detailed reason
#[derive(Debug, Clone)]
pub struct CookieValidation {
    pub is_valid: bool,
    pub reason: Option<CookieInvalidReason>,
}

impl CookieValidation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    fn invalid(reason: CookieInvalidReason) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason),
        }
    }
}

/// Required YouTube authentication cookies for full functionality
const REQUIRED_AUTH_COOKIES: &[&str] = &["SID", "HSID", "SSID", "APISID", "SAPISID"];

/// Parsed cookie from Netscape format
#[derive(Debug, Clone)]
pub struct ParsedCookie {
    pub domain: String,
    pub name: String,
    pub value: String,
    /// Unix timestamp, 0 means session cookie
    pub expires: Option<i64>,
}

impl ParsedCookie {
    /// Parses one `domain \t flag \t path \t secure \t expires \t name \t value` line.
    pub fn from_netscape_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 7 {
            return None;
        }
        Some(Self {
            domain: parts[0].to_string(),
            name: parts[5].to_string(),
            value: parts[6].to_string(),
            expires: parts[4].parse().ok(),
        })
    }

    pub fn is_expired(&self) -> bool {
        match self.expires {
            Some(0) | None => false,
            Some(ts) => ts < chrono::Utc::now().timestamp(),
        }
    }
}

/// Offline diagnostic of a cookies file
#[derive(Debug, Clone, Default)]
pub struct CookiesDiagnostic {
    pub file_exists: bool,
    pub file_size: u64,
    pub total_cookies: usize,
    pub youtube_cookies: usize,
    pub auth_cookies_found: Vec<String>,
    pub auth_cookies_missing: Vec<String>,
    pub auth_cookies_expired: Vec<String>,
    pub issues: Vec<String>,
    pub is_valid: bool,
}

/// Parse Netscape cookie file content and return diagnostics
pub fn diagnose_cookies_content(content: &str) -> CookiesDiagnostic {
    let mut diagnostic = CookiesDiagnostic {
        file_exists: true,
        file_size: content.len() as u64,
        ..Default::default()
    };

    if !content.lines().any(|l| l.contains("Netscape HTTP Cookie File")) {
        diagnostic
            .issues
            .push("Missing 'Netscape HTTP Cookie File' header".to_string());
    }

    for line in content.lines().map(str::trim) {
        if line.is_empty() || (line.starts_with('#') && !line.starts_with("#HttpOnly_")) {
            continue;
        }
        let line = line.trim_start_matches("#HttpOnly_");
        let Some(cookie) = ParsedCookie::from_netscape_line(line) else {
            continue;
        };
        diagnostic.total_cookies += 1;

        if !(cookie.domain.contains("youtube.com") || cookie.domain.contains("google.com")) {
            continue;
        }
        diagnostic.youtube_cookies += 1;

        if REQUIRED_AUTH_COOKIES.contains(&cookie.name.as_str()) {
            if !diagnostic.auth_cookies_found.contains(&cookie.name) {
                diagnostic.auth_cookies_found.push(cookie.name.clone());
            }
            if cookie.is_expired() && !diagnostic.auth_cookies_expired.contains(&cookie.name) {
                diagnostic.auth_cookies_expired.push(cookie.name.clone());
            }
        }
    }

    diagnostic.auth_cookies_missing = REQUIRED_AUTH_COOKIES
        .iter()
        .filter(|name| !diagnostic.auth_cookies_found.iter().any(|f| f == *name))
        .map(|name| name.to_string())
        .collect();

    if diagnostic.youtube_cookies == 0 {
        diagnostic.issues.push("No youtube.com/google.com cookies".to_string());
    }
    if !diagnostic.auth_cookies_missing.is_empty() {
        diagnostic.issues.push(format!(
            "Missing auth cookies: {}",
            diagnostic.auth_cookies_missing.join(", ")
        ));
    }
    if !diagnostic.auth_cookies_expired.is_empty() {
        diagnostic.issues.push(format!(
            "Expired auth cookies: {}",
            diagnostic.auth_cookies_expired.join(", ")
        ));
    }

    diagnostic.is_valid = diagnostic.youtube_cookies > 0
        && diagnostic.auth_cookies_missing.is_empty()
        && diagnostic.auth_cookies_expired.is_empty();

    diagnostic
}

/// Locations and tool settings for a [`CookieStore`].
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// The single active cookies file handed to yt-dlp
    pub cookies_file: PathBuf,
    /// Where `cookies_backup_<timestamp>.txt` snapshots live
    pub backup_dir: PathBuf,
    /// Optional directory of spare `*.txt` cookie files used when the active one is unusable
    pub pool_dir: Option<PathBuf>,
    pub validation_url: String,
    pub ytdl_bin: String,
    pub validation_timeout: Duration,
}

impl CookieConfig {
    pub fn new(cookies_file: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            cookies_file: cookies_file.into(),
            backup_dir: backup_dir.into(),
            pool_dir: None,
            validation_url: config::cookies::VALIDATION_URL.to_string(),
            ytdl_bin: "yt-dlp".to_string(),
            validation_timeout: config::cookies::validation_timeout(),
        }
    }

    pub fn from_pipeline(pipeline: &config::PipelineConfig) -> Self {
        Self {
            pool_dir: pipeline.cookies_pool_dir.clone(),
            ytdl_bin: pipeline.ytdl_bin.clone(),
            ..Self::new(&pipeline.cookies_file, &pipeline.cookies_backup_dir)
        }
    }
}

/// Owner of the active cookies file, its backups and the rotation pool.
///
/// The "cookies exist" answer is cached on the instance and refreshed by
/// every mutating call. Mutations are serialized by `write_lock`.
pub struct CookieStore {
    config: CookieConfig,
    exists_cache: Mutex<Option<bool>>,
    write_lock: Mutex<()>,
}

impl CookieStore {
    /// Creates the store and the directories it writes into.
    pub fn new(config: CookieConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.cookies_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&config.backup_dir)?;

        Ok(Self {
            config,
            exists_cache: Mutex::new(None),
            write_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &CookieConfig {
        &self.config
    }

    /// True when the active file exists and is larger than the plausibility threshold.
    pub async fn cookies_exist(&self) -> bool {
        let mut cache = self.exists_cache.lock().await;
        if let Some(exists) = *cache {
            return exists;
        }

        match tokio::fs::metadata(&self.config.cookies_file).await {
            Ok(meta) if meta.is_file() => {
                let exists = meta.len() > config::cookies::MIN_PLAUSIBLE_SIZE_BYTES;
                *cache = Some(exists);
                exists
            }
            Ok(_) => false,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Cannot stat cookies file {:?}: {}", self.config.cookies_file, e);
                }
                false
            }
        }
    }

    async fn invalidate_cache(&self) {
        *self.exists_cache.lock().await = None;
    }

    /// Validates the active cookies with `yt-dlp --print title`.
    pub async fn validate_cookies(&self, timeout: Duration) -> bool {
        self.validate_cookies_detailed(timeout).await.is_valid
    }

    /// Validation with the classified failure reason.
    ///
    /// The yt-dlp child is killed if it outlives `timeout`.
    pub async fn validate_cookies_detailed(&self, timeout: Duration) -> CookieValidation {
        if !self.cookies_exist().await {
            return CookieValidation::invalid(CookieInvalidReason::FileNotFound);
        }

        let mut cmd = Command::new(&self.config.ytdl_bin);
        cmd.arg("--cookies")
            .arg(&self.config.cookies_file)
            .args(["--skip-download", "--print", "title"])
            .arg(&self.config.validation_url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match run_with_timeout(&mut cmd, timeout).await {
            Ok(output) => output,
            Err(ProcessError::TimedOut(_)) => {
                log::warn!("🍪 Cookies validation timed out after {}s", timeout.as_secs());
                return CookieValidation::invalid(CookieInvalidReason::TimedOut);
            }
            Err(e) => {
                log::error!("🍪 Cookies validation could not run {}: {}", self.config.ytdl_bin, e);
                return CookieValidation::invalid(CookieInvalidReason::Unknown(e.to_string()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = CookieInvalidReason::from_ytdlp_error(&stderr);
            log::warn!(
                "❌ Cookies validation failed ({}): {}",
                reason.description(),
                first_stderr_line(&output)
            );
            return CookieValidation::invalid(reason);
        }

        if output.stdout.is_empty() {
            log::warn!("❌ Cookies validation: yt-dlp exited 0 without output");
            return CookieValidation::invalid(CookieInvalidReason::EmptyOutput);
        }

        log::info!("✅ Cookies validation passed");
        CookieValidation::valid()
    }

    /// Copies the active file into the backup dir and returns the backup path.
    ///
    /// Without `name` a `cookies_backup_<YYYYmmdd_HHMMSS>.txt` name is derived
    /// from the local time; existing backups are never overwritten.
    pub async fn backup_cookies(&self, name: Option<&str>) -> Result<PathBuf, CookieError> {
        let _lock = self.write_lock.lock().await;
        self.backup_unlocked(name).await
    }

    async fn backup_unlocked(&self, name: Option<&str>) -> Result<PathBuf, CookieError> {
        if !is_regular_file(&self.config.cookies_file).await {
            return Err(CookieError::NotFound(self.config.cookies_file.clone()));
        }

        let backup_path = match name {
            Some(name) => {
                check_backup_name(name)?;
                let path = self.config.backup_dir.join(name);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(CookieError::BackupExists(name.to_string()));
                }
                path
            }
            None => self.next_backup_path().await,
        };

        let content = tokio::fs::read(&self.config.cookies_file).await?;
        let mut dst = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&backup_path)
            .await?;
        dst.write_all(&content).await?;
        dst.flush().await?;

        log::info!("🗂  Cookies backed up to {}", backup_path.display());
        Ok(backup_path)
    }

    async fn next_backup_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let mut n = 0;
        let mut path = self.config.backup_dir.join(backup_file_name(&stamp, n));
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            n += 1;
            path = self.config.backup_dir.join(backup_file_name(&stamp, n));
        }
        path
    }

    /// Overwrites the active file with a named backup.
    pub async fn restore_cookies(&self, name: &str) -> bool {
        let _lock = self.write_lock.lock().await;
        self.restore_unlocked(name).await
    }

    async fn restore_unlocked(&self, name: &str) -> bool {
        if check_backup_name(name).is_err() {
            log::warn!("Refusing to restore cookies from invalid backup name {:?}", name);
            return false;
        }

        let backup_path = self.config.backup_dir.join(name);
        let content = match tokio::fs::read(&backup_path).await {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Cannot restore cookies from {}: {}", backup_path.display(), e);
                return false;
            }
        };

        if let Err(e) = write_atomically(&self.config.cookies_file, &content).await {
            log::error!("Failed to restore cookies from {}: {}", name, e);
            self.invalidate_cache().await;
            return false;
        }

        *self.exists_cache.lock().await = Some(true);
        log::info!("♻️  Cookies restored from {}", name);
        true
    }

    /// Backup names, newest first.
    pub async fn list_backups(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.config.backup_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Cannot list cookie backups: {}", e);
                }
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(config::cookies::BACKUP_PREFIX) && name.ends_with(config::cookies::BACKUP_SUFFIX) {
                names.push(name);
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));
        names
    }

    /// Replaces the active cookies and validates them.
    ///
    /// The previous file is backed up first; if writing or validation fails,
    /// that backup is restored (or the new file removed when there was none)
    /// and `false` is returned.
    pub async fn update_cookies(&self, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() {
            log::warn!("Rejected empty cookies update");
            return false;
        }

        let _lock = self.write_lock.lock().await;

        let backup_name = if is_regular_file(&self.config.cookies_file).await {
            match self.backup_unlocked(None).await {
                Ok(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
                Err(e) => {
                    log::error!("Cookies update aborted, backup failed: {}", e);
                    return false;
                }
            }
        } else {
            None
        };

        if let Err(e) = write_atomically(&self.config.cookies_file, content.as_bytes()).await {
            log::error!("Failed to write new cookies: {}", e);
            self.rollback(backup_name.as_deref()).await;
            return false;
        }
        self.invalidate_cache().await;

        if self.validate_cookies(self.config.validation_timeout).await {
            log::info!("✅ Cookies updated: {}", self.config.cookies_file.display());
            true
        } else {
            log::warn!("New cookies failed validation, rolling back");
            self.rollback(backup_name.as_deref()).await;
            false
        }
    }

    async fn rollback(&self, backup_name: Option<&str>) {
        match backup_name {
            Some(name) => {
                if !self.restore_unlocked(name).await {
                    log::error!("Rollback failed: could not restore {}", name);
                }
            }
            None => {
                if let Err(e) = tokio::fs::remove_file(&self.config.cookies_file).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::error!("Rollback failed: could not remove new cookies: {}", e);
                    }
                }
                self.invalidate_cache().await;
            }
        }
    }

    /// Cookie file for yt-dlp: the active file, else a random pool member.
    pub async fn credential_for_extractor(&self) -> Option<PathBuf> {
        if self.cookies_exist().await {
            return Some(self.config.cookies_file.clone());
        }

        let pool_dir = self.config.pool_dir.as_ref()?;
        let candidates = pool_candidates(pool_dir).await;
        let picked = {
            use rand::seq::IndexedRandom;
            candidates.choose(&mut rand::rng()).cloned()
        };

        match &picked {
            Some(path) => log::info!("🔁 Using pool cookies: {}", path.display()),
            None => log::warn!("No usable cookies in pool {}", pool_dir.display()),
        }
        picked
    }

    /// `--cookies <path>` for yt-dlp, or nothing when no credential is available.
    pub async fn cli_args(&self) -> Vec<String> {
        match self.credential_for_extractor().await {
            Some(path) => vec!["--cookies".to_string(), path.to_string_lossy().into_owned()],
            None => Vec::new(),
        }
    }

    /// Offline Netscape-format diagnostic of the active file.
    pub async fn diagnose(&self) -> CookiesDiagnostic {
        match tokio::fs::read_to_string(&self.config.cookies_file).await {
            Ok(content) => diagnose_cookies_content(&content),
            Err(_) => CookiesDiagnostic::default(),
        }
    }
}

async fn pool_candidates(pool_dir: &Path) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(pool_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot read cookies pool {}: {}", pool_dir.display(), e);
            return Vec::new();
        }
    };

    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        match entry.metadata().await {
            Ok(meta) if meta.is_file() && meta.len() > config::cookies::MIN_PLAUSIBLE_SIZE_BYTES => {
                candidates.push(path)
            }
            _ => {}
        }
    }
    candidates.sort();
    candidates
}

/// `cookies_backup_<stamp>.txt`, then `_001`, `_002`... for backups taken
/// within the same second, so names keep sorting in creation order.
fn backup_file_name(stamp: &str, n: usize) -> String {
    let prefix = config::cookies::BACKUP_PREFIX;
    let suffix = config::cookies::BACKUP_SUFFIX;
    if n == 0 {
        format!("{}{}{}", prefix, stamp, suffix)
    } else {
        format!("{}{}_{:03}{}", prefix, stamp, n, suffix)
    }
}

fn check_backup_name(name: &str) -> Result<(), CookieError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(CookieError::InvalidName(name.to_string()));
    }
    Ok(())
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// Write to a temp file next to `path`, then rename over it.
async fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp_path = PathBuf::from(format!("{}.tmp.{}", path.display(), std::process::id()));

    tokio::fs::write(&temp_path, content).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}
