use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Cache janitor configuration
pub mod cache {
    use super::Duration;

    /// Maximum age of a downloaded artifact before the janitor deletes it (6 hours)
    pub const RETENTION_SECS: u64 = 6 * 3600;

    /// Interval between janitor sweeps (1 hour)
    pub const SWEEP_INTERVAL_SECS: u64 = 3600;

    /// Pause after an unexpected sweep failure before trying again (5 minutes)
    pub const ERROR_COOLDOWN_SECS: u64 = 300;

    pub fn retention() -> Duration {
        Duration::from_secs(RETENTION_SECS)
    }

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }

    pub fn error_cooldown() -> Duration {
        Duration::from_secs(ERROR_COOLDOWN_SECS)
    }
}

/// Primary download API configuration
pub mod api {
    use super::Duration;

    /// Total timeout for a media stream request. Large videos take a while.
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 600;

    /// Timeout for the `/api/status` quota request
    pub const STATUS_TIMEOUT_SECS: u64 = 10;

    pub const CONNECT_TIMEOUT_SECS: u64 = 30;

    /// Browser-like user agent sent with every API request
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

    pub fn download_timeout() -> Duration {
        Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)
    }

    pub fn status_timeout() -> Duration {
        Duration::from_secs(STATUS_TIMEOUT_SECS)
    }

    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }
}

/// yt-dlp invocation configuration
pub mod ytdlp {
    use super::Duration;

    /// Upper bound for a single fallback download (30 minutes)
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 1800;

    /// Upper bound for info-only calls (`-J`, flat playlists)
    pub const INFO_TIMEOUT_SECS: u64 = 120;

    /// Audio bitrate requested from the mp3 post-processor
    pub const AUDIO_QUALITY: &str = "320K";

    /// Resolution ceiling for fallback video downloads
    pub const MAX_VIDEO_HEIGHT: u32 = 720;

    pub fn download_timeout() -> Duration {
        Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)
    }

    pub fn info_timeout() -> Duration {
        Duration::from_secs(INFO_TIMEOUT_SECS)
    }
}

/// Cookie store configuration
pub mod cookies {
    use super::Duration;

    /// Files at or below this size cannot hold a usable cookie jar
    pub const MIN_PLAUSIBLE_SIZE_BYTES: u64 = 100;

    pub const VALIDATION_TIMEOUT_SECS: u64 = 5;

    /// Target used by `--print title` to check that the cookies still work
    pub const VALIDATION_URL: &str = "https://www.youtube.com";

    pub const BACKUP_PREFIX: &str = "cookies_backup_";

    pub const BACKUP_SUFFIX: &str = ".txt";

    pub fn validation_timeout() -> Duration {
        Duration::from_secs(VALIDATION_TIMEOUT_SECS)
    }
}

/// Runtime configuration assembled from the environment.
///
/// | Variable | Default |
/// |---|---|
/// | `DOWNLOAD_FOLDER` | `downloads` |
/// | `API_URL` | `http://127.0.0.1:8080` |
/// | `API_KEY` | empty (primary API then always reports no quota) |
/// | `YTDL_BIN` | `yt-dlp` |
/// | `COOKIES_FILE` | `assets/cookies.txt` |
/// | `COOKIES_BACKUP_DIR` | `assets/cookies_backup` |
/// | `COOKIES_POOL_DIR` | unset |
/// | `LOG_FILE_PATH` | `alya.log` |
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub download_dir: PathBuf,
    pub api_url: String,
    pub api_key: SecretString,
    pub ytdl_bin: String,
    pub cookies_file: PathBuf,
    pub cookies_backup_dir: PathBuf,
    pub cookies_pool_dir: Option<PathBuf>,
    pub log_file_path: PathBuf,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            download_dir: env_path("DOWNLOAD_FOLDER", "downloads"),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            api_key: SecretString::from(env::var("API_KEY").unwrap_or_default()),
            ytdl_bin: env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()),
            cookies_file: env_path("COOKIES_FILE", "assets/cookies.txt"),
            cookies_backup_dir: env_path("COOKIES_BACKUP_DIR", "assets/cookies_backup"),
            cookies_pool_dir: env::var("COOKIES_POOL_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| expand_path(&v)),
            log_file_path: env_path("LOG_FILE_PATH", "alya.log"),
        }
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    expand_path(&raw)
}
