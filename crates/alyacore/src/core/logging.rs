//! Logging initialization and configuration checking
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Cookies configuration validation and logging
//! - Startup diagnostics

use anyhow::Result;
use simplelog::*;
use std::fs::File;
use std::path::Path;

use crate::download::cookies::CookieStore;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &Path) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Masks an API key for logs: keeps the first few characters only.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    if prefix.is_empty() {
        "<empty>".to_string()
    } else {
        format!("{}...", prefix)
    }
}

/// Logs cookies configuration at application startup
///
/// Reports the active cookie file, the backup set and the rotation pool, and
/// runs the offline Netscape-format diagnostic on the active file.
pub async fn log_cookies_configuration(store: &CookieStore) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🍪 Cookies Configuration Check");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = store.config();
    if store.cookies_exist().await {
        log::info!("✅ Active cookies file: {}", config.cookies_file.display());
        let diag = store.diagnose().await;
        log::info!(
            "   cookies: total={} youtube={} auth_missing=[{}] auth_expired=[{}]",
            diag.total_cookies,
            diag.youtube_cookies,
            diag.auth_cookies_missing.join(","),
            diag.auth_cookies_expired.join(",")
        );
        for issue in &diag.issues {
            log::warn!("   ⚠️  {}", issue);
        }
    } else {
        log::warn!(
            "⚠️  Active cookies file missing or too small: {}",
            config.cookies_file.display()
        );
    }

    let backups = store.list_backups().await;
    log::info!(
        "🗂  Backups in {}: {} (latest: {})",
        config.backup_dir.display(),
        backups.len(),
        backups.first().map(String::as_str).unwrap_or("none")
    );

    match &config.pool_dir {
        Some(pool) => log::info!("🔁 Rotation pool: {}", pool.display()),
        None => log::info!("🔁 Rotation pool: not configured"),
    }

    if store.credential_for_extractor().await.is_none() {
        log::error!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        log::error!("❌ NO COOKIES AVAILABLE - yt-dlp fallback downloads will FAIL!");
        log::error!("   Export cookies to {} or set COOKIES_POOL_DIR", config.cookies_file.display());
        log::error!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abcdefghijkl"), "abcdef...");
        assert_eq!(mask_secret("abc"), "abc...");
        assert_eq!(mask_secret(""), "<empty>");
    }
}
