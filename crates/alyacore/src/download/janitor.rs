//! Background retention sweep of the download directory.
//!
//! Every artifact is a plain `<id>.<ext>` file, so the janitor has no index to
//! maintain: it lists the directory, compares file ages with the retention
//! window and deletes what expired.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::config;

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub dir: PathBuf,
    pub retention: Duration,
    pub interval: Duration,
    pub error_cooldown: Duration,
}

impl JanitorConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retention: config::cache::retention(),
            interval: config::cache::sweep_interval(),
            error_cooldown: config::cache::error_cooldown(),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files looked at
    pub scanned: usize,
    pub deleted: usize,
    /// Files whose metadata or removal failed
    pub failed: usize,
}

struct RunningTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the periodic sweep task.
pub struct CacheJanitor {
    config: JanitorConfig,
    task: Mutex<Option<RunningTask>>,
}

impl CacheJanitor {
    pub fn new(config: JanitorConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Spawns the sweep loop unless one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.config.clone(), token.clone()));
        *task = Some(RunningTask { token, handle });
        log::info!(
            "🔄 Cache janitor started for {} (retention {}s, every {}s)",
            self.config.dir.display(),
            self.config.retention.as_secs(),
            self.config.interval.as_secs()
        );
    }

    /// Cancels the loop and waits for it to exit. No-op when stopped.
    pub async fn stop(&self) {
        let running = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(running) = running else {
            return;
        };

        running.token.cancel();
        if let Err(e) = running.handle.await {
            log::error!("Cache janitor task ended abnormally: {}", e);
        }
        log::info!("🛑 Cache janitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub async fn sweep(&self) -> std::io::Result<SweepReport> {
        self.sweep_at(SystemTime::now()).await
    }

    /// Sweeps as if the current time were `now`.
    pub async fn sweep_at(&self, now: SystemTime) -> std::io::Result<SweepReport> {
        sweep_dir(&self.config.dir, now, self.config.retention, file_time).await
    }

    /// Deletes `path` regardless of age. `Ok(false)` when nothing was there.
    pub async fn evict(&self, path: &Path) -> std::io::Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                log::debug!("Evicted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes `path` only if it is older than the retention window.
    pub async fn evict_if_expired(&self, path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        if !meta.is_file() || !is_expired(file_time(&meta), SystemTime::now(), self.config.retention) {
            return false;
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                log::info!("🧹 Auto-cleaned expired file: {}", path.display());
                true
            }
            Err(e) => {
                log::error!("❌ Error auto-cleaning {}: {}", path.display(), e);
                false
            }
        }
    }
}

impl Drop for CacheJanitor {
    fn drop(&mut self) {
        if let Some(running) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            running.token.cancel();
        }
    }
}

async fn run_loop(config: JanitorConfig, token: CancellationToken) {
    let mut pause = config.interval;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }

        pause = match sweep_dir(&config.dir, SystemTime::now(), config.retention, file_time).await {
            Ok(report) => {
                if report.deleted > 0 {
                    log::info!("🗑️ Cleanup completed: {} files removed", report.deleted);
                }
                config.interval
            }
            Err(e) => {
                log::error!(
                    "💥 Cache sweep of {} failed: {} (retrying in {}s)",
                    config.dir.display(),
                    e,
                    config.error_cooldown.as_secs()
                );
                config.error_cooldown
            }
        };
    }
}

type Stamp = fn(&std::fs::Metadata) -> Option<SystemTime>;

async fn sweep_dir(dir: &Path, now: SystemTime, retention: Duration, stamp: Stamp) -> std::io::Result<SweepReport> {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("Cannot stat {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        report.scanned += 1;

        if !is_expired(stamp(&meta), now, retention) {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                report.deleted += 1;
                log::info!("🧹 Cleaned up old file: {}", path.display());
            }
            // Removed concurrently by an eviction
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                report.failed += 1;
                log::error!("❌ Error cleaning up {}: {}", path.display(), e);
            }
        }
    }

    Ok(report)
}

/// Creation time where the platform reports it, modification time otherwise.
fn file_time(meta: &std::fs::Metadata) -> Option<SystemTime> {
    meta.created().or_else(|_| meta.modified()).ok()
}

/// Files without a usable timestamp and files from the future are kept.
fn is_expired(file_time: Option<SystemTime>, now: SystemTime, retention: Duration) -> bool {
    file_time
        .and_then(|t| now.duration_since(t).ok())
        .is_some_and(|age| age > retention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_is_expired_against_retention() {
        let now = SystemTime::now();
        let retention = config::cache::retention();

        assert!(is_expired(Some(now - 7 * HOUR), now, retention));
        assert!(!is_expired(Some(now - 2 * HOUR), now, retention));
        assert!(!is_expired(Some(now - retention), now, retention));
        assert!(!is_expired(Some(now + HOUR), now, retention));
        assert!(!is_expired(None, now, retention));
    }

    #[tokio::test]
    async fn test_sweep_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let janitor = CacheJanitor::new(JanitorConfig::new(dir.path().join("absent")));
        assert_eq!(janitor.sweep().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.webm"), b"a").unwrap();
        std::fs::write(dir.path().join("older.mp4"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("kept.mp3"), b"c").unwrap();

        let janitor = CacheJanitor::new(JanitorConfig::new(dir.path()));

        let fresh = janitor.sweep().await.unwrap();
        assert_eq!(fresh, SweepReport { scanned: 2, deleted: 0, failed: 0 });

        let later = SystemTime::now() + 7 * HOUR;
        let report = janitor.sweep_at(later).await.unwrap();
        assert_eq!(report, SweepReport { scanned: 2, deleted: 2, failed: 0 });
        assert!(!dir.path().join("old.webm").exists());
        assert!(dir.path().join("nested").join("kept.mp3").exists());
    }

    #[tokio::test]
    async fn test_sweep_mixed_ages() {
        let dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let seven = dir.path().join("seven.webm");
        let two = dir.path().join("two.mp4");
        for (path, age) in [(&seven, 7 * HOUR), (&two, 2 * HOUR)] {
            let file = std::fs::File::create(path).unwrap();
            file.set_modified(now - age).unwrap();
        }

        let report = sweep_dir(dir.path(), now, config::cache::retention(), |meta| meta.modified().ok())
            .await
            .unwrap();
        assert_eq!(report, SweepReport { scanned: 2, deleted: 1, failed: 0 });
        assert!(!seven.exists());
        assert!(two.exists());
    }

    #[tokio::test]
    async fn test_evict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.webm");
        std::fs::write(&path, b"data").unwrap();

        let janitor = CacheJanitor::new(JanitorConfig::new(dir.path()));
        assert!(janitor.evict(&path).await.unwrap());
        assert!(!janitor.evict(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_evict_if_expired_keeps_fresh_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.mp4");
        std::fs::write(&path, b"data").unwrap();

        let janitor = CacheJanitor::new(JanitorConfig::new(dir.path()));
        assert!(!janitor.evict_if_expired(&path).await);
        assert!(path.exists());

        let mut config = JanitorConfig::new(dir.path());
        config.retention = Duration::ZERO;
        let eager = CacheJanitor::new(config);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(eager.evict_if_expired(&path).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.webm");
        std::fs::write(&path, b"data").unwrap();

        let mut config = JanitorConfig::new(dir.path());
        config.retention = Duration::ZERO;
        config.interval = Duration::from_millis(50);
        let janitor = CacheJanitor::new(config);

        assert!(!janitor.is_running());
        janitor.start();
        janitor.start();
        assert!(janitor.is_running());

        for _ in 0..100 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!path.exists());

        janitor.stop().await;
        assert!(!janitor.is_running());
        janitor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_interrupts_long_sleep() {
        let dir = TempDir::new().unwrap();
        let janitor = CacheJanitor::new(JanitorConfig::new(dir.path()));
        janitor.start();

        tokio::time::timeout(Duration::from_secs(2), janitor.stop())
            .await
            .expect("stop should not wait for the hourly sleep");
        assert!(!janitor.is_running());
    }
}
