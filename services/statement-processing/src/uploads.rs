//! Upload Store
//!
//! Owns the directory where uploaded statements wait for extraction.
//! Every stored file gets a fresh UUID name, so concurrent extractions never
//! touch the same path. A sweep removes anything older than the configured
//! age as a safety net for files orphaned by crashes.

use fintrack_utils::{FintrackResult, UploadConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one sweep over the upload directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_age: Duration,
    sweep_interval: Duration,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration, sweep_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
            sweep_interval,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            &config.dir,
            Duration::from_secs(config.max_age_seconds),
            Duration::from_secs(config.sweep_interval_seconds),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> FintrackResult<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Write an upload under a generated name and return its path.
    pub async fn store(&self, data: &[u8], original_name: &str) -> FintrackResult<PathBuf> {
        self.ensure_dir().await?;
        let path = self.dir.join(format!("{}.pdf", Uuid::new_v4()));
        fs::write(&path, data).await?;

        debug!(
            path = %path.display(),
            original_name,
            bytes = data.len(),
            "Stored upload"
        );
        Ok(path)
    }

    /// Delete a file, logging rather than failing when it can't be removed.
    pub async fn remove(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove upload"),
        }
    }

    /// Remove every file older than the configured max age.
    pub async fn sweep_stale(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), error = %e, "Cannot read upload directory");
                }
                return report;
            }
        };

        let now = SystemTime::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Stopped sweep on unreadable directory entry");
                    break;
                }
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Cannot stat upload");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to remove stale upload");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                scanned = report.scanned,
                removed = report.removed,
                failed = report.failed,
                "Swept stale uploads"
            );
        }
        report
    }

    /// Sweep on a fixed interval for the life of the process.
    pub fn spawn_periodic_sweep(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.sweep_interval);
            // First tick completes immediately; startup already swept once
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_stale().await;
            }
        })
    }
}
