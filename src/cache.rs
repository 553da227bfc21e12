// src/cache.rs
//! File-backed cache for the raw OPML export.
//!
//! One slot, overwritten on every successful fetch. The file's modification
//! time is the expiry clock; a missing file counts as expired.

use crate::error::PalError;
use log::{debug, error, info};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub max_age: Duration,
}

impl CacheConfig {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self { path: path.into(), max_age }
    }

    pub fn from_hours(path: impl Into<PathBuf>, hours: u64) -> Self {
        Self::new(path, Duration::from_secs(hours * 3600))
    }
}

/// Age of the cached blob, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheAge {
    pub hours: u64,
    pub minutes: u64,
    pub is_expired: bool,
}

#[derive(Debug, Clone)]
pub struct FeedCache {
    config: CacheConfig,
}

impl FeedCache {
    pub fn new(config: CacheConfig) -> Self {
        debug!(
            "Feed cache at {} (max age {}s)",
            config.path.display(),
            config.max_age.as_secs()
        );
        Self { config }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn max_age(&self) -> Duration {
        self.config.max_age
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.config.path).and_then(|m| m.modified()).ok()
    }

    /// Age of the entry as seen at `now`. A timestamp in the future counts as zero.
    fn age_at(&self, now: SystemTime) -> Option<Duration> {
        self.modified()
            .map(|mtime| now.duration_since(mtime).unwrap_or(Duration::ZERO))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match self.age_at(now) {
            Some(age) => age > self.config.max_age,
            None => true,
        }
    }

    /// Content regardless of age. Read errors are logged and reported as absence.
    pub fn force_read(&self) -> Option<String> {
        match fs::read_to_string(&self.config.path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                error!("Error reading cached OPML at {}: {}", self.config.path.display(), e);
                None
            }
        }
    }

    /// Content only while the entry is still fresh.
    pub fn read(&self) -> Option<String> {
        if self.is_expired() {
            if self.modified().is_some() {
                info!(
                    "Cached OPML is older than {} hour(s), will fetch fresh data",
                    self.config.max_age.as_secs() / 3600
                );
            }
            return None;
        }
        self.force_read()
    }

    /// Replaces the cached blob. The content lands in a sibling temp file first
    /// and is renamed over the slot, so readers never observe a partial write.
    pub fn write(&self, content: &str) -> Result<(), PalError> {
        let tmp_path = self.config.path.with_extension("tmp");
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.config.path)
        })();

        match result {
            Ok(()) => {
                info!("Successfully cached OPML file ({} bytes)", content.len());
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(PalError::StorageError(format!(
                    "Failed to cache OPML at {}: {}",
                    self.config.path.display(),
                    e
                )))
            }
        }
    }

    pub fn age(&self) -> Option<CacheAge> {
        self.age_at_time(SystemTime::now())
    }

    pub fn age_at_time(&self, now: SystemTime) -> Option<CacheAge> {
        let age = self.age_at(now)?;
        let total_minutes = age.as_secs() / 60;
        Some(CacheAge {
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
            is_expired: age > self.config.max_age,
        })
    }
}
