use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::cache::CacheConfig;
use crate::error::PalError;

pub const DEFAULT_CACHE_PATH: &str = "/tmp/overcast.opml";
pub const DEFAULT_CACHE_MAX_AGE_HOURS: u64 = 36;
pub const DEFAULT_DAYS_TO_KEEP: i64 = 3;
pub const DEFAULT_REFERENCE_TZ: &str = "Europe/Warsaw";
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 4;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct Config {
    pub email: String,
    pub password: String,
    pub session_path: PathBuf,
    pub store_uri: String,
    pub database: String,
    pub collection: String,
    pub unplayed_collection: String,
    pub cache_path: PathBuf,
    pub cache_max_age_hours: u64,
    pub days_to_keep: i64,
    pub reference_tz: Tz,
    pub enrich_concurrency: usize,
    pub http_timeout_secs: u64,
}

// Manual Debug so credentials never reach the logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("session_path", &self.session_path)
            .field("store_uri", &"<redacted>")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("unplayed_collection", &self.unplayed_collection)
            .field("cache_path", &self.cache_path)
            .field("cache_max_age_hours", &self.cache_max_age_hours)
            .field("days_to_keep", &self.days_to_keep)
            .field("reference_tz", &self.reference_tz)
            .field("enrich_concurrency", &self.enrich_concurrency)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

fn cache_path_from_env() -> PathBuf {
    env::var("OPML_CACHE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_PATH))
}

fn cache_max_age_hours_from_env() -> u64 {
    env::var("OPML_CACHE_MAX_AGE_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CACHE_MAX_AGE_HOURS)
}

/// Cache location and lifetime only. Needs none of the required variables.
pub fn cache_config_from_env() -> CacheConfig {
    CacheConfig::from_hours(cache_path_from_env(), cache_max_age_hours_from_env())
}

fn required(key: &str) -> Result<String, PalError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PalError::ConfigError(format!("{} environment variable is not set", key)))
}

impl Config {
    pub fn from_env() -> Result<Self, PalError> {
        let collection = required("MONGODB_COLLECTION")?;
        let tz_name = env::var("REFERENCE_TZ").unwrap_or_else(|_| DEFAULT_REFERENCE_TZ.to_string());
        let reference_tz: Tz = tz_name
            .parse()
            .map_err(|e| PalError::ConfigError(format!("REFERENCE_TZ '{}': {}", tz_name, e)))?;

        Ok(Config {
            email: required("EMAIL")?,
            password: required("PASSWORD")?,
            session_path: PathBuf::from(required("SESSION_PATH")?),
            store_uri: required("PODCAST_DB")?,
            database: required("MONGODB_DATABASE")?,
            unplayed_collection: env::var("UNPLAYED_COLLECTION")
                .unwrap_or_else(|_| format!("{}_unplayed", collection)),
            collection,
            cache_path: cache_path_from_env(),
            cache_max_age_hours: cache_max_age_hours_from_env(),
            days_to_keep: env::var("DAYS_TO_KEEP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DAYS_TO_KEEP),
            reference_tz,
            enrich_concurrency: env::var("ENRICH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_ENRICH_CONCURRENCY),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        })
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_hours * 3600)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache_path.clone(), self.cache_max_age())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Settings for tests; nothing here points at a real account.
    pub fn test_default() -> Self {
        Config {
            email: "listener@example.com".to_string(),
            password: "hunter2".to_string(),
            session_path: PathBuf::from("/tmp/podcast-pal-test.session"),
            store_uri: "redis://127.0.0.1/".to_string(),
            database: "podcasts".to_string(),
            collection: "played".to_string(),
            unplayed_collection: "played_unplayed".to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_max_age_hours: DEFAULT_CACHE_MAX_AGE_HOURS,
            days_to_keep: DEFAULT_DAYS_TO_KEEP,
            reference_tz: chrono_tz::Europe::Warsaw,
            enrich_concurrency: DEFAULT_ENRICH_CONCURRENCY,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn validate_and_log(&self) {
        log::info!("Application Configuration Loaded: {:?}", self);
        if self.days_to_keep < 0 {
            log::warn!("DAYS_TO_KEEP is negative ({}); no played episode will pass", self.days_to_keep);
        }
    }
}
