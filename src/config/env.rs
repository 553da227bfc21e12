use log::error;
use std::env;

use crate::error::PalError;

/// Settings without which a run cannot start.
pub const REQUIRED_ENV_VARS: &[&str] = &[
    "EMAIL",
    "PASSWORD",
    "PODCAST_DB",
    "MONGODB_DATABASE",
    "MONGODB_COLLECTION",
    "SESSION_PATH",
];

/// Names of required variables that are unset or blank.
pub fn missing_env_vars() -> Vec<&'static str> {
    REQUIRED_ENV_VARS
        .iter()
        .copied()
        .filter(|key| env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true))
        .collect()
}

pub fn check_env_vars() -> Result<(), PalError> {
    let missing = missing_env_vars();
    if missing.is_empty() {
        return Ok(());
    }
    for key in &missing {
        error!("ERROR: {key} is not set!");
    }
    error!("Please set all required variables in .env file before running");
    Err(PalError::ConfigError(format!(
        "Missing required environment variables: {}",
        missing.join(", ")
    )))
}
