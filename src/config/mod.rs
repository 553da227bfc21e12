pub mod env;
pub mod settings;

pub use settings::Config;

use crate::error::PalError;
use std::sync::Arc;

/// Loads `.env`, checks every required variable and returns the shared config.
/// Missing credentials or store settings abort before anything touches the network.
pub fn load_config() -> Result<Arc<Config>, PalError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    env::check_env_vars()?;
    let config = Config::from_env()?;
    config.validate_and_log();

    Ok(Arc::new(config))
}
