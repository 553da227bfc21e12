// src/utils/mod.rs
use log::info;

pub mod timing;

/// Installs the process-wide logger. `level` applies to this crate and most
/// dependencies; HTTP and Redis internals are clamped to warnings.
pub fn setup_logging(level: log::LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("rustls", log::LevelFilter::Warn)
        .level_for("redis", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized.");
    Ok(())
}

/// Parses a level name, falling back to `Info`.
pub fn parse_level(name: Option<&str>) -> log::LevelFilter {
    name.and_then(|n| n.parse().ok()).unwrap_or(log::LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(parse_level(Some("debug")), log::LevelFilter::Debug);
        assert_eq!(parse_level(Some("WARN")), log::LevelFilter::Warn);
        assert_eq!(parse_level(Some("chatty")), log::LevelFilter::Info);
        assert_eq!(parse_level(None), log::LevelFilter::Info);
    }
}
