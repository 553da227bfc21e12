// src/main.rs
use std::process;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use podcast_pal::{
    aggregator::Aggregator,
    cache::FeedCache,
    config::{self, settings::cache_config_from_env, Config},
    error::PalError,
    fetch::{ResilientFetcher, OVERCAST_OPML_URL},
    pipeline::{Pipeline, RunReport, Targets},
    recency::RecencyFilter,
    scraper::PageScraper,
    session::{Credentials, SessionManager},
    store::{MemoryCollection, PodcastCollection, RedisCollection},
    utils::{parse_level, setup_logging},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sync recent Overcast listening history into a podcast store", long_about = None)]
struct Args {
    /// Retention window in days; overrides DAYS_TO_KEEP
    #[arg(long)]
    days_to_keep: Option<i64>,

    /// Also write unplayed episodes to UNPLAYED_COLLECTION
    #[arg(long)]
    dual_bucket: bool,

    /// Run the whole pipeline against an in-memory store
    #[arg(long)]
    dry_run: bool,

    /// Use the cached export without fetching while it is still fresh
    #[arg(long)]
    prefer_cache: bool,

    /// Print the age of the cached export and exit
    #[arg(long)]
    cache_status: bool,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = setup_logging(parse_level(args.log_level.as_deref())) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if args.cache_status {
        dotenv::dotenv().ok();
        print_cache_status(&FeedCache::new(cache_config_from_env()));
        return;
    }

    match run(&args).await {
        Ok(report) => info!("Run finished: {:?}", report),
        Err(e) => {
            error!("Run failed ({:?}): {}", e.categorize(), e);
            process::exit(1);
        }
    }
}

fn print_cache_status(cache: &FeedCache) {
    match cache.age() {
        Some(age) => println!(
            "Cache at {} is {}h {}m old ({})",
            cache.path().display(),
            age.hours,
            age.minutes,
            if age.is_expired { "expired" } else { "valid" }
        ),
        None => println!("No cache at {}", cache.path().display()),
    }
}

async fn run(args: &Args) -> Result<RunReport, PalError> {
    info!("🎧 podcast-pal starting");
    let app_config = config::load_config()?;

    let credentials = Credentials::new(app_config.email.clone(), app_config.password.clone())?;
    let sessions = SessionManager::new(credentials, app_config.session_path.clone(), app_config.http_timeout())?;
    let session = Arc::new(sessions.get_session().await?);

    let retention_days = args.days_to_keep.unwrap_or(app_config.days_to_keep);
    let filter = RecencyFilter::new(app_config.reference_tz, retention_days);
    let now = filter.now();
    let aggregator = Aggregator::new(filter, app_config.enrich_concurrency);

    let fetcher = ResilientFetcher::new(session.clone(), FeedCache::new(app_config.cache_config()));
    let pipeline = Pipeline::new(fetcher, PageScraper::new(session), aggregator, OVERCAST_OPML_URL)
        .prefer_cache(args.prefer_cache);

    if args.dry_run {
        warn!("Dry run: writing to an in-memory store only");
        let played = MemoryCollection::new(app_config.collection.clone());
        let unplayed = MemoryCollection::new(app_config.unplayed_collection.clone());
        let report = pipeline.run(targets(args, &played, &unplayed), &now).await?;
        for podcast in played.documents().await {
            info!("[dry run] {} ({} episodes)", podcast.title, podcast.episodes.len());
        }
        return Ok(report);
    }

    let played = connect(&app_config).await?;
    let unplayed = played.sibling(&app_config.unplayed_collection);
    pipeline.run(targets(args, &played, &unplayed), &now).await
}

fn targets<'a>(args: &Args, played: &'a dyn PodcastCollection, unplayed: &'a dyn PodcastCollection) -> Targets<'a> {
    if args.dual_bucket {
        Targets::Dual { played, unplayed }
    } else {
        Targets::Single(played)
    }
}

async fn connect(app_config: &Config) -> Result<RedisCollection, PalError> {
    RedisCollection::connect(&app_config.store_uri, &app_config.database, &app_config.collection).await
}
