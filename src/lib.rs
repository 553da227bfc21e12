pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod models;
pub mod opml;
pub mod pipeline;
pub mod recency;
pub mod scraper;
pub mod session;
pub mod store;
pub mod utils;

// Re-export the pieces a caller wires together
pub use aggregator::Aggregator;
pub use cache::{CacheConfig, FeedCache};
pub use error::{FetchFailure, PalError};
pub use fetch::{FetchResult, ResilientFetcher};
pub use models::{Episode, Podcast};
pub use pipeline::{Pipeline, RunReport, Targets};
pub use recency::RecencyFilter;
pub use store::{MemoryCollection, PodcastCollection, RedisCollection, Upserter};
