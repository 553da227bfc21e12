//! One end-to-end run: acquire the feed, aggregate, merge into the store.
//!
//! Everything up to the merge pass happens before the first write, so a run
//! that fails early leaves the store untouched.

use chrono::DateTime;
use chrono_tz::Tz;
use log::{info, warn};

use crate::aggregator::Aggregator;
use crate::error::PalError;
use crate::fetch::{FetchResult, ResilientFetcher};
use crate::http::HttpTransport;
use crate::models::Podcast;
use crate::opml::parse_opml;
use crate::scraper::EpisodeEnricher;
use crate::store::{PodcastCollection, Upserter};
use crate::utils::timing::Timer;

/// Where a run's podcasts get written.
pub enum Targets<'a> {
    /// Recently played episodes only.
    Single(&'a dyn PodcastCollection),
    /// Played and unplayed episodes into separate collections.
    Dual {
        played: &'a dyn PodcastCollection,
        unplayed: &'a dyn PodcastCollection,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub from_cache: bool,
    pub stale_cache: bool,
    pub podcasts_in_feed: usize,
    pub played_updates: usize,
    pub unplayed_updates: usize,
}

impl RunReport {
    pub fn total_updates(&self) -> usize {
        self.played_updates + self.unplayed_updates
    }
}

pub struct Pipeline<T: HttpTransport, E: EpisodeEnricher> {
    fetcher: ResilientFetcher<T>,
    enricher: E,
    aggregator: Aggregator,
    upserter: Upserter,
    endpoint: String,
    prefer_cache: bool,
}

impl<T: HttpTransport, E: EpisodeEnricher> Pipeline<T, E> {
    pub fn new(fetcher: ResilientFetcher<T>, enricher: E, aggregator: Aggregator, endpoint: impl Into<String>) -> Self {
        Self {
            fetcher,
            enricher,
            aggregator,
            upserter: Upserter::new(),
            endpoint: endpoint.into(),
            prefer_cache: false,
        }
    }

    /// Skip the network while the cached export is still fresh.
    pub fn prefer_cache(mut self, prefer: bool) -> Self {
        self.prefer_cache = prefer;
        self
    }

    pub async fn run(&self, targets: Targets<'_>, now: &DateTime<Tz>) -> Result<RunReport, PalError> {
        let mut timer = Timer::start("Pipeline run");
        let mut report = RunReport::default();

        let fetched = if self.prefer_cache {
            self.fetcher.fetch_preferring_cache(&self.endpoint).await?
        } else {
            self.fetcher.fetch(&self.endpoint).await?
        };
        if let FetchResult::Cached { is_stale, .. } = &fetched {
            report.from_cache = true;
            report.stale_cache = *is_stale;
        }
        let raw_podcasts = parse_opml(fetched.body())?;
        report.podcasts_in_feed = raw_podcasts.len();
        timer.checkpoint("fetch");

        match targets {
            Targets::Single(collection) => {
                let podcasts = self.aggregator.aggregate(&raw_podcasts, &self.enricher, now).await;
                timer.checkpoint("aggregate");
                report.played_updates = self.merge(collection, &podcasts).await?;
            }
            Targets::Dual { played, unplayed } => {
                let buckets = self.aggregator.aggregate_buckets(&raw_podcasts, &self.enricher, now).await;
                timer.checkpoint("aggregate");
                report.played_updates = self.merge(played, &buckets.played).await?;
                report.unplayed_updates = self.merge(unplayed, &buckets.unplayed).await?;
            }
        }
        timer.checkpoint("merge");
        timer.finish();

        if report.stale_cache {
            warn!("This run used an expired OPML cache; data may be out of date");
        }
        if report.total_updates() == 0 {
            info!("No podcasts were updated in this run");
        } else {
            info!(
                "Updated {} played podcasts and {} unplayed podcasts in this run",
                report.played_updates, report.unplayed_updates
            );
        }
        Ok(report)
    }

    async fn merge(&self, collection: &dyn PodcastCollection, podcasts: &[Podcast]) -> Result<usize, PalError> {
        let mut updates = 0;
        for podcast in podcasts {
            if self.upserter.upsert(collection, podcast).await? {
                updates += 1;
            }
        }
        Ok(updates)
    }
}
