//! Turns parsed OPML into per-run podcast records.
//!
//! Episodes are filtered before enrichment, so excluded episodes never cost a
//! page fetch. Enrichment of the surviving episodes runs concurrently (bounded)
//! and keeps feed order.

use chrono::DateTime;
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::models::{Episode, Podcast};
use crate::opml::{RawEpisode, RawPodcast};
use crate::recency::RecencyFilter;
use crate::scraper::EpisodeEnricher;

/// Podcasts split by play state, for the dual-collection mode.
#[derive(Debug, Clone, Default)]
pub struct Buckets {
    pub played: Vec<Podcast>,
    pub unplayed: Vec<Podcast>,
}

pub struct Aggregator {
    filter: RecencyFilter,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(filter: RecencyFilter, concurrency: usize) -> Self {
        Self { filter, concurrency: concurrency.max(1) }
    }

    pub fn filter(&self) -> &RecencyFilter {
        &self.filter
    }

    /// Recently played episodes, one record per podcast that has any.
    pub async fn aggregate<E>(&self, raw_podcasts: &[RawPodcast], enricher: &E, now: &DateTime<Tz>) -> Vec<Podcast>
    where
        E: EpisodeEnricher + ?Sized,
    {
        let mut podcasts = Vec::new();
        for raw in raw_podcasts {
            let included: Vec<&RawEpisode> = raw.episodes.iter().filter(|ep| self.filter.includes(ep, now)).collect();
            if included.is_empty() {
                debug!("No recently played episodes for '{}'", raw.title());
                continue;
            }
            let artwork_url = self.resolve_artwork(raw, &included, enricher).await;
            let episodes = self.enrich(&included, enricher).await;
            podcasts.push(Podcast::from_raw(raw, episodes, artwork_url, *now));
        }
        info!("Aggregated {} podcasts with recently played episodes", podcasts.len());
        podcasts
    }

    /// Played bucket as in [`aggregate`](Self::aggregate); unplayed bucket holds
    /// every episode not marked played, regardless of age.
    pub async fn aggregate_buckets<E>(&self, raw_podcasts: &[RawPodcast], enricher: &E, now: &DateTime<Tz>) -> Buckets
    where
        E: EpisodeEnricher + ?Sized,
    {
        let mut buckets = Buckets::default();
        for raw in raw_podcasts {
            let played: Vec<&RawEpisode> = raw.episodes.iter().filter(|ep| self.filter.includes(ep, now)).collect();
            let unplayed: Vec<&RawEpisode> = raw.episodes.iter().filter(|ep| !ep.is_played()).collect();
            if played.is_empty() && unplayed.is_empty() {
                continue;
            }

            let candidates: Vec<&RawEpisode> = played.iter().chain(unplayed.iter()).copied().collect();
            let artwork_url = self.resolve_artwork(raw, &candidates, enricher).await;

            if !played.is_empty() {
                let episodes = self.enrich(&played, enricher).await;
                buckets.played.push(Podcast::from_raw(raw, episodes, artwork_url.clone(), *now));
            }
            if !unplayed.is_empty() {
                let episodes = self.enrich(&unplayed, enricher).await;
                buckets.unplayed.push(Podcast::from_raw(raw, episodes, artwork_url, *now));
            }
        }
        info!(
            "Aggregated {} played and {} unplayed podcasts",
            buckets.played.len(),
            buckets.unplayed.len()
        );
        buckets
    }

    /// Artwork comes from the feed's first episode page. If that page yields
    /// nothing, the first included episode's page is tried once.
    async fn resolve_artwork<E>(&self, raw: &RawPodcast, included: &[&RawEpisode], enricher: &E) -> String
    where
        E: EpisodeEnricher + ?Sized,
    {
        let first_url = raw.episodes.first().and_then(RawEpisode::overcast_url);
        if let Some(url) = first_url {
            let artwork = enricher.artwork_url(url).await;
            if !artwork.is_empty() {
                return artwork;
            }
        }
        match included.iter().find_map(|ep| ep.overcast_url()) {
            Some(url) if Some(url) != first_url => enricher.artwork_url(url).await,
            _ => String::new(),
        }
    }

    async fn enrich<E>(&self, episodes: &[&RawEpisode], enricher: &E) -> Vec<Episode>
    where
        E: EpisodeEnricher + ?Sized,
    {
        let tz = *self.filter.tz();
        stream::iter(episodes.iter().copied())
            .map(|raw| async move {
                let title = raw.title();
                let summary = match raw.overcast_url() {
                    Some(url) => enricher.summary(url, title).await,
                    None => title.to_string(),
                };
                match Episode::from_raw(raw, summary, &tz) {
                    Ok(episode) => Some(episode),
                    Err(e) => {
                        warn!("Skipping malformed episode '{}': {}", title, e);
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .filter_map(|episode| async move { episode })
            .collect()
            .await
    }
}
