//! Persisted podcast documents and the incremental merge against them.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryCollection;
pub use self::redis::RedisCollection;

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use dashmap::DashMap;
use itertools::Itertools;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::error::PalError;
use crate::models::{DocumentKey, Episode, Podcast};

/// A collection of podcast documents keyed by (title, source).
#[async_trait]
pub trait PodcastCollection: Send + Sync {
    fn name(&self) -> &str;

    async fn find_one(&self, key: &DocumentKey) -> Result<Option<Podcast>, PalError>;

    async fn insert_one(&self, document: &Podcast) -> Result<(), PalError>;

    /// Appends `episodes` to the document's list and sets `created_at`, as one
    /// atomic write. Existing episodes are left untouched.
    async fn append_episodes(
        &self,
        key: &DocumentKey,
        episodes: &[Episode],
        touched_at: DateTime<FixedOffset>,
    ) -> Result<(), PalError>;
}

/// Episodes of `incoming` whose `overcast_id` the document doesn't have yet, in
/// incoming order. A repeated id in `incoming` is taken once.
pub fn new_episodes<'a>(existing: &Podcast, incoming: &'a Podcast) -> Vec<&'a Episode> {
    let mut seen: HashSet<&str> = existing.episodes.iter().map(|ep| ep.overcast_id.as_str()).collect();
    incoming
        .episodes
        .iter()
        .filter(|ep| seen.insert(ep.overcast_id.as_str()))
        .collect()
}

/// `podcast` with repeated episode ids dropped, first occurrence kept.
fn deduplicated(podcast: &Podcast) -> Cow<'_, Podcast> {
    let unique: Vec<&Episode> = podcast.episodes.iter().unique_by(|ep| ep.overcast_id.as_str()).collect();
    if unique.len() == podcast.episodes.len() {
        return Cow::Borrowed(podcast);
    }
    warn!(
        "Dropping {} repeated episodes from podcast '{}'",
        podcast.episodes.len() - unique.len(),
        podcast.title
    );
    Cow::Owned(Podcast {
        episodes: unique.into_iter().cloned().collect(),
        ..podcast.clone()
    })
}

/// Insert-or-append against a collection. The find-then-write sequence for a
/// key runs under a per-key lock, so at most one writer touches a document.
#[derive(Default)]
pub struct Upserter {
    locks: DashMap<(String, DocumentKey), Arc<Mutex<()>>>,
}

impl Upserter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, collection: &str, key: &DocumentKey) -> Arc<Mutex<()>> {
        self.locks
            .entry((collection.to_string(), key.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns whether anything was written.
    pub async fn upsert<C>(&self, collection: &C, podcast: &Podcast) -> Result<bool, PalError>
    where
        C: PodcastCollection + ?Sized,
    {
        let key = podcast.key();
        let lock = self.lock_for(collection.name(), &key);
        let _guard = lock.lock().await;

        let existing = collection
            .find_one(&key)
            .await
            .map_err(|e| wrap("Failed to query podcast", &key, e))?;

        let Some(existing) = existing else {
            let document = deduplicated(podcast);
            info!(
                "Inserting new podcast '{}' with {} episodes into '{}'",
                document.title,
                document.episodes.len(),
                collection.name()
            );
            collection
                .insert_one(&document)
                .await
                .map_err(|e| wrap("Failed to insert podcast", &key, e))?;
            return Ok(true);
        };

        let fresh: Vec<Episode> = new_episodes(&existing, podcast).into_iter().cloned().collect();
        if fresh.is_empty() {
            debug!("No new episodes for podcast '{}'", podcast.title);
            return Ok(false);
        }

        info!("Updating podcast '{}' with {} new episodes", podcast.title, fresh.len());
        collection
            .append_episodes(&key, &fresh, podcast.created_at)
            .await
            .map_err(|e| wrap("Failed to update podcast", &key, e))?;
        Ok(true)
    }
}

fn wrap(context: &str, key: &DocumentKey, err: PalError) -> PalError {
    match err {
        PalError::StorageError(msg) => PalError::StorageError(format!("{} '{}': {}", context, key, msg)),
        other => PalError::StorageError(format!("{} '{}': {}", context, key, other)),
    }
}
