//! In-process collection for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tokio::sync::Mutex;

use super::PodcastCollection;
use crate::error::PalError;
use crate::models::{DocumentKey, Episode, Podcast};

#[derive(Debug, Default)]
pub struct MemoryCollection {
    name: String,
    documents: Mutex<HashMap<DocumentKey, Podcast>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Number of successful inserts and appends so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn documents(&self) -> Vec<Podcast> {
        let mut docs: Vec<Podcast> = self.documents.lock().await.values().cloned().collect();
        docs.sort_by(|a, b| a.key().cmp(&b.key()));
        docs
    }

    fn check_write(&self) -> Result<(), PalError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PalError::StorageError(format!("write to '{}' rejected", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl PodcastCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, key: &DocumentKey) -> Result<Option<Podcast>, PalError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PalError::StorageError(format!("read from '{}' rejected", self.name)));
        }
        Ok(self.documents.lock().await.get(key).cloned())
    }

    async fn insert_one(&self, document: &Podcast) -> Result<(), PalError> {
        self.check_write()?;
        self.documents.lock().await.insert(document.key(), document.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn append_episodes(
        &self,
        key: &DocumentKey,
        episodes: &[Episode],
        touched_at: DateTime<FixedOffset>,
    ) -> Result<(), PalError> {
        self.check_write()?;
        let mut documents = self.documents.lock().await;
        let document = documents
            .get_mut(key)
            .ok_or_else(|| PalError::StorageError(format!("no document for '{}'", key)))?;
        document.episodes.extend_from_slice(episodes);
        document.created_at = touched_at;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
