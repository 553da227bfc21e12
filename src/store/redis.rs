// src/store/redis.rs
//! Redis-backed podcast collection.
//!
//! A document is a hash holding the podcast fields plus a list of
//! JSON-encoded episodes. Inserts and appends run as MULTI/EXEC pipelines,
//! so an append is one atomic RPUSH + HSET.

use std::collections::HashMap;
use std::fmt;

use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use log::{debug, error, info};

use super::PodcastCollection;
use crate::error::PalError;
use crate::models::{DocumentKey, Episode, Podcast};

const FIELD_TITLE: &str = "podcast_title";
const FIELD_SOURCE: &str = "source";
const FIELD_ARTWORK: &str = "artwork_url";
const FIELD_CATEGORY: &str = "category";
const FIELD_CREATED_AT: &str = "created_at";

/// One collection inside a database namespace, sharing a Redis connection.
#[derive(Clone)]
pub struct RedisCollection {
    conn_manager: ConnectionManager,
    database: String,
    collection: String,
}

// ConnectionManager isn't Debug
impl fmt::Debug for RedisCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCollection")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

impl RedisCollection {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, PalError> {
        info!("Initializing Redis connection manager for collection '{}.{}'", database, collection);
        let client = ::redis::Client::open(uri)
            .map_err(|e| PalError::StorageError(format!("Invalid store URI: {}", e)))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create Redis ConnectionManager: {}", e);
            PalError::StorageError(format!("Failed to connect to store: {}", e))
        })?;
        info!("Connected to collection '{}.{}'", database, collection);
        Ok(Self::with_manager(conn_manager, database, collection))
    }

    /// Another collection over the same connection.
    pub fn with_manager(conn_manager: ConnectionManager, database: &str, collection: &str) -> Self {
        Self {
            conn_manager,
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }

    pub fn sibling(&self, collection: &str) -> Self {
        Self::with_manager(self.conn_manager.clone(), &self.database, collection)
    }

    fn document_key(&self, key: &DocumentKey) -> String {
        document_key(&self.database, &self.collection, key)
    }

    fn episodes_key(&self, key: &DocumentKey) -> String {
        episodes_key(&self.database, &self.collection, key)
    }
}

const DOCUMENT_PREFIX: &str = "doc";
const EPISODES_PREFIX: &str = "eps";

// Hashes and lists live under different fixed segments, so a title can never
// turn one podcast's list key into another podcast's hash key.
pub(crate) fn document_key(database: &str, collection: &str, key: &DocumentKey) -> String {
    format!("{}:{}:{}:{}:{}", database, collection, DOCUMENT_PREFIX, key.source, key.title)
}

pub(crate) fn episodes_key(database: &str, collection: &str, key: &DocumentKey) -> String {
    format!("{}:{}:{}:{}:{}", database, collection, EPISODES_PREFIX, key.source, key.title)
}

fn document_fields(podcast: &Podcast) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        (FIELD_TITLE, podcast.title.clone()),
        (FIELD_SOURCE, podcast.source.clone()),
        (FIELD_ARTWORK, podcast.artwork_url.clone()),
        (FIELD_CREATED_AT, podcast.created_at.to_rfc3339()),
    ];
    if let Some(category) = &podcast.category {
        fields.push((FIELD_CATEGORY, category.clone()));
    }
    fields
}

fn encode_episodes(episodes: &[Episode]) -> Result<Vec<String>, PalError> {
    episodes
        .iter()
        .map(|ep| serde_json::to_string(ep).map_err(PalError::from))
        .collect()
}

fn decode_document(mut fields: HashMap<String, String>, episodes: Vec<String>) -> Result<Podcast, PalError> {
    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| PalError::StorageError(format!("document is missing '{}'", name)))
    };
    let title = take(FIELD_TITLE)?;
    let source = take(FIELD_SOURCE)?;
    let artwork_url = take(FIELD_ARTWORK)?;
    let created_raw = take(FIELD_CREATED_AT)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|e| PalError::StorageError(format!("bad created_at '{}': {}", created_raw, e)))?;
    let category = fields.remove(FIELD_CATEGORY);

    let episodes = episodes
        .iter()
        .map(|raw| serde_json::from_str::<Episode>(raw).map_err(PalError::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Podcast { title, source, artwork_url, category, created_at, episodes })
}

#[async_trait]
impl PodcastCollection for RedisCollection {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn find_one(&self, key: &DocumentKey) -> Result<Option<Podcast>, PalError> {
        let doc_key = self.document_key(key);
        let eps_key = self.episodes_key(key);
        debug!("Looking up document {}", doc_key);
        let mut conn = self.conn_manager.clone();

        let fields: HashMap<String, String> = conn.hgetall(&doc_key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let episodes: Vec<String> = conn.lrange(&eps_key, 0, -1).await?;
        decode_document(fields, episodes).map(Some)
    }

    async fn insert_one(&self, document: &Podcast) -> Result<(), PalError> {
        let key = document.key();
        let doc_key = self.document_key(&key);
        let eps_key = self.episodes_key(&key);
        let encoded = encode_episodes(&document.episodes)?;
        let mut conn = self.conn_manager.clone();

        let fields = document_fields(document);
        let mut pipe = ::redis::pipe();
        pipe.atomic().hset_multiple(&doc_key, fields.as_slice()).ignore();
        if !encoded.is_empty() {
            pipe.rpush(&eps_key, encoded).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        debug!("Inserted document {}", doc_key);
        Ok(())
    }

    async fn append_episodes(
        &self,
        key: &DocumentKey,
        episodes: &[Episode],
        touched_at: DateTime<FixedOffset>,
    ) -> Result<(), PalError> {
        let doc_key = self.document_key(key);
        let eps_key = self.episodes_key(key);
        let encoded = encode_episodes(episodes)?;
        let mut conn = self.conn_manager.clone();

        let mut pipe = ::redis::pipe();
        pipe.atomic()
            .hset(&doc_key, FIELD_CREATED_AT, touched_at.to_rfc3339())
            .ignore();
        if !encoded.is_empty() {
            pipe.rpush(&eps_key, encoded).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        debug!("Appended {} episodes to {}", episodes.len(), doc_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Warsaw;
    use pretty_assertions::assert_eq;

    fn sample() -> Podcast {
        let ts = Warsaw.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap().fixed_offset();
        Podcast {
            title: "Test Podcast".into(),
            source: "overcast".into(),
            artwork_url: "http://artwork.url".into(),
            category: Some("Technology".into()),
            created_at: ts,
            episodes: vec![Episode {
                title: "Test Episode".into(),
                audio_url: "http://audio.url".into(),
                overcast_url: "http://overcast.url".into(),
                overcast_id: "ep123".into(),
                published: ts,
                play_progress: Some("50".into()),
                last_played_at: Some(ts),
                summary: "Test summary".into(),
                duration_secs: Some(1800),
            }],
        }
    }

    #[test]
    fn keys_are_namespaced() {
        let key = DocumentKey::new("Test Podcast", "overcast");
        assert_eq!(document_key("pods", "played", &key), "pods:played:doc:overcast:Test Podcast");
        assert_eq!(episodes_key("pods", "played", &key), "pods:played:eps:overcast:Test Podcast");
    }

    #[test]
    fn episode_list_never_aliases_another_document() {
        let titles = ["Tech", "Tech:episodes", "eps:overcast:Tech", "doc:overcast:Tech", ":", ""];
        for a in titles {
            for b in titles {
                let list = episodes_key("pods", "played", &DocumentKey::new(a, "overcast"));
                let hash = document_key("pods", "played", &DocumentKey::new(b, "overcast"));
                assert_ne!(list, hash, "list of {:?} collides with hash of {:?}", a, b);
            }
        }
    }

    #[test]
    fn document_decodes_from_fields_and_list() {
        let podcast = sample();
        let fields: HashMap<String, String> = document_fields(&podcast)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let episodes = encode_episodes(&podcast.episodes).unwrap();

        assert_eq!(decode_document(fields, episodes).unwrap(), podcast);
    }

    #[test]
    fn incomplete_document_is_a_storage_error() {
        let fields: HashMap<String, String> = [("podcast_title".to_string(), "x".to_string())].into_iter().collect();
        assert!(matches!(decode_document(fields, vec![]), Err(PalError::StorageError(_))));
    }
}
