//! Episode and podcast records, and the shape they are persisted in.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::PalError;
use crate::opml::{RawEpisode, RawPodcast};
use crate::recency::parse_timestamp;

pub const SOURCE_TAG: &str = "overcast";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(rename = "episode_title")]
    pub title: String,
    pub audio_url: String,
    pub overcast_url: String,
    /// Stable across fetches; the merge key.
    pub overcast_id: String,
    #[serde(rename = "published_date")]
    pub published: DateTime<FixedOffset>,
    pub play_progress: Option<String>,
    pub last_played_at: Option<DateTime<FixedOffset>>,
    pub summary: String,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

impl Episode {
    pub fn from_raw(raw: &RawEpisode, summary: String, tz: &Tz) -> Result<Self, PalError> {
        let pub_date = raw.require("pubDate")?;
        let published = parse_timestamp(pub_date, tz)
            .ok_or_else(|| PalError::ParseError(format!("invalid pubDate '{}'", pub_date)))?;
        let last_played_at = raw
            .attr("userUpdatedDate")
            .and_then(|v| parse_timestamp(v, tz))
            .map(|ts| ts.fixed_offset());

        Ok(Episode {
            title: raw.require("title")?.to_string(),
            audio_url: raw.require("url")?.to_string(),
            overcast_url: raw.require("overcastUrl")?.to_string(),
            overcast_id: raw.require("overcastId")?.to_string(),
            published: published.fixed_offset(),
            play_progress: raw.attr("progress").map(str::to_string),
            last_played_at,
            summary,
            duration_secs: raw.attr("duration").and_then(|d| d.trim().parse().ok()),
        })
    }
}

/// Store identity of a podcast document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub title: String,
    pub source: String,
}

impl DocumentKey {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self { title: title.into(), source: source.into() }
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Podcast {
    #[serde(rename = "podcast_title")]
    pub title: String,
    pub source: String,
    pub artwork_url: String,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub episodes: Vec<Episode>,
}

impl Podcast {
    /// Builds a run's view of one podcast. Episodes repeating an `overcast_id`
    /// are dropped, keeping the first.
    pub fn from_raw(
        raw: &RawPodcast,
        episodes: Vec<Episode>,
        artwork_url: String,
        created_at: DateTime<Tz>,
    ) -> Self {
        Podcast {
            title: raw.title().to_string(),
            source: SOURCE_TAG.to_string(),
            artwork_url,
            category: raw.category().map(str::to_string),
            created_at: created_at.fixed_offset(),
            episodes: episodes
                .into_iter()
                .unique_by(|ep| ep.overcast_id.clone())
                .collect(),
        }
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(&self.title, &self.source)
    }
}
