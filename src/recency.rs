//! Play-state and recency decisions.
//!
//! All comparisons happen in one reference timezone. Naive timestamps are
//! taken to already be in that zone; zone-aware ones are converted into it.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::warn;

use crate::opml::RawEpisode;

const SECONDS_PER_DAY: i64 = 86_400;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Pins a naive timestamp to the reference zone. For a wall-clock time skipped
/// by a DST jump, the instant an hour later is used.
pub fn annotate_naive(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

pub fn to_reference<Z: TimeZone>(ts: &DateTime<Z>, tz: &Tz) -> DateTime<Tz> {
    ts.with_timezone(tz)
}

/// Parses RFC 3339, RFC 2822, or a zone-less ISO timestamp into the reference zone.
pub fn parse_timestamp(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(to_reference(&ts, tz));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(to_reference(&ts, tz));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| annotate_naive(naive, tz))
}

/// Whole days elapsed, rounded down.
fn days_between(earlier: &DateTime<Tz>, later: &DateTime<Tz>) -> i64 {
    (*later - *earlier).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// An episode counts only if it was played, has a last-played time, and that
/// time is no more than `retention_days` whole days before `now` (inclusive).
pub fn should_include(
    played: bool,
    last_played: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
    retention_days: i64,
) -> bool {
    if !played {
        return false;
    }
    match last_played {
        Some(ts) => days_between(ts, now) <= retention_days,
        None => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecencyFilter {
    tz: Tz,
    retention_days: i64,
}

impl RecencyFilter {
    pub fn new(tz: Tz, retention_days: i64) -> Self {
        Self { tz, retention_days }
    }

    pub fn with_retention_days(self, retention_days: i64) -> Self {
        Self { retention_days, ..self }
    }

    pub fn tz(&self) -> &Tz {
        &self.tz
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    pub fn includes(&self, episode: &RawEpisode, now: &DateTime<Tz>) -> bool {
        if !episode.is_played() {
            return false;
        }
        let last_played = episode.attr("userUpdatedDate").and_then(|raw| {
            let parsed = parse_timestamp(raw, &self.tz);
            if parsed.is_none() {
                warn!("Unparseable userUpdatedDate '{}' on '{}'", raw, episode.title());
            }
            parsed
        });
        should_include(true, last_played.as_ref(), now, self.retention_days)
    }
}
