use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use chrono_tz::{Europe::Warsaw, Tz};
use filetime::{set_file_mtime, FileTime};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use podcast_pal::aggregator::Aggregator;
use podcast_pal::cache::FeedCache;
use podcast_pal::config::Config;
use podcast_pal::error::{FetchFailure, PalError};
use podcast_pal::fetch::{ResilientFetcher, OVERCAST_OPML_URL};
use podcast_pal::http::{HttpResponse, HttpTransport};
use podcast_pal::pipeline::{Pipeline, Targets};
use podcast_pal::recency::RecencyFilter;
use podcast_pal::scraper::PageScraper;
use podcast_pal::store::{MemoryCollection, PodcastCollection};

const EXPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<opml version="1.0">
  <head><title>Overcast Podcast Subscriptions</title></head>
  <body>
    <outline text="feeds">
      <outline type="rss" text="Daily Tech" title="Daily Tech" xmlUrl="https://example.com/daily.xml">
        <outline type="podcast-episode" overcastId="101" pubDate="2024-03-08T06:00:00-05:00" title="Chips &amp; Dips" url="https://cdn.example.com/101.mp3" overcastUrl="https://overcast.fm/+101" played="1" progress="1200" userUpdatedDate="2024-03-09T20:00:00+01:00"/>
        <outline type="podcast-episode" overcastId="100" pubDate="2024-01-30T06:00:00-05:00" title="Old News" url="https://cdn.example.com/100.mp3" overcastUrl="https://overcast.fm/+100" played="1" userUpdatedDate="2024-02-01T09:00:00+01:00"/>
        <outline type="podcast-episode" overcastId="102" pubDate="2024-03-09T06:00:00-05:00" title="Queued Up" url="https://cdn.example.com/102.mp3" overcastUrl="https://overcast.fm/+102"/>
      </outline>
      <outline type="rss" text="Slow Radio" title="Slow Radio" xmlUrl="https://example.com/slow.xml">
        <outline type="podcast-episode" overcastId="200" pubDate="2023-12-30T06:00:00-05:00" title="Long Ago" url="https://cdn.example.com/200.mp3" overcastUrl="https://overcast.fm/+200" played="1" userUpdatedDate="2024-01-01T10:00:00+01:00"/>
      </outline>
    </outline>
  </body>
</opml>"#;

const PAGE_101: &str = r#"<html><head>
<meta name="og:description" content="Snacks &amp; silicon">
</head><body><img class="art fullart" src="https://public.overcast-cdn.com/art/daily"/></body></html>"#;

/// Serves canned responses per URL and records every request.
struct RoutingTransport {
    routes: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<String>>,
}

impl RoutingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self { routes: Mutex::new(HashMap::new()), requests: Mutex::new(Vec::new()) })
    }

    fn route(&self, url: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), HttpResponse::new(status, body));
    }

    fn requests_for(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl HttpTransport for RoutingTransport {
    async fn get(&self, url: &str) -> anyhow::Result<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| HttpResponse::new(404, "not found")))
    }
}

fn now() -> DateTime<Tz> {
    Warsaw.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

fn config_in(dir: &TempDir) -> Config {
    Config {
        cache_path: dir.path().join("overcast.opml"),
        ..Config::test_default()
    }
}

fn cache_in(dir: &TempDir) -> FeedCache {
    FeedCache::new(config_in(dir).cache_config())
}

fn pipeline(transport: &Arc<RoutingTransport>, cache: FeedCache) -> Pipeline<Arc<RoutingTransport>, PageScraper<Arc<RoutingTransport>>> {
    let _ = env_logger::try_init();
    let config = Config::test_default();
    let filter = RecencyFilter::new(config.reference_tz, config.days_to_keep);
    let aggregator = Aggregator::new(filter, config.enrich_concurrency);
    Pipeline::new(
        ResilientFetcher::new(transport.clone(), cache),
        PageScraper::new(transport.clone()),
        aggregator,
        OVERCAST_OPML_URL,
    )
}

fn live_transport() -> Arc<RoutingTransport> {
    let transport = RoutingTransport::new();
    transport.route(OVERCAST_OPML_URL, 200, EXPORT);
    transport.route("https://overcast.fm/+101", 200, PAGE_101);
    transport
}

#[tokio::test]
async fn fresh_run_inserts_recently_played_episodes() {
    let dir = TempDir::new().unwrap();
    let transport = live_transport();
    let played = MemoryCollection::new("played");

    let report = pipeline(&transport, cache_in(&dir)).run(Targets::Single(&played), &now()).await.unwrap();

    assert!(!report.from_cache);
    assert_eq!(report.podcasts_in_feed, 2);
    assert_eq!(report.played_updates, 1);

    let documents = played.documents().await;
    assert_eq!(documents.len(), 1);
    let daily = &documents[0];
    assert_eq!(daily.title, "Daily Tech");
    assert_eq!(daily.source, "overcast");
    assert_eq!(daily.artwork_url, "https://public.overcast-cdn.com/art/daily");
    assert_eq!(daily.episodes.len(), 1);
    assert_eq!(daily.episodes[0].overcast_id, "101");
    assert_eq!(daily.episodes[0].title, "Chips & Dips");
    assert_eq!(daily.episodes[0].summary, "Snacks & silicon");
    assert_eq!(daily.created_at, now().fixed_offset());

    // The first episode is included, so no excluded page is ever requested.
    assert_eq!(transport.requests_for("https://overcast.fm/+100"), 0);
    assert_eq!(transport.requests_for("https://overcast.fm/+200"), 0);
    assert_eq!(cache_in(&dir).force_read().as_deref(), Some(EXPORT));
}

#[tokio::test]
async fn rerun_with_same_export_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let transport = live_transport();
    let played = MemoryCollection::new("played");
    let pipeline = pipeline(&transport, cache_in(&dir));

    pipeline.run(Targets::Single(&played), &now()).await.unwrap();
    let before = played.documents().await;
    let report = pipeline.run(Targets::Single(&played), &now()).await.unwrap();

    assert_eq!(report.total_updates(), 0);
    assert_eq!(played.write_count(), 1);
    assert_eq!(played.documents().await, before);
}

#[tokio::test]
async fn newly_played_episode_is_appended() {
    let dir = TempDir::new().unwrap();
    let transport = live_transport();
    let played = MemoryCollection::new("played");
    let pipeline = pipeline(&transport, cache_in(&dir));
    pipeline.run(Targets::Single(&played), &now()).await.unwrap();

    let next_export = EXPORT.replace(
        r#"overcastUrl="https://overcast.fm/+102"/>"#,
        r#"overcastUrl="https://overcast.fm/+102" played="1" userUpdatedDate="2024-03-10T08:00:00+01:00"/>"#,
    );
    transport.route(OVERCAST_OPML_URL, 200, &next_export);
    let later = now() + chrono::Duration::hours(1);
    let report = pipeline.run(Targets::Single(&played), &later).await.unwrap();

    assert_eq!(report.played_updates, 1);
    let daily = &played.documents().await[0];
    let ids: Vec<&str> = daily.episodes.iter().map(|ep| ep.overcast_id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102"]);
    // No page for 102, so its summary falls back to the title.
    assert_eq!(daily.episodes[1].summary, "Queued Up");
    assert_eq!(daily.created_at, later.fixed_offset());
}

#[tokio::test]
async fn outage_falls_back_to_expired_cache() {
    let dir = TempDir::new().unwrap();
    let cache = cache_in(&dir);
    cache.write(EXPORT).unwrap();
    let then = SystemTime::now() - Duration::from_secs(72 * 3600);
    set_file_mtime(cache.path(), FileTime::from_system_time(then)).unwrap();

    let transport = RoutingTransport::new();
    transport.route(OVERCAST_OPML_URL, 503, "maintenance");
    transport.route("https://overcast.fm/+101", 200, PAGE_101);
    let played = MemoryCollection::new("played");

    let report = pipeline(&transport, cache).run(Targets::Single(&played), &now()).await.unwrap();

    assert!(report.from_cache);
    assert!(report.stale_cache);
    assert_eq!(report.played_updates, 1);
    assert_eq!(played.len().await, 1);
}

#[tokio::test]
async fn outage_without_cache_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let transport = RoutingTransport::new();
    transport.route(OVERCAST_OPML_URL, 503, "maintenance");
    let played = MemoryCollection::new("played");

    let result = pipeline(&transport, cache_in(&dir)).run(Targets::Single(&played), &now()).await;

    assert!(matches!(result, Err(PalError::FetchError(FetchFailure::Status(503)))));
    assert!(played.is_empty().await);
    assert_eq!(played.write_count(), 0);
}

#[tokio::test]
async fn prefer_cache_skips_the_network() {
    let dir = TempDir::new().unwrap();
    let cache = cache_in(&dir);
    cache.write(EXPORT).unwrap();
    let transport = RoutingTransport::new();
    transport.route("https://overcast.fm/+101", 200, PAGE_101);
    let played = MemoryCollection::new("played");

    let report = pipeline(&transport, cache)
        .prefer_cache(true)
        .run(Targets::Single(&played), &now())
        .await
        .unwrap();

    assert!(report.from_cache);
    assert!(!report.stale_cache);
    assert_eq!(transport.requests_for(OVERCAST_OPML_URL), 0);
    assert_eq!(report.played_updates, 1);
}

#[tokio::test]
async fn dual_bucket_writes_unplayed_separately() {
    let dir = TempDir::new().unwrap();
    let transport = live_transport();
    let played = MemoryCollection::new("played");
    let unplayed = MemoryCollection::new("played_unplayed");

    let report = pipeline(&transport, cache_in(&dir))
        .run(Targets::Dual { played: &played, unplayed: &unplayed }, &now())
        .await
        .unwrap();

    assert_eq!(report.played_updates, 1);
    assert_eq!(report.unplayed_updates, 1);
    let queued = &unplayed.documents().await[0];
    assert_eq!(queued.title, "Daily Tech");
    assert_eq!(queued.episodes.len(), 1);
    assert_eq!(queued.episodes[0].overcast_id, "102");
    assert_eq!(played.documents().await[0].episodes[0].overcast_id, "101");
}

#[tokio::test]
async fn storage_failure_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let transport = live_transport();
    let played = MemoryCollection::new("played");
    played.fail_writes(true);

    let result = pipeline(&transport, cache_in(&dir)).run(Targets::Single(&played), &now()).await;

    match result {
        Err(PalError::StorageError(msg)) => assert!(msg.contains("Daily Tech")),
        other => panic!("expected StorageError, got {:?}", other),
    }
    assert_eq!(played.name(), "played");
}
