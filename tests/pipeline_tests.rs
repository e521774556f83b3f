use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use osm2gtfs::Error;
use osm2gtfs::cache::DiskCache;
use osm2gtfs::config::{ConfigOverrides, Configuration};
use osm2gtfs::creators::{
    AgencyCreator, Creator, CreatorKind, CreatorRegistry, CreatorSet, FeedInfoCreator,
    RouteNaming, RoutesCreator, ScheduleCreator, StopsCreator, TripsCreator,
};
use osm2gtfs::feed::Feed;
use osm2gtfs::osm::{GeoRoute, GeoSource, GeoStop};
use osm2gtfs::pipeline::{self, PipelineState, RefreshScope};
use osm2gtfs::schedule::{ScheduleData, ScheduleEntry, ScheduleSource, ServiceDef};
use osm2gtfs::store::GeoDataStore;

#[derive(Default)]
struct Calls {
    routes: AtomicUsize,
    stops: AtomicUsize,
    schedule: AtomicUsize,
}

impl Calls {
    fn counts(&self) -> (usize, usize, usize) {
        (
            self.routes.load(Ordering::SeqCst),
            self.stops.load(Ordering::SeqCst),
            self.schedule.load(Ordering::SeqCst),
        )
    }
}

struct MockGeo {
    calls: Arc<Calls>,
    offline: bool,
    /// Adds route 2, which the timetable does not mention.
    unscheduled_route: bool,
}

#[async_trait]
impl GeoSource for MockGeo {
    fn name(&self) -> &str {
        "mock-overpass"
    }

    fn cache_key(&self) -> String {
        "route=bus in accra".into()
    }

    async fn fetch_routes(&self) -> anyhow::Result<Vec<GeoRoute>> {
        self.calls.routes.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            anyhow::bail!("network unreachable");
        }
        let mut routes = vec![GeoRoute {
            id: "r100".into(),
            reference: "1".into(),
            name: "Line 1".into(),
            stop_ids: vec!["n1".into(), "n2".into(), "n3".into()],
            from: Some("Circle".into()),
            to: Some("Madina".into()),
            colour: None,
        }];
        if self.unscheduled_route {
            routes.push(GeoRoute {
                id: "r200".into(),
                reference: "2".into(),
                name: "Line 2".into(),
                stop_ids: vec!["n3".into(), "n1".into()],
                from: None,
                to: None,
                colour: None,
            });
        }
        Ok(routes)
    }

    async fn fetch_stops(&self) -> anyhow::Result<Vec<GeoStop>> {
        self.calls.stops.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            anyhow::bail!("network unreachable");
        }
        Ok(["A", "B", "C"]
            .iter()
            .enumerate()
            .map(|(i, name)| GeoStop {
                id: format!("n{}", i + 1),
                lat: 5.55 + i as f64 * 0.01,
                lon: -0.2,
                name: name.to_string(),
            })
            .collect())
    }
}

struct MockSchedule {
    calls: Arc<Calls>,
}

#[async_trait]
impl ScheduleSource for MockSchedule {
    fn name(&self) -> &str {
        "mock-schedule"
    }

    fn cache_key(&self) -> String {
        "timetable.json".into()
    }

    async fn fetch(&self) -> anyhow::Result<ScheduleData> {
        self.calls.schedule.fetch_add(1, Ordering::SeqCst);
        Ok(ScheduleData {
            services: vec![ServiceDef {
                service_id: "weekday".into(),
                days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
                start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            }],
            entries: vec![ScheduleEntry {
                route_ref: "1".into(),
                service_id: "weekday".into(),
                departures: vec!["06:00".parse().unwrap()],
                stop_offsets: None,
                minutes_between_stops: 5,
            }],
        })
    }
}

struct Harness {
    dir: tempfile::TempDir,
    calls: Arc<Calls>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            calls: Arc::new(Calls::default()),
        }
    }

    fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    fn config(&self, selector: &str, output: &str) -> Configuration {
        let json = format!(
            r#"{{
                "selector": "{selector}",
                "agency": {{
                    "agency_id": "TRT",
                    "agency_name": "Trotro Network",
                    "agency_url": "https://example.org",
                    "agency_timezone": "Africa/Accra"
                }},
                "feed_info": {{
                    "publisher_name": "Maps Club",
                    "publisher_url": "https://example.org/club",
                    "lang": "en",
                    "version": "2026.1"
                }},
                "query": {{
                    "bbox": {{"n": 5.7, "s": 5.5, "e": -0.1, "w": -0.3}},
                    "tags": {{"route": "bus"}}
                }}
            }}"#
        );
        let overrides = ConfigOverrides {
            output: Some(self.output(output)),
        };
        Configuration::from_json(&json, &overrides).unwrap()
    }

    fn store(&self, config: &Configuration, offline: bool) -> GeoDataStore {
        self.store_with(config, offline, false)
    }

    fn store_with(
        &self,
        config: &Configuration,
        offline: bool,
        unscheduled_route: bool,
    ) -> GeoDataStore {
        GeoDataStore::new(
            Box::new(MockGeo {
                calls: Arc::clone(&self.calls),
                offline,
                unscheduled_route,
            }),
            Box::new(MockSchedule {
                calls: Arc::clone(&self.calls),
            }),
            DiskCache::new(self.dir.path().join("cache"), config.selector()),
            config.cache().clone(),
        )
    }
}

fn read_entry(archive: &Path, name: &str) -> String {
    let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut text = String::new();
    zip.by_name(name).unwrap().read_to_string(&mut text).unwrap();
    text
}

fn data_rows(archive: &Path, name: &str) -> Vec<String> {
    read_entry(archive, name)
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_end_to_end_single_route() {
    let h = Harness::new();
    let config = h.config("default", "feed.zip");
    let mut store = h.store(&config, false);

    let outcome = pipeline::run(
        &config,
        &mut store,
        &CreatorRegistry::with_defaults(),
        RefreshScope::None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.state, PipelineState::Patched);
    assert_eq!(outcome.populated, CreatorKind::ORDER.to_vec());

    let archive = outcome.archive.unwrap();
    assert_eq!(archive, h.output("feed.zip"));
    assert_eq!(data_rows(&archive, "agency.txt").len(), 1);
    assert_eq!(data_rows(&archive, "routes.txt"), vec!["r100,TRT,1,Line 1,3,"]);
    assert_eq!(data_rows(&archive, "stops.txt").len(), 3);
    assert_eq!(
        data_rows(&archive, "trips.txt"),
        vec!["r100,weekday,r100-weekday-060000,C"]
    );
    assert_eq!(
        data_rows(&archive, "stop_times.txt"),
        vec![
            "r100-weekday-060000,06:00:00,06:00:00,n1,1",
            "r100-weekday-060000,06:05:00,06:05:00,n2,2",
            "r100-weekday-060000,06:10:00,06:10:00,n3,3",
        ]
    );
    assert_eq!(
        data_rows(&archive, "calendar.txt"),
        vec!["weekday,1,1,1,1,1,0,0,20260101,20261231"]
    );
    assert!(read_entry(&archive, "feed_info.txt").contains("Maps Club"));
}

#[tokio::test]
async fn test_warnings_are_reported_and_archive_still_written() {
    let h = Harness::new();
    let config = h.config("default", "feed.zip");
    let mut store = h.store_with(&config, false, true);

    let outcome = pipeline::run(
        &config,
        &mut store,
        &CreatorRegistry::with_defaults(),
        RefreshScope::None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.state, PipelineState::Patched);
    assert!(outcome.problems.iter().all(|p| !p.is_fatal()));
    assert!(outcome.problems.iter().any(|p| {
        p.table == "routes" && p.entity.as_deref() == Some("r200") && p.message == "route has no trips"
    }));

    let archive = outcome.archive.unwrap();
    assert!(archive.exists());
    assert_eq!(data_rows(&archive, "routes.txt").len(), 2);
    assert_eq!(data_rows(&archive, "trips.txt").len(), 1);
}

#[tokio::test]
async fn test_accra_strategy_names_routes_by_termini() {
    let h = Harness::new();
    let config = h.config("accra", "accra.zip");
    let mut store = h.store(&config, false);

    let outcome = pipeline::run(
        &config,
        &mut store,
        &CreatorRegistry::with_defaults(),
        RefreshScope::None,
    )
    .await
    .unwrap();

    let routes = data_rows(&outcome.archive.unwrap(), "routes.txt");
    assert_eq!(routes, vec!["r100,TRT,1,Circle - Madina,3,"]);
}

#[tokio::test]
async fn test_repeated_runs_are_identical_and_use_cache() {
    let h = Harness::new();
    let registry = CreatorRegistry::with_defaults();

    let first = h.config("default", "first.zip");
    pipeline::run(&first, &mut h.store(&first, false), &registry, RefreshScope::None)
        .await
        .unwrap();

    let second = h.config("default", "second.zip");
    pipeline::run(&second, &mut h.store(&second, false), &registry, RefreshScope::None)
        .await
        .unwrap();

    assert_eq!(h.calls.counts(), (1, 1, 1));
    assert_eq!(
        std::fs::read(h.output("first.zip")).unwrap(),
        std::fs::read(h.output("second.zip")).unwrap()
    );
}

#[tokio::test]
async fn test_cached_data_survives_offline_run() {
    let h = Harness::new();
    let registry = CreatorRegistry::with_defaults();

    let config = h.config("default", "online.zip");
    pipeline::run(&config, &mut h.store(&config, false), &registry, RefreshScope::None)
        .await
        .unwrap();

    let config = h.config("default", "offline.zip");
    let outcome = pipeline::run(&config, &mut h.store(&config, true), &registry, RefreshScope::None)
        .await
        .unwrap();
    assert_eq!(outcome.state, PipelineState::Patched);
}

#[tokio::test]
async fn test_routes_refresh_touches_nothing_else() {
    let h = Harness::new();
    let config = h.config("default", "feed.zip");
    let mut store = h.store(&config, false);

    let outcome = pipeline::run(
        &config,
        &mut store,
        &CreatorRegistry::with_defaults(),
        RefreshScope::Routes,
    )
    .await
    .unwrap();

    assert_eq!(outcome.state, PipelineState::DataLoaded);
    assert!(outcome.archive.is_none());
    assert_eq!(h.calls.counts(), (1, 0, 0));
    assert!(!h.output("feed.zip").exists());
}

#[tokio::test]
async fn test_refresh_all_refetches_and_converts() {
    let h = Harness::new();
    let registry = CreatorRegistry::with_defaults();

    let config = h.config("default", "feed.zip");
    pipeline::run(&config, &mut h.store(&config, false), &registry, RefreshScope::None)
        .await
        .unwrap();
    let outcome = pipeline::run(&config, &mut h.store(&config, false), &registry, RefreshScope::All)
        .await
        .unwrap();

    assert_eq!(outcome.state, PipelineState::Patched);
    assert_eq!(h.calls.counts(), (2, 2, 2));
}

#[tokio::test]
async fn test_failed_refresh_is_data_source_error() {
    let h = Harness::new();
    let config = h.config("default", "feed.zip");

    let err = pipeline::run(
        &config,
        &mut h.store(&config, true),
        &CreatorRegistry::with_defaults(),
        RefreshScope::Stops,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::DataSource { ref source_name, .. } if source_name == "mock-overpass"));
}

#[tokio::test]
async fn test_unsupported_agency_writes_nothing() {
    let h = Harness::new();
    let config = h.config("atlantis", "feed.zip");

    let err = pipeline::run(
        &config,
        &mut h.store(&config, false),
        &CreatorRegistry::with_defaults(),
        RefreshScope::None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::UnsupportedAgency(ref s) if s == "atlantis"));
    assert!(!h.output("feed.zip").exists());
}

/// Records each creator's kind and the number of stops in the feed when it ran.
struct Recording {
    inner: Box<dyn Creator>,
    log: Arc<Mutex<Vec<(CreatorKind, usize)>>>,
}

#[async_trait]
impl Creator for Recording {
    fn kind(&self) -> CreatorKind {
        self.inner.kind()
    }

    async fn populate(&self, feed: &mut Feed, store: &mut GeoDataStore) -> osm2gtfs::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.kind(), feed.stops().len()));
        self.inner.populate(feed, store).await
    }
}

/// Leaves the feed untouched.
struct Nothing(CreatorKind);

#[async_trait]
impl Creator for Nothing {
    fn kind(&self) -> CreatorKind {
        self.0
    }

    async fn populate(&self, _feed: &mut Feed, _store: &mut GeoDataStore) -> osm2gtfs::Result<()> {
        Ok(())
    }
}

fn recording_set(config: &Configuration, log: &Arc<Mutex<Vec<(CreatorKind, usize)>>>) -> CreatorSet {
    let wrap = |inner: Box<dyn Creator>| -> Box<dyn Creator> {
        Box::new(Recording {
            inner,
            log: Arc::clone(log),
        })
    };
    CreatorSet {
        agency: wrap(Box::new(AgencyCreator::new(config))),
        feed_info: wrap(Box::new(FeedInfoCreator::new(config))),
        routes: wrap(Box::new(RoutesCreator::new(config, RouteNaming::Name))),
        stops: wrap(Box::new(StopsCreator::new(config))),
        schedule: wrap(Box::new(ScheduleCreator::new(config))),
        trips: wrap(Box::new(TripsCreator::new(config))),
    }
}

#[tokio::test]
async fn test_creators_run_in_dependency_order() {
    let h = Harness::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = CreatorRegistry::new();
    let shared = Arc::clone(&log);
    registry.register("recording", move |config| recording_set(config, &shared));

    let config = h.config("recording", "feed.zip");
    pipeline::run(&config, &mut h.store(&config, false), &registry, RefreshScope::None)
        .await
        .unwrap();

    let log = log.lock().unwrap().clone();
    let kinds: Vec<_> = log.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, CreatorKind::ORDER.to_vec());

    let stops_before_schedule = log
        .iter()
        .find(|(kind, _)| *kind == CreatorKind::Schedule)
        .map(|(_, stops)| *stops);
    assert_eq!(stops_before_schedule, Some(3));
}

#[tokio::test]
async fn test_fatal_validation_problem_stops_before_writing() {
    let h = Harness::new();
    let mut registry = CreatorRegistry::new();
    registry.register("agencyless", |config| {
        let mut set = recording_set(config, &Arc::new(Mutex::new(Vec::new())));
        set.agency = Box::new(Nothing(CreatorKind::Agency));
        set
    });

    let config = h.config("agencyless", "feed.zip");
    let err = pipeline::run(&config, &mut h.store(&config, false), &registry, RefreshScope::None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation { .. }));
    assert!(!h.output("feed.zip").exists());
}
