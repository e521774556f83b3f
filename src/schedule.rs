//! Timetable data from a schedule source.
//!
//! The geographic data only says where routes go; when they run comes from a
//! separate JSON timetable, fetched over HTTP or read from a local file:
//!
//! ```json
//! {
//!   "services": [
//!     {"service_id": "weekday", "days": ["mon", "tue", "wed", "thu", "fri"],
//!      "start_date": "2026-01-01", "end_date": "2026-12-31"}
//!   ],
//!   "entries": [
//!     {"route_ref": "7", "service_id": "weekday",
//!      "departures": ["06:00", "06:30"], "stop_offsets": [0, 4, 9]}
//!   ]
//! }
//! ```

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::feed::ServiceTime;
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};

/// Default spacing between consecutive stops when an entry gives no offsets.
pub const DEFAULT_MINUTES_BETWEEN_STOPS: u32 = 2;

/// A named set of operating days, written as a `calendar.txt` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    pub service_id: String,
    pub days: Vec<Weekday>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Departures of one route reference under one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub route_ref: String,
    pub service_id: String,
    /// Departure times from the first stop.
    pub departures: Vec<ServiceTime>,
    /// Minutes from the first stop to each stop, one per stop.
    #[serde(default)]
    pub stop_offsets: Option<Vec<u32>>,
    #[serde(default = "default_minutes_between_stops")]
    pub minutes_between_stops: u32,
}

fn default_minutes_between_stops() -> u32 {
    DEFAULT_MINUTES_BETWEEN_STOPS
}

/// Everything a schedule source provides; cached as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleData {
    #[serde(default)]
    pub services: Vec<ServiceDef>,
    #[serde(default)]
    pub entries: Vec<ScheduleEntry>,
}

impl ScheduleData {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(bytes).context("schedule source is not a valid timetable document")
    }

}

/// Provider of timetable data.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Identifies what this source reads; cache entries for another key are ignored.
    fn cache_key(&self) -> String;

    async fn fetch(&self) -> anyhow::Result<ScheduleData>;
}

/// Builds the schedule source named by the configuration.
pub fn source_from_config(config: &Configuration) -> Result<Box<dyn ScheduleSource>> {
    let Some(source) = config.schedule_source() else {
        return Ok(Box::new(NoSchedule));
    };

    if let Some(path) = &source.path {
        return Ok(Box::new(FileSchedule { path: path.clone() }));
    }

    let url = source
        .url
        .clone()
        .ok_or_else(|| Error::Config("schedule_source needs a url or a path".into()))?;
    let client = BasicClient::with_timeout(config.timeout())
        .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;

    match (&source.api_key_header, &source.api_key_env) {
        (Some(header), Some(env_var)) => {
            let key = std::env::var(env_var).map_err(|_| {
                Error::Config(format!("environment variable {env_var} must be set"))
            })?;
            let client = ApiKey::header(client, header, &key)
                .map_err(|e| Error::Config(format!("schedule_source: {e}")))?;
            Ok(Box::new(HttpSchedule::new(client, url)))
        }
        (None, None) => Ok(Box::new(HttpSchedule::new(client, url))),
        _ => Err(Error::Config(
            "schedule_source.api_key_header and api_key_env must be set together".into(),
        )),
    }
}

/// Timetable served over HTTP.
pub struct HttpSchedule<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> HttpSchedule<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> ScheduleSource for HttpSchedule<C> {
    fn name(&self) -> &str {
        "schedule-url"
    }

    fn cache_key(&self) -> String {
        self.url.clone()
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> anyhow::Result<ScheduleData> {
        let body = fetch_bytes(&self.client, &self.url).await?;
        let data = ScheduleData::parse(&body)?;
        info!(
            services = data.services.len(),
            entries = data.entries.len(),
            "Fetched schedule source"
        );
        Ok(data)
    }
}

/// Timetable stored in a local file.
pub struct FileSchedule {
    path: PathBuf,
}

impl FileSchedule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScheduleSource for FileSchedule {
    fn name(&self) -> &str {
        "schedule-file"
    }

    fn cache_key(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> anyhow::Result<ScheduleData> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        ScheduleData::parse(&bytes)
    }
}

/// Used when no schedule source is configured: no services, no entries.
pub struct NoSchedule;

#[async_trait]
impl ScheduleSource for NoSchedule {
    fn name(&self) -> &str {
        "none"
    }

    fn cache_key(&self) -> String {
        String::new()
    }

    async fn fetch(&self) -> anyhow::Result<ScheduleData> {
        Ok(ScheduleData::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMETABLE: &str = r#"{
        "services": [
            {"service_id": "weekday", "days": ["mon", "Tue", "wednesday"],
             "start_date": "2026-01-01", "end_date": "2026-12-31"}
        ],
        "entries": [
            {"route_ref": "7", "service_id": "weekday", "departures": ["06:00", "6:30"]},
            {"route_ref": "8", "service_id": "weekday", "departures": ["07:15"],
             "stop_offsets": [0, 3, 8], "minutes_between_stops": 5}
        ]
    }"#;

    #[test]
    fn test_out_of_range_departure_is_rejected() {
        let doc = br#"{"entries": [
            {"route_ref": "7", "service_id": "weekday", "departures": ["1200000:00"]}
        ]}"#;
        let err = ScheduleData::parse(doc).unwrap_err();
        assert!(format!("{err:#}").contains("1200000:00"));
    }

    #[test]
    fn test_parse_timetable() {
        let data = ScheduleData::parse(TIMETABLE.as_bytes()).unwrap();

        let service = &data.services[0];
        assert_eq!(service.service_id, "weekday");
        assert_eq!(service.days, vec![Weekday::Mon, Weekday::Tue, Weekday::Wed]);
        assert_eq!(service.end_date, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());

        assert_eq!(data.entries.len(), 2);
        assert_eq!(data.entries[0].departures[1], ServiceTime::from_hms(6, 30, 0).unwrap());
        assert_eq!(data.entries[0].stop_offsets, None);
        assert_eq!(
            data.entries[0].minutes_between_stops,
            DEFAULT_MINUTES_BETWEEN_STOPS
        );
        assert_eq!(data.entries[1].stop_offsets, Some(vec![0, 3, 8]));
    }

    #[test]
    fn test_bad_departure_time_rejected() {
        let json = TIMETABLE.replace("07:15", "quarter past");
        assert!(ScheduleData::parse(json.as_bytes()).is_err());
    }

    #[tokio::test]
    async fn test_file_schedule_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timetable.json");
        std::fs::write(&path, TIMETABLE).unwrap();

        let source = FileSchedule::new(&path);
        let data = source.fetch().await.unwrap();

        assert_eq!(data.entries.len(), 2);
        assert_eq!(source.cache_key(), path.display().to_string());
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let source = FileSchedule::new("/nonexistent/timetable.json");
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_no_schedule_is_empty() {
        let data = NoSchedule.fetch().await.unwrap();
        assert_eq!(data, ScheduleData::default());
    }
}
