//! Configuration loading and validation.
//!
//! The configuration file is JSON. It is read once at startup, merged with
//! command-line overrides and validated into an immutable [`Configuration`]
//! that is passed explicitly to every component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::cache::CacheKind;
use crate::error::{Error, Result};

/// Default Overpass API interpreter endpoint.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Selector used when the configuration names none.
pub const DEFAULT_SELECTOR: &str = "default";

const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Agency identity, written to `agency.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgencyConfig {
    pub agency_id: String,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    #[serde(default)]
    pub agency_lang: Option<String>,
    #[serde(default)]
    pub agency_phone: Option<String>,
    #[serde(default)]
    pub agency_fare_url: Option<String>,
}

/// Optional feed metadata, written to `feed_info.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedInfoConfig {
    pub publisher_name: String,
    pub publisher_url: String,
    pub lang: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub n: f64,
    pub s: f64,
    pub e: f64,
    pub w: f64,
}

/// Which OpenStreetMap route relations to convert.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub bbox: BoundingBox,
    pub tags: BTreeMap<String, String>,
}

/// Where timetable data comes from. Exactly one of `url` and `path` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSourceConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Header carrying the API key, e.g. `x-api-key`.
    #[serde(default)]
    pub api_key_header: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Cache location and per-source freshness policy.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub routes_max_age_hours: Option<u64>,
    #[serde(default)]
    pub stops_max_age_hours: Option<u64>,
    #[serde(default)]
    pub schedule_max_age_hours: Option<u64>,
}

impl CacheConfig {
    /// Age after which a cache entry of `kind` counts as stale. `None` means
    /// entries never expire and are only replaced by an explicit refresh.
    pub fn max_age(&self, kind: CacheKind) -> Option<Duration> {
        let hours = match kind {
            CacheKind::Routes => self.routes_max_age_hours,
            CacheKind::Stops => self.stops_max_age_hours,
            CacheKind::ScheduleSource => self.schedule_max_age_hours,
        };
        hours.map(|h| Duration::from_secs(h * 60 * 60))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            routes_max_age_hours: None,
            stops_max_age_hours: None,
            schedule_max_age_hours: None,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopsConfig {
    /// Name given to stops without a `name` tag. Unnamed stops are a
    /// transform error when unset.
    #[serde(default)]
    pub unnamed_stop_name: Option<String>,
}

/// What creators do with an entity they cannot transform.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransformPolicy {
    /// Abort the run.
    #[default]
    Strict,
    /// Log a warning naming the entity and leave it out of the feed.
    Skip,
}

/// The file as written by the user, before validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    selector: Option<String>,
    agency: AgencyConfig,
    #[serde(default)]
    feed_info: Option<FeedInfoConfig>,
    query: QueryConfig,
    #[serde(default)]
    overpass_url: Option<String>,
    #[serde(default)]
    schedule_source: Option<ScheduleSourceConfig>,
    #[serde(default)]
    output_file: Option<PathBuf>,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    stops: StopsConfig,
    #[serde(default)]
    transform_policy: TransformPolicy,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output: Option<PathBuf>,
}

/// Validated, read-only settings for one run.
#[derive(Debug, Clone)]
pub struct Configuration {
    selector: String,
    agency: AgencyConfig,
    feed_info: Option<FeedInfoConfig>,
    query: QueryConfig,
    route_type: u16,
    overpass_url: String,
    schedule_source: Option<ScheduleSourceConfig>,
    output_file: PathBuf,
    cache: CacheConfig,
    stops: StopsConfig,
    transform_policy: TransformPolicy,
    timeout: Duration,
}

impl Configuration {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Configuration file read");
        Self::from_json(&content, overrides)
    }

    /// Parses and validates configuration from a JSON document.
    pub fn from_json(content: &str, overrides: &ConfigOverrides) -> Result<Self> {
        let raw: RawConfig =
            serde_json::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        validate_agency(&raw.agency)?;
        validate_query(&raw.query)?;
        if let Some(info) = &raw.feed_info {
            validate_feed_info(info)?;
        }
        if let Some(source) = &raw.schedule_source {
            validate_schedule_source(source)?;
        }

        let route_tag = raw
            .query
            .tags
            .get("route")
            .ok_or_else(|| Error::Config("query.tags must contain a 'route' tag".into()))?;
        let route_type = route_type_for(route_tag)
            .ok_or_else(|| Error::Config(format!("unsupported route tag value '{route_tag}'")))?;

        let output_file = overrides
            .output
            .clone()
            .or(raw.output_file)
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::Config("no output file given".into()))?;

        let selector = raw
            .selector
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SELECTOR.to_string());

        Ok(Self {
            selector,
            agency: raw.agency,
            feed_info: raw.feed_info,
            query: raw.query,
            route_type,
            overpass_url: raw
                .overpass_url
                .unwrap_or_else(|| DEFAULT_OVERPASS_URL.to_string()),
            schedule_source: raw.schedule_source,
            output_file,
            cache: raw.cache,
            stops: raw.stops,
            transform_policy: raw.transform_policy,
            timeout: Duration::from_secs(raw.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn agency(&self) -> &AgencyConfig {
        &self.agency
    }

    pub fn feed_info(&self) -> Option<&FeedInfoConfig> {
        self.feed_info.as_ref()
    }

    pub fn query(&self) -> &QueryConfig {
        &self.query
    }

    /// GTFS `route_type` derived from the query's `route` tag.
    pub fn route_type(&self) -> u16 {
        self.route_type
    }

    pub fn overpass_url(&self) -> &str {
        &self.overpass_url
    }

    pub fn schedule_source(&self) -> Option<&ScheduleSourceConfig> {
        self.schedule_source.as_ref()
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn unnamed_stop_name(&self) -> Option<&str> {
        self.stops.unnamed_stop_name.as_deref()
    }

    pub fn transform_policy(&self) -> TransformPolicy {
        self.transform_policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Maps an OpenStreetMap `route=*` value to a GTFS `route_type`.
pub fn route_type_for(route_tag: &str) -> Option<u16> {
    match route_tag {
        "tram" | "light_rail" => Some(0),
        "subway" => Some(1),
        "train" | "railway" => Some(2),
        "bus" | "share_taxi" | "minibus" => Some(3),
        "ferry" => Some(4),
        "aerialway" => Some(6),
        "trolleybus" => Some(11),
        "monorail" => Some(12),
        _ => None,
    }
}

fn validate_agency(agency: &AgencyConfig) -> Result<()> {
    if agency.agency_id.trim().is_empty() {
        return Err(Error::Config("agency.agency_id must not be empty".into()));
    }
    if agency.agency_id.chars().any(char::is_whitespace) {
        return Err(Error::Config(format!(
            "agency.agency_id '{}' must not contain whitespace",
            agency.agency_id
        )));
    }
    if agency.agency_name.trim().is_empty() {
        return Err(Error::Config("agency.agency_name must not be empty".into()));
    }
    validate_http_url("agency.agency_url", &agency.agency_url)?;
    if let Some(fare_url) = &agency.agency_fare_url {
        validate_http_url("agency.agency_fare_url", fare_url)?;
    }
    if !is_timezone_name(&agency.agency_timezone) {
        return Err(Error::Config(format!(
            "agency.agency_timezone '{}' is not a timezone name",
            agency.agency_timezone
        )));
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| Error::Config(format!("{field} '{value}' is not a URL: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::Config(format!("{field} '{value}' must be http(s)")));
    }
    Ok(())
}

/// Accepts `UTC` and `Area/Location` style names.
fn is_timezone_name(tz: &str) -> bool {
    if tz == "UTC" {
        return true;
    }
    let mut parts = tz.split('/');
    let area = parts.next().unwrap_or_default();
    !area.is_empty()
        && parts.clone().next().is_some()
        && parts.all(|p| !p.is_empty())
        && !tz.chars().any(char::is_whitespace)
}

fn validate_query(query: &QueryConfig) -> Result<()> {
    let b = query.bbox;
    if !(-90.0..=90.0).contains(&b.s) || !(-90.0..=90.0).contains(&b.n) {
        return Err(Error::Config("query.bbox latitudes must be within ±90".into()));
    }
    if !(-180.0..=180.0).contains(&b.w) || !(-180.0..=180.0).contains(&b.e) {
        return Err(Error::Config("query.bbox longitudes must be within ±180".into()));
    }
    if b.s >= b.n || b.w >= b.e {
        return Err(Error::Config(
            "query.bbox must satisfy s < n and w < e".into(),
        ));
    }
    if query.tags.is_empty() {
        return Err(Error::Config("query.tags must not be empty".into()));
    }
    Ok(())
}

fn validate_feed_info(info: &FeedInfoConfig) -> Result<()> {
    if info.publisher_name.trim().is_empty() {
        return Err(Error::Config("feed_info.publisher_name must not be empty".into()));
    }
    validate_http_url("feed_info.publisher_url", &info.publisher_url)?;
    if let (Some(start), Some(end)) = (info.start_date, info.end_date)
        && end < start
    {
        return Err(Error::Config(format!(
            "feed_info.end_date {end} is before start_date {start}"
        )));
    }
    Ok(())
}

fn validate_schedule_source(source: &ScheduleSourceConfig) -> Result<()> {
    match (&source.url, &source.path) {
        (Some(_), Some(_)) => Err(Error::Config(
            "schedule_source must set either url or path, not both".into(),
        )),
        (None, None) => Err(Error::Config("schedule_source needs a url or a path".into())),
        (Some(url), None) => validate_http_url("schedule_source.url", url),
        (None, Some(_)) => Ok(()),
    }
}
