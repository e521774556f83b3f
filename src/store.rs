//! Cached access to geographic and schedule data.
//!
//! The store sits between the creators and the data sources. Each kind of
//! data (routes, stops, schedule source) has its own cache entry and is
//! fetched, cached and refreshed independently. Within one run a retrieved
//! set is memoized, so creators asking again get the same `Arc` back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::cache::{CacheKind, DiskCache, Lookup};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::feed::ServiceTime;
use crate::osm::{GeoRoute, GeoSource, GeoStop};
use crate::schedule::{ScheduleData, ScheduleSource};

/// One derived service pattern: a route run under a service, starting at a
/// departure time, with minute offsets from the first stop.
#[derive(Debug, Clone, PartialEq)]
pub struct TripPlan {
    pub route_id: String,
    pub service_id: String,
    pub departure: ServiceTime,
    pub stop_ids: Vec<String>,
    /// One per stop, starting at 0, never decreasing.
    pub offsets_minutes: Vec<u32>,
}

pub struct GeoDataStore {
    geo: Box<dyn GeoSource>,
    schedule: Box<dyn ScheduleSource>,
    cache: DiskCache,
    cache_config: CacheConfig,
    routes: Option<Arc<Vec<GeoRoute>>>,
    stops: Option<Arc<Vec<GeoStop>>>,
    schedule_data: Option<Arc<ScheduleData>>,
    trip_plans: Option<Arc<Vec<TripPlan>>>,
}

impl GeoDataStore {
    pub fn new(
        geo: Box<dyn GeoSource>,
        schedule: Box<dyn ScheduleSource>,
        cache: DiskCache,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            geo,
            schedule,
            cache,
            cache_config,
            routes: None,
            stops: None,
            schedule_data: None,
            trip_plans: None,
        }
    }

    /// Route relations, from memo or cache unless `refresh` is set.
    pub async fn get_routes(&mut self, refresh: bool) -> Result<Arc<Vec<GeoRoute>>> {
        if !refresh && let Some(routes) = &self.routes {
            return Ok(Arc::clone(routes));
        }

        let kind = CacheKind::Routes;
        let routes = resolve(
            &self.cache,
            kind,
            &self.geo.cache_key(),
            self.cache_config.max_age(kind),
            self.geo.name(),
            refresh,
            self.geo.fetch_routes(),
        )
        .await?;

        let routes = Arc::new(routes);
        self.routes = Some(Arc::clone(&routes));
        Ok(routes)
    }

    /// Stop nodes, from memo or cache unless `refresh` is set.
    pub async fn get_stops(&mut self, refresh: bool) -> Result<Arc<Vec<GeoStop>>> {
        if !refresh && let Some(stops) = &self.stops {
            return Ok(Arc::clone(stops));
        }

        let kind = CacheKind::Stops;
        let stops = resolve(
            &self.cache,
            kind,
            &self.geo.cache_key(),
            self.cache_config.max_age(kind),
            self.geo.name(),
            refresh,
            self.geo.fetch_stops(),
        )
        .await?;

        let stops = Arc::new(stops);
        self.stops = Some(Arc::clone(&stops));
        Ok(stops)
    }

    /// Timetable data, from memo or cache unless `refresh` is set.
    pub async fn get_schedule_source(&mut self, refresh: bool) -> Result<Arc<ScheduleData>> {
        if !refresh && let Some(data) = &self.schedule_data {
            return Ok(Arc::clone(data));
        }

        let kind = CacheKind::ScheduleSource;
        let data = resolve(
            &self.cache,
            kind,
            &self.schedule.cache_key(),
            self.cache_config.max_age(kind),
            self.schedule.name(),
            refresh,
            self.schedule.fetch(),
        )
        .await?;

        let data = Arc::new(data);
        self.schedule_data = Some(Arc::clone(&data));
        Ok(data)
    }

    pub fn set_trip_plans(&mut self, plans: Vec<TripPlan>) {
        debug!(plans = plans.len(), "Trip plans stored");
        self.trip_plans = Some(Arc::new(plans));
    }

    /// Plans derived by the schedule creator, if it has run.
    pub fn trip_plans(&self) -> Option<Arc<Vec<TripPlan>>> {
        self.trip_plans.clone()
    }
}

/// Cache lookup with fetch fallback.
///
/// - `refresh`: always fetch; a failed fetch is an error.
/// - fresh entry: returned without fetching.
/// - stale entry: fetch, falling back to the stale data if the fetch fails.
/// - no entry: fetch; a failed fetch is an error.
///
/// A successful fetch replaces the cache entry.
async fn resolve<T, F>(
    cache: &DiskCache,
    kind: CacheKind,
    key: &str,
    max_age: Option<Duration>,
    source_name: &str,
    refresh: bool,
    fetch: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: Future<Output = anyhow::Result<T>>,
{
    let stale = if refresh {
        info!(%kind, source = source_name, "Refresh requested");
        None
    } else {
        match cache.load(kind, key, max_age) {
            Lookup::Fresh(data) => {
                debug!(%kind, "Using cached data");
                return Ok(data);
            }
            Lookup::Stale(data) => Some(data),
            Lookup::Missing => None,
        }
    };

    match fetch.await {
        Ok(data) => {
            cache.save(kind, key, &data)?;
            info!(%kind, source = source_name, "Fetched and cached");
            Ok(data)
        }
        Err(e) => match stale {
            Some(data) => {
                warn!(
                    %kind,
                    source = source_name,
                    error = %format!("{e:#}"),
                    "Fetch failed, using stale cache entry"
                );
                Ok(data)
            }
            None => Err(Error::data_source(source_name, format!("{kind}: {e:#}"))),
        },
    }
}
