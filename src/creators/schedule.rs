use async_trait::async_trait;
use tracing::{info, warn};

use super::{Creator, CreatorKind, tolerate};
use crate::config::{Configuration, TransformPolicy};
use crate::error::{Error, Result};
use crate::feed::{Calendar, Feed};
use crate::osm::GeoRoute;
use crate::schedule::ScheduleEntry;
use crate::store::{GeoDataStore, TripPlan};

/// Adds calendar rows and derives the trip plans the trips creator expands.
pub struct ScheduleCreator {
    policy: TransformPolicy,
}

impl ScheduleCreator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            policy: config.transform_policy(),
        }
    }
}

/// Plans for every route whose short name matches the entry's `route_ref`.
fn plan_entry(entry: &ScheduleEntry, routes: &[GeoRoute], feed: &Feed) -> Result<Vec<TripPlan>> {
    let route_ref = entry.route_ref.trim();
    let entity = format!("schedule entry {route_ref}/{}", entry.service_id);

    if route_ref.is_empty() {
        return Err(Error::transform(entity, "route_ref is empty"));
    }

    if feed.calendar(&entry.service_id).is_none() {
        return Err(Error::transform(
            entity,
            format!("unknown service '{}'", entry.service_id),
        ));
    }

    let matching: Vec<&GeoRoute> = routes
        .iter()
        .filter(|r| {
            feed.route(&r.id)
                .is_some_and(|fr| fr.route_short_name == route_ref)
        })
        .collect();
    if matching.is_empty() {
        return Err(Error::transform(entity, "no route in the feed has this ref"));
    }

    let mut plans = Vec::new();
    for route in matching {
        if let Some(missing) = route.stop_ids.iter().find(|id| feed.stop(id).is_none()) {
            return Err(Error::transform(
                entity,
                format!("stop {missing} of route {} is not in the feed", route.id),
            ));
        }

        let offsets = offsets_for(entry, route.stop_ids.len()).map_err(|m| {
            Error::transform(entity.clone(), format!("route {}: {m}", route.id))
        })?;

        plans.extend(entry.departures.iter().map(|&departure| TripPlan {
            route_id: route.id.clone(),
            service_id: entry.service_id.clone(),
            departure,
            stop_ids: route.stop_ids.clone(),
            offsets_minutes: offsets.clone(),
        }));
    }
    Ok(plans)
}

/// Minutes from the first stop to each of `stops` stops.
fn offsets_for(entry: &ScheduleEntry, stops: usize) -> std::result::Result<Vec<u32>, String> {
    let Some(offsets) = &entry.stop_offsets else {
        return (0..stops as u32)
            .map(|i| i.checked_mul(entry.minutes_between_stops))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| "stop offsets overflow".to_string());
    };

    if offsets.len() != stops {
        return Err(format!(
            "{} stop offsets given for {stops} stops",
            offsets.len()
        ));
    }
    if offsets.windows(2).any(|w| w[1] < w[0]) {
        return Err("stop offsets decrease".into());
    }
    Ok(offsets.clone())
}

#[async_trait]
impl Creator for ScheduleCreator {
    fn kind(&self) -> CreatorKind {
        CreatorKind::Schedule
    }

    async fn populate(&self, feed: &mut Feed, store: &mut GeoDataStore) -> Result<()> {
        let data = store.get_schedule_source(false).await?;
        let routes = store.get_routes(false).await?;

        for service in &data.services {
            let calendar = Calendar::new(
                service.service_id.clone(),
                &service.days,
                service.start_date,
                service.end_date,
            );
            tolerate(self.policy, feed.add_calendar(calendar))?;
        }

        let mut plans = Vec::new();
        for entry in &data.entries {
            if entry.departures.is_empty() {
                warn!(route_ref = %entry.route_ref, service = %entry.service_id, "Schedule entry has no departures");
            }
            if let Some(entry_plans) = tolerate(self.policy, plan_entry(entry, &routes, feed))? {
                plans.extend(entry_plans);
            }
        }

        info!(
            services = feed.calendars().len(),
            plans = plans.len(),
            "Schedule derived"
        );
        store.set_trip_plans(plans);
        Ok(())
    }
}
