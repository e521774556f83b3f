use async_trait::async_trait;
use tracing::info;

use super::{Creator, CreatorKind, tolerate};
use crate::config::{Configuration, TransformPolicy};
use crate::error::{Error, Result};
use crate::feed::{Feed, StopTime, Trip};
use crate::store::{GeoDataStore, TripPlan};

/// Expands each trip plan into a trip with its stop times.
pub struct TripsCreator {
    policy: TransformPolicy,
}

impl TripsCreator {
    pub fn new(config: &Configuration) -> Self {
        Self {
            policy: config.transform_policy(),
        }
    }
}

/// `<route>-<service>-<HHMMSS>`
fn trip_id(plan: &TripPlan) -> String {
    format!(
        "{}-{}-{}",
        plan.route_id,
        plan.service_id,
        plan.departure.compact()
    )
}

fn to_trip(plan: &TripPlan, feed: &Feed) -> Result<Trip> {
    let trip_id = trip_id(plan);
    let stop_times = plan
        .stop_ids
        .iter()
        .zip(&plan.offsets_minutes)
        .enumerate()
        .map(|(i, (stop_id, &offset))| -> Result<StopTime> {
            let at = plan.departure.plus_minutes(offset).ok_or_else(|| {
                Error::transform(
                    format!("trip {trip_id}"),
                    format!("{offset} minutes after {} is out of range", plan.departure),
                )
            })?;
            Ok(StopTime {
                stop_id: stop_id.clone(),
                arrival_time: at,
                departure_time: at,
                stop_sequence: i as u32 + 1,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let headsign = plan
        .stop_ids
        .last()
        .and_then(|id| feed.stop(id))
        .map(|s| s.stop_name.clone());

    Ok(Trip {
        trip_id,
        route_id: plan.route_id.clone(),
        service_id: plan.service_id.clone(),
        headsign,
        stop_times,
    })
}

#[async_trait]
impl Creator for TripsCreator {
    fn kind(&self) -> CreatorKind {
        CreatorKind::Trips
    }

    async fn populate(&self, feed: &mut Feed, store: &mut GeoDataStore) -> Result<()> {
        let plans = store.trip_plans().ok_or(Error::OutOfOrder {
            creator: CreatorKind::Trips,
            requires: CreatorKind::Schedule,
        })?;

        let mut added = 0;
        for plan in plans.iter() {
            let added_trip = to_trip(plan, feed).and_then(|trip| feed.add_trip(trip));
            if tolerate(self.policy, added_trip)?.is_some() {
                added += 1;
            }
        }

        info!(added, plans = plans.len(), "Trips added");
        Ok(())
    }
}
