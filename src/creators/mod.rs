//! Creators turn source data into feed records.
//!
//! There is one creator per GTFS concern. A strategy, chosen by the
//! configuration's selector, supplies all six through the
//! [`CreatorRegistry`]; the pipeline then runs them in [`CreatorKind::ORDER`].

mod agency;
mod factory;
mod feed_info;
mod routes;
mod schedule;
mod stops;
mod trips;

pub use agency::AgencyCreator;
pub use factory::{CreatorRegistry, StrategyConstructor};
pub use feed_info::FeedInfoCreator;
pub use routes::{RouteNaming, RoutesCreator};
pub use schedule::ScheduleCreator;
pub use stops::StopsCreator;
pub use trips::TripsCreator;

use std::fmt;

use async_trait::async_trait;
use tracing::warn;

use crate::config::TransformPolicy;
use crate::error::{Error, Result};
use crate::feed::Feed;
use crate::store::GeoDataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreatorKind {
    Agency,
    FeedInfo,
    Routes,
    Stops,
    Schedule,
    Trips,
}

impl CreatorKind {
    /// Order in which creators populate the feed.
    pub const ORDER: [CreatorKind; 6] = [
        CreatorKind::Agency,
        CreatorKind::FeedInfo,
        CreatorKind::Routes,
        CreatorKind::Stops,
        CreatorKind::Schedule,
        CreatorKind::Trips,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CreatorKind::Agency => "agency",
            CreatorKind::FeedInfo => "feed_info",
            CreatorKind::Routes => "routes",
            CreatorKind::Stops => "stops",
            CreatorKind::Schedule => "schedule",
            CreatorKind::Trips => "trips",
        }
    }
}

impl fmt::Display for CreatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adds one kind of record to the feed.
///
/// Creators only add records; they never remove or replace what an earlier
/// creator put in the feed.
#[async_trait]
pub trait Creator: Send + Sync {
    fn kind(&self) -> CreatorKind;

    async fn populate(&self, feed: &mut Feed, store: &mut GeoDataStore) -> Result<()>;
}

/// The six creators of one strategy.
pub struct CreatorSet {
    pub agency: Box<dyn Creator>,
    pub feed_info: Box<dyn Creator>,
    pub routes: Box<dyn Creator>,
    pub stops: Box<dyn Creator>,
    pub schedule: Box<dyn Creator>,
    pub trips: Box<dyn Creator>,
}

impl CreatorSet {
    /// The creators in the order they must run.
    pub fn in_order(&self) -> [&dyn Creator; 6] {
        [
            self.agency.as_ref(),
            self.feed_info.as_ref(),
            self.routes.as_ref(),
            self.stops.as_ref(),
            self.schedule.as_ref(),
            self.trips.as_ref(),
        ]
    }
}

/// Applies the transform policy to the outcome of transforming one entity.
///
/// Returns `Ok(None)` when the entity is skipped. Errors other than
/// [`Error::Transform`] always propagate.
pub(crate) fn tolerate<T>(policy: TransformPolicy, result: Result<T>) -> Result<Option<T>> {
    match (result, policy) {
        (Ok(value), _) => Ok(Some(value)),
        (Err(Error::Transform { entity, message }), TransformPolicy::Skip) => {
            warn!(%entity, %message, "Skipping entity");
            Ok(None)
        }
        (Err(e), _) => Err(e),
    }
}
