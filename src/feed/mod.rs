//! In-memory GTFS feed: records, validation and archive output.
//!
//! Tables are insert-only. A record whose id is already present is rejected,
//! so a creator can never overwrite what an earlier creator added.

mod time;
mod validate;
mod writer;

pub use time::ServiceTime;
pub use validate::{Problem, Severity};
pub use writer::{CORE_TABLES, FEED_INFO_FILE, encode_feed_info};
pub(crate) use writer::entry_options;

use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveDate, Weekday};
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agency {
    pub agency_id: String,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    pub agency_lang: Option<String>,
    pub agency_phone: Option<String>,
    pub agency_fare_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedInfo {
    pub publisher_name: String,
    pub publisher_url: String,
    pub lang: String,
    pub version: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub route_id: String,
    pub agency_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_type: u16,
    /// `RRGGBB`, no leading `#`.
    pub route_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    pub service_id: String,
    /// Monday first.
    pub days: [bool; 7],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Calendar {
    pub fn new(
        service_id: impl Into<String>,
        weekdays: &[Weekday],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        let mut days = [false; 7];
        for day in weekdays {
            days[day.num_days_from_monday() as usize] = true;
        }
        Self {
            service_id: service_id.into(),
            days,
            start_date,
            end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopTime {
    pub stop_id: String,
    pub arrival_time: ServiceTime,
    pub departure_time: ServiceTime,
    /// 1-based position along the trip.
    pub stop_sequence: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub headsign: Option<String>,
    pub stop_times: Vec<StopTime>,
}

/// Insertion-ordered table with unique ids.
#[derive(Debug)]
struct Table<T> {
    name: &'static str,
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Table<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, id: &str, row: T) -> Result<()> {
        if self.index.contains_key(id) {
            return Err(Error::transform(
                format!("{} '{id}'", self.name),
                "id is already present in the feed",
            ));
        }
        self.index.insert(id.to_string(), self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&i| &self.rows[i])
    }
}

/// The feed being assembled.
#[derive(Debug)]
pub struct Feed {
    agencies: Table<Agency>,
    feed_info: Option<FeedInfo>,
    routes: Table<Route>,
    stops: Table<Stop>,
    calendars: Table<Calendar>,
    trips: Table<Trip>,
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}

impl Feed {
    pub fn new() -> Self {
        Self {
            agencies: Table::new("agency"),
            feed_info: None,
            routes: Table::new("route"),
            stops: Table::new("stop"),
            calendars: Table::new("service"),
            trips: Table::new("trip"),
        }
    }

    pub fn add_agency(&mut self, agency: Agency) -> Result<()> {
        let id = agency.agency_id.clone();
        self.agencies.insert(&id, agency)
    }

    pub fn add_feed_info(&mut self, info: FeedInfo) -> Result<()> {
        if self.feed_info.is_some() {
            return Err(Error::transform(
                "feed_info",
                "feed metadata is already present in the feed",
            ));
        }
        self.feed_info = Some(info);
        Ok(())
    }

    pub fn add_route(&mut self, route: Route) -> Result<()> {
        let id = route.route_id.clone();
        self.routes.insert(&id, route)
    }

    pub fn add_stop(&mut self, stop: Stop) -> Result<()> {
        let id = stop.stop_id.clone();
        self.stops.insert(&id, stop)
    }

    pub fn add_calendar(&mut self, calendar: Calendar) -> Result<()> {
        let id = calendar.service_id.clone();
        self.calendars.insert(&id, calendar)
    }

    pub fn add_trip(&mut self, trip: Trip) -> Result<()> {
        let id = trip.trip_id.clone();
        self.trips.insert(&id, trip)
    }

    pub fn agencies(&self) -> &[Agency] {
        &self.agencies.rows
    }

    pub fn agency(&self, agency_id: &str) -> Option<&Agency> {
        self.agencies.get(agency_id)
    }

    pub fn feed_info(&self) -> Option<&FeedInfo> {
        self.feed_info.as_ref()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes.rows
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops.rows
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn calendars(&self) -> &[Calendar] {
        &self.calendars.rows
    }

    pub fn calendar(&self, service_id: &str) -> Option<&Calendar> {
        self.calendars.get(service_id)
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips.rows
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    /// Checks the feed against the format rules.
    pub fn validate(&self) -> Vec<Problem> {
        validate::validate(self)
    }

    /// Writes the core tables to a zip archive at `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        writer::write_archive(self, path)
    }
}
