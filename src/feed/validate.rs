use std::collections::HashSet;
use std::fmt;

use super::Feed;

/// How serious a validation problem is.
///
/// Warnings are reported and the archive is still written; fatal problems
/// mean the archive would be unusable and stop the run before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub severity: Severity,
    pub table: &'static str,
    pub entity: Option<String>,
    pub message: String,
}

impl Problem {
    fn warning(table: &'static str, entity: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            table,
            entity: entity.map(str::to_string),
            message: message.into(),
        }
    }

    fn fatal(table: &'static str, entity: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            ..Self::warning(table, entity, message)
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "{}.txt [{entity}]: {}", self.table, self.message),
            None => write!(f, "{}.txt: {}", self.table, self.message),
        }
    }
}

pub(super) fn validate(feed: &Feed) -> Vec<Problem> {
    let mut problems = Vec::new();
    check_agencies(feed, &mut problems);
    check_routes(feed, &mut problems);
    check_stops(feed, &mut problems);
    check_calendars(feed, &mut problems);
    check_trips(feed, &mut problems);
    problems
}

fn check_agencies(feed: &Feed, problems: &mut Vec<Problem>) {
    if feed.agencies().is_empty() {
        problems.push(Problem::fatal("agency", None, "feed has no agency"));
    }
}

fn check_routes(feed: &Feed, problems: &mut Vec<Problem>) {
    if feed.routes().is_empty() {
        problems.push(Problem::warning("routes", None, "feed has no routes"));
    }

    let served: HashSet<&str> = feed.trips().iter().map(|t| t.route_id.as_str()).collect();

    for route in feed.routes() {
        let id = Some(route.route_id.as_str());
        if feed.agency(&route.agency_id).is_none() {
            problems.push(Problem::fatal(
                "routes",
                id,
                format!("unknown agency_id '{}'", route.agency_id),
            ));
        }
        if route.route_short_name.is_empty() && route.route_long_name.is_empty() {
            problems.push(Problem::fatal(
                "routes",
                id,
                "route_short_name and route_long_name are both empty",
            ));
        }
        if let Some(color) = &route.route_color
            && !is_hex_color(color)
        {
            problems.push(Problem::warning(
                "routes",
                id,
                format!("route_color '{color}' is not RRGGBB"),
            ));
        }
        if !feed.trips().is_empty() && !served.contains(route.route_id.as_str()) {
            problems.push(Problem::warning("routes", id, "route has no trips"));
        }
    }
}

fn check_stops(feed: &Feed, problems: &mut Vec<Problem>) {
    if feed.stops().is_empty() {
        problems.push(Problem::warning("stops", None, "feed has no stops"));
    }

    let visited: HashSet<&str> = feed
        .trips()
        .iter()
        .flat_map(|t| t.stop_times.iter().map(|st| st.stop_id.as_str()))
        .collect();

    for stop in feed.stops() {
        let id = Some(stop.stop_id.as_str());
        if !(-90.0..=90.0).contains(&stop.stop_lat) || !(-180.0..=180.0).contains(&stop.stop_lon) {
            problems.push(Problem::fatal(
                "stops",
                id,
                format!("coordinates ({}, {}) out of range", stop.stop_lat, stop.stop_lon),
            ));
        }
        if stop.stop_name.trim().is_empty() {
            problems.push(Problem::warning("stops", id, "stop_name is empty"));
        }
        if !feed.trips().is_empty() && !visited.contains(stop.stop_id.as_str()) {
            problems.push(Problem::warning("stops", id, "stop is not served by any trip"));
        }
    }
}

fn check_calendars(feed: &Feed, problems: &mut Vec<Problem>) {
    for calendar in feed.calendars() {
        let id = Some(calendar.service_id.as_str());
        if calendar.end_date < calendar.start_date {
            problems.push(Problem::fatal(
                "calendar",
                id,
                format!(
                    "end_date {} is before start_date {}",
                    calendar.end_date, calendar.start_date
                ),
            ));
        }
        if !calendar.days.iter().any(|&d| d) {
            problems.push(Problem::warning("calendar", id, "service runs on no weekday"));
        }
    }
}

fn check_trips(feed: &Feed, problems: &mut Vec<Problem>) {
    if feed.trips().is_empty() {
        problems.push(Problem::warning("trips", None, "feed has no trips"));
    }

    for trip in feed.trips() {
        let id = Some(trip.trip_id.as_str());
        if feed.route(&trip.route_id).is_none() {
            problems.push(Problem::fatal(
                "trips",
                id,
                format!("unknown route_id '{}'", trip.route_id),
            ));
        }
        if feed.calendar(&trip.service_id).is_none() {
            problems.push(Problem::fatal(
                "trips",
                id,
                format!("unknown service_id '{}'", trip.service_id),
            ));
        }
        if trip.stop_times.len() < 2 {
            problems.push(Problem::warning(
                "stop_times",
                id,
                "trip visits fewer than two stops",
            ));
        }
        for stop_time in &trip.stop_times {
            if feed.stop(&stop_time.stop_id).is_none() {
                problems.push(Problem::fatal(
                    "stop_times",
                    id,
                    format!("unknown stop_id '{}'", stop_time.stop_id),
                ));
            }
        }
        let goes_back = trip
            .stop_times
            .windows(2)
            .any(|w| w[1].arrival_time < w[0].departure_time);
        if goes_back {
            problems.push(Problem::warning(
                "stop_times",
                id,
                "times decrease along the trip",
            ));
        }
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 6 && s.chars().all(|c| c.is_ascii_hexdigit())
}
