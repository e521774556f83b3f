//! CSV table encoding and zip archive output.
//!
//! Entries are deflated with a fixed timestamp and permissions, so the same
//! feed always produces the same archive bytes.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{Feed, FeedInfo, ServiceTime};
use crate::error::{Error, Result};

/// Tables written by [`Feed::write`]. `feed_info.txt` is not among them; it
/// is appended to the finished archive by the patch step.
pub const CORE_TABLES: [&str; 6] = [
    "agency.txt",
    "stops.txt",
    "routes.txt",
    "trips.txt",
    "stop_times.txt",
    "calendar.txt",
];

pub const FEED_INFO_FILE: &str = "feed_info.txt";

const AGENCY_COLUMNS: &[&str] = &[
    "agency_id",
    "agency_name",
    "agency_url",
    "agency_timezone",
    "agency_lang",
    "agency_phone",
    "agency_fare_url",
];
const STOP_COLUMNS: &[&str] = &["stop_id", "stop_name", "stop_lat", "stop_lon"];
const ROUTE_COLUMNS: &[&str] = &[
    "route_id",
    "agency_id",
    "route_short_name",
    "route_long_name",
    "route_type",
    "route_color",
];
const TRIP_COLUMNS: &[&str] = &["route_id", "service_id", "trip_id", "trip_headsign"];
const STOP_TIME_COLUMNS: &[&str] = &[
    "trip_id",
    "arrival_time",
    "departure_time",
    "stop_id",
    "stop_sequence",
];
const CALENDAR_COLUMNS: &[&str] = &[
    "service_id",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "start_date",
    "end_date",
];
const FEED_INFO_COLUMNS: &[&str] = &[
    "feed_publisher_name",
    "feed_publisher_url",
    "feed_lang",
    "feed_version",
    "feed_start_date",
    "feed_end_date",
    "feed_contact_email",
];

#[derive(Serialize)]
struct TripRow<'a> {
    route_id: &'a str,
    service_id: &'a str,
    trip_id: &'a str,
    trip_headsign: Option<&'a str>,
}

#[derive(Serialize)]
struct StopTimeRow<'a> {
    trip_id: &'a str,
    arrival_time: ServiceTime,
    departure_time: ServiceTime,
    stop_id: &'a str,
    stop_sequence: u32,
}

#[derive(Serialize)]
struct CalendarRow<'a> {
    service_id: &'a str,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Serialize)]
struct FeedInfoRow<'a> {
    feed_publisher_name: &'a str,
    feed_publisher_url: &'a str,
    feed_lang: &'a str,
    feed_version: Option<&'a str>,
    feed_start_date: Option<String>,
    feed_end_date: Option<String>,
    feed_contact_email: Option<&'a str>,
}

fn gtfs_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Encodes rows as CSV with a header row, even when there are no rows.
fn encode_table<T: Serialize>(
    columns: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> csv::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// The single-row `feed_info.txt` table.
pub fn encode_feed_info(info: &FeedInfo) -> csv::Result<Vec<u8>> {
    let row = FeedInfoRow {
        feed_publisher_name: &info.publisher_name,
        feed_publisher_url: &info.publisher_url,
        feed_lang: &info.lang,
        feed_version: info.version.as_deref(),
        feed_start_date: info.start_date.map(gtfs_date),
        feed_end_date: info.end_date.map(gtfs_date),
        feed_contact_email: info.contact_email.as_deref(),
    };
    encode_table(FEED_INFO_COLUMNS, [row])
}

fn encode_core_tables(feed: &Feed) -> csv::Result<Vec<(&'static str, Vec<u8>)>> {
    let agency = encode_table(AGENCY_COLUMNS, feed.agencies())?;
    let stops = encode_table(STOP_COLUMNS, feed.stops())?;
    let routes = encode_table(ROUTE_COLUMNS, feed.routes())?;

    let trips = encode_table(
        TRIP_COLUMNS,
        feed.trips().iter().map(|t| TripRow {
            route_id: &t.route_id,
            service_id: &t.service_id,
            trip_id: &t.trip_id,
            trip_headsign: t.headsign.as_deref(),
        }),
    )?;

    let stop_times = encode_table(
        STOP_TIME_COLUMNS,
        feed.trips().iter().flat_map(|t| {
            t.stop_times.iter().map(move |st| StopTimeRow {
                trip_id: &t.trip_id,
                arrival_time: st.arrival_time,
                departure_time: st.departure_time,
                stop_id: &st.stop_id,
                stop_sequence: st.stop_sequence,
            })
        }),
    )?;

    let calendar = encode_table(
        CALENDAR_COLUMNS,
        feed.calendars().iter().map(|c| {
            let d = c.days.map(u8::from);
            CalendarRow {
                service_id: &c.service_id,
                monday: d[0],
                tuesday: d[1],
                wednesday: d[2],
                thursday: d[3],
                friday: d[4],
                saturday: d[5],
                sunday: d[6],
                start_date: gtfs_date(c.start_date),
                end_date: gtfs_date(c.end_date),
            }
        }),
    )?;

    Ok(CORE_TABLES
        .into_iter()
        .zip([agency, stops, routes, trips, stop_times, calendar])
        .collect())
}

/// Options shared by every archive entry.
pub(crate) fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

#[tracing::instrument(skip(feed, path), fields(path = %path.display()))]
pub(super) fn write_archive(feed: &Feed, path: &Path) -> Result<()> {
    let write_err = |message: String| Error::Write {
        path: path.to_path_buf(),
        message,
    };

    let tables = encode_core_tables(feed).map_err(|e| write_err(e.to_string()))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }

    let file = File::create(path).map_err(|e| write_err(e.to_string()))?;
    let mut zip = ZipWriter::new(file);
    for (name, bytes) in &tables {
        zip.start_file(*name, entry_options())
            .map_err(|e| write_err(format!("{name}: {e}")))?;
        zip.write_all(bytes)
            .map_err(|e| write_err(format!("{name}: {e}")))?;
        debug!(table = *name, bytes = bytes.len(), "Table written");
    }
    zip.finish().map_err(|e| write_err(e.to_string()))?;

    info!(
        routes = feed.routes().len(),
        stops = feed.stops().len(),
        trips = feed.trips().len(),
        "Archive written"
    );
    Ok(())
}
