//! Subsetting a feed by geography or service dates.
//!
//! Both filters first select a set of trips and then cut every other table
//! down to the rows those trips still reference.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::debug;

use crate::error::{DatabusError, Result};
use crate::feed::{FeedTables, Table, TableName};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Inclusive on every edge.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Formats as `min_lon,min_lat,max_lon,max_lat`, the order used on the
/// command line and by the catalog API.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

/// Parses `min_lon,min_lat,max_lon,max_lat`.
impl FromStr for BoundingBox {
    type Err = DatabusError;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DatabusError::Processing(format!("Invalid bounding box '{s}': {e}")))?;

        match parts.as_slice() {
            [min_lon, min_lat, max_lon, max_lat] => {
                Ok(BoundingBox::new(*min_lat, *min_lon, *max_lat, *max_lon))
            }
            _ => Err(DatabusError::Processing(format!(
                "Invalid bounding box '{s}': expected min_lon,min_lat,max_lon,max_lat"
            ))),
        }
    }
}

/// Keeps the trips that call at least one stop inside `bbox`.
pub fn by_bounding_box(feed: &FeedTables, bbox: BoundingBox) -> FeedTables {
    let inside: HashSet<&str> = feed
        .state(TableName::Stops)
        .rows()
        .map(|stops| {
            stops
                .rows()
                .filter(|s| {
                    let lat = s.get("stop_lat").and_then(|v| v.parse::<f64>().ok());
                    let lon = s.get("stop_lon").and_then(|v| v.parse::<f64>().ok());
                    matches!((lat, lon), (Some(lat), Some(lon)) if bbox.contains(lat, lon))
                })
                .filter_map(|s| s.get("stop_id"))
                .collect()
        })
        .unwrap_or_default();

    let trip_ids: HashSet<&str> = feed
        .state(TableName::StopTimes)
        .rows()
        .map(|st| {
            st.rows()
                .filter(|r| r.get("stop_id").is_some_and(|s| inside.contains(s)))
                .filter_map(|r| r.get("trip_id"))
                .collect()
        })
        .unwrap_or_default();

    debug!(stops = inside.len(), trips = trip_ids.len(), %bbox, "Bounding box selection");
    restrict_to_trips(feed, &trip_ids)
}

/// Parses a `YYYY-MM-DD` date argument.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| DatabusError::Processing(format!("Invalid date '{value}': {e}")))
}

/// Keeps the trips whose service runs on at least one day in `start..=end`.
pub fn by_dates(feed: &FeedTables, start: NaiveDate, end: NaiveDate) -> Result<FeedTables> {
    if start > end {
        return Err(DatabusError::Processing(format!(
            "Start date {start} is after end date {end}"
        )));
    }

    let services = active_services(feed, start, end);
    let trip_ids: HashSet<&str> = feed
        .state(TableName::Trips)
        .rows()
        .map(|trips| {
            trips
                .rows()
                .filter(|t| t.get("service_id").is_some_and(|s| services.contains(s)))
                .filter_map(|t| t.get("trip_id"))
                .collect()
        })
        .unwrap_or_default();

    debug!(services = services.len(), trips = trip_ids.len(), %start, %end, "Date selection");
    Ok(restrict_to_trips(feed, &trip_ids))
}

fn gtfs_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(v, "%Y%m%d").ok())
}

fn weekday_column(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Service ids running on some day in the range, after calendar_dates
/// exceptions (1 adds the day, 2 removes it).
fn active_services(feed: &FeedTables, start: NaiveDate, end: NaiveDate) -> HashSet<&str> {
    let mut added = HashSet::new();
    let mut removed = HashSet::new();
    if let Some(dates) = feed.state(TableName::CalendarDates).rows() {
        for row in dates.rows() {
            let (Some(service), Some(date)) = (row.get("service_id"), gtfs_date(row.get("date")))
            else {
                continue;
            };
            match row.get("exception_type") {
                Some("1") if (start..=end).contains(&date) => {
                    added.insert(service);
                }
                Some("2") => {
                    removed.insert((service, date));
                }
                _ => {}
            }
        }
    }

    let mut active = added;
    if let Some(calendar) = feed.state(TableName::Calendar).rows() {
        for row in calendar.rows() {
            let Some(service) = row.get("service_id") else {
                continue;
            };
            let (Some(from), Some(to)) = (gtfs_date(row.get("start_date")), gtfs_date(row.get("end_date")))
            else {
                continue;
            };

            let runs = from.max(start).iter_days().take_while(|d| *d <= to.min(end)).any(|d| {
                row.get(weekday_column(d.weekday())) == Some("1") && !removed.contains(&(service, d))
            });
            if runs {
                active.insert(service);
            }
        }
    }
    active
}

fn copy(feed: &FeedTables, out: &mut FeedTables, name: TableName, f: impl Fn(&Table) -> Table) {
    if let Some(table) = feed.get(name) {
        out.insert(name, f(table));
    }
}

fn as_refs(set: &HashSet<String>) -> HashSet<&str> {
    set.iter().map(String::as_str).collect()
}

/// Cuts the feed down to `trip_ids` and everything they reference.
pub fn restrict_to_trips(feed: &FeedTables, trip_ids: &HashSet<&str>) -> FeedTables {
    let mut out = FeedTables::new();

    let trips = feed
        .get(TableName::Trips)
        .map(|t| t.retain_keys("trip_id", trip_ids))
        .unwrap_or_default();
    let stop_times = feed
        .get(TableName::StopTimes)
        .map(|t| t.retain_keys("trip_id", trip_ids))
        .unwrap_or_default();

    let keys_of = |table: &Table, column: &str| -> HashSet<String> {
        table
            .column_index(column)
            .map(|idx| table.column_values(idx).flatten().map(str::to_string).collect())
            .unwrap_or_default()
    };
    let route_ids = keys_of(&trips, "route_id");
    let service_ids = keys_of(&trips, "service_id");
    let shape_ids = keys_of(&trips, "shape_id");
    let stop_ids = keys_of(&stop_times, "stop_id");

    let (route_ids, service_ids, shape_ids, stop_ids) = (
        as_refs(&route_ids),
        as_refs(&service_ids),
        as_refs(&shape_ids),
        as_refs(&stop_ids),
    );

    let routes = feed
        .get(TableName::Routes)
        .map(|t| t.retain_keys("route_id", &route_ids));
    let agency_ids: HashSet<String> = routes
        .as_ref()
        .map(|r| keys_of(r, "agency_id"))
        .unwrap_or_default();
    let agency_ids = as_refs(&agency_ids);

    copy(
        feed,
        &mut out,
        TableName::Agency,
        |t| {
            if t.has_column("agency_id") && !agency_ids.is_empty() {
                t.retain_keys("agency_id", &agency_ids)
            } else {
                t.clone()
            }
        },
    );
    if let Some(routes) = routes {
        out.insert(TableName::Routes, routes);
    }
    copy(feed, &mut out, TableName::Stops, |t| t.retain_keys("stop_id", &stop_ids));
    if feed.get(TableName::Trips).is_some() {
        out.insert(TableName::Trips, trips);
    }
    if feed.get(TableName::StopTimes).is_some() {
        out.insert(TableName::StopTimes, stop_times);
    }
    copy(feed, &mut out, TableName::Calendar, |t| t.retain_keys("service_id", &service_ids));
    copy(feed, &mut out, TableName::CalendarDates, |t| t.retain_keys("service_id", &service_ids));
    copy(feed, &mut out, TableName::Shapes, |t| t.retain_keys("shape_id", &shape_ids));
    copy(feed, &mut out, TableName::Frequencies, |t| t.retain_keys("trip_id", trip_ids));
    copy(
        feed,
        &mut out,
        TableName::Transfers,
        |t| {
            t.filter_rows(|r| {
                let kept = |c: &str| r.get(c).is_some_and(|s| stop_ids.contains(s));
                kept("from_stop_id") && kept("to_stop_id")
            })
        },
    );
    copy(
        feed,
        &mut out,
        TableName::FareRules,
        |t| {
            if t.has_column("route_id") {
                t.filter_rows(|r| r.get("route_id").is_none_or(|id| route_ids.contains(id)))
            } else {
                t.clone()
            }
        },
    );
    copy(feed, &mut out, TableName::FareAttributes, |t| t.clone());

    out
}
