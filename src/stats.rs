use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{DatabusError, Result};
use crate::feed::{FeedTables, TableName};

static ROUTE_TYPES: &[(&str, &str)] = &[
    ("0", "Tram, Streetcar, Light rail"),
    ("1", "Subway, Metro"),
    ("2", "Rail"),
    ("3", "Bus"),
    ("4", "Ferry"),
    ("5", "Cable tram"),
    ("6", "Aerial lift, suspended cable car"),
    ("7", "Funicular"),
    ("11", "Trolleybus"),
    ("12", "Monorail"),
];

/// Human readable name of a GTFS `route_type` code.
pub fn route_type_name(code: &str) -> String {
    ROUTE_TYPES
        .iter()
        .find(|(c, _)| *c == code.trim())
        .map_or_else(|| format!("Unknown ({code})"), |(_, name)| name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePeriod {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    // table sizes
    pub agencies: usize,
    pub routes: usize,
    pub stops: usize,
    pub trips: usize,
    pub stop_times: usize,
    pub shapes: usize,
    pub calendar: usize,
    pub calendar_dates: usize,

    /// Route count keyed by the raw `route_type` value.
    pub routes_by_type: BTreeMap<String, usize>,
    pub service_period: Option<ServicePeriod>,
}

impl FeedStats {
    pub fn from_feed(feed: &FeedTables) -> Self {
        let mut s = FeedStats {
            agencies: feed.count(TableName::Agency),
            routes: feed.count(TableName::Routes),
            stops: feed.count(TableName::Stops),
            trips: feed.count(TableName::Trips),
            stop_times: feed.count(TableName::StopTimes),
            shapes: feed.count(TableName::Shapes),
            calendar: feed.count(TableName::Calendar),
            calendar_dates: feed.count(TableName::CalendarDates),
            ..Default::default()
        };

        if let Some(routes) = feed.state(TableName::Routes).rows() {
            for route in routes.rows() {
                if let Some(route_type) = route.get("route_type") {
                    *s.routes_by_type.entry(route_type.to_string()).or_default() += 1;
                }
            }
        }

        if let Some(calendar) = feed.state(TableName::Calendar).rows() {
            let parse = |v: Option<&str>| v.and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok());
            let start = calendar.rows().filter_map(|r| parse(r.get("start_date"))).min();
            let end = calendar.rows().filter_map(|r| parse(r.get("end_date"))).max();

            if let (Some(start), Some(end)) = (start, end) {
                s.service_period = Some(ServicePeriod {
                    start: start.format("%Y-%m-%d").to_string(),
                    end: end.format("%Y-%m-%d").to_string(),
                });
            }
        }

        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_type: Option<String>,
    pub total_trips: usize,
    pub unique_stops: usize,
    pub directions: usize,
    pub total_stop_times: usize,
}

impl RouteStats {
    pub fn from_feed(feed: &FeedTables, route_id: &str) -> Result<Self> {
        let not_found = || DatabusError::Processing(format!("Route {route_id} not found"));

        let routes = feed.state(TableName::Routes).rows().ok_or_else(not_found)?;
        let route = routes
            .rows()
            .find(|r| r.get("route_id") == Some(route_id))
            .ok_or_else(not_found)?;

        let mut trip_ids = HashSet::new();
        let mut directions = HashSet::new();
        let mut has_direction = false;
        if let Some(trips) = feed.state(TableName::Trips).rows() {
            has_direction = trips.has_column("direction_id");
            for trip in trips.rows().filter(|t| t.get("route_id") == Some(route_id)) {
                if let Some(id) = trip.get("trip_id") {
                    trip_ids.insert(id);
                }
                if let Some(direction) = trip.get("direction_id") {
                    directions.insert(direction);
                }
            }
        }

        let mut stops = HashSet::new();
        let mut total_stop_times = 0;
        if let Some(stop_times) = feed.state(TableName::StopTimes).rows() {
            for st in stop_times
                .rows()
                .filter(|st| st.get("trip_id").is_some_and(|t| trip_ids.contains(t)))
            {
                total_stop_times += 1;
                if let Some(stop) = st.get("stop_id") {
                    stops.insert(stop);
                }
            }
        }

        Ok(RouteStats {
            route_id: route_id.to_string(),
            route_short_name: route.get("route_short_name").map(str::to_string),
            route_long_name: route.get("route_long_name").map(str::to_string),
            route_type: route.get("route_type").map(str::to_string),
            total_trips: trip_ids.len(),
            unique_stops: stops.len(),
            directions: if has_direction { directions.len() } else { 1 },
            total_stop_times,
        })
    }
}
