//! Small in-memory feeds shared by the validation tests.

use chrono::{Duration, Local};

use crate::feed::{FeedTables, Table, TableName};

fn ymd(offset_days: i64) -> String {
    (Local::now().date_naive() + Duration::days(offset_days))
        .format("%Y%m%d")
        .to_string()
}

/// A feed that passes every standard rule.
pub(crate) fn valid_feed() -> FeedTables {
    FeedTables::new()
        .with_table(
            TableName::Agency,
            Table::new(["agency_id", "agency_name", "agency_url", "agency_timezone"]).with_row([
                "A1",
                "Test Transit Agency",
                "https://test-transit.example",
                "America/Costa_Rica",
            ]),
        )
        .with_table(TableName::Routes, routes(&[("R1", "1", "Downtown"), ("R2", "2", "Airport")]))
        .with_table(
            TableName::Stops,
            Table::new(["stop_id", "stop_name", "stop_lat", "stop_lon"])
                .with_row(["S1", "Central", "9.9281", "-84.0907"])
                .with_row(["S2", "Museum", "9.9325", "-84.0795"])
                .with_row(["S3", "Airport", "9.9939", "-84.2088"]),
        )
        .with_table(
            TableName::Trips,
            Table::new(["route_id", "service_id", "trip_id", "shape_id"])
                .with_row(["R1", "WK", "T1", "SH1"])
                .with_row(["R2", "WK", "T2", "SH1"]),
        )
        .with_table(
            TableName::StopTimes,
            Table::new(["trip_id", "arrival_time", "departure_time", "stop_id", "stop_sequence"])
                .with_row(["T1", "08:00:00", "08:00:00", "S1", "1"])
                .with_row(["T1", "08:10:00", "08:10:00", "S2", "2"])
                .with_row(["T2", "09:00:00", "09:00:00", "S1", "1"])
                .with_row(["T2", "09:30:00", "09:30:00", "S3", "2"]),
        )
        .with_table(TableName::Calendar, calendar(&[("WK", -10, 300)]))
        .with_table(
            TableName::Shapes,
            Table::new(["shape_id", "shape_pt_lat", "shape_pt_lon", "shape_pt_sequence"])
                .with_row(["SH1", "9.9281", "-84.0907", "1"])
                .with_row(["SH1", "9.9939", "-84.2088", "2"]),
        )
}

pub(crate) fn routes(rows: &[(&str, &str, &str)]) -> Table {
    let mut table = Table::new([
        "route_id",
        "agency_id",
        "route_short_name",
        "route_long_name",
        "route_type",
    ]);
    for (id, short, long) in rows {
        table.push_row([*id, "A1", *short, *long, "3"]);
    }
    table
}

/// Calendar rows as `(service_id, start offset, end offset)` in days from today.
pub(crate) fn calendar(rows: &[(&str, i64, i64)]) -> Table {
    let mut table = Table::new([
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
    ]);
    for (id, start, end) in rows {
        let start = ymd(*start);
        let end = ymd(*end);
        table.push_row([*id, "1", "1", "1", "1", "1", "0", "0", start.as_str(), end.as_str()]);
    }
    table
}
