//! The standard GTFS rule set.
//!
//! Every rule emits at most one issue per condition rather than one per
//! offending row; counts and sample ids go into the issue details.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde_json::json;

use super::rule::{Category, Issue, Rule, RuleCheck, Severity};
use crate::feed::{FeedTables, Table, TableName};

const REQUIRED_FILES: [TableName; 5] = [
    TableName::Agency,
    TableName::Routes,
    TableName::Stops,
    TableName::Trips,
    TableName::StopTimes,
];

const REQUIRED_FIELDS: &[(TableName, &[&str])] = &[
    (TableName::Agency, &["agency_name", "agency_url", "agency_timezone"]),
    (TableName::Routes, &["route_id", "route_type"]),
    (TableName::Stops, &["stop_id", "stop_name", "stop_lat", "stop_lon"]),
    (TableName::Trips, &["route_id", "service_id", "trip_id"]),
    (TableName::StopTimes, &["trip_id", "stop_id", "stop_sequence"]),
];

const MAX_MISSING_IDS: usize = 10;
const MAX_UNNAMED_ROUTES: usize = 5;
const STALE_SERVICE_DAYS: i64 = 30;
const MAX_SERVICE_SPAN_DAYS: i64 = 730;

/// Number of distinct trips sampled by the stop sequence check.
pub const SEQUENCE_SAMPLE_TRIPS: usize = 100;

/// All standard rules, in reporting order.
pub fn get_all_rules() -> Vec<Rule> {
    vec![
        required_files_rule(),
        required_fields_rule(),
        data_types_rule(),
        foreign_keys_rule(),
        coordinate_validity_rule(),
        service_dates_rule(),
        stop_times_sequence_rule(),
        route_names_rule(),
        duplicate_ids_rule(),
        speed_validation_rule(),
    ]
}

pub fn required_files_rule() -> Rule {
    Rule::from_fn(
        "required_files",
        "Check for required GTFS files",
        Severity::Error,
        |feed| {
            Ok(REQUIRED_FILES
                .iter()
                .filter(|name| feed.state(**name).is_missing_or_empty())
                .map(|name| {
                    Issue::new(format!("Required file {} is missing or empty", name.file_name()))
                        .with_detail("file", name.as_str())
                })
                .collect())
        },
    )
    .with_category(Category::Structure)
}

pub fn required_fields_rule() -> Rule {
    Rule::from_fn(
        "required_fields",
        "Check for required fields in each file",
        Severity::Error,
        |feed| {
            let mut issues = Vec::new();
            for (name, fields) in REQUIRED_FIELDS {
                let Some(table) = feed.state(*name).rows() else {
                    continue;
                };
                for field in fields.iter().filter(|f| !table.has_column(f)) {
                    issues.push(
                        Issue::new(format!(
                            "Required field '{field}' missing in {}",
                            name.file_name()
                        ))
                        .with_detail("file", name.as_str())
                        .with_detail("field", *field),
                    );
                }
            }
            Ok(issues)
        },
    )
    .with_category(Category::Structure)
}

fn is_numeric(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

/// True when every non-blank value of `column` parses as a number.
fn column_is_numeric(table: &Table, column: usize) -> bool {
    table.column_values(column).flatten().all(is_numeric)
}

pub fn data_types_rule() -> Rule {
    Rule::from_fn(
        "data_types",
        "Check data type compliance",
        Severity::Error,
        |feed| {
            let mut issues = Vec::new();

            if let Some(stops) = feed.state(TableName::Stops).present() {
                if let (Some(lat), Some(lon)) =
                    (stops.column_index("stop_lat"), stops.column_index("stop_lon"))
                {
                    if !column_is_numeric(stops, lat) || !column_is_numeric(stops, lon) {
                        issues.push(
                            Issue::new("Stop coordinates must be numeric")
                                .with_detail("file", "stops")
                                .with_detail("fields", json!(["stop_lat", "stop_lon"])),
                        );
                    }
                }
            }

            if let Some(routes) = feed.state(TableName::Routes).present() {
                if let Some(route_type) = routes.column_index("route_type") {
                    if !column_is_numeric(routes, route_type) {
                        issues.push(
                            Issue::new("Route type must be numeric")
                                .with_detail("file", "routes")
                                .with_detail("field", "route_type"),
                        );
                    }
                }
            }

            Ok(issues)
        },
    )
    .with_category(Category::DataQuality)
}

/// Distinct values of `child.column` missing from `parent.column`, in order of
/// first appearance.
fn dangling_refs<'a>(
    parent: &Table,
    child: &'a Table,
    column: &str,
    parent_name: TableName,
    child_name: TableName,
) -> anyhow::Result<Vec<&'a str>> {
    let parent_idx = parent
        .require_column(column)
        .with_context(|| parent_name.file_name())?;
    let child_idx = child
        .require_column(column)
        .with_context(|| child_name.file_name())?;

    let known: HashSet<&str> = parent.column_values(parent_idx).flatten().collect();
    let mut seen = HashSet::new();
    Ok(child
        .column_values(child_idx)
        .flatten()
        .filter(|v| !known.contains(*v) && seen.insert(*v))
        .collect())
}

pub fn foreign_keys_rule() -> Rule {
    Rule::from_fn(
        "foreign_keys",
        "Check foreign key relationships",
        Severity::Error,
        |feed| {
            let mut issues = Vec::new();

            if let (Some(routes), Some(trips)) = (
                feed.state(TableName::Routes).present(),
                feed.state(TableName::Trips).present(),
            ) {
                let missing =
                    dangling_refs(routes, trips, "route_id", TableName::Routes, TableName::Trips)?;
                if !missing.is_empty() {
                    let sample: Vec<_> = missing.into_iter().take(MAX_MISSING_IDS).collect();
                    issues.push(
                        Issue::new("Trips reference non-existent routes")
                            .with_detail("missing_route_ids", json!(sample)),
                    );
                }
            }

            if let (Some(stops), Some(stop_times)) = (
                feed.state(TableName::Stops).present(),
                feed.state(TableName::StopTimes).present(),
            ) {
                let missing = dangling_refs(
                    stops,
                    stop_times,
                    "stop_id",
                    TableName::Stops,
                    TableName::StopTimes,
                )?;
                if !missing.is_empty() {
                    let sample: Vec<_> = missing.into_iter().take(MAX_MISSING_IDS).collect();
                    issues.push(
                        Issue::new("Stop times reference non-existent stops")
                            .with_detail("missing_stop_ids", json!(sample)),
                    );
                }
            }

            Ok(issues)
        },
    )
    .with_category(Category::ReferentialIntegrity)
}

/// Counts numeric values of `column` outside `[-limit, limit]`. Non-numeric
/// values are left to the data type rule.
fn count_out_of_range(table: &Table, column: usize, limit: f64) -> usize {
    table
        .column_values(column)
        .flatten()
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .filter(|v| *v < -limit || *v > limit)
        .count()
}

pub fn coordinate_validity_rule() -> Rule {
    Rule::from_fn(
        "coordinate_validity",
        "Check coordinate validity",
        Severity::Error,
        |feed| {
            let mut issues = Vec::new();
            let Some(stops) = feed.state(TableName::Stops).present() else {
                return Ok(issues);
            };
            let (Some(lat), Some(lon)) =
                (stops.column_index("stop_lat"), stops.column_index("stop_lon"))
            else {
                return Ok(issues);
            };

            let bad_lats = count_out_of_range(stops, lat, 90.0);
            if bad_lats > 0 {
                issues.push(
                    Issue::new(format!("Invalid latitudes found: {bad_lats} stops"))
                        .with_detail("count", bad_lats),
                );
            }

            let bad_lons = count_out_of_range(stops, lon, 180.0);
            if bad_lons > 0 {
                issues.push(
                    Issue::new(format!("Invalid longitudes found: {bad_lons} stops"))
                        .with_detail("count", bad_lons),
                );
            }

            Ok(issues)
        },
    )
    .with_category(Category::Geographic)
}

/// Flags stale and unusually long calendar periods.
///
/// `now` pins the reference time; `None` uses the local clock at check time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceDates {
    pub now: Option<NaiveDateTime>,
}

fn parse_gtfs_date(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .with_context(|| format!("invalid date '{value}'"))
}

impl ServiceDates {
    fn periods(calendar: &Table) -> anyhow::Result<Vec<(NaiveDate, NaiveDate)>> {
        let start = calendar.require_column("start_date")?;
        let end = calendar.require_column("end_date")?;

        let mut periods = Vec::new();
        for row in calendar.rows() {
            if let (Some(s), Some(e)) = (row.at(start), row.at(end)) {
                periods.push((parse_gtfs_date(s)?, parse_gtfs_date(e)?));
            }
        }
        Ok(periods)
    }
}

impl RuleCheck for ServiceDates {
    fn check(&self, feed: &FeedTables) -> anyhow::Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let Some(calendar) = feed.state(TableName::Calendar).rows() else {
            return Ok(issues);
        };

        let periods = match Self::periods(calendar) {
            Ok(periods) => periods,
            Err(e) => {
                issues.push(Issue::new(format!("Error validating service dates: {e:#}")));
                return Ok(issues);
            }
        };

        let now = self.now.unwrap_or_else(|| Local::now().naive_local());
        let cutoff = now - Duration::days(STALE_SERVICE_DAYS);

        let past = periods
            .iter()
            .filter(|(_, end)| end.and_hms_opt(0, 0, 0).is_some_and(|e| e < cutoff))
            .count();
        if past > 0 {
            issues.push(
                Issue::new(format!(
                    "Service periods ending more than {STALE_SERVICE_DAYS} days ago: {past}"
                ))
                .with_detail("count", past),
            );
        }

        let long = periods
            .iter()
            .filter(|(start, end)| (*end - *start).num_days() > MAX_SERVICE_SPAN_DAYS)
            .count();
        if long > 0 {
            issues.push(
                Issue::new(format!("Service periods longer than 2 years: {long}"))
                    .with_detail("count", long),
            );
        }

        Ok(issues)
    }
}

pub fn service_dates_rule() -> Rule {
    service_dates_rule_at(None)
}

/// [`service_dates_rule`] evaluated against a fixed reference time.
pub fn service_dates_rule_at(now: Option<NaiveDateTime>) -> Rule {
    Rule::new(
        "service_dates",
        "Check service date ranges",
        Severity::Warning,
        ServiceDates { now },
    )
    .with_category(Category::Temporal)
}

/// Checks for duplicated and non-contiguous stop sequences.
///
/// Contiguity is only checked on the first `trip_limit` distinct trips (all of
/// them when `None`), and only the first offending trip is reported.
#[derive(Debug, Clone, Copy)]
pub struct StopTimesSequence {
    pub trip_limit: Option<usize>,
}

impl RuleCheck for StopTimesSequence {
    fn check(&self, feed: &FeedTables) -> anyhow::Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let Some(stop_times) = feed.state(TableName::StopTimes).present() else {
            return Ok(issues);
        };
        let trip_col = stop_times
            .require_column("trip_id")
            .context("stop_times.txt")?;
        let seq_col = stop_times
            .require_column("stop_sequence")
            .context("stop_times.txt")?;

        // Sequences are compared numerically; unparsable values by their text.
        let mut group_sizes: HashMap<(&str, Result<i64, &str>), usize> = HashMap::new();
        let mut trip_order: Vec<&str> = Vec::new();
        let mut sequences: HashMap<&str, Vec<Option<i64>>> = HashMap::new();

        for row in stop_times.rows() {
            let Some(trip_id) = row.at(trip_col) else {
                continue;
            };
            let seq = row
                .at(seq_col)
                .map(|s| s.trim().parse::<i64>().map_err(|_| s));
            if let Some(key) = seq {
                *group_sizes.entry((trip_id, key)).or_default() += 1;
            }
            sequences
                .entry(trip_id)
                .or_insert_with(|| {
                    trip_order.push(trip_id);
                    Vec::new()
                })
                .push(seq.and_then(Result::ok));
        }

        let duplicates = group_sizes.values().filter(|n| **n > 1).count();
        if duplicates > 0 {
            issues.push(
                Issue::new(format!("Duplicate stop sequences found in {duplicates} cases"))
                    .with_detail("count", duplicates),
            );
        }

        let limit = self.trip_limit.unwrap_or(usize::MAX);
        for trip_id in trip_order.into_iter().take(limit) {
            if !is_dense_run(&sequences[trip_id]) {
                issues.push(
                    Issue::new(format!("Non-sequential stop sequences in trip {trip_id}"))
                        .with_detail("trip_id", trip_id),
                );
                break;
            }
        }

        Ok(issues)
    }
}

/// True when the values, once sorted, are exactly `1..=len`.
fn is_dense_run(values: &[Option<i64>]) -> bool {
    let Some(mut sorted) = values.iter().copied().collect::<Option<Vec<i64>>>() else {
        return false;
    };
    sorted.sort_unstable();
    sorted.iter().zip(1..).all(|(v, expected)| *v == expected)
}

pub fn stop_times_sequence_rule() -> Rule {
    stop_times_sequence_rule_with_limit(Some(SEQUENCE_SAMPLE_TRIPS))
}

pub fn stop_times_sequence_rule_with_limit(trip_limit: Option<usize>) -> Rule {
    Rule::new(
        "stop_times_sequence",
        "Check stop time sequences",
        Severity::Warning,
        StopTimesSequence { trip_limit },
    )
    .with_category(Category::Sequence)
}

pub fn route_names_rule() -> Rule {
    Rule::from_fn(
        "route_names",
        "Check route naming consistency",
        Severity::Info,
        |feed| {
            let Some(routes) = feed.state(TableName::Routes).present() else {
                return Ok(Vec::new());
            };

            let unnamed: Vec<_> = routes
                .rows()
                .filter(|r| r.get("route_short_name").is_none() && r.get("route_long_name").is_none())
                .collect();
            if unnamed.is_empty() {
                return Ok(Vec::new());
            }

            let ids: Vec<&str> = unnamed
                .iter()
                .filter_map(|r| r.get("route_id"))
                .take(MAX_UNNAMED_ROUTES)
                .collect();
            Ok(vec![
                Issue::new(format!("Routes without names: {}", unnamed.len()))
                    .with_detail("count", unnamed.len())
                    .with_detail("route_ids", json!(ids)),
            ])
        },
    )
    .with_category(Category::Naming)
}

/// Rows whose `column` value already appeared earlier in the table.
fn count_repeats(table: &Table, column: usize) -> usize {
    let mut seen = HashSet::new();
    table
        .column_values(column)
        .flatten()
        .filter(|v| !seen.insert(*v))
        .count()
}

pub fn duplicate_ids_rule() -> Rule {
    Rule::from_fn(
        "duplicate_ids",
        "Check for duplicate IDs",
        Severity::Error,
        |feed| {
            let mut issues = Vec::new();
            let checks = [
                (TableName::Routes, "route_id", "Duplicate route IDs found"),
                (TableName::Stops, "stop_id", "Duplicate stop IDs found"),
            ];

            for (name, column, label) in checks {
                let Some(table) = feed.state(name).present() else {
                    continue;
                };
                let Some(idx) = table.column_index(column) else {
                    continue;
                };
                let repeats = count_repeats(table, idx);
                if repeats > 0 {
                    issues.push(
                        Issue::new(format!("{label}: {repeats}")).with_detail("count", repeats),
                    );
                }
            }

            Ok(issues)
        },
    )
    .with_category(Category::Uniqueness)
}

/// Placeholder until stop-to-stop speeds are computed: only recommends shapes.
pub fn speed_validation_rule() -> Rule {
    Rule::from_fn(
        "speed_validation",
        "Validate travel speeds between stops",
        Severity::Info,
        |feed| {
            if feed.state(TableName::Shapes).is_missing_or_empty() {
                return Ok(vec![
                    Issue::new("No shapes available for speed validation")
                        .with_detail("recommendation", "Add shapes.txt for better validation"),
                ]);
            }
            Ok(Vec::new())
        },
    )
    .with_category(Category::Performance)
}
