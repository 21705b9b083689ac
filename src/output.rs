//! Persistence for validation results and feed summaries.
//!
//! Full reports are written as JSON documents; summaries are appended to a
//! CSV history file. Feed statistics can be rendered as a markdown report.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use csv::WriterBuilder;
use tracing::{debug, info};

use crate::error::Result;
use crate::stats::{FeedStats, route_type_name};
use crate::validation::{ReportSummary, ValidationReport};

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Writes the full report as pretty JSON, creating parent directories.
pub fn write_report(path: &Path, report: &ValidationReport) -> Result<()> {
    create_parent(path)?;
    fs::write(path, report.to_json()?)?;
    info!(path = %path.display(), "Validation report written");
    Ok(())
}

/// Appends a [`ReportSummary`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_summary(path: &Path, summary: &ReportSummary) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(summary)?;
    writer.flush()?;

    Ok(())
}

/// Markdown summary of a feed's statistics.
pub fn feed_summary_markdown(
    stats: &FeedStats,
    feed_path: Option<&Path>,
    generated_at: NaiveDateTime,
) -> String {
    let source = feed_path.map_or_else(|| "-".to_string(), |p| p.display().to_string());
    let mut md = String::new();

    // writing to a String cannot fail
    let _ = writeln!(md, "# GTFS Feed Summary Report\n");
    let _ = writeln!(md, "Generated from: {source}");
    let _ = writeln!(md, "Generated on: {}\n", generated_at.format("%Y-%m-%d %H:%M:%S"));

    let _ = writeln!(md, "## Feed Statistics\n");
    for (label, count) in [
        ("Agencies", stats.agencies),
        ("Routes", stats.routes),
        ("Stops", stats.stops),
        ("Trips", stats.trips),
        ("Stop Times", stats.stop_times),
        ("Shapes", stats.shapes),
        ("Calendar Entries", stats.calendar),
    ] {
        let _ = writeln!(md, "- **{label}**: {count}");
    }

    if !stats.routes_by_type.is_empty() {
        let _ = writeln!(md, "\n## Routes by Type\n");
        for (route_type, count) in &stats.routes_by_type {
            let _ = writeln!(md, "- **{}**: {count}", route_type_name(route_type));
        }
    }

    if let Some(period) = &stats.service_period {
        let _ = writeln!(md, "\n## Service Period\n");
        let _ = writeln!(md, "- **Start Date**: {}", period.start);
        let _ = writeln!(md, "- **End Date**: {}", period.end);
    }

    md
}

/// Writes [`feed_summary_markdown`] for the current local time to `path`.
pub fn write_feed_summary(
    path: &Path,
    stats: &FeedStats,
    feed_path: Option<&Path>,
) -> Result<PathBuf> {
    create_parent(path)?;
    fs::write(path, feed_summary_markdown(stats, feed_path, Local::now().naive_local()))?;
    info!(path = %path.display(), "Feed summary written");
    Ok(path.to_path_buf())
}

/// Human readable size such as `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let rounded = (size * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}
