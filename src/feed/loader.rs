//! Reads GTFS text files from a directory or a zip archive.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use super::{FeedTables, Table, TableName};
use crate::error::{DatabusError, Result};

const BOM: char = '\u{feff}';

/// Loads every known GTFS table found at `path`.
///
/// `path` may be a directory containing `*.txt` files or a zip archive. Files
/// that do not correspond to a [`TableName`] are skipped.
#[tracing::instrument(fields(path = %path.display()))]
pub fn load_feed(path: &Path) -> Result<FeedTables> {
    if !path.exists() {
        return Err(DatabusError::Processing(format!(
            "Feed path does not exist: {}",
            path.display()
        )));
    }

    info!("Loading GTFS feed");
    let result = if path.is_dir() {
        load_dir(path)
    } else {
        File::open(path).map_err(DatabusError::from).and_then(load_zip)
    };

    let tables = result
        .map_err(|e| DatabusError::Processing(format!("Failed to load GTFS feed: {e}")))?
        .with_source(path);

    info!(tables = tables.table_names().count(), "GTFS feed loaded");
    Ok(tables)
}

fn load_dir(dir: &Path) -> Result<FeedTables> {
    let mut feed = FeedTables::new();
    for name in TableName::ALL {
        let file_path = dir.join(name.file_name());
        if !file_path.is_file() {
            continue;
        }
        let table = read_table(File::open(&file_path)?)?;
        debug!(table = %name, rows = table.len(), "Read table");
        feed.insert(name, table);
    }
    Ok(feed)
}

fn load_zip<R: Read + Seek>(reader: R) -> Result<FeedTables> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut feed = FeedTables::new();

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        // Some producers nest the files inside a folder.
        let base = entry.name().rsplit('/').next().unwrap_or_default().to_string();
        let Some(name) = TableName::from_file_name(&base) else {
            continue;
        };
        if !base.ends_with(".txt") {
            continue;
        }
        let table = read_table(entry)?;
        debug!(table = %name, rows = table.len(), "Read table");
        feed.insert(name, table);
    }

    Ok(feed)
}

/// Parses one GTFS CSV file.
pub fn read_table<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches(BOM).trim().to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut table = Table::new(headers);
    for record in rdr.records() {
        let record = record?;
        table.push_row(record.iter());
    }
    Ok(table)
}
