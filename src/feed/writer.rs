use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;

use super::{FeedTables, Table, TableName};
use crate::error::Result;

/// Writes every table of `feed` as `<name>.txt` into a new zip archive.
#[tracing::instrument(skip(feed), fields(path = %path.display()))]
pub fn export_to_zip(feed: &FeedTables, path: &Path) -> Result<PathBuf> {
    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, table) in feed.iter() {
        zip.start_file(name.file_name(), options)?;
        write_table(&mut zip, table)?;
    }

    zip.finish()?;
    info!("GTFS feed exported");
    Ok(path.to_path_buf())
}

/// Writes each non-empty table as `<name>.txt` under `dir`, creating it if
/// needed. Returns the written files keyed by table.
#[tracing::instrument(skip(feed), fields(dir = %dir.display()))]
pub fn export_to_dir(feed: &FeedTables, dir: &Path) -> Result<BTreeMap<TableName, PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut files = BTreeMap::new();
    for (name, table) in feed.iter().filter(|(_, t)| !t.is_empty()) {
        let path = dir.join(name.file_name());
        write_table(File::create(&path)?, table)?;
        debug!(table = %name, rows = table.len(), "Exported table");
        files.insert(name, path);
    }

    info!(tables = files.len(), "GTFS tables exported");
    Ok(files)
}

fn write_table<W: Write>(out: W, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(table.columns())?;
    for row in 0..table.len() {
        writer.write_record((0..table.columns().len()).map(|c| table.value(row, c).unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{TableName, load_feed};
    use std::env;
    use std::fs;

    #[test]
    fn test_export_then_load_keeps_tables() {
        let path = env::temp_dir().join("databus_writer_test.zip");
        let _ = fs::remove_file(&path);

        let feed = FeedTables::new()
            .with_table(
                TableName::Stops,
                Table::new(["stop_id", "stop_name"])
                    .with_row(["S1", "Central, North"])
                    .with_row(["S2", ""]),
            )
            .with_table(TableName::Agency, Table::new(["agency_name"]));

        export_to_zip(&feed, &path).unwrap();
        let loaded = load_feed(&path).unwrap();

        let stops = loaded.get(TableName::Stops).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops.value(0, 1), Some("Central, North"));
        assert_eq!(stops.value(1, 1), None);
        assert!(loaded.get(TableName::Agency).unwrap().is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_export_to_dir_skips_empty_tables() {
        let dir = env::temp_dir().join("databus_writer_dir").join("csv");
        let _ = fs::remove_dir_all(dir.parent().unwrap());

        let feed = FeedTables::new()
            .with_table(
                TableName::Routes,
                Table::new(["route_id", "route_type"]).with_row(["R1", "3"]),
            )
            .with_table(TableName::Shapes, Table::new(["shape_id"]));

        let files = export_to_dir(&feed, &dir).unwrap();
        assert_eq!(files.keys().copied().collect::<Vec<_>>(), vec![TableName::Routes]);
        assert_eq!(files[&TableName::Routes], dir.join("routes.txt"));
        assert_eq!(
            fs::read_to_string(dir.join("routes.txt")).unwrap(),
            "route_id,route_type\nR1,3\n"
        );
        assert!(!dir.join("shapes.txt").exists());

        fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }
}
