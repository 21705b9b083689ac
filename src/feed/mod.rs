//! In-memory representation of a GTFS feed.
//!
//! A feed is a set of named [`Table`]s. [`FeedTables::state`] tells apart a
//! file that was never provided, one that was provided without rows, and one
//! holding data; rules are expected to check the state explicitly instead of
//! probing for columns.

mod loader;
mod table;
mod writer;

pub use loader::{load_feed, read_table};
pub use table::{Row, Table};
pub use writer::{export_to_dir, export_to_zip};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// The GTFS text files understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Agency,
    Routes,
    Stops,
    Trips,
    StopTimes,
    Calendar,
    CalendarDates,
    Shapes,
    FareAttributes,
    FareRules,
    Frequencies,
    Transfers,
}

impl TableName {
    pub const ALL: [TableName; 12] = [
        TableName::Agency,
        TableName::Routes,
        TableName::Stops,
        TableName::Trips,
        TableName::StopTimes,
        TableName::Calendar,
        TableName::CalendarDates,
        TableName::Shapes,
        TableName::FareAttributes,
        TableName::FareRules,
        TableName::Frequencies,
        TableName::Transfers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Agency => "agency",
            TableName::Routes => "routes",
            TableName::Stops => "stops",
            TableName::Trips => "trips",
            TableName::StopTimes => "stop_times",
            TableName::Calendar => "calendar",
            TableName::CalendarDates => "calendar_dates",
            TableName::Shapes => "shapes",
            TableName::FareAttributes => "fare_attributes",
            TableName::FareRules => "fare_rules",
            TableName::Frequencies => "frequencies",
            TableName::Transfers => "transfers",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.txt", self.as_str())
    }

    /// Resolves a file name such as `stops.txt` (or a bare `stops`).
    pub fn from_file_name(name: &str) -> Option<TableName> {
        let stem = name.strip_suffix(".txt").unwrap_or(name);
        TableName::ALL.into_iter().find(|t| t.as_str() == stem)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence of a table within a feed.
#[derive(Debug, Clone, Copy)]
pub enum TableState<'a> {
    Absent,
    Empty(&'a Table),
    Rows(&'a Table),
}

impl<'a> TableState<'a> {
    /// The table when it holds at least one row.
    pub fn rows(self) -> Option<&'a Table> {
        match self {
            TableState::Rows(t) => Some(t),
            _ => None,
        }
    }

    /// The table whenever it was provided, with or without rows.
    pub fn present(self) -> Option<&'a Table> {
        match self {
            TableState::Absent => None,
            TableState::Empty(t) | TableState::Rows(t) => Some(t),
        }
    }

    pub fn is_missing_or_empty(&self) -> bool {
        !matches!(self, TableState::Rows(_))
    }
}

/// All tables loaded from one feed, plus where they came from.
#[derive(Debug, Clone, Default)]
pub struct FeedTables {
    tables: BTreeMap<TableName, Table>,
    source: Option<PathBuf>,
}

impl FeedTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: TableName, table: Table) -> Self {
        self.insert(name, table);
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn insert(&mut self, name: TableName, table: Table) {
        self.tables.insert(name, table);
    }

    pub fn remove(&mut self, name: TableName) -> Option<Table> {
        self.tables.remove(&name)
    }

    pub fn get(&self, name: TableName) -> Option<&Table> {
        self.tables.get(&name)
    }

    pub fn state(&self, name: TableName) -> TableState<'_> {
        match self.tables.get(&name) {
            None => TableState::Absent,
            Some(t) if t.is_empty() => TableState::Empty(t),
            Some(t) => TableState::Rows(t),
        }
    }

    /// Row count of a table, zero when absent.
    pub fn count(&self, name: TableName) -> usize {
        self.get(name).map_or(0, Table::len)
    }

    pub fn table_names(&self) -> impl Iterator<Item = TableName> + '_ {
        self.tables.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableName, &Table)> + '_ {
        self.tables.iter().map(|(k, v)| (*k, v))
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_distinguishes_absent_empty_and_rows() {
        let feed = FeedTables::new()
            .with_table(TableName::Agency, Table::new(["agency_name"]))
            .with_table(
                TableName::Routes,
                Table::new(["route_id"]).with_row(["R1"]),
            );

        assert!(matches!(feed.state(TableName::Stops), TableState::Absent));
        assert!(matches!(feed.state(TableName::Agency), TableState::Empty(_)));
        assert!(matches!(feed.state(TableName::Routes), TableState::Rows(_)));
        assert!(feed.state(TableName::Agency).present().is_some());
        assert!(feed.state(TableName::Agency).rows().is_none());
    }

    #[test]
    fn test_from_file_name() {
        assert_eq!(TableName::from_file_name("stop_times.txt"), Some(TableName::StopTimes));
        assert_eq!(TableName::from_file_name("calendar"), Some(TableName::Calendar));
        assert_eq!(TableName::from_file_name("feed_info.txt"), None);
    }

    #[test]
    fn test_count_of_absent_table_is_zero() {
        let feed = FeedTables::new();
        assert_eq!(feed.count(TableName::Shapes), 0);
        assert!(feed.source().is_none());
    }
}
