//! Feed holder with query, statistics and filtering helpers.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{DatabusError, Result};
use crate::feed::{self, FeedTables, Table, TableName};
use crate::filter::{self, BoundingBox};
use crate::output;
use crate::stats::{FeedStats, RouteStats};

/// Owns at most one loaded feed. Operations other than loading fail with a
/// configuration error until a feed is present.
#[derive(Debug, Clone, Default)]
pub struct GtfsProcessor {
    feed_path: Option<PathBuf>,
    feed: Option<FeedTables>,
}

impl GtfsProcessor {
    pub fn new(feed_path: Option<PathBuf>) -> Self {
        Self {
            feed_path,
            feed: None,
        }
    }

    /// Wraps an already loaded feed.
    pub fn from_feed(feed: FeedTables) -> Self {
        Self {
            feed_path: feed.source().map(Path::to_path_buf),
            feed: Some(feed),
        }
    }

    /// Loads from `path`, falling back to the path given at construction.
    pub fn load_feed(&mut self, path: Option<&Path>) -> Result<&FeedTables> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.feed_path.clone())
            .ok_or_else(|| DatabusError::Processing("No feed path provided".to_string()))?;

        let loaded = feed::load_feed(&path)?;
        self.feed_path = Some(path);
        Ok(self.feed.insert(loaded))
    }

    pub fn is_loaded(&self) -> bool {
        self.feed.is_some()
    }

    pub fn feed(&self) -> Result<&FeedTables> {
        self.feed.as_ref().ok_or_else(|| {
            DatabusError::Configuration("No GTFS feed loaded. Call load_feed() first.".to_string())
        })
    }

    pub fn feed_path(&self) -> Option<&Path> {
        self.feed_path.as_deref()
    }

    /// Copy of a table, empty when the feed lacks it.
    fn table(&self, name: TableName) -> Result<Table> {
        Ok(self.feed()?.get(name).cloned().unwrap_or_default())
    }

    fn table_where(&self, name: TableName, column: &str, value: Option<&str>) -> Result<Table> {
        let table = self.table(name)?;
        Ok(match value {
            Some(v) => table.filter_rows(|r| r.get(column) == Some(v)),
            None => table,
        })
    }

    pub fn agencies(&self) -> Result<Table> {
        self.table(TableName::Agency)
    }

    pub fn stops(&self) -> Result<Table> {
        self.table(TableName::Stops)
    }

    /// Shape points, optionally for one `shape_id`. Empty when the feed has no
    /// shapes.
    pub fn shapes(&self, shape_id: Option<&str>) -> Result<Table> {
        self.table_where(TableName::Shapes, "shape_id", shape_id)
    }

    pub fn routes(&self, agency_id: Option<&str>) -> Result<Table> {
        self.table_where(TableName::Routes, "agency_id", agency_id)
    }

    pub fn trips(&self, route_id: Option<&str>) -> Result<Table> {
        self.table_where(TableName::Trips, "route_id", route_id)
    }

    pub fn stop_times(&self, trip_id: Option<&str>) -> Result<Table> {
        self.table_where(TableName::StopTimes, "trip_id", trip_id)
    }

    pub fn feed_stats(&self) -> Result<FeedStats> {
        Ok(FeedStats::from_feed(self.feed()?))
    }

    pub fn route_stats(&self, route_id: &str) -> Result<RouteStats> {
        RouteStats::from_feed(self.feed()?, route_id)
    }

    /// New processor holding only the part of the feed inside `bbox`.
    pub fn filter_by_bounding_box(
        &self,
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    ) -> Result<GtfsProcessor> {
        let bbox = BoundingBox::new(min_lat, min_lon, max_lat, max_lon);
        let filtered = filter::by_bounding_box(self.feed()?, bbox);
        info!(%bbox, trips = filtered.count(TableName::Trips), "Filtered feed by bounding box");
        Ok(GtfsProcessor::from_feed(filtered))
    }

    /// New processor holding the trips running between `start` and `end`
    /// (both `YYYY-MM-DD`, inclusive).
    pub fn filter_by_dates(&self, start: &str, end: &str) -> Result<GtfsProcessor> {
        let (start, end) = (filter::parse_date(start)?, filter::parse_date(end)?);
        let filtered = filter::by_dates(self.feed()?, start, end)?;
        info!(%start, %end, trips = filtered.count(TableName::Trips), "Filtered feed by dates");
        Ok(GtfsProcessor::from_feed(filtered))
    }

    /// New processor restricted to the given trips.
    pub fn filter_by_trips(&self, trip_ids: &HashSet<&str>) -> Result<GtfsProcessor> {
        Ok(GtfsProcessor::from_feed(filter::restrict_to_trips(self.feed()?, trip_ids)))
    }

    pub fn export_to_zip(&self, path: &Path) -> Result<PathBuf> {
        feed::export_to_zip(self.feed()?, path)
    }

    /// Writes each non-empty table as `<name>.txt` into `output_dir`.
    pub fn to_csv(&self, output_dir: &Path) -> Result<BTreeMap<TableName, PathBuf>> {
        feed::export_to_dir(self.feed()?, output_dir)
    }

    /// Writes a markdown summary of [`Self::feed_stats`] to `path`.
    pub fn create_summary_report(&self, path: &Path) -> Result<PathBuf> {
        output::write_feed_summary(path, &self.feed_stats()?, self.feed_path())
    }
}
