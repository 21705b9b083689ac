//! Trait and types for interacting with a GTFS feed catalog.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use databus::error::Result;
use databus::filter::BoundingBox;
use serde::{Deserialize, Serialize};

fn default_status() -> String {
    "active".to_string()
}

/// Metadata for a single GTFS feed from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFeed {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub country_code: String,
    pub region: Option<String>,
    pub city: Option<String>,
    pub operator: Option<String>,
    pub url: Option<String>,
    pub download_url: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Size in bytes.
    pub file_size: Option<u64>,
    pub version: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub agency_id: Option<String>,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    pub agency_lang: Option<String>,
    pub agency_phone: Option<String>,
    pub agency_fare_url: Option<String>,
    pub agency_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub agency_id: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_desc: Option<String>,
    pub route_type: i32,
    pub route_url: Option<String>,
    pub route_color: Option<String>,
    pub route_text_color: Option<String>,
    pub route_sort_order: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub stop_code: Option<String>,
    pub stop_name: String,
    pub stop_desc: Option<String>,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub zone_id: Option<String>,
    pub stop_url: Option<String>,
    pub location_type: Option<i32>,
    pub parent_station: Option<String>,
    pub stop_timezone: Option<String>,
    pub wheelchair_boarding: Option<i32>,
    pub platform_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    pub trip_headsign: Option<String>,
    pub trip_short_name: Option<String>,
    pub direction_id: Option<i32>,
    pub block_id: Option<String>,
    pub shape_id: Option<String>,
    pub wheelchair_accessible: Option<i32>,
    pub bikes_allowed: Option<i32>,
}

/// Abstraction over a feed catalog provider.
#[async_trait::async_trait]
pub trait CatalogApi {
    /// Returns the available feeds, optionally for one country code (e.g. `CR`).
    async fn list_feeds(&self, country: Option<&str>) -> Result<Vec<CatalogFeed>>;

    async fn get_feed(&self, feed_id: &str) -> Result<CatalogFeed>;

    async fn get_agencies(&self, feed_id: &str) -> Result<Vec<Agency>>;

    async fn get_routes(
        &self,
        feed_id: &str,
        agency_id: Option<&str>,
        route_type: Option<i32>,
    ) -> Result<Vec<Route>>;

    async fn get_stops(
        &self,
        feed_id: &str,
        bbox: Option<BoundingBox>,
        route_id: Option<&str>,
    ) -> Result<Vec<Stop>>;

    async fn get_trips(
        &self,
        feed_id: &str,
        route_id: Option<&str>,
        service_id: Option<&str>,
    ) -> Result<Vec<Trip>>;

    /// Saves the feed archive to `output_path` and returns that path.
    async fn download_feed(&self, feed_id: &str, output_path: &Path) -> Result<PathBuf>;
}
