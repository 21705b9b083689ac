use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use databus::config::ApiConfig;
use databus::error::{DatabusError, Result};
use databus::fetch::auth::ApiKey;
use databus::fetch::{BasicClient, HttpClient, Retrying};
use databus::filter::BoundingBox;
use reqwest::header::{ACCEPT, HeaderValue, USER_AGENT};
use reqwest::{Method, Request, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::services::catalog_api::{Agency, CatalogApi, CatalogFeed, Route, Stop, Trip};

const USER_AGENT_VALUE: &str = concat!("databus/", env!("CARGO_PKG_VERSION"));

/// Client for the Databús catalog REST API.
pub struct DatabusClient<C> {
    http: C,
    base_url: String,
}

impl DatabusClient<Box<dyn HttpClient>> {
    /// Builds the standard client stack: timeout, retries and, when a key is
    /// configured, bearer authentication.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let basic = BasicClient::with_timeout(Duration::from_secs(config.timeout))
            .map_err(|e| DatabusError::Configuration(format!("failed to build HTTP client: {e}")))?;
        let retrying = Retrying::new(basic, config.max_retries);

        let http: Box<dyn HttpClient> = match config.api_key.as_deref() {
            Some(key) => Box::new(ApiKey::bearer(retrying, key)?),
            None => Box::new(retrying),
        };
        Ok(Self::new(http, &config.base_url))
    }
}

impl<C: HttpClient> DatabusClient<C> {
    pub fn new(http: C, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str], params: &[(&str, String)]) -> Result<Url> {
        let invalid = |reason: String| {
            DatabusError::Configuration(format!("invalid API URL '{}': {reason}", self.base_url))
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<Response> {
        let mut req = Request::new(Method::GET, url.clone());
        let headers = req.headers_mut();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        debug!(%url, "Sending request");
        let response = self.http.execute(req).await.map_err(|e| {
            if e.is_connect() {
                DatabusError::Connection(format!("Failed to connect to {url}: {e}"))
            } else if e.is_timeout() {
                DatabusError::Connection(format!("Request timed out: {e}"))
            } else {
                DatabusError::Api(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatabusError::Api(format!("{status} from {url}: {body}")));
        }
        Ok(response)
    }

    async fn get_json(&self, segments: &[&str], params: &[(&str, String)]) -> Result<Value> {
        let url = self.url(segments, params)?;
        let response = self.send(url.clone()).await?;
        response
            .json()
            .await
            .map_err(|e| DatabusError::Api(format!("invalid response from {url}: {e}")))
    }

    /// Fetches a list endpoint wrapped as `{"<key>": [...]}`.
    async fn get_list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        key: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let body = self.get_json(segments, params).await?;
        unwrap_list(body, key)
    }
}

/// Items under `key`, empty when the key is missing or null.
fn unwrap_list<T: DeserializeOwned>(mut body: Value, key: &str) -> Result<Vec<T>> {
    match body.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(items) => serde_json::from_value(items)
            .map_err(|e| DatabusError::Api(format!("unexpected '{key}' payload: {e}"))),
    }
}

fn push_opt(params: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<impl ToString>) {
    if let Some(v) = value {
        params.push((name, v.to_string()));
    }
}

#[async_trait]
impl<C: HttpClient> CatalogApi for DatabusClient<C> {
    async fn list_feeds(&self, country: Option<&str>) -> Result<Vec<CatalogFeed>> {
        let mut params = Vec::new();
        push_opt(&mut params, "country", country);
        let feeds: Vec<CatalogFeed> = self.get_list(&["feeds"], "feeds", &params).await?;
        info!(total = feeds.len(), "Feed list fetched");
        Ok(feeds)
    }

    async fn get_feed(&self, feed_id: &str) -> Result<CatalogFeed> {
        let body = self.get_json(&["feeds", feed_id], &[]).await?;
        serde_json::from_value(body)
            .map_err(|e| DatabusError::Api(format!("unexpected feed payload: {e}")))
    }

    async fn get_agencies(&self, feed_id: &str) -> Result<Vec<Agency>> {
        self.get_list(&["feeds", feed_id, "agencies"], "agencies", &[])
            .await
    }

    async fn get_routes(
        &self,
        feed_id: &str,
        agency_id: Option<&str>,
        route_type: Option<i32>,
    ) -> Result<Vec<Route>> {
        let mut params = Vec::new();
        push_opt(&mut params, "agency_id", agency_id);
        push_opt(&mut params, "route_type", route_type);
        self.get_list(&["feeds", feed_id, "routes"], "routes", &params)
            .await
    }

    async fn get_stops(
        &self,
        feed_id: &str,
        bbox: Option<BoundingBox>,
        route_id: Option<&str>,
    ) -> Result<Vec<Stop>> {
        let mut params = Vec::new();
        push_opt(&mut params, "bbox", bbox);
        push_opt(&mut params, "route_id", route_id);
        self.get_list(&["feeds", feed_id, "stops"], "stops", &params)
            .await
    }

    async fn get_trips(
        &self,
        feed_id: &str,
        route_id: Option<&str>,
        service_id: Option<&str>,
    ) -> Result<Vec<Trip>> {
        let mut params = Vec::new();
        push_opt(&mut params, "route_id", route_id);
        push_opt(&mut params, "service_id", service_id);
        self.get_list(&["feeds", feed_id, "trips"], "trips", &params)
            .await
    }

    #[tracing::instrument(skip(self), fields(output = %output_path.display()))]
    async fn download_feed(&self, feed_id: &str, output_path: &Path) -> Result<PathBuf> {
        let url = self.url(&["feeds", feed_id, "download"], &[])?;
        let response = self.send(url).await?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let written = match save_body(response, output_path).await {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "Download failed, removing partial file");
                let _ = tokio::fs::remove_file(output_path).await;
                return Err(e);
            }
        };

        info!(feed_id, bytes = written, "Downloaded feed");
        Ok(output_path.to_path_buf())
    }
}

/// Streams the response body into `path`, returning the byte count.
async fn save_body(mut response: Response, path: &Path) -> Result<usize> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0usize;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| DatabusError::Api(format!("Failed to download feed: {e}")))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::env;

    fn client(server: &mockito::Server) -> DatabusClient<BasicClient> {
        DatabusClient::new(BasicClient::new(), &format!("{}/", server.url()))
    }

    const FEED: &str = r#"{
        "id": "costa-rica-gtfs",
        "name": "Costa Rica GTFS",
        "country_code": "CR",
        "city": "San José",
        "file_size": 1048576,
        "last_updated": "2024-01-15T10:30:00Z"
    }"#;

    #[tokio::test]
    async fn test_list_feeds_with_country() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feeds")
            .match_query(Matcher::UrlEncoded("country".into(), "CR".into()))
            .match_header("user-agent", USER_AGENT_VALUE)
            .match_header("accept", "application/json")
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"feeds": [{FEED}]}}"#))
            .create_async()
            .await;

        let feeds = client(&server).list_feeds(Some("CR")).await.unwrap();

        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].id, "costa-rica-gtfs");
        assert_eq!(feeds[0].status, "active");
        assert_eq!(feeds[0].file_size, Some(1048576));
        assert!(feeds[0].last_updated.is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_envelope_key_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/feeds/cr/agencies")
            .with_body("{}")
            .create_async()
            .await;

        let agencies = client(&server).get_agencies("cr").await.unwrap();
        assert!(agencies.is_empty());
    }

    #[tokio::test]
    async fn test_get_feed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/feeds/costa-rica-gtfs")
            .with_body(FEED)
            .create_async()
            .await;

        let feed = client(&server).get_feed("costa-rica-gtfs").await.unwrap();
        assert_eq!(feed.country_code, "CR");
        assert_eq!(feed.city.as_deref(), Some("San José"));
    }

    #[tokio::test]
    async fn test_get_routes_filters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feeds/cr/routes")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("agency_id".into(), "A1".into()),
                Matcher::UrlEncoded("route_type".into(), "3".into()),
            ]))
            .with_body(r#"{"routes": [{"route_id": "R1", "route_type": 3, "route_short_name": "1"}]}"#)
            .create_async()
            .await;

        let routes = client(&server)
            .get_routes("cr", Some("A1"), Some(3))
            .await
            .unwrap();
        assert_eq!(routes[0].route_id, "R1");
        assert_eq!(routes[0].route_type, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_stops_bbox_is_lon_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feeds/cr/stops")
            .match_query(Matcher::UrlEncoded("bbox".into(), "-84.1,9.9,-84,10".into()))
            .with_body(
                r#"{"stops": [{"stop_id": "S1", "stop_name": "Central", "stop_lat": 9.93, "stop_lon": -84.08}]}"#,
            )
            .create_async()
            .await;

        let bbox = BoundingBox::new(9.9, -84.1, 10.0, -84.0);
        let stops = client(&server).get_stops("cr", Some(bbox), None).await.unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].stop_lat, 9.93);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_trips() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/feeds/cr/trips")
            .match_query(Matcher::UrlEncoded("route_id".into(), "R1".into()))
            .with_body(r#"{"trips": [{"route_id": "R1", "service_id": "WK", "trip_id": "T1", "direction_id": 0}]}"#)
            .create_async()
            .await;

        let trips = client(&server).get_trips("cr", Some("R1"), None).await.unwrap();
        assert_eq!(trips[0].direction_id, Some(0));
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/feeds/nope")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let err = client(&server).get_feed("nope").await.unwrap_err();
        assert!(matches!(err, DatabusError::Api(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn test_malformed_json_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/feeds")
            .with_body("<html>")
            .create_async()
            .await;

        let err = client(&server).list_feeds(None).await.unwrap_err();
        assert!(matches!(err, DatabusError::Api(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let client = DatabusClient::new(BasicClient::new(), "http://127.0.0.1:1");
        let err = client.list_feeds(None).await.unwrap_err();
        assert!(matches!(err, DatabusError::Connection(_)));
    }

    #[tokio::test]
    async fn test_download_feed_writes_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/feeds/cr/download")
            .with_body(b"PK\x03\x04fake zip".to_vec())
            .create_async()
            .await;

        let path = env::temp_dir().join("databus_download_test").join("cr.zip");
        let saved = client(&server).download_feed("cr", &path).await.unwrap();

        assert_eq!(saved, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04fake zip");
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_feed_id_is_percent_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feeds/cr%2Fsan-jose%3Fv=2/agencies")
            .with_body(r#"{"agencies": []}"#)
            .create_async()
            .await;

        let agencies = client(&server).get_agencies("cr/san-jose?v=2").await.unwrap();
        assert!(agencies.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_base_url_path_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/feeds/cr")
            .with_body(FEED)
            .create_async()
            .await;

        let client = DatabusClient::new(BasicClient::new(), &format!("{}/v1/", server.url()));
        client.get_feed("cr").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_interrupted_download_removes_partial_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/feeds/cr/download")
            .with_chunked_body(|w| {
                w.write_all(b"PK\x03\x04partial")?;
                Err(std::io::Error::other("connection dropped"))
            })
            .create_async()
            .await;

        let dir = env::temp_dir().join("databus_download_partial");
        let path = dir.join("cr.zip");
        let result = client(&server).download_feed("cr", &path).await;

        assert!(result.is_err());
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_from_config_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feeds")
            .match_header("authorization", "Bearer abc")
            .with_body(r#"{"feeds": []}"#)
            .create_async()
            .await;

        let config = ApiConfig {
            base_url: server.url(),
            api_key: Some("abc".into()),
            ..ApiConfig::default()
        };
        let feeds = DatabusClient::from_config(&config)
            .unwrap()
            .list_feeds(None)
            .await
            .unwrap();

        assert!(feeds.is_empty());
        mock.assert_async().await;
    }
}
