use crate::error::{DatabusError, Result};
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// The header is validated once at construction, so a malformed key is a
/// configuration error instead of a failed request.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
            DatabusError::Configuration(format!("invalid API key header '{header_name}': {e}"))
        })?;
        let mut value = HeaderValue::from_str(key)
            .map_err(|e| DatabusError::Configuration(format!("invalid API key: {e}")))?;
        value.set_sensitive(true);

        Ok(Self {
            inner,
            header_name,
            value,
        })
    }

    /// `Authorization: Bearer <key>`.
    pub fn bearer(inner: C, key: &str) -> Result<Self> {
        Self::new(inner, AUTHORIZATION.as_str(), &format!("Bearer {key}"))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;

    #[test]
    fn test_bearer_rejects_control_characters() {
        assert!(ApiKey::bearer(BasicClient::new(), "good-token").is_ok());
        let err = ApiKey::bearer(BasicClient::new(), "bad\ntoken").err().unwrap();
        assert!(matches!(err, DatabusError::Configuration(_)));
    }

    #[test]
    fn test_custom_header_name_is_validated() {
        assert!(ApiKey::new(BasicClient::new(), "X-Api-Key", "k").is_ok());
        assert!(ApiKey::new(BasicClient::new(), "bad header", "k").is_err());
    }

    #[tokio::test]
    async fn test_header_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feeds")
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .create_async()
            .await;

        let client = ApiKey::bearer(BasicClient::new(), "s3cret").unwrap();
        let url = format!("{}/feeds", server.url()).parse().unwrap();
        let resp = client
            .execute(reqwest::Request::new(reqwest::Method::GET, url))
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        mock.assert_async().await;
    }
}
