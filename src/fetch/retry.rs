use std::time::Duration;

use super::client::HttpClient;
use async_trait::async_trait;
use reqwest::{Method, Request, Response, StatusCode};
use tracing::warn;

/// Statuses treated as transient.
pub const RETRY_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// An [`HttpClient`] wrapper that repeats idempotent requests (GET, HEAD,
/// OPTIONS) on transient statuses or connection failures.
///
/// `max_retries` counts extra attempts, so a request is sent at most
/// `max_retries + 1` times. The last response is returned as is.
pub struct Retrying<C> {
    inner: C,
    max_retries: u32,
    backoff: Duration,
}

impl<C> Retrying<C> {
    pub fn new(inner: C, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            backoff: Duration::from_millis(300),
        }
    }

    /// Base delay, doubled after each failed attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for Retrying<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        let idempotent = matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS);
        let mut attempt = 0;

        loop {
            if !idempotent || attempt >= self.max_retries {
                return self.inner.execute(req).await;
            }
            // bodies that cannot be cloned get a single attempt
            let Some(next) = req.try_clone() else {
                return self.inner.execute(req).await;
            };

            match self.inner.execute(next).await {
                Ok(resp) if !RETRY_STATUSES.contains(&resp.status()) => return Ok(resp),
                Ok(resp) => {
                    warn!(url = %req.url(), status = %resp.status(), attempt, "Transient status, retrying");
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(url = %req.url(), error = %e, attempt, "Request failed, retrying");
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
            tokio::time::sleep(self.backoff * 2u32.saturating_pow(attempt - 1)).await;
        }
    }
}
