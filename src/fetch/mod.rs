//! Pluggable HTTP execution.
//!
//! Every outbound request goes through [`HttpClient`]. Behaviour such as
//! retries or authentication is layered on by wrapping one client in another:
//!
//! ```ignore
//! let client = ApiKey::bearer(Retrying::new(BasicClient::new(), 3), "token")?;
//! ```

mod basic;
mod client;
mod retry;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use retry::{RETRY_STATUSES, Retrying};
