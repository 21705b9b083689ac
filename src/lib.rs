//! GTFS feed loading, validation and processing.

pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod filter;
pub mod output;
pub mod processor;
pub mod stats;
pub mod validation;

pub use error::{DatabusError, Result};
pub use processor::GtfsProcessor;
pub use validation::{ValidationReport, Validator};
