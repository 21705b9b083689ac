mod client;

pub use client::DatabusClient;
