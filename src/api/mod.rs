//! Fleet REST API access.

pub mod client;

pub use client::{ApiError, ClientOptions, FleetClient};
