//! Fleet-wide aggregation.
//!
//! Fans per-device fetches out over a bounded number of concurrent
//! requests and folds the results into per-module outcomes. One broken
//! device becomes one failure entry, never a failed export.

pub mod fanout;

pub use fanout::{device_summaries, Aggregator, AggregatorOptions, DeviceSource, FleetDevice};
