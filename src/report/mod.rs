//! Report output.
//!
//! Renders an aggregated fleet report as pretty-printed JSON or as a
//! human-readable Markdown summary.

pub mod generator;

pub use generator::*;
