//! Normalization passes applied to raw device payloads.
//!
//! Raw telemetry arrives with three recurring problems: values rendered
//! as serialized object text instead of structured data, timestamps in
//! half a dozen formats, and platform names spelled differently by every
//! agent version. Each submodule fixes one of them.

pub mod platform;
pub mod serialized;
pub mod timestamp;

pub use platform::{normalize_platform, platform_for_device};
pub use serialized::{expand_serialized, looks_serialized, parse_serialized};
pub use timestamp::{format_duration, normalize_instant, parse_instant};
