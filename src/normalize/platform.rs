//! Platform reconciliation.
//!
//! Device records spell their platform a dozen ways: kernel names,
//! marketing names, agent names, or nothing at all. [`normalize_platform`]
//! maps any single spelling to a [`Platform`], and [`platform_for_device`]
//! walks a whole raw device record through the known fields in priority
//! order, falling back to hardware heuristics when no field resolves.

use crate::models::Platform;
use serde_json::Value;

const MACOS_ALIASES: [&str; 6] = ["macos", "mac", "macintosh", "darwin", "osx", "munki"];
const WINDOWS_ALIASES: [&str; 2] = ["windows", "cimian"];

/// Model substrings that identify PC hardware when no OS field resolved.
const PC_MODEL_MARKERS: [&str; 14] = [
    "dell",
    "lenovo",
    "thinkpad",
    "thinkcentre",
    "latitude",
    "optiplex",
    "precision",
    "inspiron",
    "surface",
    "hp",
    "hewlett",
    "elitebook",
    "probook",
    "pavilion",
];

/// Fields probed for a platform name, in priority order. Earlier entries
/// are written by newer agents and win over legacy fallbacks.
const PLATFORM_FIELDS: [&[&str]; 7] = [
    &["system", "operatingSystem", "name"],
    &["platform"],
    &["inventory", "platform"],
    &["clientType"],
    &["management", "agent"],
    &["osName"],
    &["os"],
];

const VENDOR_FIELDS: [&[&str]; 4] = [
    &["hardware", "manufacturer"],
    &["hardware", "vendor"],
    &["manufacturer"],
    &["vendor"],
];

const MODEL_FIELDS: [&[&str]; 3] = [&["hardware", "model"], &["model"], &["modelName"]];

/// Maps one raw platform spelling to a canonical [`Platform`].
///
/// Matching is case-insensitive: exact aliases first (including the
/// agent names munki and cimian), then a `win` prefix, then substring
/// containment as a last resort. Canonical labels map to themselves, so
/// normalizing twice changes nothing.
pub fn normalize_platform(raw: &str) -> Platform {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return Platform::Unknown;
    }
    if MACOS_ALIASES.contains(&lowered.as_str()) {
        return Platform::MacOs;
    }
    if WINDOWS_ALIASES.contains(&lowered.as_str()) || lowered.starts_with("win") {
        return Platform::Windows;
    }
    if lowered.contains("mac") || lowered.contains("darwin") {
        return Platform::MacOs;
    }
    if lowered.contains("win") {
        return Platform::Windows;
    }
    Platform::Unknown
}

/// Resolves the platform of a whole raw device record.
///
/// Probes the known platform fields in priority order and returns the
/// first that normalizes to something known. When every field is absent
/// or unrecognized, falls back to hardware identity: an Apple vendor
/// string means macOS, a known PC model line means Windows. Devices that
/// defeat both passes stay [`Platform::Unknown`] rather than guessing.
pub fn platform_for_device(device: &Value) -> Platform {
    for path in PLATFORM_FIELDS {
        if let Some(raw) = string_at(device, path) {
            let platform = normalize_platform(raw);
            if platform.is_known() {
                return platform;
            }
        }
    }

    for path in VENDOR_FIELDS {
        if let Some(vendor) = string_at(device, path) {
            if vendor.to_lowercase().contains("apple") {
                return Platform::MacOs;
            }
        }
    }

    for path in MODEL_FIELDS {
        if let Some(model) = string_at(device, path) {
            let lowered = model.to_lowercase();
            if PC_MODEL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                return Platform::Windows;
            }
            if lowered.contains("mac") {
                return Platform::MacOs;
            }
        }
    }

    Platform::Unknown
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().filter(|s| !s.trim().is_empty())
}
