//! System module extractor: OS identity, build, and uptime.

use super::{pick, pick_instant, pick_str, pick_u64};
use crate::models::{DeviceContext, SystemInfo};
use crate::normalize::format_duration;
use serde_json::Value;

/// Some agents nest OS identity under a child object, others inline it.
const OS_OBJECT_KEYS: &[&str] = &["operatingSystem", "os"];

const NAME_KEYS: &[&str] = &["osName", "name", "productName", "caption", "os"];
pub(crate) const VERSION_KEYS: &[&str] = &["osVersion", "version", "productVersion", "displayVersion"];
const BUILD_KEYS: &[&str] = &["buildVersion", "build", "buildNumber"];
const ARCH_KEYS: &[&str] = &["architecture", "arch", "osArchitecture", "cpuArchitecture"];
const UPTIME_KEYS: &[&str] = &["uptimeSeconds", "uptime", "uptimeSec"];
const BOOT_TIME_KEYS: &[&str] = &["lastBootTime", "bootTime", "lastBoot", "lastBootUpTime"];

/// Reduces a system payload to the canonical OS record.
pub fn extract_system(ctx: &DeviceContext, payload: &Value) -> Option<SystemInfo> {
    if !payload.is_object() {
        return None;
    }
    let mut info = SystemInfo::for_device(ctx);

    let os = pick(payload, OS_OBJECT_KEYS)
        .filter(|value| value.is_object())
        .unwrap_or(payload);
    info.os_name = pick_str(os, NAME_KEYS).or_else(|| pick_str(payload, NAME_KEYS));
    info.os_version = pick_str(os, VERSION_KEYS).or_else(|| pick_str(payload, VERSION_KEYS));
    info.build_version = pick_str(os, BUILD_KEYS).or_else(|| pick_str(payload, BUILD_KEYS));
    info.architecture = pick_str(os, ARCH_KEYS).or_else(|| pick_str(payload, ARCH_KEYS));

    info.uptime_seconds = pick_u64(payload, UPTIME_KEYS);
    info.uptime = info
        .uptime_seconds
        .map(format_duration)
        .or_else(|| pick_str(payload, &["uptime"]));
    info.last_boot_time = pick_instant(payload, BOOT_TIME_KEYS);

    Some(info)
}
