//! Module extractors.
//!
//! One submodule per telemetry module. Each knows the field-name
//! variants the different agents use for the same fact and reduces a
//! raw payload to the canonical record, resolving every variant in a
//! fixed priority order. The helpers here are the shared vocabulary:
//! ordered key probing and lenient scalar coercion.

pub mod identity;
pub mod installs;
pub mod management;
pub mod network;
pub mod peripherals;
pub mod security;
pub mod system;

use crate::models::{DeviceContext, DeviceSummary, ModuleKind};
use crate::normalize;
use chrono::{DateTime, Utc};
use serde_json::Value;

const DEVICE_ID_KEYS: &[&str] = &["deviceId", "id", "udid", "uuid"];
const SERIAL_KEYS: &[&str] = &["serialNumber", "serial", "serialNo"];
const DEVICE_NAME_KEYS: &[&str] = &["deviceName", "name", "computerName", "hostname"];
const LAST_SEEN_KEYS: &[&str] = &[
    "lastSeen",
    "lastCheckin",
    "lastCheckIn",
    "lastReportTime",
    "collectedAt",
];
const SUMMARY_OS_VERSION_KEYS: &[&str] = &["osVersion", "systemVersion"];

/// Key variants under which each module's payload may appear in a raw
/// device record.
pub fn payload_keys(module: ModuleKind) -> &'static [&'static str] {
    match module {
        ModuleKind::System => &["system", "systemInfo", "os"],
        ModuleKind::Network => &["network", "networkInfo", "networking"],
        ModuleKind::Installs => &["installs", "managedInstalls", "installInfo"],
        ModuleKind::Identity => &["identity", "users", "accounts"],
        ModuleKind::Security => &["security", "securityInfo"],
        ModuleKind::Management => &["management", "mdm", "managementInfo"],
        ModuleKind::Peripherals => &["peripherals", "peripheralsInfo"],
    }
}

/// Locates a module's payload inside a raw device record.
///
/// The payload may already be structured, or it may be a string holding
/// JSON or serialized object text; both are parsed into place. Missing
/// keys, nulls, and empty objects all mean the module was not collected
/// and yield `None`.
pub fn module_payload(device: &Value, module: ModuleKind) -> Option<Value> {
    for key in payload_keys(module) {
        let Some(found) = device.get(*key) else {
            continue;
        };
        match found {
            Value::Null => continue,
            Value::String(text) => {
                if let Some(parsed) = payload_from_text(text) {
                    return Some(parsed);
                }
            }
            other => {
                if let Some(payload) = non_empty(other.clone()) {
                    return Some(payload);
                }
            }
        }
    }
    None
}

/// Resolves identity and provenance once per device. Devices with no
/// identifier at all cannot be keyed and return `None`.
pub fn device_context(device: &Value) -> Option<DeviceContext> {
    let device_id = pick_str(device, DEVICE_ID_KEYS)
        .or_else(|| pick_str(device, SERIAL_KEYS))
        .or_else(|| pick_str(device, DEVICE_NAME_KEYS))?;
    Some(DeviceContext {
        device_id,
        serial_number: pick_str(device, SERIAL_KEYS),
        device_name: pick_str(device, DEVICE_NAME_KEYS),
        platform: normalize::platform_for_device(device),
        last_seen: pick_instant(device, LAST_SEEN_KEYS),
    })
}

/// Builds the fleet-listing row for a device.
pub fn device_summary(device: &Value) -> Option<DeviceSummary> {
    let ctx = device_context(device)?;
    let os_version = pick_str(device, SUMMARY_OS_VERSION_KEYS).or_else(|| {
        module_payload(device, ModuleKind::System)
            .and_then(|payload| pick_str(&payload, system::VERSION_KEYS))
    });
    Some(DeviceSummary {
        device_id: ctx.device_id,
        serial_number: ctx.serial_number,
        device_name: ctx.device_name,
        platform: ctx.platform,
        os_version,
        last_seen: ctx.last_seen,
    })
}

fn payload_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        return non_empty(normalize::expand_serialized(parsed));
    }
    if normalize::looks_serialized(trimmed) {
        return non_empty(normalize::parse_serialized(trimmed));
    }
    None
}

fn non_empty(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(ref map) if map.is_empty() => None,
        other => Some(other),
    }
}

/// Returns the first present, non-null value among the key variants.
pub(crate) fn pick<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
}

/// First key variant that yields usable text. Numbers are rendered,
/// empty and whitespace-only strings are skipped.
pub(crate) fn pick_str(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(string_from)
}

pub(crate) fn pick_u64(payload: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(u64_from)
}

pub(crate) fn pick_bool(payload: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(bool_from)
}

pub(crate) fn pick_array<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(Value::as_array)
}

pub(crate) fn pick_instant(payload: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(normalize::normalize_instant)
}

/// Name for a list entry that is a bare string rather than an object.
/// Unlike [`string_from`] this never renders numbers into names.
pub(crate) fn bare_name(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn string_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn u64_from(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Lenient boolean coercion covering the spellings agents actually send:
/// JSON booleans, zero/nonzero numbers, and yes/no style text.
pub(crate) fn bool_from(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" | "enabled" | "active" => Some(true),
            "false" | "no" | "0" | "off" | "disabled" | "inactive" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionType, Platform, SecurityPosture};
    use serde_json::json;

    #[test]
    fn test_pick_str_skips_empty_variants() {
        let payload = json!({"osName": "", "name": "macOS"});
        assert_eq!(
            pick_str(&payload, &["osName", "name"]),
            Some("macOS".to_string())
        );
    }

    #[test]
    fn test_pick_str_renders_numbers() {
        let payload = json!({"version": 14.5});
        assert_eq!(pick_str(&payload, &["version"]), Some("14.5".to_string()));
    }

    #[test]
    fn test_pick_u64_from_string() {
        let payload = json!({"uptime": "86400"});
        assert_eq!(pick_u64(&payload, &["uptime"]), Some(86_400));
        let payload = json!({"uptime": 86400.9});
        assert_eq!(pick_u64(&payload, &["uptime"]), Some(86_400));
    }

    #[test]
    fn test_bool_from_spellings() {
        assert_eq!(bool_from(&json!(true)), Some(true));
        assert_eq!(bool_from(&json!(0)), Some(false));
        assert_eq!(bool_from(&json!("Enabled")), Some(true));
        assert_eq!(bool_from(&json!("off")), Some(false));
        assert_eq!(bool_from(&json!("maybe")), None);
        assert_eq!(bool_from(&json!([1])), None);
    }

    #[test]
    fn test_device_context_resolves_identity() {
        let device = json!({
            "deviceId": "D-100",
            "serialNumber": "C02ABC",
            "deviceName": "design-mbp",
            "platform": "macOS",
            "lastSeen": "2024-01-15T10:00:00Z",
        });
        let ctx = device_context(&device).unwrap();
        assert_eq!(ctx.device_id, "D-100");
        assert_eq!(ctx.serial_number.as_deref(), Some("C02ABC"));
        assert_eq!(ctx.platform, Platform::MacOs);
        assert!(ctx.last_seen.is_some());
    }

    #[test]
    fn test_device_context_falls_back_to_serial() {
        let device = json!({"serialNumber": "SN-9"});
        let ctx = device_context(&device).unwrap();
        assert_eq!(ctx.device_id, "SN-9");
    }

    #[test]
    fn test_device_without_identity_is_none() {
        assert!(device_context(&json!({"platform": "Windows"})).is_none());
        assert!(device_context(&json!({})).is_none());
    }

    #[test]
    fn test_module_payload_structured() {
        let device = json!({"network": {"hostname": "kiosk-01"}});
        let payload = module_payload(&device, ModuleKind::Network).unwrap();
        assert_eq!(payload["hostname"], "kiosk-01");
    }

    #[test]
    fn test_module_payload_absent_shapes() {
        assert!(module_payload(&json!({}), ModuleKind::System).is_none());
        assert!(module_payload(&json!({"system": null}), ModuleKind::System).is_none());
        assert!(module_payload(&json!({"system": {}}), ModuleKind::System).is_none());
    }

    #[test]
    fn test_module_payload_from_json_string() {
        let device = json!({"security": "{\"firewallEnabled\": true}"});
        let payload = module_payload(&device, ModuleKind::Security).unwrap();
        assert_eq!(payload["firewallEnabled"], true);
    }

    #[test]
    fn test_module_payload_from_serialized_text() {
        let device = json!({"management": "@{enrolled=True; provider=Jamf}"});
        let payload = module_payload(&device, ModuleKind::Management).unwrap();
        assert_eq!(payload["enrolled"], true);
        assert_eq!(payload["provider"], "Jamf");
    }

    #[test]
    fn test_module_payload_key_variants() {
        let device = json!({"managedInstalls": {"items": []}});
        assert!(module_payload(&device, ModuleKind::Installs).is_some());
    }

    #[test]
    fn test_device_summary_pulls_version_from_system_payload() {
        let device = json!({
            "deviceId": "D-1",
            "platform": "macOS",
            "system": {"osVersion": "14.5"},
        });
        let summary = device_summary(&device).unwrap();
        assert_eq!(summary.os_version.as_deref(), Some("14.5"));
    }

    #[test]
    fn test_macos_agent_payload_extracts_every_module() {
        let raw: Value =
            serde_json::from_str(include_str!("../../fixtures/macos_device.json")).unwrap();
        let device = normalize::expand_serialized(raw);

        let ctx = device_context(&device).unwrap();
        assert_eq!(ctx.device_id, "JGH5-4421");
        assert_eq!(ctx.serial_number.as_deref(), Some("C02XK1ZKJGH5"));
        assert_eq!(ctx.platform, Platform::MacOs);
        assert!(ctx.last_seen.is_some());

        let payload = module_payload(&device, ModuleKind::System).unwrap();
        let sys = system::extract_system(&ctx, &payload).unwrap();
        assert_eq!(sys.os_name.as_deref(), Some("macOS Sonoma"));
        assert_eq!(sys.os_version.as_deref(), Some("14.6.1"));
        assert_eq!(sys.build_version.as_deref(), Some("23G93"));
        assert_eq!(sys.architecture.as_deref(), Some("arm64"));
        assert_eq!(sys.uptime.as_deref(), Some("5d 0h"));

        let payload = module_payload(&device, ModuleKind::Network).unwrap();
        let net = network::extract_network(&ctx, &payload).unwrap();
        assert_eq!(net.hostname.as_deref(), Some("kareem-mbp.local"));
        assert_eq!(net.connection_type, ConnectionType::Wifi);
        assert_eq!(net.active_interface.as_deref(), Some("en0"));
        assert_eq!(net.ip_address.as_deref(), Some("10.1.40.23"));
        assert_eq!(net.ssid.as_deref(), Some("CorpNet"));
        assert_eq!(net.interface_count, 3);

        let payload = module_payload(&device, ModuleKind::Installs).unwrap();
        let installs = installs::extract_installs(&ctx, &payload).unwrap();
        assert_eq!(installs.managed_client.as_deref(), Some("munki"));
        assert_eq!(installs.total_packages, 3);
        assert_eq!(installs.installed_count, 1);
        assert_eq!(installs.pending_count, 1);
        assert_eq!(installs.failed_count, 1);
        assert_eq!(installs.warnings.len(), 1);
        assert_eq!(installs.recent_sessions[0].duration.as_deref(), Some("3m"));

        let payload = module_payload(&device, ModuleKind::Identity).unwrap();
        let identity = identity::extract_identity(&ctx, &payload).unwrap();
        assert_eq!(identity.total_users, 2);
        assert_eq!(identity.admin_count, 2);
        assert_eq!(identity.disabled_count, 1);
        assert_eq!(identity.logged_in_count, 1);
        assert_eq!(identity.secure_token_count, Some(1));
        assert_eq!(identity.failed_login_count, None);
        assert_eq!(identity.directory_bound, Some(false));

        let payload = module_payload(&device, ModuleKind::Security).unwrap();
        let security = security::extract_security(&ctx, &payload).unwrap();
        assert_eq!(security.firewall_enabled, Some(true));
        assert_eq!(security.disk_encryption_enabled, Some(true));
        match security.posture.unwrap() {
            SecurityPosture::MacOs { sip, gatekeeper, .. } => {
                assert_eq!(sip.as_deref(), Some("Enabled"));
                assert!(gatekeeper.is_some());
            }
            other => panic!("expected macos posture, got {:?}", other),
        }

        let payload = module_payload(&device, ModuleKind::Management).unwrap();
        let mgmt = management::extract_management(&ctx, &payload).unwrap();
        assert_eq!(mgmt.enrolled, Some(true));
        assert_eq!(mgmt.provider.as_deref(), Some("Jamf Pro"));
        assert_eq!(mgmt.user_approved, Some(true));
        assert_eq!(mgmt.profile_count, Some(6));

        let payload = module_payload(&device, ModuleKind::Peripherals).unwrap();
        let periph = peripherals::extract_peripherals(&ctx, &payload).unwrap();
        assert_eq!(periph.display_count, 2);
        assert_eq!(periph.displays[0].resolution.as_deref(), Some("3024x1964"));
        assert_eq!(periph.usb_count, 1);
        assert_eq!(periph.printer_count, 1);
    }

    #[test]
    fn test_windows_serialized_payload_extracts_every_module() {
        let raw: Value =
            serde_json::from_str(include_str!("../../fixtures/windows_device.json")).unwrap();
        let device = normalize::expand_serialized(raw);
        assert!(device["system"].is_object());

        let ctx = device_context(&device).unwrap();
        assert_eq!(ctx.device_id, "WKS-0443");
        assert_eq!(ctx.serial_number.as_deref(), Some("5CG3241XYZ"));
        assert_eq!(ctx.device_name.as_deref(), Some("WKS-0443"));
        assert_eq!(ctx.platform, Platform::Windows);

        let summary = device_summary(&device).unwrap();
        assert_eq!(summary.os_version.as_deref(), Some("23H2"));

        let payload = module_payload(&device, ModuleKind::System).unwrap();
        let sys = system::extract_system(&ctx, &payload).unwrap();
        assert_eq!(
            sys.os_name.as_deref(),
            Some("Microsoft Windows 11 Enterprise")
        );
        assert_eq!(sys.os_version.as_deref(), Some("23H2"));
        assert_eq!(sys.build_version.as_deref(), Some("22631"));
        assert_eq!(sys.architecture.as_deref(), Some("64-bit"));
        assert_eq!(sys.uptime.as_deref(), Some("1d 2h"));
        assert!(sys.last_boot_time.is_some());

        let payload = module_payload(&device, ModuleKind::Network).unwrap();
        let net = network::extract_network(&ctx, &payload).unwrap();
        assert_eq!(net.interface_count, 0);
        assert_eq!(net.hostname.as_deref(), Some("WKS-0443.corp.example.com"));
        assert_eq!(net.ip_address.as_deref(), Some("10.2.17.88"));
        assert_eq!(net.mac_address.as_deref(), Some("8C-16-45-2A-9D-33"));
        assert_eq!(net.connection_type, ConnectionType::Other);

        let payload = module_payload(&device, ModuleKind::Security).unwrap();
        let security = security::extract_security(&ctx, &payload).unwrap();
        assert_eq!(security.firewall_enabled, Some(true));
        assert_eq!(security.disk_encryption_enabled, Some(true));
        match security.posture.unwrap() {
            SecurityPosture::Windows {
                antivirus_enabled,
                antivirus_up_to_date,
                tpm_present,
                tpm_enabled,
                automatic_updates,
            } => {
                assert_eq!(antivirus_enabled, Some(true));
                assert_eq!(antivirus_up_to_date, Some(true));
                assert_eq!(tpm_present, Some(true));
                assert_eq!(tpm_enabled, Some(true));
                assert_eq!(automatic_updates, Some(false));
            }
            other => panic!("expected windows posture, got {:?}", other),
        }

        let payload = module_payload(&device, ModuleKind::Management).unwrap();
        let mgmt = management::extract_management(&ctx, &payload).unwrap();
        assert_eq!(mgmt.enrolled, Some(true));
        assert_eq!(mgmt.provider.as_deref(), Some("Microsoft Intune"));
        assert_eq!(mgmt.enrollment_type.as_deref(), Some("Entra joined"));
        assert!(mgmt.last_check_in.is_some());
        assert_eq!(mgmt.profile_count, None);

        let payload = module_payload(&device, ModuleKind::Installs).unwrap();
        let installs = installs::extract_installs(&ctx, &payload).unwrap();
        assert_eq!(installs.managed_client.as_deref(), Some("cimian"));
        assert_eq!(installs.installed_count, 2);
        assert_eq!(installs.pending_count, 1);
        assert_eq!(installs.failed_count, 0);
        assert_eq!(installs.errors.len(), 1);
        assert_eq!(installs.last_run, installs.recent_sessions[0].started_at);

        let payload = module_payload(&device, ModuleKind::Identity).unwrap();
        let identity = identity::extract_identity(&ctx, &payload).unwrap();
        assert_eq!(identity.total_users, 2);
        assert_eq!(identity.logged_in_count, 1);
        assert_eq!(identity.failed_login_count, Some(2));
        assert_eq!(identity.secure_token_count, None);
        assert_eq!(identity.directory_bound, Some(true));

        assert!(module_payload(&device, ModuleKind::Peripherals).is_none());
    }
}
