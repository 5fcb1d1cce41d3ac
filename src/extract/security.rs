//! Security module extractor: firewall, encryption, and platform posture.
//!
//! Windows and macOS agents report security through entirely different
//! vocabularies. The extractor branches on which marker keys the payload
//! actually carries rather than trusting the device's platform field;
//! the two never mix, so the first family found decides.

use super::{bool_from, pick, pick_bool, pick_str, string_from};
use crate::models::{DeviceContext, SecurityInfo, SecurityPosture};
use serde_json::Value;

const FIREWALL_KEYS: &[&str] = &["firewallEnabled", "firewall", "firewallState"];
const COMMON_ENCRYPTION_KEYS: &[&str] = &["diskEncryptionEnabled", "diskEncryption", "encryptionEnabled"];

const WINDOWS_MARKERS: &[&str] = &[
    "antivirus",
    "antivirusEnabled",
    "defender",
    "bitlocker",
    "bitlockerEnabled",
    "tpm",
    "tpmPresent",
    "automaticUpdates",
];
const MACOS_MARKERS: &[&str] = &[
    "gatekeeper",
    "sip",
    "systemIntegrityProtection",
    "filevault",
    "fileVault",
    "xprotectVersion",
    "activationLock",
];

const BITLOCKER_KEYS: &[&str] = &["bitlocker", "bitlockerEnabled", "deviceEncryption"];
const FILEVAULT_KEYS: &[&str] = &["filevault", "fileVault", "filevaultEnabled"];

/// Reduces a security payload to the canonical posture record.
pub fn extract_security(ctx: &DeviceContext, payload: &Value) -> Option<SecurityInfo> {
    if !payload.is_object() {
        return None;
    }
    let mut info = SecurityInfo::for_device(ctx);
    info.firewall_enabled = flag(payload, FIREWALL_KEYS);

    if has_any(payload, WINDOWS_MARKERS) {
        info.disk_encryption_enabled =
            flag(payload, BITLOCKER_KEYS).or_else(|| flag(payload, COMMON_ENCRYPTION_KEYS));
        info.posture = Some(windows_posture(payload));
    } else if has_any(payload, MACOS_MARKERS) {
        info.disk_encryption_enabled =
            flag(payload, FILEVAULT_KEYS).or_else(|| flag(payload, COMMON_ENCRYPTION_KEYS));
        info.posture = Some(macos_posture(payload));
    } else {
        info.disk_encryption_enabled = flag(payload, COMMON_ENCRYPTION_KEYS);
    }
    Some(info)
}

fn windows_posture(payload: &Value) -> SecurityPosture {
    let antivirus = pick(payload, &["antivirus", "defender"]);
    let tpm = pick(payload, &["tpm"]);
    SecurityPosture::Windows {
        antivirus_enabled: antivirus
            .and_then(flag_value)
            .or_else(|| pick_bool(payload, &["antivirusEnabled", "defenderEnabled"])),
        antivirus_up_to_date: antivirus
            .and_then(|av| pick_bool(av, &["upToDate", "definitionsUpToDate", "current"]))
            .or_else(|| pick_bool(payload, &["antivirusUpToDate"])),
        tpm_present: tpm
            .and_then(|t| match t {
                Value::Object(_) => pick_bool(t, &["present", "isPresent", "detected"]),
                other => bool_from(other),
            })
            .or_else(|| pick_bool(payload, &["tpmPresent"])),
        tpm_enabled: tpm
            .and_then(|t| pick_bool(t, &["enabled", "activated", "ready"]))
            .or_else(|| pick_bool(payload, &["tpmEnabled"])),
        automatic_updates: pick(payload, &["automaticUpdates", "windowsUpdate", "autoUpdate"])
            .and_then(flag_value),
    }
}

fn macos_posture(payload: &Value) -> SecurityPosture {
    SecurityPosture::MacOs {
        gatekeeper: pick_str(payload, &["gatekeeper", "gatekeeperStatus"]),
        sip: pick_str(payload, &["sip", "systemIntegrityProtection", "sipStatus"]),
        filevault_state: pick_str(payload, &["filevault", "fileVault", "filevaultState"]),
        xprotect_version: pick_str(payload, &["xprotectVersion", "xprotect"]),
        activation_lock: pick_str(payload, &["activationLock", "activationLockStatus"]),
    }
}

/// Reads an on/off fact that may arrive as a scalar or as an object with
/// its own enabled field, plus the encryption state words BitLocker and
/// FileVault report.
fn flag(payload: &Value, keys: &[&str]) -> Option<bool> {
    pick(payload, keys).and_then(flag_value)
}

fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Object(_) => pick_bool(value, &["enabled", "status", "state", "protectionStatus"]),
        other => bool_from(other).or_else(|| state_word(other)),
    }
}

fn state_word(value: &Value) -> Option<bool> {
    let text = string_from(value)?.to_lowercase();
    if text.contains("not encrypt") || text.starts_with("decrypt") || text.contains("unprotected") {
        Some(false)
    } else if text.contains("encrypt") || text.contains("protected") || text.contains("blocking") {
        Some(true)
    } else {
        None
    }
}

fn has_any(payload: &Value, keys: &[&str]) -> bool {
    keys.iter()
        .any(|key| payload.get(*key).map(|v| !v.is_null()).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use serde_json::json;

    fn ctx() -> DeviceContext {
        DeviceContext {
            device_id: "D-5".to_string(),
            serial_number: None,
            device_name: None,
            platform: Platform::Unknown,
            last_seen: None,
        }
    }

    #[test]
    fn test_windows_shape() {
        let payload = json!({
            "firewallEnabled": true,
            "antivirus": {"enabled": true, "upToDate": false},
            "bitlocker": {"enabled": true},
            "tpm": {"present": true, "enabled": false},
            "automaticUpdates": "Enabled",
        });
        let info = extract_security(&ctx(), &payload).unwrap();
        assert_eq!(info.firewall_enabled, Some(true));
        assert_eq!(info.disk_encryption_enabled, Some(true));
        match info.posture.unwrap() {
            SecurityPosture::Windows {
                antivirus_enabled,
                antivirus_up_to_date,
                tpm_present,
                tpm_enabled,
                automatic_updates,
            } => {
                assert_eq!(antivirus_enabled, Some(true));
                assert_eq!(antivirus_up_to_date, Some(false));
                assert_eq!(tpm_present, Some(true));
                assert_eq!(tpm_enabled, Some(false));
                assert_eq!(automatic_updates, Some(true));
            }
            other => panic!("expected windows posture, got {:?}", other),
        }
    }

    #[test]
    fn test_macos_shape() {
        let payload = json!({
            "firewall": "Off",
            "gatekeeper": "App Store and identified developers",
            "sip": "Enabled",
            "filevault": "Encrypted",
            "xprotectVersion": "5287",
        });
        let info = extract_security(&ctx(), &payload).unwrap();
        assert_eq!(info.firewall_enabled, Some(false));
        assert_eq!(info.disk_encryption_enabled, Some(true));
        match info.posture.unwrap() {
            SecurityPosture::MacOs {
                gatekeeper,
                sip,
                filevault_state,
                xprotect_version,
                activation_lock,
            } => {
                assert_eq!(
                    gatekeeper.as_deref(),
                    Some("App Store and identified developers")
                );
                assert_eq!(sip.as_deref(), Some("Enabled"));
                assert_eq!(filevault_state.as_deref(), Some("Encrypted"));
                assert_eq!(xprotect_version.as_deref(), Some("5287"));
                assert_eq!(activation_lock, None);
            }
            other => panic!("expected macos posture, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_shape_keeps_common_fields_only() {
        let payload = json!({
            "firewallEnabled": "on",
            "diskEncryptionEnabled": true,
            "vendorSpecific": {"opaque": 1},
        });
        let info = extract_security(&ctx(), &payload).unwrap();
        assert_eq!(info.firewall_enabled, Some(true));
        assert_eq!(info.disk_encryption_enabled, Some(true));
        assert!(info.posture.is_none());
    }

    #[test]
    fn test_flat_windows_keys() {
        let payload = json!({
            "antivirusEnabled": true,
            "bitlockerEnabled": false,
            "tpmPresent": true,
        });
        let info = extract_security(&ctx(), &payload).unwrap();
        assert_eq!(info.disk_encryption_enabled, Some(false));
        match info.posture.unwrap() {
            SecurityPosture::Windows {
                antivirus_enabled,
                tpm_present,
                tpm_enabled,
                ..
            } => {
                assert_eq!(antivirus_enabled, Some(true));
                assert_eq!(tpm_present, Some(true));
                assert_eq!(tpm_enabled, None);
            }
            other => panic!("expected windows posture, got {:?}", other),
        }
    }

    #[test]
    fn test_filevault_boolean_payload() {
        let payload = json!({"fileVault": true, "sip": "Enabled"});
        let info = extract_security(&ctx(), &payload).unwrap();
        assert_eq!(info.disk_encryption_enabled, Some(true));
    }

    #[test]
    fn test_non_object_payload_is_none() {
        assert!(extract_security(&ctx(), &json!(null)).is_none());
        assert!(extract_security(&ctx(), &json!("locked down")).is_none());
    }
}
