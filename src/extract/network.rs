//! Network module extractor: the active interface and its addressing.

use super::{pick_array, pick_str};
use crate::models::{ConnectionType, DeviceContext, NetworkInfo};
use serde_json::Value;
use std::net::Ipv4Addr;

const HOSTNAME_KEYS: &[&str] = &["hostname", "hostName", "computerName", "localHostname"];
const INTERFACE_LIST_KEYS: &[&str] = &["interfaces", "networkInterfaces", "adapters"];
const NAME_KEYS: &[&str] = &["name", "interface", "device", "adapterName"];
const TYPE_KEYS: &[&str] = &["type", "interfaceType", "kind", "hardware"];
const STATUS_KEYS: &[&str] = &["status", "state", "isActive", "active", "connected"];
const IP_KEYS: &[&str] = &["ipAddress", "ipv4", "ip", "ipv4Address", "address"];
const MAC_KEYS: &[&str] = &["macAddress", "mac", "hardwareAddress", "physicalAddress"];
const SSID_KEYS: &[&str] = &["ssid", "wirelessNetwork", "currentNetwork"];

/// Reduces a network payload to the canonical connectivity record.
///
/// The active interface is the first one whose status flag reads as
/// connected; when no interface says so, the first one holding an IP
/// address stands in. Addressing fields prefer the active interface and
/// fall back to the payload root for agents that report flat.
pub fn extract_network(ctx: &DeviceContext, payload: &Value) -> Option<NetworkInfo> {
    if !payload.is_object() {
        return None;
    }
    let mut info = NetworkInfo::for_device(ctx);
    info.hostname = pick_str(payload, HOSTNAME_KEYS);

    let interfaces = pick_array(payload, INTERFACE_LIST_KEYS);
    if let Some(list) = interfaces {
        info.interface_count = list.len();
    }
    let active = interfaces.and_then(|list| {
        list.iter()
            .find(|iface| is_active(iface))
            .or_else(|| list.iter().find(|iface| pick_str(iface, IP_KEYS).is_some()))
    });

    info.active_interface = active.and_then(|iface| pick_str(iface, NAME_KEYS));
    info.ip_address = active
        .and_then(|iface| pick_str(iface, IP_KEYS))
        .or_else(|| pick_str(payload, IP_KEYS))
        .as_deref()
        .and_then(first_ipv4);
    info.mac_address = active
        .and_then(|iface| pick_str(iface, MAC_KEYS))
        .or_else(|| pick_str(payload, MAC_KEYS));
    info.ssid = active
        .and_then(|iface| pick_str(iface, SSID_KEYS))
        .or_else(|| pick_str(payload, SSID_KEYS));

    let type_text = active
        .and_then(|iface| pick_str(iface, TYPE_KEYS))
        .or_else(|| pick_str(payload, TYPE_KEYS))
        .or_else(|| info.active_interface.clone());
    info.connection_type = type_text
        .as_deref()
        .map(ConnectionType::from)
        .unwrap_or_default();
    if info.connection_type == ConnectionType::Other && info.ssid.is_some() {
        // An SSID only exists on a wireless link.
        info.connection_type = ConnectionType::Wifi;
    }

    Some(info)
}

/// The first status-flavored key present decides; agents disagree on
/// both the key and whether the value is a flag or a word.
fn is_active(iface: &Value) -> bool {
    for key in STATUS_KEYS {
        if let Some(value) = iface.get(*key) {
            return match value {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                Value::String(s) => matches!(
                    s.trim().to_lowercase().as_str(),
                    "active" | "connected" | "up" | "true" | "yes" | "1"
                ),
                _ => false,
            };
        }
    }
    false
}

/// Picks the first valid IPv4 address out of a possibly multi-valued
/// field. Agents concatenate every address of an interface, IPv6 and
/// link-local included, into one delimited string.
pub(crate) fn first_ipv4(raw: &str) -> Option<String> {
    raw.split([',', ';'])
        .flat_map(str::split_whitespace)
        .find(|candidate| candidate.parse::<Ipv4Addr>().is_ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use serde_json::json;

    fn ctx() -> DeviceContext {
        DeviceContext {
            device_id: "D-2".to_string(),
            serial_number: None,
            device_name: None,
            platform: Platform::Windows,
            last_seen: None,
        }
    }

    #[test]
    fn test_active_interface_wins() {
        let payload = json!({
            "hostname": "kiosk-7",
            "interfaces": [
                {"name": "Ethernet 2", "status": "Disconnected", "ipAddress": ""},
                {"name": "Wi-Fi", "status": "Up", "type": "IEEE 802.11",
                 "ipAddress": "10.20.0.31", "macAddress": "AA:BB:CC:00:11:22",
                 "ssid": "CorpNet"},
            ],
        });
        let info = extract_network(&ctx(), &payload).unwrap();
        assert_eq!(info.hostname.as_deref(), Some("kiosk-7"));
        assert_eq!(info.active_interface.as_deref(), Some("Wi-Fi"));
        assert_eq!(info.connection_type, ConnectionType::Wifi);
        assert_eq!(info.ip_address.as_deref(), Some("10.20.0.31"));
        assert_eq!(info.mac_address.as_deref(), Some("AA:BB:CC:00:11:22"));
        assert_eq!(info.ssid.as_deref(), Some("CorpNet"));
        assert_eq!(info.interface_count, 2);
    }

    #[test]
    fn test_no_status_falls_back_to_first_with_ip() {
        let payload = json!({
            "interfaces": [
                {"name": "bridge0"},
                {"name": "en0", "ip": "192.168.4.9"},
            ],
        });
        let info = extract_network(&ctx(), &payload).unwrap();
        assert_eq!(info.active_interface.as_deref(), Some("en0"));
        assert_eq!(info.ip_address.as_deref(), Some("192.168.4.9"));
    }

    #[test]
    fn test_flat_payload_without_interface_list() {
        let payload = json!({
            "hostname": "lab-pc",
            "ipAddress": "172.16.8.4",
            "macAddress": "00:11:22:33:44:55",
            "type": "Ethernet",
        });
        let info = extract_network(&ctx(), &payload).unwrap();
        assert_eq!(info.interface_count, 0);
        assert_eq!(info.active_interface, None);
        assert_eq!(info.ip_address.as_deref(), Some("172.16.8.4"));
        assert_eq!(info.connection_type, ConnectionType::Ethernet);
    }

    #[test]
    fn test_first_ipv4_skips_ipv6_and_garbage() {
        assert_eq!(
            first_ipv4("fe80::1c2a, 10.0.0.5, 192.168.1.20"),
            Some("10.0.0.5".to_string())
        );
        assert_eq!(first_ipv4("fe80::1c2a"), None);
        assert_eq!(first_ipv4("300.1.2.3; 10.1.2.3"), Some("10.1.2.3".to_string()));
        assert_eq!(first_ipv4(""), None);
        assert_eq!(first_ipv4("not an address"), None);
    }

    #[test]
    fn test_ssid_implies_wifi() {
        let payload = json!({"ssid": "HomeNet", "ipAddress": "192.168.0.7"});
        let info = extract_network(&ctx(), &payload).unwrap();
        assert_eq!(info.connection_type, ConnectionType::Wifi);
    }

    #[test]
    fn test_boolean_and_numeric_status_flags() {
        let payload = json!({
            "interfaces": [
                {"name": "eth0", "isActive": 0},
                {"name": "wlan0", "isActive": 1, "ipv4": "10.9.8.7"},
            ],
        });
        let info = extract_network(&ctx(), &payload).unwrap();
        assert_eq!(info.active_interface.as_deref(), Some("wlan0"));
    }

    #[test]
    fn test_absent_payload_shapes() {
        assert!(extract_network(&ctx(), &json!(null)).is_none());
        assert!(extract_network(&ctx(), &json!("text")).is_none());
    }
}
