//! Peripherals module extractor: displays, USB devices, and printers.

use super::{bare_name, pick, pick_bool, pick_str, string_from, u64_from};
use crate::models::{DeviceContext, DisplayDevice, PeripheralsInfo, PrinterDevice, UsbDevice};
use serde_json::Value;

const DISPLAY_LIST_KEYS: &[&str] = &["displays", "monitors", "screens"];
const USB_LIST_KEYS: &[&str] = &["usbDevices", "usb", "usbPeripherals"];
const PRINTER_LIST_KEYS: &[&str] = &["printers", "printQueues"];

const NAME_KEYS: &[&str] = &["name", "displayName", "productName", "model"];
const RESOLUTION_KEYS: &[&str] = &["resolution", "nativeResolution", "currentResolution"];
const INTERNAL_KEYS: &[&str] = &["internal", "isInternal", "builtIn"];
const VENDOR_KEYS: &[&str] = &["vendor", "manufacturer", "vendorName"];
const SERIAL_KEYS: &[&str] = &["serialNumber", "serial"];
const PRINTER_MODEL_KEYS: &[&str] = &["model", "driver", "makeAndModel"];
const DEFAULT_KEYS: &[&str] = &["isDefault", "default", "isDefaultPrinter"];

/// Reduces a peripherals payload to the canonical attached-hardware
/// record. List entries may be objects or bare name strings.
pub fn extract_peripherals(ctx: &DeviceContext, payload: &Value) -> Option<PeripheralsInfo> {
    if !payload.is_object() {
        return None;
    }
    let mut info = PeripheralsInfo::for_device(ctx);
    info.displays = entries(payload, DISPLAY_LIST_KEYS, display_device);
    info.usb_devices = entries(payload, USB_LIST_KEYS, usb_device);
    info.printers = entries(payload, PRINTER_LIST_KEYS, printer_device);
    info.display_count = info.displays.len();
    info.usb_count = info.usb_devices.len();
    info.printer_count = info.printers.len();
    Some(info)
}

fn entries<T>(payload: &Value, keys: &[&str], build: fn(&Value) -> Option<T>) -> Vec<T> {
    match pick(payload, keys) {
        Some(Value::Array(list)) => list.iter().filter_map(build).collect(),
        _ => Vec::new(),
    }
}

fn display_device(value: &Value) -> Option<DisplayDevice> {
    let name = pick_str(value, NAME_KEYS).or_else(|| bare_name(value))?;
    Some(DisplayDevice {
        name,
        resolution: resolution_text(value),
        internal: pick_bool(value, INTERNAL_KEYS),
    })
}

/// Resolution may be a rendered string or a width/height object.
fn resolution_text(value: &Value) -> Option<String> {
    let raw = pick(value, RESOLUTION_KEYS)?;
    if let Some(text) = string_from(raw) {
        return Some(text);
    }
    let width = raw.get("width").and_then(u64_from)?;
    let height = raw.get("height").and_then(u64_from)?;
    Some(format!("{}x{}", width, height))
}

fn usb_device(value: &Value) -> Option<UsbDevice> {
    let name = pick_str(value, NAME_KEYS).or_else(|| bare_name(value))?;
    Some(UsbDevice {
        name,
        vendor: pick_str(value, VENDOR_KEYS),
        serial_number: pick_str(value, SERIAL_KEYS),
    })
}

fn printer_device(value: &Value) -> Option<PrinterDevice> {
    let name = pick_str(value, NAME_KEYS).or_else(|| bare_name(value))?;
    Some(PrinterDevice {
        name,
        model: pick_str(value, PRINTER_MODEL_KEYS),
        is_default: pick_bool(value, DEFAULT_KEYS),
    })
}
