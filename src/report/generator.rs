//! Markdown and JSON report generation.
//!
//! The JSON report is the full canonical export. The Markdown report is
//! a human-readable summary: fleet composition, per-module record
//! counts, and the devices that failed.

use crate::models::{
    AggregationOutcome, DeviceFailure, DeviceSummary, FleetReport, ModuleCollections, ModuleKind,
    ReportMetadata,
};
use anyhow::Result;
use std::collections::HashMap;

/// Generate the full Markdown summary.
pub fn generate_markdown_report(report: &FleetReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Fleetscope Report\n\n");

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Fleet composition
    output.push_str(&generate_fleet_section(&report.devices));

    // Per-module outcomes
    output.push_str(&generate_modules_section(&report.modules));

    // Devices that failed
    output.push_str(&generate_failures_section(&report.modules));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Fleet API:** {}\n", metadata.api_url));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Devices:** {}\n", metadata.device_count));
    section.push_str(&format!(
        "- **Modules Exported:** {}\n",
        metadata.modules_exported
    ));
    section.push_str(&format!("- **Total Records:** {}\n", metadata.total_records));
    if metadata.total_failures > 0 {
        section.push_str(&format!(
            "- **Total Failures:** {}\n",
            metadata.total_failures
        ));
    }
    section.push_str(&format!(
        "- **Export Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push_str("\n");

    section
}

/// Generate the fleet composition section.
fn generate_fleet_section(devices: &[DeviceSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Fleet\n\n");

    if devices.is_empty() {
        section.push_str("No devices were found in the fleet listing.\n\n");
        return section;
    }

    // Platform breakdown
    let mut by_platform: HashMap<&str, usize> = HashMap::new();
    for device in devices {
        *by_platform.entry(device.platform.as_str()).or_insert(0) += 1;
    }

    section.push_str("### Devices by Platform\n\n");
    section.push_str("| Platform | Devices |\n");
    section.push_str("|:---|:---:|\n");

    let mut platforms: Vec<_> = by_platform.iter().collect();
    platforms.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

    for (platform, count) in platforms {
        section.push_str(&format!("| {} | {} |\n", platform, count));
    }
    section.push_str("\n");

    // Device inventory
    section.push_str("### Devices\n\n");
    section.push_str("| Device | Serial | Name | Platform | OS Version | Last Seen |\n");
    section.push_str("|:---|:---|:---|:---|:---|:---|\n");

    for device in devices {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} |\n",
            device.device_id,
            cell(&device.serial_number),
            cell(&device.device_name),
            device.platform,
            cell(&device.os_version),
            last_seen_cell(device),
        ));
    }
    section.push_str("\n");

    section
}

/// Generate the per-module outcome table.
fn generate_modules_section(modules: &ModuleCollections) -> String {
    let mut section = String::new();

    section.push_str("## Modules\n\n");

    let rows = module_rows(modules);
    if rows.is_empty() {
        section.push_str("No modules were exported.\n\n");
        return section;
    }

    section.push_str("| Module | Records | Failures |\n");
    section.push_str("|:---|:---:|:---:|\n");

    for (module, records, failures) in rows {
        section.push_str(&format!("| {} | {} | {} |\n", module, records, failures));
    }
    section.push_str("\n");

    section
}

/// Generate the failures section. Omitted entirely when every device
/// exported cleanly.
fn generate_failures_section(modules: &ModuleCollections) -> String {
    let failures = module_failures(modules);
    if failures.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Failures\n\n");

    for (module, device_failures) in failures {
        section.push_str(&format!("### {}\n\n", module));
        section.push_str("| Device | Reason |\n");
        section.push_str("|:---|:---|\n");

        for failure in device_failures {
            section.push_str(&format!(
                "| `{}` | {} |\n",
                failure.device_id, failure.reason
            ));
        }
        section.push_str("\n");
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by fleetscope*\n");

    footer
}

fn cell(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn last_seen_cell(device: &DeviceSummary) -> String {
    match device.last_seen {
        Some(instant) => instant.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// One summary row per exported module.
fn module_rows(modules: &ModuleCollections) -> Vec<(ModuleKind, usize, usize)> {
    let mut rows = Vec::new();
    rows.extend(slot_row(ModuleKind::System, &modules.system));
    rows.extend(slot_row(ModuleKind::Network, &modules.network));
    rows.extend(slot_row(ModuleKind::Installs, &modules.installs));
    rows.extend(slot_row(ModuleKind::Identity, &modules.identity));
    rows.extend(slot_row(ModuleKind::Security, &modules.security));
    rows.extend(slot_row(ModuleKind::Management, &modules.management));
    rows.extend(slot_row(ModuleKind::Peripherals, &modules.peripherals));
    rows
}

fn slot_row<T>(
    module: ModuleKind,
    slot: &Option<AggregationOutcome<T>>,
) -> Option<(ModuleKind, usize, usize)> {
    slot.as_ref()
        .map(|outcome| (module, outcome.record_count(), outcome.failure_count()))
}

/// The failure lists of every module that has any.
fn module_failures(modules: &ModuleCollections) -> Vec<(ModuleKind, &[DeviceFailure])> {
    let mut rows = Vec::new();
    rows.extend(slot_failures(ModuleKind::System, &modules.system));
    rows.extend(slot_failures(ModuleKind::Network, &modules.network));
    rows.extend(slot_failures(ModuleKind::Installs, &modules.installs));
    rows.extend(slot_failures(ModuleKind::Identity, &modules.identity));
    rows.extend(slot_failures(ModuleKind::Security, &modules.security));
    rows.extend(slot_failures(ModuleKind::Management, &modules.management));
    rows.extend(slot_failures(ModuleKind::Peripherals, &modules.peripherals));
    rows
}

fn slot_failures<T>(
    module: ModuleKind,
    slot: &Option<AggregationOutcome<T>>,
) -> Option<(ModuleKind, &[DeviceFailure])> {
    slot.as_ref()
        .filter(|outcome| !outcome.failures.is_empty())
        .map(|outcome| (module, outcome.failures.as_slice()))
}

/// Generate a JSON report.
pub fn generate_json_report(report: &FleetReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
