//! Concurrent aggregation across the device fleet.
//!
//! The aggregator resolves the fleet listing once, then collects one
//! module at a time. For each module it first tries the server's bulk
//! listing, then the device's own listing row; only devices covered by
//! neither are fetched individually, fanned out over a bounded worker
//! pool. Every outcome is tracked per device, so a device that errors or
//! reports garbage shows up in the failure list while the rest of the
//! fleet exports normally.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiError, FleetClient};
use crate::extract;
use crate::models::{
    AggregationOutcome, DeviceContext, DeviceFailure, DeviceSummary, ModuleCollections, ModuleKind,
};
use crate::normalize::expand_serialized;

/// Where device records come from. The HTTP client implements this; tests
/// substitute canned fleets.
#[allow(async_fn_in_trait)]
pub trait DeviceSource {
    async fn list_devices(&self) -> Result<Vec<Value>, ApiError>;
    async fn device_detail(&self, device_id: &str) -> Result<Value, ApiError>;
    async fn module_listing(&self, module: ModuleKind) -> Result<Option<Vec<Value>>, ApiError>;
}

impl DeviceSource for FleetClient {
    async fn list_devices(&self) -> Result<Vec<Value>, ApiError> {
        FleetClient::list_devices(self).await
    }

    async fn device_detail(&self, device_id: &str) -> Result<Value, ApiError> {
        FleetClient::device_detail(self, device_id).await
    }

    async fn module_listing(&self, module: ModuleKind) -> Result<Option<Vec<Value>>, ApiError> {
        FleetClient::module_listing(self, module).await
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Maximum in-flight device fetches per module.
    pub concurrency: usize,
    pub show_progress: bool,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            show_progress: false,
        }
    }
}

/// One enrolled device: its resolved identity plus the raw listing row it
/// came from.
#[derive(Debug, Clone)]
pub struct FleetDevice {
    pub context: DeviceContext,
    pub listing: Value,
}

pub struct Aggregator<S> {
    source: S,
    options: AggregatorOptions,
}

impl<S: DeviceSource> Aggregator<S> {
    pub fn new(source: S, options: AggregatorOptions) -> Self {
        Self { source, options }
    }

    /// Resolves the fleet listing into identified devices, sorted by
    /// device id. Rows without any identity are skipped; duplicate rows
    /// for the same device keep whichever reported in most recently.
    pub async fn fleet(&self) -> Result<Vec<FleetDevice>, ApiError> {
        let rows = self.source.list_devices().await?;
        info!("Fleet listing returned {} rows", rows.len());

        let mut by_id: HashMap<String, FleetDevice> = HashMap::new();
        for row in rows {
            let row = expand_serialized(row);
            let Some(context) = extract::device_context(&row) else {
                warn!("Skipping device row without any identity field");
                continue;
            };
            let device = FleetDevice {
                context,
                listing: row,
            };
            match by_id.entry(device.context.device_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(device);
                }
                Entry::Occupied(mut slot) => {
                    debug!(
                        device_id = %device.context.device_id,
                        "Duplicate listing row, keeping the most recent"
                    );
                    if device.context.last_seen > slot.get().context.last_seen {
                        slot.insert(device);
                    }
                }
            }
        }

        let mut devices: Vec<FleetDevice> = by_id.into_values().collect();
        devices.sort_by(|a, b| a.context.device_id.cmp(&b.context.device_id));
        Ok(devices)
    }

    /// Aggregates one module and stores the outcome in the matching
    /// collection slot.
    pub async fn collect_into(
        &self,
        devices: &[FleetDevice],
        module: ModuleKind,
        collections: &mut ModuleCollections,
    ) {
        match module {
            ModuleKind::System => {
                collections.system = Some(
                    self.collect(devices, module, extract::system::extract_system)
                        .await,
                );
            }
            ModuleKind::Network => {
                collections.network = Some(
                    self.collect(devices, module, extract::network::extract_network)
                        .await,
                );
            }
            ModuleKind::Installs => {
                collections.installs = Some(
                    self.collect(devices, module, extract::installs::extract_installs)
                        .await,
                );
            }
            ModuleKind::Identity => {
                collections.identity = Some(
                    self.collect(devices, module, extract::identity::extract_identity)
                        .await,
                );
            }
            ModuleKind::Security => {
                collections.security = Some(
                    self.collect(devices, module, extract::security::extract_security)
                        .await,
                );
            }
            ModuleKind::Management => {
                collections.management = Some(
                    self.collect(devices, module, extract::management::extract_management)
                        .await,
                );
            }
            ModuleKind::Peripherals => {
                collections.peripherals = Some(
                    self.collect(devices, module, extract::peripherals::extract_peripherals)
                        .await,
                );
            }
        }
    }

    /// Collects one module across the fleet.
    pub async fn collect<T>(
        &self,
        devices: &[FleetDevice],
        module: ModuleKind,
        extract: fn(&DeviceContext, &Value) -> Option<T>,
    ) -> AggregationOutcome<T> {
        if devices.is_empty() {
            return AggregationOutcome::default();
        }

        let progress = self.progress_bar(devices.len());
        let bulk = self.bulk_payloads(devices, module).await;

        let mut outcomes: Vec<(DeviceContext, Result<Option<T>, ApiError>)> = Vec::new();
        let mut pending: Vec<&FleetDevice> = Vec::new();

        for device in devices {
            // A bulk row wins, then a payload already nested in the
            // listing row; only devices with neither need a detail fetch.
            let local = bulk
                .get(&device.context.device_id)
                .cloned()
                .or_else(|| extract::module_payload(&device.listing, module));
            match local {
                Some(payload) => {
                    outcomes.push((device.context.clone(), Ok(extract(&device.context, &payload))));
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                }
                None => pending.push(device),
            }
        }

        let fetched: Vec<(DeviceContext, Result<Option<T>, ApiError>)> = stream::iter(pending)
            .map(|device| {
                let progress = progress.clone();
                async move {
                    let outcome = self.fetch_record(device, module, extract).await;
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    outcome
                }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;
        outcomes.extend(fetched);

        if let Some(pb) = progress {
            pb.finish_with_message(format!("{} module complete", module));
        }

        outcomes.sort_by(|a, b| a.0.device_id.cmp(&b.0.device_id));

        let mut outcome = AggregationOutcome::default();
        for (ctx, result) in outcomes {
            match result {
                Ok(Some(record)) => outcome.records.push(record),
                Ok(None) => {
                    debug!(device_id = %ctx.device_id, module = %module, "No module data");
                }
                Err(err) => {
                    warn!(device_id = %ctx.device_id, module = %module, "Device failed: {}", err);
                    outcome.failures.push(DeviceFailure {
                        device_id: ctx.device_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            module = %module,
            "Aggregated {} records and {} failures across {} devices",
            outcome.record_count(),
            outcome.failure_count(),
            devices.len()
        );
        outcome
    }

    /// Fetches one device's detail record and extracts the module payload
    /// from it.
    async fn fetch_record<T>(
        &self,
        device: &FleetDevice,
        module: ModuleKind,
        extract: fn(&DeviceContext, &Value) -> Option<T>,
    ) -> (DeviceContext, Result<Option<T>, ApiError>) {
        match self.source.device_detail(&device.context.device_id).await {
            Ok(detail) => {
                let detail = expand_serialized(detail);
                let ctx = merged_context(&device.context, &detail);
                let record = extract::module_payload(&detail, module)
                    .and_then(|payload| extract(&ctx, &payload));
                (ctx, Ok(record))
            }
            Err(err) => (device.context.clone(), Err(err)),
        }
    }

    /// Fetches the bulk listing for a module and keys its payloads by
    /// device id. An empty map means every device needs a detail fetch,
    /// either because the server has no bulk endpoint or because it
    /// failed.
    async fn bulk_payloads(
        &self,
        devices: &[FleetDevice],
        module: ModuleKind,
    ) -> HashMap<String, Value> {
        let rows = match self.source.module_listing(module).await {
            Ok(Some(rows)) => rows,
            Ok(None) => return HashMap::new(),
            Err(err) => {
                warn!(
                    module = %module,
                    "Bulk listing failed, falling back to per-device fetches: {}", err
                );
                return HashMap::new();
            }
        };
        info!(module = %module, "Using bulk listing ({} rows)", rows.len());

        let known: HashSet<&str> = devices
            .iter()
            .map(|d| d.context.device_id.as_str())
            .collect();
        let mut by_serial: HashMap<&str, &str> = HashMap::new();
        for device in devices {
            if let Some(serial) = &device.context.serial_number {
                by_serial.insert(serial.as_str(), device.context.device_id.as_str());
            }
        }

        let mut latest: HashMap<String, (Option<DateTime<Utc>>, Value)> = HashMap::new();
        for row in rows {
            let row = expand_serialized(row);
            let Some(row_ctx) = extract::device_context(&row) else {
                debug!(module = %module, "Skipping bulk row without device identity");
                continue;
            };
            let device_id = if known.contains(row_ctx.device_id.as_str()) {
                row_ctx.device_id.clone()
            } else if let Some(id) = row_ctx
                .serial_number
                .as_deref()
                .and_then(|serial| by_serial.get(serial))
                .or_else(|| by_serial.get(row_ctx.device_id.as_str()))
            {
                (*id).to_string()
            } else {
                debug!(
                    device_id = %row_ctx.device_id,
                    module = %module,
                    "Bulk row does not match any listed device"
                );
                continue;
            };

            let payload = extract::module_payload(&row, module).unwrap_or(row);
            match latest.entry(device_id) {
                Entry::Vacant(slot) => {
                    slot.insert((row_ctx.last_seen, payload));
                }
                Entry::Occupied(mut slot) => {
                    if row_ctx.last_seen > slot.get().0 {
                        slot.insert((row_ctx.last_seen, payload));
                    }
                }
            }
        }

        latest
            .into_iter()
            .map(|(id, (_, payload))| (id, payload))
            .collect()
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.options.show_progress {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    }
}

/// Canonical listing rows for a resolved fleet, in fleet order.
pub fn device_summaries(devices: &[FleetDevice]) -> Vec<DeviceSummary> {
    devices
        .iter()
        .filter_map(|device| extract::device_summary(&device.listing))
        .collect()
}

/// Re-resolves the device context against the full detail record, which
/// usually carries fields the thin listing row lacked. The listing's
/// device id stays authoritative so records always key back to the fleet
/// listing.
fn merged_context(base: &DeviceContext, detail: &Value) -> DeviceContext {
    match extract::device_context(detail) {
        Some(mut ctx) => {
            ctx.device_id = base.device_id.clone();
            if ctx.serial_number.is_none() {
                ctx.serial_number = base.serial_number.clone();
            }
            if ctx.device_name.is_none() {
                ctx.device_name = base.device_name.clone();
            }
            if !ctx.platform.is_known() {
                ctx.platform = base.platform;
            }
            if ctx.last_seen.is_none() {
                ctx.last_seen = base.last_seen;
            }
            ctx
        }
        None => base.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, SystemInfo};
    use reqwest::StatusCode;
    use serde_json::json;

    #[derive(Default)]
    struct StubSource {
        devices: Vec<Value>,
        details: HashMap<String, Value>,
        bulk: Option<Vec<Value>>,
        failing: HashSet<String>,
    }

    impl DeviceSource for StubSource {
        async fn list_devices(&self) -> Result<Vec<Value>, ApiError> {
            Ok(self.devices.clone())
        }

        async fn device_detail(&self, device_id: &str) -> Result<Value, ApiError> {
            if self.failing.contains(device_id) {
                return Err(ApiError::Status {
                    url: format!("stub/device/{}", device_id),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            self.details
                .get(device_id)
                .cloned()
                .ok_or_else(|| ApiError::Status {
                    url: format!("stub/device/{}", device_id),
                    status: StatusCode::NOT_FOUND,
                })
        }

        async fn module_listing(&self, _module: ModuleKind) -> Result<Option<Vec<Value>>, ApiError> {
            Ok(self.bulk.clone())
        }
    }

    fn aggregator(source: StubSource) -> Aggregator<StubSource> {
        Aggregator::new(source, AggregatorOptions::default())
    }

    async fn collect_system(
        source: StubSource,
    ) -> (Vec<FleetDevice>, AggregationOutcome<SystemInfo>) {
        let agg = aggregator(source);
        let devices = agg.fleet().await.unwrap();
        let outcome = agg
            .collect(&devices, ModuleKind::System, extract::system::extract_system)
            .await;
        (devices, outcome)
    }

    #[tokio::test]
    async fn test_fleet_skips_rows_without_identity_and_sorts() {
        let agg = aggregator(StubSource {
            devices: vec![
                json!({"deviceId": "beta"}),
                json!({"note": "no identity here"}),
                json!({"deviceId": "alpha"}),
            ],
            ..StubSource::default()
        });
        let devices = agg.fleet().await.unwrap();
        let ids: Vec<&str> = devices
            .iter()
            .map(|d| d.context.device_id.as_str())
            .collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_fleet_dedupes_by_most_recent_checkin() {
        let agg = aggregator(StubSource {
            devices: vec![
                json!({"deviceId": "kiosk-1", "deviceName": "stale", "lastSeen": "2024-01-01T00:00:00Z"}),
                json!({"deviceId": "kiosk-1", "deviceName": "fresh", "lastSeen": "2024-03-01T00:00:00Z"}),
            ],
            ..StubSource::default()
        });
        let devices = agg.fleet().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].context.device_name.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_device_summaries_follow_fleet_order() {
        let agg = aggregator(StubSource {
            devices: vec![
                json!({"deviceId": "b", "platform": "Windows", "osVersion": "11"}),
                json!({"deviceId": "a", "platform": "macOS", "osVersion": "14.5"}),
            ],
            ..StubSource::default()
        });
        let devices = agg.fleet().await.unwrap();
        let summaries = device_summaries(&devices);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].device_id, "a");
        assert_eq!(summaries[0].platform, Platform::MacOs);
        assert_eq!(summaries[1].os_version.as_deref(), Some("11"));
    }

    #[tokio::test]
    async fn test_collect_fetches_details_when_no_bulk_listing() {
        let (_, outcome) = collect_system(StubSource {
            devices: vec![json!({"deviceId": "b"}), json!({"deviceId": "a"})],
            details: HashMap::from([
                (
                    "a".to_string(),
                    json!({"deviceId": "a", "system": {"osName": "macOS", "osVersion": "14.5"}}),
                ),
                (
                    "b".to_string(),
                    json!({"deviceId": "b", "system": {"caption": "Microsoft Windows 11 Pro"}}),
                ),
            ]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 2);
        assert!(outcome.failures.is_empty());
        // Records come back sorted by device id regardless of fetch order.
        assert_eq!(outcome.records[0].device_id, "a");
        assert_eq!(outcome.records[0].os_name.as_deref(), Some("macOS"));
        assert_eq!(outcome.records[1].device_id, "b");
    }

    #[tokio::test]
    async fn test_collect_isolates_failing_devices() {
        let (_, outcome) = collect_system(StubSource {
            devices: vec![
                json!({"deviceId": "a"}),
                json!({"deviceId": "broken"}),
                json!({"deviceId": "c"}),
            ],
            details: HashMap::from([
                (
                    "a".to_string(),
                    json!({"deviceId": "a", "system": {"osName": "macOS"}}),
                ),
                (
                    "c".to_string(),
                    json!({"deviceId": "c", "system": {"osName": "macOS"}}),
                ),
            ]),
            failing: HashSet::from(["broken".to_string()]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 2);
        assert_eq!(outcome.failure_count(), 1);
        assert_eq!(outcome.failures[0].device_id, "broken");
        assert!(outcome.failures[0].reason.contains("500"));
    }

    #[tokio::test]
    async fn test_listing_row_payload_skips_detail_fetch() {
        // No details and no bulk listing are stubbed; a detail fetch for
        // either device would land in the failure list.
        let (_, outcome) = collect_system(StubSource {
            devices: vec![
                json!({"deviceId": "a", "system": {"osName": "macOS", "osVersion": "14.5"}}),
                json!({"deviceId": "b", "system": "@{caption=Microsoft Windows 11 Pro}"}),
            ],
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.records[0].os_version.as_deref(), Some("14.5"));
        assert_eq!(
            outcome.records[1].os_name.as_deref(),
            Some("Microsoft Windows 11 Pro")
        );
    }

    #[tokio::test]
    async fn test_collect_prefers_bulk_rows_over_detail_fetches() {
        // No details are stubbed, so any per-device fetch would fail.
        let (_, outcome) = collect_system(StubSource {
            devices: vec![json!({"deviceId": "a"}), json!({"deviceId": "b"})],
            bulk: Some(vec![
                json!({"deviceId": "a", "osName": "macOS", "osVersion": "14.5"}),
                json!({"deviceId": "b", "osName": "Microsoft Windows 11 Pro"}),
            ]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.records[0].os_version.as_deref(), Some("14.5"));
    }

    #[tokio::test]
    async fn test_collect_backfills_devices_missing_from_bulk() {
        let (_, outcome) = collect_system(StubSource {
            devices: vec![json!({"deviceId": "a"}), json!({"deviceId": "b"})],
            bulk: Some(vec![json!({"deviceId": "a", "osName": "macOS"})]),
            details: HashMap::from([(
                "b".to_string(),
                json!({"deviceId": "b", "system": {"osName": "Microsoft Windows 11 Pro"}}),
            )]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 2);
        let names: Vec<_> = outcome
            .records
            .iter()
            .map(|r| r.os_name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["macOS", "Microsoft Windows 11 Pro"]);
    }

    #[tokio::test]
    async fn test_bulk_rows_matched_by_serial_number() {
        let (_, outcome) = collect_system(StubSource {
            devices: vec![json!({"deviceId": "uuid-1", "serialNumber": "C02XYZ"})],
            // The bulk row only knows the serial.
            bulk: Some(vec![json!({"serialNumber": "C02XYZ", "osName": "macOS"})]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 1);
        assert_eq!(outcome.records[0].device_id, "uuid-1");
    }

    #[tokio::test]
    async fn test_bulk_rows_for_unlisted_devices_are_dropped() {
        let (_, outcome) = collect_system(StubSource {
            devices: vec![json!({"deviceId": "a"})],
            bulk: Some(vec![
                json!({"deviceId": "a", "osName": "macOS"}),
                json!({"deviceId": "ghost", "osName": "macOS"}),
            ]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 1);
        assert_eq!(outcome.records[0].device_id, "a");
    }

    #[tokio::test]
    async fn test_device_without_module_payload_is_not_a_failure() {
        let (_, outcome) = collect_system(StubSource {
            devices: vec![json!({"deviceId": "a"})],
            details: HashMap::from([(
                "a".to_string(),
                json!({"deviceId": "a", "network": {"ipAddress": "10.0.0.5"}}),
            )]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 0);
        assert_eq!(outcome.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_collect_on_empty_fleet() {
        let (_, outcome) = collect_system(StubSource::default()).await;
        assert_eq!(outcome.record_count(), 0);
        assert_eq!(outcome.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_serialized_detail_records_are_expanded() {
        let (_, outcome) = collect_system(StubSource {
            devices: vec![json!({"deviceId": "a"})],
            details: HashMap::from([(
                "a".to_string(),
                json!({"deviceId": "a", "system": "@{osName=macOS; osVersion=14.5}"}),
            )]),
            ..StubSource::default()
        })
        .await;

        assert_eq!(outcome.record_count(), 1);
        assert_eq!(outcome.records[0].os_version.as_deref(), Some("14.5"));
    }

    #[test]
    fn test_merged_context_fills_gaps_from_detail() {
        let base = DeviceContext {
            device_id: "uuid-1".to_string(),
            serial_number: None,
            device_name: None,
            platform: Platform::Unknown,
            last_seen: None,
        };
        let detail = json!({
            "deviceId": "server-internal-id",
            "serialNumber": "C02XYZ",
            "deviceName": "design-mbp",
            "platform": "Mac OS X",
            "lastSeen": "2024-03-01T00:00:00Z",
        });
        let merged = merged_context(&base, &detail);
        // The listing id stays authoritative.
        assert_eq!(merged.device_id, "uuid-1");
        assert_eq!(merged.serial_number.as_deref(), Some("C02XYZ"));
        assert_eq!(merged.device_name.as_deref(), Some("design-mbp"));
        assert_eq!(merged.platform, Platform::MacOs);
        assert!(merged.last_seen.is_some());
    }

    #[test]
    fn test_merged_context_keeps_base_when_detail_is_bare() {
        let base = DeviceContext {
            device_id: "uuid-1".to_string(),
            serial_number: Some("C02XYZ".to_string()),
            device_name: Some("design-mbp".to_string()),
            platform: Platform::MacOs,
            last_seen: None,
        };
        let merged = merged_context(&base, &json!({"note": "nothing useful"}));
        assert_eq!(merged, base);
    }
}
