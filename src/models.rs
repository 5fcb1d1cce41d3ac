//! Data models for the fleet exporter.
//!
//! This module contains all the core data structures used throughout
//! the application for representing devices, canonical module records,
//! and the exported fleet report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating-system platform of a managed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Apple devices reporting through the munki agent.
    #[serde(rename = "macOS")]
    MacOs,
    /// PC devices reporting through the cimian agent.
    #[serde(rename = "Windows")]
    Windows,
    /// Platform could not be determined from the device record.
    #[serde(rename = "unknown")]
    Unknown,
}

impl Platform {
    /// Returns the canonical label used in exports and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
            Platform::Unknown => "unknown",
        }
    }

    /// Whether the platform was successfully resolved.
    pub fn is_known(&self) -> bool {
        !matches!(self, Platform::Unknown)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of network connection carried by the active interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Ethernet,
    Wifi,
    Bluetooth,
    #[default]
    Other,
}

impl From<&str> for ConnectionType {
    fn from(s: &str) -> Self {
        let lowered = s.to_lowercase();
        if lowered.contains("ethernet") || lowered.contains("wired") || lowered.contains("lan") {
            ConnectionType::Ethernet
        } else if lowered.contains("wi-fi")
            || lowered.contains("wifi")
            || lowered.contains("wireless")
            || lowered.contains("802.11")
            || lowered.contains("airport")
        {
            ConnectionType::Wifi
        } else if lowered.contains("bluetooth") {
            ConnectionType::Bluetooth
        } else {
            ConnectionType::Other
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::Ethernet => write!(f, "Ethernet"),
            ConnectionType::Wifi => write!(f, "Wi-Fi"),
            ConnectionType::Bluetooth => write!(f, "Bluetooth"),
            ConnectionType::Other => write!(f, "Other"),
        }
    }
}

/// State of a managed software item as reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    Installed,
    Pending,
    Failed,
    Other,
}

impl From<&str> for InstallStatus {
    fn from(s: &str) -> Self {
        let lowered = s.to_lowercase();
        if lowered.contains("fail") || lowered.contains("error") {
            InstallStatus::Failed
        } else if lowered.contains("pending")
            || lowered.contains("queued")
            || lowered.contains("available")
            || lowered.contains("update")
            || lowered.contains("will be")
        {
            InstallStatus::Pending
        } else if lowered.contains("install") || lowered.contains("present") || lowered == "managed"
        {
            InstallStatus::Installed
        } else {
            InstallStatus::Other
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStatus::Installed => write!(f, "Installed"),
            InstallStatus::Pending => write!(f, "Pending"),
            InstallStatus::Failed => write!(f, "Failed"),
            InstallStatus::Other => write!(f, "Other"),
        }
    }
}

/// Telemetry module published by the fleet API for every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    System,
    Network,
    Installs,
    Identity,
    Security,
    Management,
    Peripherals,
}

impl ModuleKind {
    /// Every module the exporter knows how to normalize.
    pub const ALL: [ModuleKind; 7] = [
        ModuleKind::System,
        ModuleKind::Network,
        ModuleKind::Installs,
        ModuleKind::Identity,
        ModuleKind::Security,
        ModuleKind::Management,
        ModuleKind::Peripherals,
    ];

    /// Returns the lowercase name used in API paths and report keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::System => "system",
            ModuleKind::Network => "network",
            ModuleKind::Installs => "installs",
            ModuleKind::Identity => "identity",
            ModuleKind::Security => "security",
            ModuleKind::Management => "management",
            ModuleKind::Peripherals => "peripherals",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity and provenance resolved once per device, shared by every
/// canonical record extracted from that device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceContext {
    /// Stable identifier of the device within the fleet.
    pub device_id: String,
    /// Hardware serial number, if reported.
    pub serial_number: Option<String>,
    /// Human-readable device name.
    pub device_name: Option<String>,
    /// Resolved platform.
    pub platform: Platform,
    /// When the device last reported in.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Canonical operating-system and uptime record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub last_seen: Option<DateTime<Utc>>,
    /// Operating system product name.
    pub os_name: Option<String>,
    /// Operating system version string.
    pub os_version: Option<String>,
    /// Build or release identifier.
    pub build_version: Option<String>,
    /// CPU architecture (arm64, x86_64, ...).
    pub architecture: Option<String>,
    /// Uptime in whole seconds.
    pub uptime_seconds: Option<u64>,
    /// Uptime rendered for humans ("3d 4h").
    pub uptime: Option<String>,
    /// Instant the device last booted.
    pub last_boot_time: Option<DateTime<Utc>>,
}

impl SystemInfo {
    /// Creates an empty record carrying the device's identity.
    pub fn for_device(ctx: &DeviceContext) -> Self {
        Self {
            device_id: ctx.device_id.clone(),
            serial_number: ctx.serial_number.clone(),
            device_name: ctx.device_name.clone(),
            platform: ctx.platform,
            last_seen: ctx.last_seen,
            os_name: None,
            os_version: None,
            build_version: None,
            architecture: None,
            uptime_seconds: None,
            uptime: None,
            last_boot_time: None,
        }
    }
}

/// Canonical network connectivity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub last_seen: Option<DateTime<Utc>>,
    /// Hostname the device reports for itself.
    pub hostname: Option<String>,
    /// Classified connection type of the active interface.
    pub connection_type: ConnectionType,
    /// Name of the interface currently carrying traffic.
    pub active_interface: Option<String>,
    /// First valid IPv4 address of the active interface.
    pub ip_address: Option<String>,
    /// Hardware address of the active interface.
    pub mac_address: Option<String>,
    /// Wireless network name, when connected over Wi-Fi.
    pub ssid: Option<String>,
    /// Number of interfaces present in the payload.
    pub interface_count: usize,
}

impl NetworkInfo {
    pub fn for_device(ctx: &DeviceContext) -> Self {
        Self {
            device_id: ctx.device_id.clone(),
            serial_number: ctx.serial_number.clone(),
            device_name: ctx.device_name.clone(),
            platform: ctx.platform,
            last_seen: ctx.last_seen,
            hostname: None,
            connection_type: ConnectionType::Other,
            active_interface: None,
            ip_address: None,
            mac_address: None,
            ssid: None,
            interface_count: 0,
        }
    }
}

/// A single software item under management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedItem {
    pub name: String,
    pub version: Option<String>,
    pub status: InstallStatus,
    pub last_update: Option<DateTime<Utc>>,
}

/// One agent run (check-in) on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSession {
    /// What triggered the run (auto, manual, ...).
    pub run_type: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Elapsed time rendered for humans ("1h 12m").
    pub duration: Option<String>,
    /// Number of items the run acted on.
    pub actions: Option<u64>,
}

/// A timestamped message emitted by the endpoint agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Canonical managed-software record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallsInfo {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub last_seen: Option<DateTime<Utc>>,
    /// Management client that produced the payload (munki, cimian).
    pub managed_client: Option<String>,
    /// Total number of managed items.
    pub total_packages: usize,
    pub installed_count: usize,
    pub pending_count: usize,
    pub failed_count: usize,
    /// Individual managed items.
    pub items: Vec<ManagedItem>,
    /// Instant of the most recent agent run.
    pub last_run: Option<DateTime<Utc>>,
    /// Recent agent runs, newest first as reported.
    pub recent_sessions: Vec<RunSession>,
    pub errors: Vec<AgentMessage>,
    pub warnings: Vec<AgentMessage>,
}

impl InstallsInfo {
    pub fn for_device(ctx: &DeviceContext) -> Self {
        Self {
            device_id: ctx.device_id.clone(),
            serial_number: ctx.serial_number.clone(),
            device_name: ctx.device_name.clone(),
            platform: ctx.platform,
            last_seen: ctx.last_seen,
            managed_client: None,
            total_packages: 0,
            installed_count: 0,
            pending_count: 0,
            failed_count: 0,
            items: Vec::new(),
            last_run: None,
            recent_sessions: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// A local user account on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub username: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub is_disabled: bool,
    pub is_logged_in: bool,
    pub last_logon: Option<DateTime<Utc>>,
}

/// Canonical local-accounts record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityInfo {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub last_seen: Option<DateTime<Utc>>,
    pub total_users: usize,
    pub admin_count: usize,
    pub disabled_count: usize,
    pub logged_in_count: usize,
    pub users: Vec<UserAccount>,
    /// Whether the device is bound to a directory service.
    pub directory_bound: Option<bool>,
    /// Number of accounts holding a secure token (macOS payloads only).
    pub secure_token_count: Option<usize>,
    /// Failed login attempts (Windows payloads only).
    pub failed_login_count: Option<u64>,
}

impl IdentityInfo {
    pub fn for_device(ctx: &DeviceContext) -> Self {
        Self {
            device_id: ctx.device_id.clone(),
            serial_number: ctx.serial_number.clone(),
            device_name: ctx.device_name.clone(),
            platform: ctx.platform,
            last_seen: ctx.last_seen,
            total_users: 0,
            admin_count: 0,
            disabled_count: 0,
            logged_in_count: 0,
            users: Vec::new(),
            directory_bound: None,
            secure_token_count: None,
            failed_login_count: None,
        }
    }
}

/// Platform-specific portion of the security record. The payload decides
/// which variant applies; the two never mix on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flavor")]
pub enum SecurityPosture {
    #[serde(rename = "windows")]
    #[serde(rename_all = "camelCase")]
    Windows {
        antivirus_enabled: Option<bool>,
        antivirus_up_to_date: Option<bool>,
        tpm_present: Option<bool>,
        tpm_enabled: Option<bool>,
        automatic_updates: Option<bool>,
    },
    #[serde(rename = "macos")]
    #[serde(rename_all = "camelCase")]
    MacOs {
        gatekeeper: Option<String>,
        sip: Option<String>,
        filevault_state: Option<String>,
        xprotect_version: Option<String>,
        activation_lock: Option<String>,
    },
}

/// Canonical security-posture record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityInfo {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub last_seen: Option<DateTime<Utc>>,
    /// Host firewall state, common to both platforms.
    pub firewall_enabled: Option<bool>,
    /// Full-disk encryption state (FileVault or BitLocker).
    pub disk_encryption_enabled: Option<bool>,
    /// Platform-specific flags, absent when the payload shape is unknown.
    pub posture: Option<SecurityPosture>,
}

impl SecurityInfo {
    pub fn for_device(ctx: &DeviceContext) -> Self {
        Self {
            device_id: ctx.device_id.clone(),
            serial_number: ctx.serial_number.clone(),
            device_name: ctx.device_name.clone(),
            platform: ctx.platform,
            last_seen: ctx.last_seen,
            firewall_enabled: None,
            disk_encryption_enabled: None,
            posture: None,
        }
    }
}

/// Canonical MDM enrollment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementInfo {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub last_seen: Option<DateTime<Utc>>,
    pub enrolled: Option<bool>,
    /// MDM vendor or server product name.
    pub provider: Option<String>,
    pub server_url: Option<String>,
    /// Whether enrollment was user approved (macOS).
    pub user_approved: Option<bool>,
    /// How the device was enrolled (DEP, manual, ...).
    pub enrollment_type: Option<String>,
    pub profile_count: Option<u64>,
    pub last_check_in: Option<DateTime<Utc>>,
}

impl ManagementInfo {
    pub fn for_device(ctx: &DeviceContext) -> Self {
        Self {
            device_id: ctx.device_id.clone(),
            serial_number: ctx.serial_number.clone(),
            device_name: ctx.device_name.clone(),
            platform: ctx.platform,
            last_seen: ctx.last_seen,
            enrolled: None,
            provider: None,
            server_url: None,
            user_approved: None,
            enrollment_type: None,
            profile_count: None,
            last_check_in: None,
        }
    }
}

/// An attached display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayDevice {
    pub name: String,
    pub resolution: Option<String>,
    pub internal: Option<bool>,
}

/// A connected USB device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDevice {
    pub name: String,
    pub vendor: Option<String>,
    pub serial_number: Option<String>,
}

/// A configured printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDevice {
    pub name: String,
    pub model: Option<String>,
    pub is_default: Option<bool>,
}

/// Canonical attached-hardware record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralsInfo {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub last_seen: Option<DateTime<Utc>>,
    pub display_count: usize,
    pub usb_count: usize,
    pub printer_count: usize,
    pub displays: Vec<DisplayDevice>,
    pub usb_devices: Vec<UsbDevice>,
    pub printers: Vec<PrinterDevice>,
}

impl PeripheralsInfo {
    pub fn for_device(ctx: &DeviceContext) -> Self {
        Self {
            device_id: ctx.device_id.clone(),
            serial_number: ctx.serial_number.clone(),
            device_name: ctx.device_name.clone(),
            platform: ctx.platform,
            last_seen: ctx.last_seen,
            display_count: 0,
            usb_count: 0,
            printer_count: 0,
            displays: Vec::new(),
            usb_devices: Vec::new(),
            printers: Vec::new(),
        }
    }
}

/// One row of the fleet device listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub device_id: String,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub os_version: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A device that could not contribute a record to a module export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFailure {
    pub device_id: String,
    /// Human-readable explanation of what went wrong.
    pub reason: String,
}

/// Result of aggregating one module across the fleet: the records that
/// normalized cleanly plus the devices that failed, kept side by side so
/// one bad device never hides the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationOutcome<T> {
    pub records: Vec<T>,
    pub failures: Vec<DeviceFailure>,
}

impl<T> Default for AggregationOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> AggregationOutcome<T> {
    /// Devices that produced a record.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Devices that errored during fetch or normalization.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Metadata about an export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Base URL of the fleet API that was queried.
    pub api_url: String,
    /// Date and time the export was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of devices in the fleet listing.
    pub device_count: usize,
    /// Number of modules exported.
    pub modules_exported: usize,
    /// Canonical records across all exported modules.
    pub total_records: usize,
    /// Failures across all exported modules.
    pub total_failures: usize,
    /// Duration of the export in seconds.
    pub duration_seconds: f64,
}

/// Per-module collections of the fleet report. Only modules that were
/// exported appear in the serialized output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCollections {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<AggregationOutcome<SystemInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<AggregationOutcome<NetworkInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installs: Option<AggregationOutcome<InstallsInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<AggregationOutcome<IdentityInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<AggregationOutcome<SecurityInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management: Option<AggregationOutcome<ManagementInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peripherals: Option<AggregationOutcome<PeripheralsInfo>>,
}

impl ModuleCollections {
    fn counts<T>(slot: &Option<AggregationOutcome<T>>) -> (usize, usize, usize) {
        match slot {
            Some(outcome) => (1, outcome.record_count(), outcome.failure_count()),
            None => (0, 0, 0),
        }
    }

    /// Number of modules present in the export.
    pub fn exported_count(&self) -> usize {
        self.tally().0
    }

    /// Total canonical records across every exported module.
    pub fn record_count(&self) -> usize {
        self.tally().1
    }

    /// Total failures across every exported module.
    pub fn failure_count(&self) -> usize {
        self.tally().2
    }

    fn tally(&self) -> (usize, usize, usize) {
        let mut exported = 0;
        let mut records = 0;
        let mut failures = 0;
        for (e, r, f) in [
            Self::counts(&self.system),
            Self::counts(&self.network),
            Self::counts(&self.installs),
            Self::counts(&self.identity),
            Self::counts(&self.security),
            Self::counts(&self.management),
            Self::counts(&self.peripherals),
        ] {
            exported += e;
            records += r;
            failures += f;
        }
        (exported, records, failures)
    }
}

/// The complete fleet export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetReport {
    /// Metadata about the export run.
    pub metadata: ReportMetadata,
    /// One summary row per device in the fleet listing.
    pub devices: Vec<DeviceSummary>,
    /// Canonical records grouped per module.
    pub modules: ModuleCollections,
}
