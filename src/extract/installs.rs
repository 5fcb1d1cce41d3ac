//! Installs module extractor: managed software inventory and agent runs.

use super::{bare_name, pick, pick_array, pick_bool, pick_instant, pick_str, pick_u64, string_from};
use crate::models::{AgentMessage, DeviceContext, InstallStatus, InstallsInfo, ManagedItem, RunSession};
use crate::normalize::format_duration;
use serde_json::Value;

const CLIENT_KEYS: &[&str] = &["type", "client", "manager", "agent"];
const ITEM_LIST_KEYS: &[&str] = &["items", "managedInstalls", "packages", "managedItems"];
const ITEM_NAME_KEYS: &[&str] = &["name", "displayName", "itemName"];
const ITEM_VERSION_KEYS: &[&str] = &["version", "installedVersion", "versionToInstall"];
const ITEM_STATUS_KEYS: &[&str] = &["status", "state", "installState"];
const ITEM_INSTALLED_KEYS: &[&str] = &["installed", "isInstalled"];
const ITEM_UPDATED_KEYS: &[&str] = &["lastUpdate", "lastUpdated", "endTime", "installedAt"];
const LAST_RUN_KEYS: &[&str] = &["lastRun", "lastRunTime", "lastCheckTime"];
const SESSION_LIST_KEYS: &[&str] = &["sessions", "runs", "recentSessions"];
const SESSION_TYPE_KEYS: &[&str] = &["runType", "type", "trigger"];
const SESSION_START_KEYS: &[&str] = &["startTime", "started", "startedAt"];
const SESSION_DURATION_KEYS: &[&str] = &["durationSeconds", "duration", "elapsedSeconds"];
const SESSION_ACTIONS_KEYS: &[&str] = &["actions", "installCount", "itemsManaged"];
const ERROR_KEYS: &[&str] = &["errors", "errorMessages"];
const WARNING_KEYS: &[&str] = &["warnings", "warningMessages"];
const MESSAGE_TEXT_KEYS: &[&str] = &["message", "text", "detail"];
const MESSAGE_TIME_KEYS: &[&str] = &["timestamp", "time", "date"];

/// Reduces an installs payload to the canonical managed-software record.
pub fn extract_installs(ctx: &DeviceContext, payload: &Value) -> Option<InstallsInfo> {
    if !payload.is_object() {
        return None;
    }
    let mut info = InstallsInfo::for_device(ctx);
    info.managed_client = pick_str(payload, CLIENT_KEYS);

    if let Some(list) = pick_array(payload, ITEM_LIST_KEYS) {
        info.items = list.iter().filter_map(managed_item).collect();
    }
    info.total_packages = info.items.len();
    for item in &info.items {
        match item.status {
            InstallStatus::Installed => info.installed_count += 1,
            InstallStatus::Pending => info.pending_count += 1,
            InstallStatus::Failed => info.failed_count += 1,
            InstallStatus::Other => {}
        }
    }

    if let Some(list) = pick_array(payload, SESSION_LIST_KEYS) {
        info.recent_sessions = list.iter().filter_map(run_session).collect();
    }
    info.last_run = pick_instant(payload, LAST_RUN_KEYS).or_else(|| {
        info.recent_sessions
            .iter()
            .filter_map(|session| session.started_at)
            .max()
    });

    info.errors = messages(payload, ERROR_KEYS);
    info.warnings = messages(payload, WARNING_KEYS);
    Some(info)
}

fn managed_item(value: &Value) -> Option<ManagedItem> {
    // A bare string entry is an item name with nothing else known.
    let name = pick_str(value, ITEM_NAME_KEYS).or_else(|| bare_name(value))?;
    Some(ManagedItem {
        name,
        version: pick_str(value, ITEM_VERSION_KEYS),
        status: item_status(value),
        last_update: pick_instant(value, ITEM_UPDATED_KEYS),
    })
}

/// Status text wins; agents without one report an installed flag
/// instead, where false means the item is still waiting.
fn item_status(value: &Value) -> InstallStatus {
    if let Some(text) = pick_str(value, ITEM_STATUS_KEYS) {
        return InstallStatus::from(text.as_str());
    }
    match pick_bool(value, ITEM_INSTALLED_KEYS) {
        Some(true) => InstallStatus::Installed,
        Some(false) => InstallStatus::Pending,
        None => InstallStatus::Other,
    }
}

fn run_session(value: &Value) -> Option<RunSession> {
    if !value.is_object() {
        return None;
    }
    Some(RunSession {
        run_type: pick_str(value, SESSION_TYPE_KEYS),
        started_at: pick_instant(value, SESSION_START_KEYS),
        duration: pick_u64(value, SESSION_DURATION_KEYS).map(format_duration),
        actions: pick_u64(value, SESSION_ACTIONS_KEYS),
    })
}

fn messages(payload: &Value, keys: &[&str]) -> Vec<AgentMessage> {
    match pick(payload, keys) {
        Some(Value::Array(list)) => list.iter().filter_map(message_entry).collect(),
        Some(single) => message_entry(single).into_iter().collect(),
        None => Vec::new(),
    }
}

fn message_entry(value: &Value) -> Option<AgentMessage> {
    match value {
        Value::String(_) => Some(AgentMessage {
            message: string_from(value)?,
            timestamp: None,
        }),
        Value::Object(_) => Some(AgentMessage {
            message: pick_str(value, MESSAGE_TEXT_KEYS)?,
            timestamp: pick_instant(value, MESSAGE_TIME_KEYS),
        }),
        _ => None,
    }
}
