//! Management module extractor: MDM enrollment state.

use super::{pick_array, pick_bool, pick_instant, pick_str, pick_u64};
use crate::models::{DeviceContext, ManagementInfo};
use serde_json::Value;

const ENROLLED_KEYS: &[&str] = &["enrolled", "mdmEnrolled", "isEnrolled"];
const STATE_KEYS: &[&str] = &["enrollmentState", "state", "status"];
const PROVIDER_KEYS: &[&str] = &["provider", "vendor", "mdmName", "serverName"];
const SERVER_KEYS: &[&str] = &["serverUrl", "serverURL", "mdmServer", "checkInUrl"];
const USER_APPROVED_KEYS: &[&str] = &["userApproved", "userApprovedEnrollment", "uamdm"];
const ENROLLMENT_TYPE_KEYS: &[&str] = &["enrollmentType", "enrollmentMethod"];
const PROFILE_COUNT_KEYS: &[&str] = &["profileCount", "profilesCount"];
const PROFILE_LIST_KEYS: &[&str] = &["profiles", "installedProfiles"];
const CHECK_IN_KEYS: &[&str] = &["lastCheckIn", "lastCheckin", "lastContact", "lastSync"];

/// Reduces a management payload to the canonical enrollment record.
pub fn extract_management(ctx: &DeviceContext, payload: &Value) -> Option<ManagementInfo> {
    if !payload.is_object() {
        return None;
    }
    let mut info = ManagementInfo::for_device(ctx);
    info.enrolled = pick_bool(payload, ENROLLED_KEYS).or_else(|| enrollment_state(payload));
    info.provider = pick_str(payload, PROVIDER_KEYS);
    info.server_url = pick_str(payload, SERVER_KEYS);
    info.user_approved = pick_bool(payload, USER_APPROVED_KEYS);
    info.enrollment_type = pick_str(payload, ENROLLMENT_TYPE_KEYS);
    info.profile_count = pick_u64(payload, PROFILE_COUNT_KEYS)
        .or_else(|| pick_array(payload, PROFILE_LIST_KEYS).map(|list| list.len() as u64));
    info.last_check_in = pick_instant(payload, CHECK_IN_KEYS);
    Some(info)
}

/// Agents without a boolean often report a state word instead. Negated
/// forms must be checked before the bare word they contain.
fn enrollment_state(payload: &Value) -> Option<bool> {
    let state = pick_str(payload, STATE_KEYS)?;
    let lowered = state.to_lowercase();
    if lowered.contains("not enrolled") || lowered.contains("unenrolled") {
        Some(false)
    } else if lowered.contains("enrolled") || lowered.contains("managed") {
        Some(true)
    } else {
        None
    }
}
