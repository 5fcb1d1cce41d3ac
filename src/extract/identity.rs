//! Identity module extractor: local accounts and login state.

use super::{bare_name, pick_array, pick_bool, pick_instant, pick_str, pick_u64};
use crate::models::{DeviceContext, IdentityInfo, UserAccount};
use serde_json::Value;
use std::collections::HashSet;

const USER_LIST_KEYS: &[&str] = &["users", "accounts", "localUsers"];
const USERNAME_KEYS: &[&str] = &["username", "name", "shortName", "accountName"];
const FULL_NAME_KEYS: &[&str] = &["fullName", "displayName", "realName"];
const ADMIN_KEYS: &[&str] = &["isAdmin", "admin", "administrator"];
const DISABLED_KEYS: &[&str] = &["isDisabled", "disabled", "accountDisabled"];
const LOGGED_IN_KEYS: &[&str] = &["isLoggedIn", "loggedIn", "currentlyLoggedIn"];
const LAST_LOGON_KEYS: &[&str] = &["lastLogon", "lastLogin", "lastLoginTime"];
const SECURE_TOKEN_KEYS: &[&str] = &["secureToken", "hasSecureToken"];
const SESSION_LIST_KEYS: &[&str] = &["loggedInUsers", "sessions", "activeSessions"];
const DIRECTORY_KEYS: &[&str] = &["directoryBound", "adBound", "domainJoined", "ldapBound"];
const FAILED_LOGIN_KEYS: &[&str] = &["failedLoginCount", "failedLogins", "badPasswordAttempts"];

/// Reduces an identity payload to the canonical accounts record.
///
/// The payload is usually an object holding a user list, but some agent
/// versions send the bare list itself; both shapes land here. A user
/// counts as logged in when their own flag says so or when their name
/// appears in the payload's session list.
pub fn extract_identity(ctx: &DeviceContext, payload: &Value) -> Option<IdentityInfo> {
    let users_raw: &[Value] = match payload {
        Value::Array(list) => list,
        Value::Object(_) => pick_array(payload, USER_LIST_KEYS)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => return None,
    };

    let mut info = IdentityInfo::for_device(ctx);
    let sessions = session_usernames(payload);
    info.users = users_raw
        .iter()
        .filter_map(|user| user_account(user, &sessions))
        .collect();
    info.total_users = info.users.len();
    info.admin_count = info.users.iter().filter(|u| u.is_admin).count();
    info.disabled_count = info.users.iter().filter(|u| u.is_disabled).count();
    info.logged_in_count = info.users.iter().filter(|u| u.is_logged_in).count();

    info.directory_bound = pick_bool(payload, DIRECTORY_KEYS);
    info.secure_token_count = secure_token_count(users_raw);
    info.failed_login_count = failed_login_count(payload, users_raw);
    Some(info)
}

fn user_account(value: &Value, sessions: &HashSet<String>) -> Option<UserAccount> {
    let username = pick_str(value, USERNAME_KEYS).or_else(|| bare_name(value))?;
    let is_logged_in = pick_bool(value, LOGGED_IN_KEYS).unwrap_or(false)
        || sessions.contains(&username.to_lowercase());
    Some(UserAccount {
        full_name: pick_str(value, FULL_NAME_KEYS),
        is_admin: pick_bool(value, ADMIN_KEYS).unwrap_or(false),
        is_disabled: pick_bool(value, DISABLED_KEYS).unwrap_or(false),
        is_logged_in,
        last_logon: pick_instant(value, LAST_LOGON_KEYS),
        username,
    })
}

/// Usernames named by the payload's session list, lowercased for
/// case-insensitive matching.
fn session_usernames(payload: &Value) -> HashSet<String> {
    let Some(list) = pick_array(payload, SESSION_LIST_KEYS) else {
        return HashSet::new();
    };
    list.iter()
        .filter_map(|entry| match entry {
            Value::Object(_) => pick_str(entry, USERNAME_KEYS),
            other => bare_name(other),
        })
        .map(|name| name.to_lowercase())
        .collect()
}

/// Counts secure-token holders, but only when the payload carries the
/// flag at all. macOS agents send it; a fleet of Windows payloads must
/// report `None`, not zero.
fn secure_token_count(users: &[Value]) -> Option<usize> {
    let mut seen = false;
    let mut count = 0;
    for user in users {
        if let Some(flag) = pick_bool(user, SECURE_TOKEN_KEYS) {
            seen = true;
            if flag {
                count += 1;
            }
        }
    }
    seen.then_some(count)
}

/// A payload-level counter wins; otherwise per-user counters are summed
/// when any user carries one.
fn failed_login_count(payload: &Value, users: &[Value]) -> Option<u64> {
    if let Some(count) = pick_u64(payload, FAILED_LOGIN_KEYS) {
        return Some(count);
    }
    let mut seen = false;
    let mut total = 0;
    for user in users {
        if let Some(count) = pick_u64(user, FAILED_LOGIN_KEYS) {
            seen = true;
            total += count;
        }
    }
    seen.then_some(total)
}
