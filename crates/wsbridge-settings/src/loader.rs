//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::WsBridgeSettings;

/// Resolve the path to the settings file (`~/.wsbridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wsbridge").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WsBridgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path`, apply env overrides, then validate.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged
/// document is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WsBridgeSettings> {
    let defaults = serde_json::to_value(WsBridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WsBridgeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WSBRIDGE_*` overrides read through `lookup`.
///
/// Unparsable or out-of-range values are ignored with a warning.
pub fn apply_env_overrides<F>(settings: &mut WsBridgeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let client = &mut settings.client;

    if let Some(v) = lookup("WSBRIDGE_LOG_LEVEL").filter(|v| !v.is_empty()) {
        client.log_level = v;
    }
    if let Some(v) = read_bool(&lookup, "WSBRIDGE_JSON_LOGS") {
        client.json_logs = v;
    }
    let millis = [
        ("WSBRIDGE_IDLE_TIMEOUT_MS", &mut client.idle_timeout_ms),
        ("WSBRIDGE_PONG_TIMEOUT_MS", &mut client.pong_timeout_ms),
        ("WSBRIDGE_CONNECT_TIMEOUT_MS", &mut client.connect_timeout_ms),
        ("WSBRIDGE_HTTP_TIMEOUT_MS", &mut client.http_timeout_ms),
    ];
    for (name, slot) in millis {
        if let Some(v) = read_u64(&lookup, name, 1, 3_600_000) {
            *slot = v;
        }
    }
    if let Some(v) = read_u64(&lookup, "WSBRIDGE_SETTLE_DELAY_MS", 0, 600_000) {
        client.connected_settle_delay_ms = v;
    }
    if let Some(v) = read_u64(&lookup, "WSBRIDGE_LATE_REGISTRATION_DELAY_MS", 0, 600_000) {
        client.late_registration_delay_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

fn read_bool<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<bool> {
    let val = lookup(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_u64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
