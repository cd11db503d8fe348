//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{LogLevel, NervSettings};

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "NERV_SETTINGS";

/// `$NERV_SETTINGS`, else `~/.nerv/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".nerv").join("settings.json")
}

pub fn load_settings() -> Result<NervSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<NervSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.normalize();
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<NervSettings> {
    let defaults = serde_json::to_value(NervSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        if !user.is_object() {
            return Err(SettingsError::InvalidValue(format!(
                "{} must contain a JSON object at the root",
                path.display()
            )));
        }
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply `NERV_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut NervSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are logged and ignored (the file/default value stands).
pub fn apply_overrides_from(settings: &mut NervSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = string("NERV_LLM_MODEL") {
        settings.llm.model = v;
    }
    if let Some(v) = string("NERV_LLM_BASE_URL") {
        settings.llm.base_url = v;
    }
    if let Some(raw) = string("NERV_LLM_CONTEXT_WINDOW") {
        if let Some(v) = checked("NERV_LLM_CONTEXT_WINDOW", parse_u64_range(&raw, 256, 1_048_576), &raw) {
            settings.llm.context_window = v as u32;
        }
    }
    if let Some(raw) = string("NERV_LLM_MAX_RETRIES") {
        if let Some(v) = checked("NERV_LLM_MAX_RETRIES", parse_u64_range(&raw, 1, 20), &raw) {
            settings.llm.max_retries = v as u32;
        }
    }
    if let Some(raw) = string("NERV_LLM_TEMPERATURE") {
        if let Some(v) = checked("NERV_LLM_TEMPERATURE", parse_f64_range(&raw, 0.0, 2.0), &raw) {
            settings.llm.temperature = v;
        }
    }
    if let Some(raw) = string("NERV_LLM_DEBUG_PAYLOADS") {
        if let Some(v) = checked("NERV_LLM_DEBUG_PAYLOADS", parse_bool(&raw), &raw) {
            settings.llm.debug_payloads = v;
        }
    }
    if let Some(v) = string("NERV_DATABASE_PATH") {
        settings.database.path = v;
    }
    if let Some(raw) = string("NERV_SUMMARY_INTERVAL_SECS") {
        if let Some(v) = checked("NERV_SUMMARY_INTERVAL_SECS", parse_u64_range(&raw, 60, 604_800), &raw) {
            settings.summarization.interval_seconds = v;
        }
    }
    if let Some(raw) = string("NERV_LOG_LEVEL") {
        if let Some(v) = checked("NERV_LOG_LEVEL", LogLevel::parse(&raw), &raw) {
            settings.logging.level = v;
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

fn checked<T>(name: &str, parsed: Option<T>, raw: &str) -> Option<T> {
    if parsed.is_none() {
        warn!(key = name, value = %raw, "invalid env var, ignoring");
    }
    parsed
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
