//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FramecastSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `FRAMECAST_*` environment overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::FramecastSettings;

/// Resolve the settings file path.
///
/// `FRAMECAST_SETTINGS` wins; otherwise `~/.framecast/settings.json`.
pub fn settings_path() -> PathBuf {
    settings_path_from(|name| std::env::var(name).ok())
}

/// [`settings_path`] with variables read through `lookup`.
pub fn settings_path_from<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };
    if let Some(path) = env.string("FRAMECAST_SETTINGS") {
        return PathBuf::from(path);
    }
    let home = env.string("HOME").unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(home).join(".framecast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FramecastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<FramecastSettings> {
    let mut settings = read_settings_file(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Read and merge the settings file without env overrides or validation.
pub fn read_settings_file(path: &Path) -> Result<FramecastSettings> {
    let defaults = serde_json::to_value(FramecastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `FRAMECAST_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is kept.
pub fn apply_overrides<F>(settings: &mut FramecastSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("FRAMECAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("FRAMECAST_PORT", 0, u64::from(u16::MAX)) {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.u64_in("FRAMECAST_MAX_SESSIONS", 1, 1_000_000) {
        settings.server.max_sessions = v as usize;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.u64_in("FRAMECAST_IDLE_TIMEOUT_SECS", 1, 86_400) {
        settings.session.idle_timeout_secs = v;
    }
    if let Some(v) = env.u64_in("FRAMECAST_IDLE_CHECK_INTERVAL_SECS", 1, 3_600) {
        settings.session.idle_check_interval_secs = v;
    }
    if let Some(v) = env.bool("FRAMECAST_SINGLE_USE") {
        settings.session.single_use = v;
    }
    if let Some(v) = env.enum_value("FRAMECAST_PATTERN") {
        settings.session.pattern = v;
    }

    // ── Stream ──────────────────────────────────────────────────────
    if let Some(v) = env.u64_in("FRAMECAST_FRAME_INTERVAL_MS", 1, 60_000) {
        settings.stream.frame_interval_ms = v;
    }
    if let Some(v) = env.u64_in("FRAMECAST_KEEPALIVE_INTERVAL_SECS", 1, 600) {
        settings.stream.keepalive_interval_secs = v;
    }
    if let Some(v) = env.u64_in("FRAMECAST_PONG_TIMEOUT_SECS", 1, 3_600) {
        settings.stream.pong_timeout_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("FRAMECAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.enum_value("FRAMECAST_LOG_FORMAT") {
        settings.logging.format = v;
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
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        result
    }

    fn enum_value<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let val = self.string(name)?;
        let result = serde_json::from_value(Value::String(val.to_lowercase())).ok();
        if result.is_none() {
            warn!(key = name, value = %val, "unknown env var value, ignoring");
        }
        result
    }
}
