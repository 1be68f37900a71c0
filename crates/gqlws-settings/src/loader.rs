//! Settings loading: compiled defaults, then the JSON file, then `GQLWS_*`
//! environment variables.
//!
//! The file is merged over the defaults as raw JSON before deserialising,
//! so a file only needs the keys it changes:
//! - objects merge key by key
//! - arrays and scalars replace the default
//! - `null` keeps the default

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{GqlwsSettings, LogFormat};

/// Default settings file: `~/.gqlws/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".gqlws").join("settings.json")
}

/// Load from [`settings_path`].
pub fn load_settings() -> Result<GqlwsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path`, apply environment overrides, and validate.
///
/// A missing file is not an error: defaults (plus environment) are used.
pub fn load_settings_from_path(path: &Path) -> Result<GqlwsSettings> {
    let parse_error = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut merged = serde_json::to_value(GqlwsSettings::default()).map_err(parse_error)?;
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "merging settings file");
            let overlay: Value = serde_json::from_str(&content).map_err(parse_error)?;
            merged = deep_merge(merged, overlay);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let mut settings: GqlwsSettings = serde_json::from_value(merged).map_err(parse_error)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Merge `overlay` into `base` (see module docs for the rules).
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if value.is_null() {
                    continue;
                }
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `GQLWS_*` overrides read through `lookup`.
///
/// Empty values are treated as unset; invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut GqlwsSettings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let server = &mut settings.server;
    let protocol = &mut settings.protocol;

    if let Some(host) = var("GQLWS_HOST") {
        server.host = host;
    }
    if let Some(port) = env_in_range(&var, "GQLWS_PORT", 0..=u16::MAX) {
        server.port = port;
    }
    if let Some(path) = var("GQLWS_PATH") {
        server.path = path;
    }
    if let Some(n) = env_in_range(&var, "GQLWS_MAX_CONNECTIONS", 1..=1_000_000) {
        server.max_connections = n;
    }
    if let Some(n) = env_in_range(&var, "GQLWS_MAX_MESSAGE_SIZE", 1024..=64 * 1024 * 1024) {
        server.max_message_size = n;
    }

    if let Some(ms) = env_in_range(&var, "GQLWS_INIT_TIMEOUT_MS", 0..=600_000) {
        protocol.connection_init_wait_timeout_ms = ms;
    }
    if let Some(ms) = env_in_range(&var, "GQLWS_KEEP_ALIVE_INTERVAL_MS", 0..=600_000) {
        protocol.keep_alive_interval_ms = ms;
    }
    if let Some(ms) = env_in_range(&var, "GQLWS_KEEP_ALIVE_TIMEOUT_MS", 0..=3_600_000) {
        protocol.keep_alive_timeout_ms = ms;
    }
    if let Some(n) = env_in_range(&var, "GQLWS_OUTBOUND_BUFFER_SIZE", 1..=65_536) {
        protocol.outbound_buffer_size = n;
    }

    if let Some(level) = var("GQLWS_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(raw) = var("GQLWS_LOG_FORMAT") {
        match parse_log_format(&raw) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "GQLWS_LOG_FORMAT", value = %raw, "unknown log format, ignoring"),
        }
    }
}

/// Parse a log format name (`pretty`/`text` or `json`, any case).
pub fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "pretty" | "text" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse `raw` as a number inside `range`.
pub fn parse_in_range<T>(raw: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| range.contains(n))
}

fn env_in_range<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    range: RangeInclusive<T>,
) -> Option<T>
where
    T: FromStr + PartialOrd + Display + Clone,
{
    let raw = var(name)?;
    let parsed = parse_in_range(&raw, range.clone());
    if parsed.is_none() {
        warn!(
            key = name,
            value = %raw,
            min = %range.start(),
            max = %range.end(),
            "env override out of range or not a number, ignoring"
        );
    }
    parsed
}
