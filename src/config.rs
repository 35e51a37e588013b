//! Runtime configuration.
//!
//! Each value resolves from its environment variable first, then from the
//! `config` category of `local_settings`, then from the built-in default.
//! The data directory is environment-only because the store lives inside it.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::db::{self, DbState};
use crate::grouping::{GroupingMode, DEFAULT_GROUP_WINDOW_MS};
use crate::scaling::ScalingRule;

pub const CONFIG_CATEGORY: &str = "config";
pub const DEFAULT_API_BASE: &str = "http://localhost:4000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const APP_DIR_NAME: &str = "catering-desk";

/// Setting keys accepted by `config set`, with their environment variables.
pub const CONFIG_KEYS: &[(&str, &str)] = &[
    ("api_base", "CATERING_API_BASE"),
    ("timeout_secs", "CATERING_TIMEOUT_SECS"),
    ("group_window_ms", "CATERING_GROUP_WINDOW_MS"),
    ("grouping_mode", "CATERING_GROUPING_MODE"),
    ("scaling_rule", "CATERING_SCALING_RULE"),
    ("slip_warnings", "CATERING_SLIP_WARNINGS"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base: String,
    pub data_dir: PathBuf,
    pub timeout: Duration,
    pub group_window_ms: i64,
    pub grouping_mode: GroupingMode,
    pub scaling_rule: ScalingRule,
    /// Print the skipped-line footnote on slips.
    pub slip_warnings: bool,
    /// `api_base` came from `--api-base` for this run.
    pub api_base_from_cli: bool,
}

impl AppConfig {
    pub fn defaults(data_dir: PathBuf) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            data_dir,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            group_window_ms: DEFAULT_GROUP_WINDOW_MS,
            grouping_mode: GroupingMode::default(),
            scaling_rule: ScalingRule::default(),
            slip_warnings: true,
            api_base_from_cli: false,
        }
    }

    /// Resolve every key through `lookup`, which already applies the
    /// env-then-store precedence. Invalid values are logged and ignored.
    pub fn resolve(data_dir: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::defaults(data_dir);

        if let Some(v) = lookup("api_base") {
            cfg.api_base = v;
        }
        if let Some(v) = lookup("timeout_secs") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => cfg.timeout = Duration::from_secs(secs),
                _ => warn!(value = %v, "ignoring invalid timeout_secs"),
            }
        }
        if let Some(v) = lookup("group_window_ms") {
            match v.parse::<i64>() {
                Ok(ms) if ms >= 0 => cfg.group_window_ms = ms,
                _ => warn!(value = %v, "ignoring invalid group_window_ms"),
            }
        }
        if let Some(v) = lookup("grouping_mode") {
            match GroupingMode::parse(&v) {
                Some(mode) => cfg.grouping_mode = mode,
                None => warn!(value = %v, "ignoring invalid grouping_mode"),
            }
        }
        if let Some(v) = lookup("scaling_rule") {
            match ScalingRule::parse(&v) {
                Some(rule) => cfg.scaling_rule = rule,
                None => warn!(value = %v, "ignoring invalid scaling_rule"),
            }
        }
        if let Some(v) = lookup("slip_warnings") {
            match parse_bool(&v) {
                Some(flag) => cfg.slip_warnings = flag,
                None => warn!(value = %v, "ignoring invalid slip_warnings"),
            }
        }

        cfg
    }

    /// Load using process environment and the local store.
    pub fn load(data_dir: PathBuf, store: &DbState) -> Self {
        Self::resolve(data_dir, |key| {
            env_value(key).or_else(|| stored_value(store, key))
        })
    }
}

pub fn env_var_for(key: &str) -> Option<&'static str> {
    CONFIG_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, env)| *env)
}

fn env_value(key: &str) -> Option<String> {
    env_var_for(key)
        .and_then(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn stored_value(store: &DbState, key: &str) -> Option<String> {
    let conn = store.conn.lock().ok()?;
    db::get_setting(&conn, CONFIG_CATEGORY, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validate and persist a setting for `config set`.
pub fn store_setting(store: &DbState, key: &str, value: &str) -> Result<(), String> {
    if env_var_for(key).is_none() {
        let known: Vec<&str> = CONFIG_KEYS.iter().map(|(k, _)| *k).collect();
        return Err(format!(
            "Unknown setting '{key}'. Known settings: {}",
            known.join(", ")
        ));
    }
    let value = value.trim();
    let valid = match key {
        "api_base" => !crate::api::normalize_api_base(value).is_empty(),
        "timeout_secs" => value.parse::<u64>().map(|v| v > 0).unwrap_or(false),
        "group_window_ms" => value.parse::<i64>().map(|v| v >= 0).unwrap_or(false),
        "grouping_mode" => GroupingMode::parse(value).is_some(),
        "scaling_rule" => ScalingRule::parse(value).is_some(),
        "slip_warnings" => parse_bool(value).is_some(),
        _ => false,
    };
    if !valid {
        return Err(format!("Invalid value for {key}: {value}"));
    }
    let conn = store.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, CONFIG_CATEGORY, key, value)
}

pub fn remove_setting(store: &DbState, key: &str) -> Result<(), String> {
    if env_var_for(key).is_none() {
        return Err(format!("Unknown setting '{key}'"));
    }
    let conn = store.conn.lock().map_err(|e| e.to_string())?;
    db::delete_setting(&conn, CONFIG_CATEGORY, key)
}

/// Where an effective setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Cli,
    Env,
    Stored,
    Default,
}

impl ValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueSource::Cli => "command line",
            ValueSource::Env => "env",
            ValueSource::Stored => "stored",
            ValueSource::Default => "default",
        }
    }
}

impl AppConfig {
    /// Effective value of a known key, formatted as `config set` accepts it.
    pub fn value_of(&self, key: &str) -> Option<String> {
        let value = match key {
            "api_base" => self.api_base.clone(),
            "timeout_secs" => self.timeout.as_secs().to_string(),
            "group_window_ms" => self.group_window_ms.to_string(),
            "grouping_mode" => self.grouping_mode.as_str().to_string(),
            "scaling_rule" => self.scaling_rule.as_str().to_string(),
            "slip_warnings" => self.slip_warnings.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Effective value and its source. `None` for unknown keys.
    pub fn describe(&self, store: &DbState, key: &str) -> Option<(String, ValueSource)> {
        let value = self.value_of(key)?;
        let source = if key == "api_base" && self.api_base_from_cli {
            ValueSource::Cli
        } else if env_value(key).is_some() {
            ValueSource::Env
        } else if stored_value(store, key).is_some() {
            ValueSource::Stored
        } else {
            ValueSource::Default
        };
        Some((value, source))
    }
}

/// Default data directory: `$CATERING_DATA_DIR`, else [`platform_data_dir`].
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CATERING_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir.trim());
        }
    }
    platform_data_dir()
}

/// Per-user data directory for this platform, joined with `catering-desk`.
pub fn platform_data_dir() -> PathBuf {
    if let Some(dir) = dirs_next::data_dir() {
        dir.join(APP_DIR_NAME)
    } else if let Some(dir) = dirs_next::data_local_dir() {
        dir.join(APP_DIR_NAME)
    } else {
        PathBuf::from(APP_DIR_NAME)
    }
}
