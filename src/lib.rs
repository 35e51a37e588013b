//! Catering Desk
//!
//! Command-line client for a small catering business. Staff log in against
//! the catering REST API, compose orders whose ingredient lists scale with the
//! requested quantity, and print ingredient and order slips. Orders placed by
//! the same customer within a few seconds are treated as one multi-dish order
//! and get a combined, category-bucketed ingredient slip.

use std::path::Path;

use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub mod aggregation;
pub mod api;
pub mod cli;
pub mod commands;
pub mod composer;
pub mod config;
pub mod context;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod grouping;
pub mod models;
pub mod print;
pub mod reference;
pub mod reports;
pub mod scaling;
pub mod session;
pub mod slips;
pub mod storage;

const DEFAULT_LOG_FILTER: &str = "warn,catering_desk=info";

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// First non-blank string under any of `keys`.
pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// First number under any of `keys`. Numeric strings count.
pub(crate) fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match v.get(*key) {
            Some(serde_json::Value::Number(n)) => return n.as_f64(),
            Some(serde_json::Value::String(s)) => {
                if let Ok(n) = s.trim().parse::<f64>() {
                    return Some(n);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match v.get(*key) {
            Some(serde_json::Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i);
                }
            }
            Some(serde_json::Value::String(s)) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the console (stderr) and daily rolling file layers.
///
/// Files go to `<data_dir>/logs/desk.YYYY-MM-DD`; only the newest
/// [`diagnostics::MAX_LOG_FILES`] are kept. The console only shows warnings
/// unless `RUST_LOG` is set, which then drives both layers.
pub fn init_logging(data_dir: &Path) {
    let (env_filter, console_level) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, LevelFilter::TRACE),
        Err(_) => (EnvFilter::new(DEFAULT_LOG_FILTER), LevelFilter::WARN),
    };

    let log_dir = diagnostics::get_log_dir(data_dir);
    std::fs::create_dir_all(&log_dir).ok();
    diagnostics::prune_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_level);
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    // The process exits right after the command; keep the writer alive until then.
    std::mem::forget(guard);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        "catering desk starting"
    );
}
