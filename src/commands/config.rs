use anyhow::anyhow;

use crate::config::{self, AppConfig, CONFIG_KEYS};
use crate::context::AppContext;

/// Re-resolve after a change to `key`. Other values, including a
/// `--api-base` override, are left as they were.
fn reload(ctx: &mut AppContext, key: &str) {
    let fresh = AppConfig::load(ctx.config.data_dir.clone(), &ctx.db);
    if key == "api_base" {
        ctx.config = fresh;
    } else {
        let api_base = std::mem::take(&mut ctx.config.api_base);
        ctx.config = AppConfig {
            api_base,
            api_base_from_cli: ctx.config.api_base_from_cli,
            ..fresh
        };
    }
}

fn line(ctx: &AppContext, key: &str) -> Option<String> {
    let (value, source) = ctx.config.describe(&ctx.db, key)?;
    Some(format!("{key:<16} {value}  ({})", source.as_str()))
}

pub fn get(ctx: &AppContext, key: &str) -> anyhow::Result<String> {
    line(ctx, key).ok_or_else(|| anyhow!("Unknown setting '{key}'"))
}

pub fn list(ctx: &AppContext) -> String {
    let mut out: Vec<String> = CONFIG_KEYS
        .iter()
        .filter_map(|(key, _)| line(ctx, key))
        .collect();
    out.push(format!("{:<16} {}", "data_dir", ctx.config.data_dir.display()));
    out.join("\n")
}

pub fn set(ctx: &mut AppContext, key: &str, value: &str) -> anyhow::Result<String> {
    config::store_setting(&ctx.db, key, value).map_err(|e| anyhow!(e))?;
    reload(ctx, key);
    let shown = line(ctx, key).unwrap_or_default();
    match config::env_var_for(key).filter(|name| std::env::var(name).is_ok()) {
        Some(env) => Ok(format!("{shown}\nNote: {env} is set and takes precedence")),
        None => Ok(shown),
    }
}

pub fn unset(ctx: &mut AppContext, key: &str) -> anyhow::Result<String> {
    config::remove_setting(&ctx.db, key).map_err(|e| anyhow!(e))?;
    reload(ctx, key);
    get(ctx, key)
}
