use anyhow::{anyhow, Context};

use crate::context::AppContext;
use crate::diagnostics;
use crate::reference::cancellable;
use crate::session;

pub async fn login(ctx: &mut AppContext, email: &str, password: &str) -> anyhow::Result<String> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(anyhow!("Email and password are required"));
    }
    let client = ctx.anonymous_client()?;
    let store = ctx.session_store();
    let new_session = cancellable(&ctx.cancel, session::login(&client, &store, email, password))
        .await
        .context("Login failed")?;
    let out = format!(
        "Logged in as {} ({})",
        new_session.email,
        new_session.role.as_str()
    );
    ctx.session = Some(new_session);
    Ok(out)
}

pub fn logout(ctx: &mut AppContext) -> anyhow::Result<String> {
    session::logout(&ctx.session_store()).map_err(|e| anyhow!(e))?;
    ctx.session = None;
    Ok("Logged out".to_string())
}

pub fn whoami(ctx: &AppContext) -> String {
    match &ctx.session {
        Some(s) => format!("{} ({})", s.email, s.role.as_str()),
        None => "Not logged in".to_string(),
    }
}

pub fn status(ctx: &AppContext) -> anyhow::Result<String> {
    let about = diagnostics::get_about_info();
    let store = diagnostics::get_store_status(&ctx.db).map_err(|e| anyhow!(e))?;
    let mut out = format!(
        "catering-desk {} ({}, built {})\n",
        about["version"].as_str().unwrap_or_default(),
        about["gitSha"].as_str().unwrap_or_default(),
        about["buildTimestamp"].as_str().unwrap_or_default(),
    );
    out.push_str(&format!("API base:       {}\n", ctx.config.api_base));
    out.push_str(&format!("Data dir:       {}\n", ctx.config.data_dir.display()));
    out.push_str(&format!(
        "Local store:    {} (schema v{})\n",
        store["dbPath"].as_str().unwrap_or_default(),
        store["schemaVersion"]
    ));
    let cached_groups = store["settings"][crate::grouping::GROUP_CACHE_CATEGORY]
        .as_i64()
        .unwrap_or(0);
    out.push_str(&format!("Cached groups:  {cached_groups}\n"));
    out.push_str(&format!("Session:        {}\n", whoami(ctx)));
    Ok(out)
}
