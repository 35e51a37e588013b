use anyhow::{anyhow, Context};

use crate::context::AppContext;
use crate::reference::cancellable;
use crate::reports::{format_report, ReportRange};
use crate::session::Role;

pub fn parse_range(raw: &str) -> anyhow::Result<ReportRange> {
    ReportRange::parse(raw)
        .ok_or_else(|| anyhow!("Unknown report range '{raw}'; use daily, monthly or yearly"))
}

pub async fn run(ctx: &AppContext, range: &str) -> anyhow::Result<String> {
    let range = parse_range(range)?;
    let client = ctx.client_for(Role::Admin)?;
    let report = cancellable(&ctx.cancel, client.report(range))
        .await
        .with_context(|| format!("Loading {} report", range.as_str()))?;
    Ok(format_report(range, &report))
}
