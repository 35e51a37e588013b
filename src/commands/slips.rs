//! Slip commands: fetch, build, then render as text, HTML or a printable page.

use std::collections::HashMap;

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::cli::{OutputArgs, SlipKind};
use crate::context::AppContext;
use crate::error::ApiError;
use crate::grouping;
use crate::models::SlipBundle;
use crate::print;
use crate::reference::{cancellable, ReferenceData};
use crate::session::Role;
use crate::slips::{self, IngredientSlipDoc, OrderSlipDoc, SlipDocument};

/// Fetch the slip bundle of every member concurrently. Results come back in
/// `member_ids` order regardless of completion order; the first failure or
/// a cancellation aborts the remaining requests.
pub async fn fetch_member_slips(
    client: &ApiClient,
    member_ids: &[i64],
    cancel: &CancellationToken,
) -> Result<Vec<(i64, SlipBundle)>, ApiError> {
    let mut set = JoinSet::new();
    for &order_id in member_ids {
        let client = client.clone();
        set.spawn(async move { (order_id, client.order_slips(order_id).await) });
    }

    let mut fetched: HashMap<i64, SlipBundle> = HashMap::with_capacity(member_ids.len());
    let collect = async {
        while let Some(joined) = set.join_next().await {
            let (order_id, result) =
                joined.map_err(|e| ApiError::InvalidResponse(format!("slip task failed: {e}")))?;
            debug!(order_id, ok = result.is_ok(), "member slip fetched");
            fetched.insert(order_id, result?);
        }
        Ok::<(), ApiError>(())
    };
    // Dropping the set on error aborts whatever is still in flight.
    cancellable(cancel, collect).await?;

    Ok(member_ids
        .iter()
        .filter_map(|id| fetched.remove(id).map(|bundle| (*id, bundle)))
        .collect())
}

async fn ingredient_slip(
    ctx: &AppContext,
    client: &ApiClient,
    order_id: i64,
) -> anyhow::Result<SlipDocument> {
    let (data, bundle) = tokio::try_join!(
        ReferenceData::load(client, &ctx.cancel),
        cancellable(&ctx.cancel, client.order_slips(order_id)),
    )
    .with_context(|| format!("Loading slip for order #{order_id}"))?;
    Ok(SlipDocument::IngredientSlip(IngredientSlipDoc::from_bundle(
        order_id,
        &bundle,
        &data.category_index(),
    )))
}

async fn order_slip(
    ctx: &AppContext,
    client: &ApiClient,
    order_id: i64,
) -> anyhow::Result<SlipDocument> {
    let bundle = cancellable(&ctx.cancel, client.order_slips(order_id))
        .await
        .with_context(|| format!("Loading slip for order #{order_id}"))?;
    Ok(SlipDocument::OrderSlip(OrderSlipDoc::from_bundle(order_id, &bundle)))
}

async fn group_slip(
    ctx: &AppContext,
    client: &ApiClient,
    order_id: i64,
) -> anyhow::Result<SlipDocument> {
    let (orders, data) = tokio::try_join!(
        cancellable(&ctx.cancel, client.orders()),
        ReferenceData::load(client, &ctx.cancel),
    )
    .context("Loading orders")?;
    if !orders.iter().any(|o| o.id == order_id) {
        anyhow::bail!("Order #{order_id} not found");
    }

    let group = grouping::resolve_group(
        order_id,
        &orders,
        &ctx.group_cache(),
        ctx.config.group_window_ms,
        ctx.config.grouping_mode,
    );
    info!(
        order_id,
        primary = group.primary_order_id,
        members = group.size(),
        "printing group slip"
    );

    let members = fetch_member_slips(client, &group.member_order_ids, &ctx.cancel)
        .await
        .context("Loading member slips")?;
    Ok(slips::build_group_slip(&members, &data.category_index()))
}

fn emit(ctx: &AppContext, document: &SlipDocument, output: &OutputArgs) -> anyhow::Result<String> {
    let options = ctx.slip_options();
    if output.print {
        let outcome = print::print_slip(document, &options, &ctx.config.data_dir, !output.no_open)
            .map_err(|e| anyhow::anyhow!(e))?;
        let verb = if outcome.opened { "Opened" } else { "Wrote" };
        return Ok(format!("{verb} {}", outcome.path.display()));
    }
    if output.html {
        return Ok(slips::render_html(document, &options));
    }
    Ok(slips::render_text(document, &options))
}

pub async fn run(ctx: &AppContext, kind: SlipKind) -> anyhow::Result<String> {
    let client = ctx.client_for(Role::User)?;
    let (document, output) = match kind {
        SlipKind::Ingredient { order_id, output } => {
            (ingredient_slip(ctx, &client, order_id).await?, output)
        }
        SlipKind::Order { order_id, output } => (order_slip(ctx, &client, order_id).await?, output),
        SlipKind::Group { order_id, output } => (group_slip(ctx, &client, order_id).await?, output),
    };
    emit(ctx, &document, &output)
}
