//! Preview, place and list orders.

use std::collections::HashMap;

use anyhow::Context;

use crate::api::ApiClient;
use crate::cli::{overrides_map, DetailsArgs};
use crate::composer::{self, Checkout, CheckoutLine, OrderDraft};
use crate::context::AppContext;
use crate::error::ApiError;
use crate::grouping::{self, OrderGroup};
use crate::models::OrderSummary;
use crate::reference::{cancellable, ReferenceData};
use crate::scaling::{ScalePreview, ScalingRule};
use crate::session::Role;
use crate::slips::format_amount;

pub fn format_preview(preview: &ScalePreview) -> String {
    let mut out = format!(
        "{}: {} requested (base {} {})\n",
        preview.dish_name,
        format_amount(preview.requested_quantity),
        format_amount(preview.base_quantity),
        preview.base_unit
    );
    match (preview.rule, preview.factor) {
        (ScalingRule::Proportional, Some(f)) => {
            out.push_str(&format!("Scale factor: {}\n", format_amount(f)))
        }
        (ScalingRule::Proportional, None) => {
            out.push_str("Scale factor: n/a (base quantity is zero)\n")
        }
        (ScalingRule::PerUnit, _) => out.push_str("Scaling: per unit\n"),
    }
    out.push_str(&format!(
        "{:<6} {:<24} {:>10} {:>12} {:<6}\n",
        "ID", "Ingredient", "Per base", "Amount", "Unit"
    ));
    for line in &preview.lines {
        let marker = if line.overridden {
            format!("  (manual, computed {})", format_amount(line.computed_amount))
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{:<6} {:<24} {:>10} {:>12} {:<6}{marker}\n",
            line.ingredient_id,
            line.name,
            format_amount(line.amount_per_base),
            format_amount(line.scaled_amount),
            line.unit
        ));
    }
    out
}

fn order_line(order: &OrderSummary) -> String {
    format!(
        "#{:<6} {:<20} {:>8} {:<6} {:<18} {}",
        order.id,
        order.dish_name.as_deref().unwrap_or("-"),
        format_amount(order.requested_quantity),
        order.requested_unit,
        order.customer_name.as_deref().unwrap_or("-"),
        order.created_at
    )
}

/// Orders in group order; multi-order groups get a header line.
pub fn format_order_list(orders: &[OrderSummary], groups: &[OrderGroup]) -> String {
    if orders.is_empty() {
        return "No orders.".to_string();
    }
    let by_id: HashMap<i64, &OrderSummary> = orders.iter().map(|o| (o.id, o)).collect();
    let mut out = String::new();
    for group in groups {
        if group.size() > 1 {
            out.push_str(&format!(
                "Group #{} ({} orders)\n",
                group.primary_order_id,
                group.size()
            ));
            for id in &group.member_order_ids {
                if let Some(order) = by_id.get(id) {
                    out.push_str(&format!("  {}\n", order_line(order)));
                }
            }
        } else if let Some(order) = by_id.get(&group.primary_order_id) {
            out.push_str(&format!("{}\n", order_line(order)));
        }
    }
    out
}

async fn reference(ctx: &AppContext) -> anyhow::Result<(ApiClient, ReferenceData)> {
    let client = ctx.client_for(Role::User)?;
    let data = ReferenceData::load(&client, &ctx.cancel)
        .await
        .context("Loading reference data")?;
    Ok((client, data))
}

pub async fn preview(
    ctx: &AppContext,
    dish_id: i64,
    quantity: f64,
    overrides: &[(i64, String)],
) -> anyhow::Result<String> {
    let (_, data) = reference(ctx).await?;
    let draft = OrderDraft {
        dish_id: Some(dish_id),
        quantity,
        overrides: overrides_map(overrides),
        ..OrderDraft::default()
    };
    let preview = composer::preview_draft(&data, &draft, ctx.config.scaling_rule)?;
    Ok(format_preview(&preview))
}

#[allow(clippy::too_many_arguments)]
pub async fn place(
    ctx: &AppContext,
    dish_id: i64,
    customer_id: i64,
    quantity: f64,
    unit: Option<String>,
    overrides: &[(i64, String)],
    details: DetailsArgs,
) -> anyhow::Result<String> {
    let (client, data) = reference(ctx).await?;
    let draft = OrderDraft {
        dish_id: Some(dish_id),
        customer_id: Some(customer_id),
        quantity,
        unit,
        overrides: overrides_map(overrides),
        details: details.into(),
    };
    let order_id = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(ApiError::Cancelled.into()),
        res = composer::place_order(&client, &data, &draft, ctx.config.scaling_rule) => res?,
    };
    Ok(format!("Order #{order_id} created"))
}

pub async fn checkout(
    ctx: &AppContext,
    customer_id: i64,
    lines: Vec<CheckoutLine>,
    details: DetailsArgs,
) -> anyhow::Result<String> {
    let (client, data) = reference(ctx).await?;
    let cart = Checkout {
        customer_id: Some(customer_id),
        lines,
        details: details.into(),
    };
    let cache = ctx.group_cache();
    let outcome = composer::checkout(
        &client,
        &data,
        &cart,
        ctx.config.scaling_rule,
        &cache,
        &ctx.cancel,
    )
    .await?;

    let ids: Vec<String> = outcome.order_ids.iter().map(|id| format!("#{id}")).collect();
    let mut out = format!("Created {} order(s): {}\n", ids.len(), ids.join(", "));
    if let Some(group) = &outcome.group {
        out.push_str(&format!(
            "Grouped under #{}; print with `slip group {}`\n",
            group.primary_order_id, group.primary_order_id
        ));
    }
    out.push_str(&format!("Reference: {}", outcome.correlation_id));
    Ok(out)
}

pub async fn list(ctx: &AppContext) -> anyhow::Result<String> {
    let client = ctx.client_for(Role::User)?;
    let orders = cancellable(&ctx.cancel, client.orders())
        .await
        .context("Loading orders")?;
    let groups = grouping::detect_groups(
        &orders,
        ctx.config.group_window_ms,
        ctx.config.grouping_mode,
    );
    ctx.group_cache().remember_all(&groups);
    Ok(format_order_list(&orders, &groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::PreviewLine;

    fn order(id: i64, dish: &str, created_at: &str) -> OrderSummary {
        OrderSummary {
            id,
            dish_name: Some(dish.into()),
            customer_id: 7,
            customer_name: Some("Asha".into()),
            requested_quantity: 5.0,
            requested_unit: "kg".into(),
            created_at: created_at.into(),
            ..OrderSummary::default()
        }
    }

    #[test]
    fn preview_marks_manual_amounts() {
        let preview = ScalePreview {
            dish_id: 1,
            dish_name: "Biryani".into(),
            base_quantity: 10.0,
            base_unit: "kg".into(),
            requested_quantity: 5.0,
            rule: ScalingRule::Proportional,
            factor: Some(0.5),
            lines: vec![
                PreviewLine {
                    ingredient_id: 11,
                    name: "Rice".into(),
                    amount_per_base: 3.0,
                    computed_amount: 1.5,
                    scaled_amount: 1.5,
                    unit: "kg".into(),
                    overridden: false,
                },
                PreviewLine {
                    ingredient_id: 12,
                    name: "Ghee".into(),
                    amount_per_base: 0.4,
                    computed_amount: 0.2,
                    scaled_amount: 0.25,
                    unit: "kg".into(),
                    overridden: true,
                },
            ],
        };
        let out = format_preview(&preview);
        assert!(out.contains("Scale factor: 0.5"));
        assert!(out.contains("(manual, computed 0.2)"));
        assert_eq!(out.matches("manual").count(), 1);
    }

    #[test]
    fn order_list_nests_group_members() {
        let orders = vec![
            order(1, "Biryani", "2025-03-01 10:00:00"),
            order(2, "Raita", "2025-03-01 10:00:04"),
            order(3, "Kheer", "2025-03-01 12:00:00"),
        ];
        let groups = grouping::detect_groups(&orders, 10_000, grouping::GroupingMode::Transitive);
        let out = format_order_list(&orders, &groups);
        assert!(out.starts_with("Group #1 (2 orders)\n  #1"));
        assert!(out.contains("\n  #2"));
        assert!(out.contains("\n#3"));
        assert_eq!(format_order_list(&[], &[]), "No orders.");
    }
}
