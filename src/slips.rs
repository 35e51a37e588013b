use chrono::Local;
use serde::Serialize;
use serde_json::Value;

use crate::aggregation::{AggregatedIngredients, Aggregator, CategoryIndex};
use crate::models::SlipBundle;
use crate::{value_f64, value_i64, value_str};

pub const DEFAULT_WIDTH: usize = 42;
/// Delay before the printable page raises the print dialog.
pub const PRINT_DELAY_MS: u64 = 300;

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct IngredientSlipDoc {
    pub order_id: i64,
    pub dish_name: String,
    pub requested_quantity: f64,
    pub requested_unit: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub ingredients: AggregatedIngredients,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct OrderSlipDoc {
    pub order_id: i64,
    pub dish_name: String,
    pub quantity: f64,
    pub unit: String,
    pub created_at: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct GroupMemberLine {
    pub order_id: i64,
    pub dish_name: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct GroupSlipDoc {
    pub primary_order_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub members: Vec<GroupMemberLine>,
    pub combined: AggregatedIngredients,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "doc", rename_all = "snake_case")]
pub enum SlipDocument {
    IngredientSlip(IngredientSlipDoc),
    OrderSlip(OrderSlipDoc),
    GroupSlip(GroupSlipDoc),
}

#[derive(Debug, Clone)]
pub struct SlipOptions {
    pub width: usize,
    /// Print the count of skipped lines under the ingredient table.
    pub show_warnings: bool,
    /// Footer timestamp; `None` means "now" in local time.
    pub generated_at: Option<String>,
}

impl Default for SlipOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            show_warnings: true,
            generated_at: None,
        }
    }
}

impl SlipOptions {
    fn footer(&self) -> String {
        let ts = self
            .generated_at
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        format!("Generated on {ts}")
    }
}

// ---------------------------------------------------------------------------
// Building documents from API payloads
// ---------------------------------------------------------------------------

fn opt_str(v: &Value, keys: &[&str]) -> Option<String> {
    value_str(v, keys)
}

impl IngredientSlipDoc {
    pub fn from_bundle(order_id: i64, bundle: &SlipBundle, index: &CategoryIndex) -> Self {
        let slip = &bundle.ingredient_slip;
        let mut agg = Aggregator::new();
        agg.add_slip(order_id, slip);
        Self {
            order_id: value_i64(slip, &["order_id", "id"]).unwrap_or(order_id),
            dish_name: opt_str(slip, &["dish_name", "dish"]).unwrap_or_default(),
            requested_quantity: value_f64(slip, &["requested_quantity", "quantity"]).unwrap_or(0.0),
            requested_unit: opt_str(slip, &["requested_unit", "unit"]).unwrap_or_default(),
            customer_name: opt_str(slip, &["customer_name"]),
            customer_phone: opt_str(slip, &["customer_phone"]),
            ingredients: agg.finish(index),
        }
    }
}

impl OrderSlipDoc {
    pub fn from_bundle(order_id: i64, bundle: &SlipBundle) -> Self {
        let slip = &bundle.order_slip;
        Self {
            order_id: value_i64(slip, &["order_id", "id"]).unwrap_or(order_id),
            dish_name: opt_str(slip, &["dish_name", "dish"]).unwrap_or_default(),
            quantity: value_f64(slip, &["quantity", "requested_quantity"]).unwrap_or(0.0),
            unit: opt_str(slip, &["unit", "requested_unit"]).unwrap_or_default(),
            created_at: opt_str(slip, &["created_at"]).unwrap_or_default(),
            customer_name: opt_str(slip, &["customer_name"]),
            customer_phone: opt_str(slip, &["customer_phone"]),
            customer_email: opt_str(slip, &["customer_email"]),
            customer_address: opt_str(slip, &["customer_address"]),
        }
    }
}

/// Combined slip for the members of one group, in member order.
///
/// A single member produces the plain ingredient slip so that the output is
/// the same as printing that order on its own.
pub fn build_group_slip(members: &[(i64, SlipBundle)], index: &CategoryIndex) -> SlipDocument {
    if let [(order_id, bundle)] = members {
        let doc = IngredientSlipDoc::from_bundle(*order_id, bundle, index);
        return SlipDocument::IngredientSlip(doc);
    }

    let mut agg = Aggregator::new();
    let mut lines = Vec::with_capacity(members.len());
    for (order_id, bundle) in members {
        let slip = &bundle.ingredient_slip;
        agg.add_slip(*order_id, slip);
        lines.push(GroupMemberLine {
            order_id: *order_id,
            dish_name: opt_str(slip, &["dish_name", "dish"]).unwrap_or_default(),
            quantity: value_f64(slip, &["requested_quantity", "quantity"]).unwrap_or(0.0),
            unit: opt_str(slip, &["requested_unit", "unit"]).unwrap_or_default(),
        });
    }

    let first = members.first().map(|(_, b)| &b.ingredient_slip);
    SlipDocument::GroupSlip(GroupSlipDoc {
        primary_order_id: members.first().map(|(id, _)| *id).unwrap_or_default(),
        customer_name: first.and_then(|s| opt_str(s, &["customer_name"])),
        customer_phone: first.and_then(|s| opt_str(s, &["customer_phone"])),
        members: lines,
        combined: agg.finish(index),
    })
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Up to 4 decimals, trailing zeros trimmed.
pub fn format_amount(value: f64) -> String {
    let mut s = format!("{value:.4}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Dishes measured in `kg` are shown per dish on slips.
pub fn dish_unit_label(unit: &str) -> &str {
    if unit.trim().eq_ignore_ascii_case("kg") {
        "dish"
    } else {
        unit.trim()
    }
}

fn dish_quantity(quantity: f64, unit: &str) -> String {
    let label = dish_unit_label(unit);
    if label.is_empty() {
        format_amount(quantity)
    } else {
        format!("{} {label}", format_amount(quantity))
    }
}

fn amount_with_unit(amount: f64, unit: &str) -> String {
    if unit.trim().is_empty() {
        format_amount(amount)
    } else {
        format!("{} {}", format_amount(amount), unit.trim())
    }
}

fn customer_label(name: Option<&str>, phone: Option<&str>) -> Option<String> {
    match (name, phone) {
        (Some(n), Some(p)) => Some(format!("{n} ({p})")),
        (Some(n), None) => Some(n.to_string()),
        (None, Some(p)) => Some(p.to_string()),
        (None, None) => None,
    }
}

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(8);
    let mut out = Vec::new();
    let mut line = String::new();
    for token in text.split_whitespace().flat_map(|t| split_long(t, width)) {
        if line.is_empty() {
            line.push_str(token);
            continue;
        }
        if line.chars().count() + 1 + token.chars().count() > width {
            out.push(std::mem::take(&mut line));
            line.push_str(token);
        } else {
            line.push(' ');
            line.push_str(token);
        }
    }
    if !line.is_empty() || out.is_empty() {
        out.push(line);
    }
    out
}

/// Hard-split a token wider than `width` into `width`-char pieces.
fn split_long(token: &str, width: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = token;
    while rest.chars().count() > width {
        let cut = rest
            .char_indices()
            .nth(width)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

/// `label` left, `value` right-aligned. Long labels wrap above the value;
/// a value too wide to share a line goes below the label.
fn pair(label: &str, value: &str, width: usize) -> String {
    let value_len = value.chars().count();
    let indent_len = label.len() - label.trim_start().len();
    let indent = &label[..indent_len];
    let fits_beside = value_len + 1 + indent_len + 8 <= width;
    let label_room = if fits_beside {
        width - value_len - 1 - indent_len
    } else {
        width.saturating_sub(indent_len)
    };
    let mut lines: Vec<String> = wrap(label, label_room)
        .into_iter()
        .map(|l| format!("{indent}{l}"))
        .collect();
    if !fits_beside {
        for chunk in wrap(value, width) {
            let pad = width.saturating_sub(chunk.chars().count());
            lines.push(format!("{}{chunk}", " ".repeat(pad)));
        }
        return lines.join("\n");
    }
    let last = lines.pop().unwrap_or_default();
    let pad = width.saturating_sub(last.chars().count() + value_len).max(1);
    lines.push(format!("{last}{}{value}", " ".repeat(pad)));
    lines.join("\n")
}

fn skipped_note(ingredients: &AggregatedIngredients) -> Option<String> {
    match ingredients.warnings.len() {
        0 => None,
        1 => Some("1 ingredient line skipped (incomplete data)".to_string()),
        n => Some(format!("{n} ingredient lines skipped (incomplete data)")),
    }
}

pub fn slip_title(document: &SlipDocument) -> String {
    match document {
        SlipDocument::IngredientSlip(doc) => format!("Ingredient Slip #{}", doc.order_id),
        SlipDocument::OrderSlip(doc) => format!("Order Slip #{}", doc.order_id),
        SlipDocument::GroupSlip(doc) => format!("Group Ingredient Slip #{}", doc.primary_order_id),
    }
}

/// File stem used when the printable page is written to disk.
pub fn slip_file_stem(document: &SlipDocument) -> String {
    match document {
        SlipDocument::IngredientSlip(doc) => format!("ingredient-slip-{}", doc.order_id),
        SlipDocument::OrderSlip(doc) => format!("order-slip-{}", doc.order_id),
        SlipDocument::GroupSlip(doc) => format!("group-slip-{}", doc.primary_order_id),
    }
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

fn text_ingredients(out: &mut Vec<String>, ingredients: &AggregatedIngredients, cfg: &SlipOptions) {
    let rule = "-".repeat(cfg.width);
    if ingredients.buckets.is_empty() {
        out.push("No ingredients".to_string());
    }
    for bucket in &ingredients.buckets {
        out.push(bucket.category.to_uppercase());
        for line in &bucket.lines {
            out.push(pair(
                &format!("  {}", line.name),
                &amount_with_unit(line.amount, &line.unit),
                cfg.width,
            ));
        }
    }
    if cfg.show_warnings {
        if let Some(note) = skipped_note(ingredients) {
            out.push(rule);
            out.push(format!("* {note}"));
        }
    }
}

pub fn render_text(document: &SlipDocument, cfg: &SlipOptions) -> String {
    let rule = "-".repeat(cfg.width);
    let mut out: Vec<String> = vec![slip_title(document).to_uppercase(), rule.clone()];

    match document {
        SlipDocument::IngredientSlip(doc) => {
            out.push(pair("Dish", &doc.dish_name, cfg.width));
            out.push(pair(
                "Quantity",
                &dish_quantity(doc.requested_quantity, &doc.requested_unit),
                cfg.width,
            ));
            if let Some(customer) =
                customer_label(doc.customer_name.as_deref(), doc.customer_phone.as_deref())
            {
                out.push(pair("Customer", &customer, cfg.width));
            }
            out.push(rule.clone());
            text_ingredients(&mut out, &doc.ingredients, cfg);
        }
        SlipDocument::OrderSlip(doc) => {
            out.push(pair("Dish", &doc.dish_name, cfg.width));
            out.push(pair("Quantity", &dish_quantity(doc.quantity, &doc.unit), cfg.width));
            if !doc.created_at.is_empty() {
                out.push(pair("Placed", &doc.created_at, cfg.width));
            }
            out.push(rule.clone());
            out.push("CUSTOMER".to_string());
            for (label, value) in [
                ("Name", &doc.customer_name),
                ("Phone", &doc.customer_phone),
                ("Email", &doc.customer_email),
            ] {
                if let Some(v) = value {
                    out.push(pair(label, v, cfg.width));
                }
            }
            if let Some(address) = &doc.customer_address {
                out.push("Address".to_string());
                out.extend(
                    wrap(address, cfg.width.saturating_sub(2))
                        .into_iter()
                        .map(|l| format!("  {l}")),
                );
            }
        }
        SlipDocument::GroupSlip(doc) => {
            let ids: Vec<String> = doc.members.iter().map(|m| format!("#{}", m.order_id)).collect();
            out.extend(wrap(&format!("Orders: {}", ids.join(", ")), cfg.width));
            if let Some(customer) =
                customer_label(doc.customer_name.as_deref(), doc.customer_phone.as_deref())
            {
                out.push(pair("Customer", &customer, cfg.width));
            }
            out.push(rule.clone());
            out.push("DISHES".to_string());
            for m in &doc.members {
                out.push(pair(
                    &format!("  {} (#{})", m.dish_name, m.order_id),
                    &dish_quantity(m.quantity, &m.unit),
                    cfg.width,
                ));
            }
            out.push(rule.clone());
            out.push("COMBINED INGREDIENTS".to_string());
            text_ingredients(&mut out, &doc.combined, cfg);
        }
    }

    out.push(rule);
    out.push(cfg.footer());
    let mut text = out.join("\n");
    text.push('\n');
    text
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

fn html_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<title>{}</title>
<style>
body {{
  font-family: ui-monospace, SFMono-Regular, Menlo, monospace;
  margin: 0; padding: 16px; background: #fff; color: #111; max-width: 480px;
}}
h1 {{ font-size: 16px; margin: 0 0 8px 0; }}
.line {{ display: flex; justify-content: space-between; gap: 8px; font-size: 12px; }}
.section {{ margin-top: 10px; border-top: 1px dashed #111; padding-top: 6px; }}
.section h3 {{ margin: 0 0 4px 0; font-size: 12px; text-transform: uppercase; }}
.note {{ color: #666; font-size: 10px; }}
.footer {{ margin-top: 12px; color: #666; font-size: 10px; text-align: center; }}
@media print {{ body {{ padding: 0; }} }}
</style>
</head>
<body>{}
<script>
window.addEventListener('load', function () {{
  setTimeout(function () {{ window.print(); }}, {});
}});
</script>
</body>
</html>"#,
        esc(title),
        body,
        PRINT_DELAY_MS
    )
}

fn html_line(label: &str, value: &str) -> String {
    format!(
        "<div class=\"line\"><span>{}</span><span>{}</span></div>",
        esc(label),
        esc(value)
    )
}

fn html_ingredients(body: &mut String, ingredients: &AggregatedIngredients, cfg: &SlipOptions) {
    if ingredients.buckets.is_empty() {
        body.push_str("<div class=\"section\"><div class=\"note\">No ingredients</div></div>");
    }
    for bucket in &ingredients.buckets {
        body.push_str(&format!("<div class=\"section\"><h3>{}</h3>", esc(&bucket.category)));
        for line in &bucket.lines {
            body.push_str(&html_line(&line.name, &amount_with_unit(line.amount, &line.unit)));
        }
        body.push_str("</div>");
    }
    if cfg.show_warnings {
        if let Some(note) = skipped_note(ingredients) {
            body.push_str(&format!("<div class=\"note\">* {}</div>", esc(&note)));
        }
    }
}

pub fn render_html(document: &SlipDocument, cfg: &SlipOptions) -> String {
    let title = slip_title(document);
    let mut body = format!("<h1>{}</h1>", esc(&title));

    match document {
        SlipDocument::IngredientSlip(doc) => {
            body.push_str(&html_line("Dish", &doc.dish_name));
            body.push_str(&html_line(
                "Quantity",
                &dish_quantity(doc.requested_quantity, &doc.requested_unit),
            ));
            if let Some(customer) =
                customer_label(doc.customer_name.as_deref(), doc.customer_phone.as_deref())
            {
                body.push_str(&html_line("Customer", &customer));
            }
            html_ingredients(&mut body, &doc.ingredients, cfg);
        }
        SlipDocument::OrderSlip(doc) => {
            body.push_str(&html_line("Dish", &doc.dish_name));
            body.push_str(&html_line("Quantity", &dish_quantity(doc.quantity, &doc.unit)));
            if !doc.created_at.is_empty() {
                body.push_str(&html_line("Placed", &doc.created_at));
            }
            body.push_str("<div class=\"section\"><h3>Customer</h3>");
            for (label, value) in [
                ("Name", &doc.customer_name),
                ("Phone", &doc.customer_phone),
                ("Email", &doc.customer_email),
                ("Address", &doc.customer_address),
            ] {
                if let Some(v) = value {
                    body.push_str(&html_line(label, v));
                }
            }
            body.push_str("</div>");
        }
        SlipDocument::GroupSlip(doc) => {
            let ids: Vec<String> = doc.members.iter().map(|m| format!("#{}", m.order_id)).collect();
            body.push_str(&html_line("Orders", &ids.join(", ")));
            if let Some(customer) =
                customer_label(doc.customer_name.as_deref(), doc.customer_phone.as_deref())
            {
                body.push_str(&html_line("Customer", &customer));
            }
            body.push_str("<div class=\"section\"><h3>Dishes</h3>");
            for m in &doc.members {
                body.push_str(&html_line(
                    &format!("{} (#{})", m.dish_name, m.order_id),
                    &dish_quantity(m.quantity, &m.unit),
                ));
            }
            body.push_str("</div>");
            html_ingredients(&mut body, &doc.combined, cfg);
        }
    }

    body.push_str(&format!("<div class=\"footer\">{}</div>", esc(&cfg.footer())));
    html_shell(&title, &body)
}
