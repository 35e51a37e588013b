//! Revenue/cost/profit reports computed by the API.

use crate::models::{ReportResponse, ReportRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportRange {
    #[default]
    Daily,
    Monthly,
    Yearly,
}

impl ReportRange {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn row_line(period: &str, orders: i64, revenue: f64, cost: f64, profit: f64) -> String {
    format!(
        "{period:<12} {orders:>7} {:>12} {:>12} {:>12}",
        money(revenue),
        money(cost),
        money(profit)
    )
}

/// Format rows and totals as a fixed-width table.
pub fn format_report(range: ReportRange, report: &ReportResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("Report ({})\n", range.as_str()));
    out.push_str(&format!(
        "{:<12} {:>7} {:>12} {:>12} {:>12}\n",
        "Period", "Orders", "Revenue", "Cost", "Profit"
    ));
    out.push_str(&"-".repeat(59));
    out.push('\n');

    if report.rows.is_empty() {
        out.push_str("No orders in this range.\n");
    }
    for ReportRow {
        period,
        orders_count,
        revenue,
        cost,
        profit,
    } in &report.rows
    {
        out.push_str(&row_line(period, *orders_count, *revenue, *cost, *profit));
        out.push('\n');
    }

    out.push_str(&"-".repeat(59));
    out.push('\n');
    let t = &report.totals;
    out.push_str(&row_line("Total", t.orders_count, t.revenue, t.cost, t.profit));
    out.push('\n');
    out
}
