//! Wire types for the catering REST API.
//!
//! Field names follow the API's snake_case JSON. Optional fields default so
//! that older server builds that omit them still deserialize.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Lenient numbers
// ---------------------------------------------------------------------------

// NUMERIC columns come back as strings and empty aggregates as null, so
// amounts and money accept a number, a numeric string or null.

fn number_from(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("expected a number, got \"{s}\"")),
        other => Err(format!("expected a number, got {other}")),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(d)?;
    number_from(&value)
        .map(|n| n.unwrap_or(0.0))
        .map_err(serde::de::Error::custom)
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(d)?;
    number_from(&value).map_err(serde::de::Error::custom)
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(d)?;
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    number_from(&value)
        .map(|n| n.map(|f| f.round() as i64).unwrap_or(0))
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DishIngredient {
    pub ingredient_id: i64,
    #[serde(default)]
    pub ingredient_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount_per_base: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dish {
    pub id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub base_quantity: f64,
    #[serde(default)]
    pub base_unit: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub price_per_base: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub cost_per_base: Option<f64>,
    #[serde(default)]
    pub ingredients: Vec<DishIngredient>,
}

impl Dish {
    pub fn is_orderable(&self) -> bool {
        !self.ingredients.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// One row of `GET /orders`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderSummary {
    pub id: i64,
    #[serde(default)]
    pub dish_id: Option<i64>,
    #[serde(default)]
    pub dish_name: Option<String>,
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub requested_quantity: f64,
    #[serde(default)]
    pub requested_unit: String,
    pub created_at: String,
}

impl OrderSummary {
    /// `created_at` as unix milliseconds. Accepts RFC 3339 and the
    /// `YYYY-MM-DD HH:MM:SS` form SQLite-backed servers emit (read as UTC).
    pub fn created_at_ms(&self) -> Option<i64> {
        parse_timestamp_ms(&self.created_at)
    }
}

pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

/// A computed (or overridden) ingredient amount sent with an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaledLine {
    pub ingredient_id: i64,
    pub scaled_amount: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CreateOrderRequest {
    pub dish_id: i64,
    pub customer_id: i64,
    pub requested_quantity: f64,
    pub requested_unit: String,
    pub overrides: Vec<ScaledLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewIngredient {
    pub name: String,
    pub category_id: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct NewCustomer {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewDishIngredient {
    pub ingredient_id: i64,
    pub amount_per_base: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct NewDish {
    pub name: String,
    pub base_quantity: f64,
    pub base_unit: String,
    pub price_per_base: Option<f64>,
    pub cost_per_base: Option<f64>,
    pub ingredients: Vec<NewDishIngredient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub role: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

/// `GET /orders/:id/slips`. Both halves are kept as raw JSON; item lines in
/// particular vary in shape between server versions and are parsed leniently
/// by [`crate::aggregation`].
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SlipBundle {
    #[serde(default)]
    pub ingredient_slip: serde_json::Value,
    #[serde(default)]
    pub order_slip: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportRow {
    pub period: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub orders_count: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub revenue: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub profit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportTotals {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub orders_count: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub revenue: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub profit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportResponse {
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub totals: ReportTotals,
}
