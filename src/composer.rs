//! Order composition and submission.
//!
//! Validates a draft against the loaded reference data, scales the dish and
//! posts the order. A checkout places several dishes for one customer and
//! records the created orders as one group directly in the local cache.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::error::{DeskError, DeskResult, ValidationError};
use crate::grouping::{GroupCache, OrderGroup};
use crate::models::{CreateOrderRequest, Dish};
use crate::reference::{cancellable, ReferenceData};
use crate::scaling::{self, OverrideMap, ScalePreview, ScalingRule};

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// Optional booking and delivery metadata carried with an order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderDetails {
    pub booking_date: Option<String>,
    pub booking_time: Option<String>,
    pub delivery_date: Option<String>,
    pub delivery_time: Option<String>,
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderDraft {
    pub dish_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub quantity: f64,
    /// Defaults to the dish's base unit.
    pub unit: Option<String>,
    pub overrides: OverrideMap,
    pub details: OrderDetails,
}

fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn validate_date(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| ValidationError::InvalidField {
            field,
            value: raw.to_string(),
        })
}

pub fn validate_time(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| ValidationError::InvalidField {
            field,
            value: raw.to_string(),
        })
}

impl OrderDetails {
    /// Trimmed, format-checked copy. Blank values become `None`.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        Ok(Self {
            booking_date: blank_to_none(&self.booking_date)
                .map(|v| validate_date("booking date", &v))
                .transpose()?,
            booking_time: blank_to_none(&self.booking_time)
                .map(|v| validate_time("booking time", &v))
                .transpose()?,
            delivery_date: blank_to_none(&self.delivery_date)
                .map(|v| validate_date("delivery date", &v))
                .transpose()?,
            delivery_time: blank_to_none(&self.delivery_time)
                .map(|v| validate_time("delivery time", &v))
                .transpose()?,
            delivery_address: blank_to_none(&self.delivery_address),
        })
    }
}

fn resolve_dish<'a>(
    data: &'a ReferenceData,
    dish_id: Option<i64>,
) -> Result<&'a Dish, ValidationError> {
    let id = dish_id.ok_or(ValidationError::MissingDish)?;
    data.find_dish(id).ok_or_else(|| ValidationError::InvalidField {
        field: "dish",
        value: id.to_string(),
    })
}

/// Preview the scaled ingredient table for a draft. Only the dish is required.
pub fn preview_draft(
    data: &ReferenceData,
    draft: &OrderDraft,
    rule: ScalingRule,
) -> Result<ScalePreview, ValidationError> {
    let dish = resolve_dish(data, draft.dish_id)?;
    scaling::preview(dish, draft.quantity, &draft.overrides, rule)
}

/// Validate `draft` and build the request body.
pub fn build_request(
    data: &ReferenceData,
    draft: &OrderDraft,
    rule: ScalingRule,
) -> Result<CreateOrderRequest, ValidationError> {
    let dish = resolve_dish(data, draft.dish_id)?;
    let customer_id = draft.customer_id.ok_or(ValidationError::MissingCustomer)?;
    if data.find_customer(customer_id).is_none() {
        return Err(ValidationError::InvalidField {
            field: "customer",
            value: customer_id.to_string(),
        });
    }
    if !draft.quantity.is_finite() || draft.quantity <= 0.0 {
        return Err(ValidationError::InvalidQuantity);
    }
    if !dish.is_orderable() {
        return Err(ValidationError::DishNotOrderable(dish.name.clone()));
    }

    let preview = scaling::preview(dish, draft.quantity, &draft.overrides, rule)?;
    if rule == ScalingRule::Proportional && preview.factor.is_none() {
        return Err(ValidationError::InvalidField {
            field: "base quantity",
            value: scaling_base_label(dish),
        });
    }
    let details = draft.details.validated()?;

    Ok(CreateOrderRequest {
        dish_id: dish.id,
        customer_id,
        requested_quantity: draft.quantity,
        requested_unit: blank_to_none(&draft.unit).unwrap_or_else(|| dish.base_unit.clone()),
        overrides: preview.to_scaled_lines(),
        booking_date: details.booking_date,
        booking_time: details.booking_time,
        delivery_date: details.delivery_date,
        delivery_time: details.delivery_time,
        delivery_address: details.delivery_address,
    })
}

fn scaling_base_label(dish: &Dish) -> String {
    format!("{} {} for {}", dish.base_quantity, dish.base_unit, dish.name)
}

/// Validate, then `POST /orders`. Returns the created order id.
pub async fn place_order(
    client: &ApiClient,
    data: &ReferenceData,
    draft: &OrderDraft,
    rule: ScalingRule,
) -> DeskResult<i64> {
    let request = build_request(data, draft, rule)?;
    let order_id = client.create_order(&request).await?;
    info!(
        order_id,
        dish_id = request.dish_id,
        customer_id = request.customer_id,
        quantity = request.requested_quantity,
        "order placed"
    );
    Ok(order_id)
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CheckoutLine {
    pub dish_id: i64,
    pub quantity: f64,
    pub unit: Option<String>,
    pub overrides: OverrideMap,
}

#[derive(Debug, Clone, Default)]
pub struct Checkout {
    pub customer_id: Option<i64>,
    pub lines: Vec<CheckoutLine>,
    pub details: OrderDetails,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutOutcome {
    pub correlation_id: String,
    pub order_ids: Vec<i64>,
    /// Present when more than one order was created.
    pub group: Option<OrderGroup>,
}

/// Submission stopped part-way through a checkout.
#[derive(Debug, Error)]
#[error(
    "Checkout stopped at line {}: {source} ({} order(s) created: {:?})",
    .failed_line + 1,
    .created.len(),
    .created
)]
pub struct CheckoutError {
    /// Zero-based index of the line that failed.
    pub failed_line: usize,
    /// Orders created before the failure, in line order.
    pub created: Vec<i64>,
    #[source]
    pub source: DeskError,
}

impl Checkout {
    fn drafts(&self) -> impl Iterator<Item = OrderDraft> + '_ {
        self.lines.iter().map(|line| OrderDraft {
            dish_id: Some(line.dish_id),
            customer_id: self.customer_id,
            quantity: line.quantity,
            unit: line.unit.clone(),
            overrides: line.overrides.clone(),
            details: self.details.clone(),
        })
    }
}

/// Validate every line, then submit them one by one.
///
/// Nothing is sent when any line fails validation. A submission failure stops
/// the checkout; the orders already created are reported and, when there are
/// at least two, still cached as a group. Cancellation counts as a failure of
/// the line in flight.
pub async fn checkout(
    client: &ApiClient,
    data: &ReferenceData,
    cart: &Checkout,
    rule: ScalingRule,
    cache: &GroupCache<'_>,
    cancel: &CancellationToken,
) -> Result<CheckoutOutcome, CheckoutError> {
    if cart.lines.is_empty() {
        return Err(CheckoutError {
            failed_line: 0,
            created: Vec::new(),
            source: ValidationError::MissingDish.into(),
        });
    }

    let mut requests = Vec::with_capacity(cart.lines.len());
    for (idx, draft) in cart.drafts().enumerate() {
        let request = build_request(data, &draft, rule).map_err(|e| CheckoutError {
            failed_line: idx,
            created: Vec::new(),
            source: e.into(),
        })?;
        requests.push(request);
    }

    let correlation_id = Uuid::new_v4().to_string();
    info!(correlation_id = %correlation_id, lines = requests.len(), "checkout started");

    let mut created = Vec::with_capacity(requests.len());
    for (idx, request) in requests.iter().enumerate() {
        match cancellable(cancel, client.create_order(request)).await {
            Ok(order_id) => {
                info!(
                    correlation_id = %correlation_id,
                    line = idx + 1,
                    order_id,
                    "checkout line placed"
                );
                created.push(order_id);
            }
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    line = idx + 1,
                    created = created.len(),
                    error = %e,
                    "checkout stopped"
                );
                remember_checkout_group(cache, &created);
                return Err(CheckoutError {
                    failed_line: idx,
                    created,
                    source: e.into(),
                });
            }
        }
    }

    let group = remember_checkout_group(cache, &created);
    info!(correlation_id = %correlation_id, orders = ?created, "checkout complete");
    Ok(CheckoutOutcome {
        correlation_id,
        order_ids: created,
        group,
    })
}

fn remember_checkout_group(cache: &GroupCache<'_>, created: &[i64]) -> Option<OrderGroup> {
    let (&primary, _) = created.split_first()?;
    if created.len() < 2 {
        return None;
    }
    let group = OrderGroup {
        primary_order_id: primary,
        member_order_ids: created.to_vec(),
    };
    if let Err(e) = cache.put(&group) {
        warn!(primary, error = %e, "failed to cache checkout group");
    }
    Some(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_server::{serve, Canned};
    use crate::models::{Customer, DishIngredient};

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    fn data() -> ReferenceData {
        ReferenceData {
            dishes: vec![
                Dish {
                    id: 1,
                    name: "Biryani".into(),
                    base_quantity: 10.0,
                    base_unit: "kg".into(),
                    ingredients: vec![DishIngredient {
                        ingredient_id: 11,
                        ingredient_name: Some("Rice".into()),
                        amount_per_base: 3.0,
                        unit: "kg".into(),
                    }],
                    ..Dish::default()
                },
                Dish {
                    id: 2,
                    name: "Empty Plate".into(),
                    base_quantity: 1.0,
                    base_unit: "plate".into(),
                    ..Dish::default()
                },
            ],
            customers: vec![Customer {
                id: 7,
                name: "Asha".into(),
                ..Customer::default()
            }],
            ..ReferenceData::default()
        }
    }

    fn draft() -> OrderDraft {
        OrderDraft {
            dish_id: Some(1),
            customer_id: Some(7),
            quantity: 5.0,
            ..OrderDraft::default()
        }
    }

    #[test]
    fn builds_request_with_scaled_overrides() {
        let req = build_request(&data(), &draft(), ScalingRule::Proportional).expect("request");
        assert_eq!(req.requested_unit, "kg");
        assert_eq!(req.overrides.len(), 1);
        assert_eq!(req.overrides[0].scaled_amount, 1.5);
        assert!(req.delivery_date.is_none());
    }

    #[test]
    fn submission_blocked_until_draft_is_complete() {
        let d = data();
        let mut no_dish = draft();
        no_dish.dish_id = None;
        assert_eq!(
            build_request(&d, &no_dish, ScalingRule::Proportional),
            Err(ValidationError::MissingDish)
        );

        let mut no_customer = draft();
        no_customer.customer_id = None;
        assert_eq!(
            build_request(&d, &no_customer, ScalingRule::Proportional),
            Err(ValidationError::MissingCustomer)
        );

        for q in [0.0, -2.0, f64::NAN] {
            let mut bad = draft();
            bad.quantity = q;
            assert_eq!(
                build_request(&d, &bad, ScalingRule::Proportional),
                Err(ValidationError::InvalidQuantity)
            );
        }

        let mut empty = draft();
        empty.dish_id = Some(2);
        assert_eq!(
            build_request(&d, &empty, ScalingRule::Proportional),
            Err(ValidationError::DishNotOrderable("Empty Plate".into()))
        );
    }

    #[test]
    fn preview_works_without_customer() {
        let mut d = draft();
        d.customer_id = None;
        d.quantity = 0.0;
        let preview = preview_draft(&data(), &d, ScalingRule::Proportional).expect("preview");
        assert!(preview.factor.is_none());
        assert_eq!(preview.lines[0].scaled_amount, 0.0);
    }

    #[test]
    fn booking_and_delivery_formats_are_checked() {
        let mut d = draft();
        d.details = OrderDetails {
            booking_date: Some(" 2025-03-01 ".into()),
            booking_time: Some("09:30".into()),
            delivery_date: Some("".into()),
            delivery_address: Some("  12 Harbour Road ".into()),
            ..OrderDetails::default()
        };
        let req = build_request(&data(), &d, ScalingRule::Proportional).expect("request");
        assert_eq!(req.booking_date.as_deref(), Some("2025-03-01"));
        assert_eq!(req.booking_time.as_deref(), Some("09:30"));
        assert!(req.delivery_date.is_none());
        assert_eq!(req.delivery_address.as_deref(), Some("12 Harbour Road"));

        d.details.delivery_time = Some("25:99".into());
        assert_eq!(
            build_request(&data(), &d, ScalingRule::Proportional),
            Err(ValidationError::InvalidField {
                field: "delivery time",
                value: "25:99".into()
            })
        );
        assert!(validate_date("booking date", "01/03/2025").is_err());
    }

    #[tokio::test]
    async fn checkout_caches_created_orders_as_one_group() {
        let (base, handle) = serve(vec![
            Canned { status: 201, body: r#"{"id":101}"#.into() },
            Canned { status: 201, body: r#"{"id":102}"#.into() },
        ])
        .await;
        let client = ApiClient::new(&base, crate::api::DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("t");
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        let cart = Checkout {
            customer_id: Some(7),
            lines: vec![
                CheckoutLine { dish_id: 1, quantity: 5.0, ..CheckoutLine::default() },
                CheckoutLine { dish_id: 1, quantity: 2.0, ..CheckoutLine::default() },
            ],
            ..Checkout::default()
        };

        let rule = ScalingRule::Proportional;
        let outcome = checkout(&client, &data(), &cart, rule, &cache, &no_cancel())
            .await
            .expect("checkout");
        assert_eq!(outcome.order_ids, vec![101, 102]);
        assert_eq!(outcome.correlation_id.len(), 36);
        let cached = cache.get(101).expect("cached group");
        assert_eq!(cached.member_order_ids, vec![101, 102]);
        assert_eq!(handle.await.expect("server").len(), 2);
    }

    #[tokio::test]
    async fn checkout_stops_on_failure_and_reports_created_lines() {
        let (base, handle) = serve(vec![
            Canned { status: 201, body: r#"{"id":201}"#.into() },
            Canned { status: 400, body: r#"{"error":"Dish not found"}"#.into() },
        ])
        .await;
        let client = ApiClient::new(&base, crate::api::DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("t");
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        let cart = Checkout {
            customer_id: Some(7),
            lines: vec![
                CheckoutLine { dish_id: 1, quantity: 5.0, ..CheckoutLine::default() },
                CheckoutLine { dish_id: 1, quantity: 1.0, ..CheckoutLine::default() },
                CheckoutLine { dish_id: 1, quantity: 3.0, ..CheckoutLine::default() },
            ],
            ..Checkout::default()
        };

        let err = checkout(&client, &data(), &cart, ScalingRule::Proportional, &cache, &no_cancel())
            .await
            .expect_err("partial failure");
        assert_eq!(err.failed_line, 1);
        assert_eq!(err.created, vec![201]);
        assert!(err.to_string().contains("Dish not found"));
        assert!(cache.get(201).is_none());
        assert_eq!(handle.await.expect("server").len(), 2);
    }

    #[tokio::test]
    async fn invalid_line_prevents_any_submission() {
        let client = ApiClient::new("http://127.0.0.1:9", crate::api::DEFAULT_TIMEOUT)
            .expect("client");
        let store = crate::db::init_in_memory().expect("db");
        let cart = Checkout {
            customer_id: Some(7),
            lines: vec![
                CheckoutLine { dish_id: 1, quantity: 5.0, ..CheckoutLine::default() },
                CheckoutLine { dish_id: 2, quantity: 1.0, ..CheckoutLine::default() },
            ],
            ..Checkout::default()
        };
        let cache = GroupCache::new(&store);
        let err = checkout(&client, &data(), &cart, ScalingRule::Proportional, &cache, &no_cancel())
            .await
            .expect_err("validation");
        assert_eq!(err.failed_line, 1);
        assert!(err.created.is_empty());
        assert!(matches!(err.source, DeskError::Validation(ValidationError::DishNotOrderable(_))));
    }

    #[tokio::test]
    async fn cancelled_checkout_sends_nothing() {
        let client = ApiClient::new("http://127.0.0.1:9", crate::api::DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("t");
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cart = Checkout {
            customer_id: Some(7),
            lines: vec![
                CheckoutLine { dish_id: 1, quantity: 5.0, ..CheckoutLine::default() },
                CheckoutLine { dish_id: 1, quantity: 2.0, ..CheckoutLine::default() },
            ],
            ..Checkout::default()
        };
        let err = checkout(&client, &data(), &cart, ScalingRule::Proportional, &cache, &cancel)
            .await
            .expect_err("cancelled");
        assert_eq!(err.failed_line, 0);
        assert!(err.created.is_empty());
        assert!(matches!(err.source, DeskError::Api(crate::error::ApiError::Cancelled)));
        assert!(cache.entries().is_empty());
    }
}
