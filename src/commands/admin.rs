//! Catalogue administration: categories, ingredients, customers and dishes.
//!
//! Every mutation is followed by a full reference-data reload so the listing
//! printed afterwards reflects the server's state.

use std::collections::HashSet;

use anyhow::Context;
use serde_json::Value;
use tracing::info;

use crate::api::ApiClient;
use crate::context::AppContext;
use crate::error::ValidationError;
use crate::models::{NewCategory, NewCustomer, NewDish, NewDishIngredient, NewIngredient};
use crate::reference::{cancellable, ReferenceData};
use crate::session::Role;
use crate::value_i64;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn trimmed_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn validate_category(name: &str) -> Result<NewCategory, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("category name"));
    }
    Ok(NewCategory {
        name: name.to_string(),
    })
}

pub fn validate_ingredient(
    name: &str,
    category_id: i64,
    data: &ReferenceData,
) -> Result<NewIngredient, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("ingredient name"));
    }
    if !data.categories.iter().any(|c| c.id == category_id) {
        return Err(ValidationError::InvalidField {
            field: "category",
            value: category_id.to_string(),
        });
    }
    Ok(NewIngredient {
        name: name.to_string(),
        category_id,
    })
}

/// Name required; blank optional fields are sent as null.
pub fn validate_customer(
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
    address: Option<&str>,
) -> Result<NewCustomer, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("customer name"));
    }
    Ok(NewCustomer {
        name: name.to_string(),
        phone: trimmed_opt(phone),
        email: trimmed_opt(email),
        address: trimmed_opt(address),
    })
}

pub fn validate_dish(mut dish: NewDish, data: &ReferenceData) -> Result<NewDish, ValidationError> {
    dish.name = dish.name.trim().to_string();
    dish.base_unit = dish.base_unit.trim().to_string();
    if dish.name.is_empty() {
        return Err(ValidationError::MissingField("dish name"));
    }
    if !dish.base_quantity.is_finite() || dish.base_quantity <= 0.0 {
        return Err(ValidationError::InvalidField {
            field: "base quantity",
            value: dish.base_quantity.to_string(),
        });
    }
    if dish.base_unit.is_empty() {
        return Err(ValidationError::MissingField("base unit"));
    }
    if dish.ingredients.is_empty() {
        return Err(ValidationError::MissingField("at least one ingredient"));
    }
    for price in [dish.price_per_base, dish.cost_per_base].into_iter().flatten() {
        if !price.is_finite() || price < 0.0 {
            return Err(ValidationError::InvalidField {
                field: "price",
                value: price.to_string(),
            });
        }
    }

    let mut seen = HashSet::new();
    for line in &mut dish.ingredients {
        if !seen.insert(line.ingredient_id) {
            return Err(ValidationError::DuplicateIngredient(line.ingredient_id));
        }
        if !line.amount_per_base.is_finite() || line.amount_per_base < 0.0 {
            return Err(ValidationError::NegativeAmount {
                ingredient_id: line.ingredient_id,
                amount: line.amount_per_base,
            });
        }
        let known = data.find_ingredient(line.ingredient_id).ok_or_else(|| {
            ValidationError::InvalidField {
                field: "ingredient",
                value: line.ingredient_id.to_string(),
            }
        })?;
        if line.unit.trim().is_empty() {
            line.unit = known.unit.clone().unwrap_or_default();
        }
    }
    Ok(dish)
}

/// Refuse to delete a category that still has ingredients unless forced.
pub fn check_category_delete(
    category_id: i64,
    data: &ReferenceData,
    force: bool,
) -> Result<(), ValidationError> {
    let in_use = data
        .ingredient_counts()
        .get(&category_id)
        .copied()
        .unwrap_or(0);
    if in_use > 0 && !force {
        return Err(ValidationError::CategoryInUse(in_use));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn created_label(what: &str, response: &Value) -> String {
    match value_i64(response, &["id"]) {
        Some(id) => format!("Created {what} #{id}"),
        None => format!("Created {what}"),
    }
}

/// Reload and append the catalogue listing to `headline`.
async fn reload_and_report(
    ctx: &AppContext,
    client: &ApiClient,
    headline: String,
) -> anyhow::Result<String> {
    let data = ReferenceData::load(client, &ctx.cancel)
        .await
        .context("Reloading reference data")?;
    Ok(format!("{headline}\n\n{}", data.summary()))
}

async fn admin_session(ctx: &AppContext) -> anyhow::Result<(ApiClient, ReferenceData)> {
    let client = ctx.client_for(Role::Admin)?;
    let data = ReferenceData::load(&client, &ctx.cancel)
        .await
        .context("Loading reference data")?;
    Ok((client, data))
}

pub async fn catalog(ctx: &AppContext) -> anyhow::Result<String> {
    let client = ctx.client_for(Role::User)?;
    let data = ReferenceData::load(&client, &ctx.cancel)
        .await
        .context("Loading reference data")?;
    Ok(data.summary())
}

pub async fn add_category(ctx: &AppContext, name: &str) -> anyhow::Result<String> {
    let body = validate_category(name)?;
    let client = ctx.client_for(Role::Admin)?;
    let resp = cancellable(&ctx.cancel, client.create_category(&body)).await?;
    info!(name = %body.name, "category created");
    reload_and_report(ctx, &client, created_label("category", &resp)).await
}

pub async fn delete_category(ctx: &AppContext, id: i64, force: bool) -> anyhow::Result<String> {
    let (client, data) = admin_session(ctx).await?;
    check_category_delete(id, &data, force)?;
    cancellable(&ctx.cancel, client.delete_category(id)).await?;
    info!(category_id = id, force, "category deleted");
    reload_and_report(ctx, &client, format!("Deleted category #{id}")).await
}

pub async fn add_ingredient(
    ctx: &AppContext,
    name: &str,
    category_id: i64,
) -> anyhow::Result<String> {
    let (client, data) = admin_session(ctx).await?;
    let body = validate_ingredient(name, category_id, &data)?;
    let resp = cancellable(&ctx.cancel, client.create_ingredient(&body)).await?;
    info!(name = %body.name, category_id, "ingredient created");
    reload_and_report(ctx, &client, created_label("ingredient", &resp)).await
}

pub async fn delete_ingredient(ctx: &AppContext, id: i64) -> anyhow::Result<String> {
    let client = ctx.client_for(Role::Admin)?;
    cancellable(&ctx.cancel, client.delete_ingredient(id)).await?;
    info!(ingredient_id = id, "ingredient deleted");
    reload_and_report(ctx, &client, format!("Deleted ingredient #{id}")).await
}

pub async fn add_customer(
    ctx: &AppContext,
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
    address: Option<&str>,
) -> anyhow::Result<String> {
    let body = validate_customer(name, phone, email, address)?;
    let client = ctx.client_for(Role::Admin)?;
    let resp = cancellable(&ctx.cancel, client.create_customer(&body)).await?;
    info!(name = %body.name, "customer created");
    reload_and_report(ctx, &client, created_label("customer", &resp)).await
}

pub async fn delete_customer(ctx: &AppContext, id: i64) -> anyhow::Result<String> {
    let client = ctx.client_for(Role::Admin)?;
    cancellable(&ctx.cancel, client.delete_customer(id)).await?;
    info!(customer_id = id, "customer deleted");
    reload_and_report(ctx, &client, format!("Deleted customer #{id}")).await
}

#[allow(clippy::too_many_arguments)]
pub async fn add_dish(
    ctx: &AppContext,
    name: &str,
    base_quantity: f64,
    base_unit: &str,
    price_per_base: Option<f64>,
    cost_per_base: Option<f64>,
    ingredients: Vec<NewDishIngredient>,
) -> anyhow::Result<String> {
    let (client, data) = admin_session(ctx).await?;
    let body = validate_dish(
        NewDish {
            name: name.to_string(),
            base_quantity,
            base_unit: base_unit.to_string(),
            price_per_base,
            cost_per_base,
            ingredients,
        },
        &data,
    )?;
    let resp = cancellable(&ctx.cancel, client.create_dish(&body)).await?;
    info!(name = %body.name, ingredients = body.ingredients.len(), "dish created");
    reload_and_report(ctx, &client, created_label("dish", &resp)).await
}

pub async fn delete_dish(ctx: &AppContext, id: i64) -> anyhow::Result<String> {
    let client = ctx.client_for(Role::Admin)?;
    cancellable(&ctx.cancel, client.delete_dish(id)).await?;
    info!(dish_id = id, "dish deleted");
    reload_and_report(ctx, &client, format!("Deleted dish #{id}")).await
}
