//! Recipe scaling.
//!
//! A dish defines `amount_per_base` for each ingredient at `base_quantity`
//! units of dish. Ordering `Q` units scales every amount by `Q / base_quantity`
//! under the proportional rule. Results are rounded to 4 decimals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::{Dish, ScaledLine};

/// How `amount_per_base` relates to the ordered quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingRule {
    /// `amount_per_base * (requested / base_quantity)`.
    #[default]
    Proportional,
    /// `amount_per_base * requested`; `base_quantity` is ignored.
    PerUnit,
}

impl ScalingRule {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "proportional" => Some(Self::Proportional),
            "per_unit" => Some(Self::PerUnit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proportional => "proportional",
            Self::PerUnit => "per_unit",
        }
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// `requested / base`, or `None` when either side is non-positive or not finite.
pub fn scale_factor(requested: f64, base: f64) -> Option<f64> {
    if !requested.is_finite() || !base.is_finite() || requested <= 0.0 || base <= 0.0 {
        return None;
    }
    Some(requested / base)
}

/// Multiplier applied to `amount_per_base` for `rule`.
pub fn multiplier(rule: ScalingRule, requested: f64, base: f64) -> Option<f64> {
    match rule {
        ScalingRule::Proportional => scale_factor(requested, base),
        ScalingRule::PerUnit => {
            if requested.is_finite() && requested > 0.0 {
                Some(requested)
            } else {
                None
            }
        }
    }
}

/// Operator-entered amounts keyed by ingredient id. Blank entries mean
/// "use the computed amount".
pub type OverrideMap = HashMap<i64, String>;

/// One previewed ingredient line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewLine {
    pub ingredient_id: i64,
    pub name: String,
    pub amount_per_base: f64,
    pub computed_amount: f64,
    pub scaled_amount: f64,
    pub unit: String,
    pub overridden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalePreview {
    pub dish_id: i64,
    pub dish_name: String,
    pub base_quantity: f64,
    pub base_unit: String,
    pub requested_quantity: f64,
    pub rule: ScalingRule,
    /// `None` when the quantity or base is not positive.
    pub factor: Option<f64>,
    pub lines: Vec<PreviewLine>,
}

impl ScalePreview {
    pub fn to_scaled_lines(&self) -> Vec<ScaledLine> {
        self.lines
            .iter()
            .map(|line| ScaledLine {
                ingredient_id: line.ingredient_id,
                scaled_amount: line.scaled_amount,
                unit: line.unit.clone(),
            })
            .collect()
    }
}

fn parse_override(ingredient_id: i64, raw: &str) -> Result<Option<f64>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err(ValidationError::InvalidOverride {
            ingredient_id,
            raw: trimmed.to_string(),
        }),
    }
}

/// Compute every ingredient line for `dish` at `requested` units.
///
/// When the multiplier cannot be computed the computed amounts are 0; callers
/// that submit orders must check [`ScalePreview::factor`] first.
pub fn preview(
    dish: &Dish,
    requested: f64,
    overrides: &OverrideMap,
    rule: ScalingRule,
) -> Result<ScalePreview, ValidationError> {
    let factor = multiplier(rule, requested, dish.base_quantity);
    let mut lines = Vec::with_capacity(dish.ingredients.len());

    for ing in &dish.ingredients {
        if ing.amount_per_base < 0.0 {
            return Err(ValidationError::NegativeAmount {
                ingredient_id: ing.ingredient_id,
                amount: ing.amount_per_base,
            });
        }
        let computed = factor
            .map(|f| round4(ing.amount_per_base * f))
            .unwrap_or(0.0);
        let manual = overrides
            .get(&ing.ingredient_id)
            .map(|raw| parse_override(ing.ingredient_id, raw))
            .transpose()?
            .flatten();

        lines.push(PreviewLine {
            ingredient_id: ing.ingredient_id,
            name: ing
                .ingredient_name
                .clone()
                .unwrap_or_else(|| format!("#{}", ing.ingredient_id)),
            amount_per_base: ing.amount_per_base,
            computed_amount: computed,
            scaled_amount: manual.unwrap_or(computed),
            unit: ing.unit.clone(),
            overridden: manual.is_some(),
        });
    }

    Ok(ScalePreview {
        dish_id: dish.id,
        dish_name: dish.name.clone(),
        base_quantity: dish.base_quantity,
        base_unit: dish.base_unit.clone(),
        requested_quantity: requested,
        rule,
        factor: factor.filter(|_| rule == ScalingRule::Proportional),
        lines,
    })
}

/// Scaled lines only, as sent in `overrides` on order creation.
pub fn scale_dish(
    dish: &Dish,
    requested: f64,
    overrides: &OverrideMap,
    rule: ScalingRule,
) -> Result<Vec<ScaledLine>, ValidationError> {
    Ok(preview(dish, requested, overrides, rule)?.to_scaled_lines())
}
