//! Ingredient aggregation for slips.
//!
//! Sums the per-order ingredient lines of one or more orders by normalized
//! name and unit, then buckets the totals under their ingredient category.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::models::{Category, Ingredient};
use crate::scaling::round4;

pub const UNCATEGORIZED: &str = "Uncategorized";

/// Amount fields in priority order.
const AMOUNT_KEYS: &[&str] = &[
    "scaled_amount",
    "scaledAmount",
    "amount",
    "amount_per_base",
    "total_amount",
];
const NAME_KEYS: &[&str] = &["name", "ingredient_name", "ingredient"];
const UNIT_KEYS: &[&str] = &["unit", "ingredient_unit"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedIngredientLine {
    pub name: String,
    pub unit: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBucket {
    pub category: String,
    pub lines: Vec<AggregatedIngredientLine>,
}

/// A slip line that could not be used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlipWarning {
    pub order_id: i64,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct AggregatedIngredients {
    pub buckets: Vec<CategoryBucket>,
    pub warnings: Vec<SlipWarning>,
}

impl AggregatedIngredients {
    pub fn line_count(&self) -> usize {
        self.buckets.iter().map(|b| b.lines.len()).sum()
    }

    pub fn find(&self, name: &str, unit: &str) -> Option<&AggregatedIngredientLine> {
        let key = (normalize_name(name), normalize_unit(unit));
        self.buckets
            .iter()
            .flat_map(|b| b.lines.iter())
            .find(|l| (normalize_name(&l.name), normalize_unit(&l.unit)) == key)
    }
}

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn normalize_unit(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn first_str(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        item.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// First present amount field; numbers and numeric strings are accepted.
pub fn item_amount(item: &Value) -> Option<f64> {
    AMOUNT_KEYS.iter().find_map(|key| match item.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Normalized ingredient name -> category name.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    by_ingredient: HashMap<String, String>,
}

impl CategoryIndex {
    pub fn build(categories: &[Category], ingredients: &[Ingredient]) -> Self {
        let names: HashMap<i64, &str> = categories
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect();
        let mut by_ingredient = HashMap::new();
        for ing in ingredients {
            let category = ing
                .category_id
                .and_then(|id| names.get(&id).map(|n| n.to_string()))
                .or_else(|| ing.category_name.clone())
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
            if let Some(category) = category {
                by_ingredient.insert(normalize_name(&ing.name), category);
            }
        }
        Self { by_ingredient }
    }

    pub fn category_for(&self, ingredient_name: &str) -> &str {
        self.by_ingredient
            .get(&normalize_name(ingredient_name))
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED)
    }
}

/// Extract `items` from an ingredient-slip payload.
pub fn slip_items(ingredient_slip: &Value) -> Vec<Value> {
    ingredient_slip
        .get("items")
        .or_else(|| ingredient_slip.get("ingredients"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Accumulates item lines from any number of orders.
#[derive(Debug, Default)]
pub struct Aggregator {
    // key -> (display name, display unit, amount); insertion order kept in `order`
    totals: HashMap<(String, String), (String, String, f64)>,
    order: Vec<(String, String)>,
    warnings: Vec<SlipWarning>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn skip(&mut self, order_id: i64, code: &str, message: String) {
        warn!(order_id, code, %message, "skipping slip line");
        self.warnings.push(SlipWarning {
            order_id,
            code: code.to_string(),
            message,
        });
    }

    pub fn add_item(&mut self, order_id: i64, item: &Value) {
        let name = first_str(item, NAME_KEYS);
        let amount = item_amount(item);

        let (name, amount) = match (name, amount) {
            (Some(n), Some(a)) => (n, a),
            (None, None) => {
                self.skip(order_id, "missing_name_and_amount", "line has no name or amount".into());
                return;
            }
            (None, Some(_)) => {
                self.skip(order_id, "missing_name", "line has no ingredient name".into());
                return;
            }
            (Some(n), None) => {
                self.skip(order_id, "missing_amount", format!("{n} has no amount"));
                return;
            }
        };
        if !amount.is_finite() || amount <= 0.0 {
            self.skip(order_id, "non_positive_amount", format!("{name} has amount {amount}"));
            return;
        }

        let unit = first_str(item, UNIT_KEYS).unwrap_or_default();
        let key = (normalize_name(&name), normalize_unit(&unit));
        match self.totals.get_mut(&key) {
            Some(entry) => entry.2 = round4(entry.2 + amount),
            None => {
                self.order.push(key.clone());
                self.totals.insert(key, (name, unit, round4(amount)));
            }
        }
    }

    pub fn add_slip(&mut self, order_id: i64, ingredient_slip: &Value) {
        for item in slip_items(ingredient_slip) {
            self.add_item(order_id, &item);
        }
    }

    /// Bucket by category. Categories and lines sort alphabetically,
    /// case-insensitively; `Uncategorized` sorts like any other name.
    pub fn finish(mut self, index: &CategoryIndex) -> AggregatedIngredients {
        let mut buckets: HashMap<String, Vec<AggregatedIngredientLine>> = HashMap::new();
        for key in self.order.drain(..) {
            if let Some((name, unit, amount)) = self.totals.remove(&key) {
                let category = index.category_for(&name).to_string();
                buckets
                    .entry(category)
                    .or_default()
                    .push(AggregatedIngredientLine { name, unit, amount });
            }
        }

        let mut buckets: Vec<CategoryBucket> = buckets
            .into_iter()
            .map(|(category, mut lines)| {
                lines.sort_by(|a, b| {
                    a.name
                        .to_lowercase()
                        .cmp(&b.name.to_lowercase())
                        .then_with(|| a.unit.cmp(&b.unit))
                });
                CategoryBucket { category, lines }
            })
            .collect();
        buckets.sort_by(|a, b| {
            a.category
                .to_lowercase()
                .cmp(&b.category.to_lowercase())
                .then_with(|| a.category.cmp(&b.category))
        });

        AggregatedIngredients {
            buckets,
            warnings: self.warnings,
        }
    }
}

/// Aggregate `(order_id, ingredientSlip)` pairs in one call.
pub fn aggregate_slips(slips: &[(i64, Value)], index: &CategoryIndex) -> AggregatedIngredients {
    let mut agg = Aggregator::new();
    for (order_id, slip) in slips {
        agg.add_slip(*order_id, slip);
    }
    agg.finish(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> CategoryIndex {
        CategoryIndex::build(
            &[
                Category { id: 1, name: "Grains".into() },
                Category { id: 2, name: "Spices".into() },
            ],
            &[
                Ingredient {
                    id: 10,
                    name: "Rice".into(),
                    category_id: Some(1),
                    ..Ingredient::default()
                },
                Ingredient {
                    id: 11,
                    name: "Black  Pepper".into(),
                    category_id: Some(2),
                    ..Ingredient::default()
                },
                Ingredient {
                    id: 12,
                    name: "Cumin".into(),
                    category_name: Some("Spices".into()),
                    ..Ingredient::default()
                },
            ],
        )
    }

    #[test]
    fn rice_from_two_orders_sums_to_one_and_a_quarter() {
        let slips = vec![
            (1, json!({ "items": [{ "name": "Rice", "unit": "kg", "scaled_amount": 0.5 }] })),
            (2, json!({ "items": [{ "name": "Rice", "unit": "kg", "scaled_amount": 0.75 }] })),
        ];
        let result = aggregate_slips(&slips, &index());
        assert_eq!(result.line_count(), 1);
        assert_eq!(
            result.buckets[0].lines[0],
            AggregatedIngredientLine { name: "Rice".into(), unit: "kg".into(), amount: 1.25 }
        );
        assert_eq!(result.buckets[0].category, "Grains");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn names_and_units_are_normalized_before_summing() {
        let slips = vec![
            (1, json!({ "items": [{ "name": "  black pepper ", "unit": "G", "amount": 2 }] })),
            (2, json!({ "items": [{ "name": "Black   Pepper", "unit": " g", "amount": "3.5" }] })),
            (3, json!({ "items": [{ "name": "Black Pepper", "unit": "kg", "amount": 1 }] })),
        ];
        let result = aggregate_slips(&slips, &index());
        let grams = result.find("black pepper", "g").expect("grams line");
        assert_eq!(grams.amount, 5.5);
        assert_eq!(grams.name, "black pepper");
        assert_eq!(result.find("Black Pepper", "KG").map(|l| l.amount), Some(1.0));
        assert_eq!(result.buckets.len(), 1);
        assert_eq!(result.buckets[0].category, "Spices");
    }

    #[test]
    fn amount_field_priority_is_respected() {
        let item = json!({
            "name": "Rice",
            "total_amount": 9,
            "amount_per_base": 8,
            "amount": 7,
            "scaledAmount": 6,
            "scaled_amount": 5
        });
        assert_eq!(item_amount(&item), Some(5.0));
        assert_eq!(item_amount(&json!({ "amount_per_base": 8, "total_amount": 9 })), Some(8.0));
        assert_eq!(item_amount(&json!({ "total_amount": "9.25" })), Some(9.25));
        assert_eq!(item_amount(&json!({ "amount": null })), None);
    }

    #[test]
    fn unmapped_ingredient_goes_to_uncategorized() {
        let slips = vec![(1, json!({ "items": [
            { "name": "Rose Water", "unit": "ml", "amount": 20 },
            { "name": "Rice", "unit": "kg", "amount": 1 }
        ] }))];
        let result = aggregate_slips(&slips, &index());
        let categories: Vec<&str> = result.buckets.iter().map(|b| b.category.as_str()).collect();
        assert_eq!(categories, vec!["Grains", UNCATEGORIZED]);
        assert_eq!(result.buckets[1].lines[0].name, "Rose Water");
    }

    #[test]
    fn malformed_and_non_positive_lines_are_skipped_with_warnings() {
        let slips = vec![(4, json!({ "items": [
            { "unit": "kg" },
            { "amount": 2 },
            { "name": "Salt" },
            { "name": "Oil", "amount": 0 },
            { "name": "Ghee", "amount": -1 },
            { "name": "Rice", "unit": "kg", "amount": 1 }
        ] }))];
        let result = aggregate_slips(&slips, &index());
        assert_eq!(result.line_count(), 1);
        let codes: Vec<&str> = result.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(
            codes,
            vec![
                "missing_name_and_amount",
                "missing_name",
                "missing_amount",
                "non_positive_amount",
                "non_positive_amount"
            ]
        );
        assert!(result.warnings.iter().all(|w| w.order_id == 4));
    }

    #[test]
    fn categories_and_lines_sort_alphabetically() {
        let slips = vec![(1, json!({ "items": [
            { "name": "cumin", "unit": "g", "amount": 1 },
            { "name": "Black Pepper", "unit": "g", "amount": 1 },
            { "name": "Zaatar", "unit": "g", "amount": 1 },
            { "name": "Rice", "unit": "kg", "amount": 1 }
        ] }))];
        let result = aggregate_slips(&slips, &index());
        let categories: Vec<&str> = result.buckets.iter().map(|b| b.category.as_str()).collect();
        assert_eq!(categories, vec!["Grains", "Spices", UNCATEGORIZED]);
        let spices: Vec<&str> = result.buckets[1].lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(spices, vec!["Black Pepper", "cumin"]);
    }

    #[test]
    fn accumulation_rounds_each_step() {
        let slips = vec![
            (1, json!({ "items": [{ "name": "Saffron", "unit": "g", "amount": 0.00004 }] })),
            (2, json!({ "items": [{ "name": "Saffron", "unit": "g", "amount": 0.00004 }] })),
        ];
        let result = aggregate_slips(&slips, &CategoryIndex::default());
        // 0.00004 rounds to 0.0 on entry; 0.0 + 0.00004 rounds to 0.0 again.
        assert_eq!(result.find("saffron", "g").map(|l| l.amount), Some(0.0));
    }

    #[test]
    fn ingredients_key_is_accepted_as_items_alias() {
        let slip = json!({
            "ingredients": [{ "ingredient_name": "Rice", "unit": "kg", "scaled_amount": 2 }]
        });
        assert_eq!(slip_items(&slip).len(), 1);
        let result = aggregate_slips(&[(1, slip)], &index());
        assert_eq!(result.find("rice", "kg").map(|l| l.amount), Some(2.0));
    }
}
