//! Reference data: categories, ingredients, dishes and customers.
//!
//! The four lists are fetched concurrently and joined before use. The load
//! races a cancellation token so Ctrl-C aborts the whole fan-out.

use std::collections::HashMap;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::aggregation::CategoryIndex;
use crate::api::ApiClient;
use crate::error::ApiError;
use crate::models::{Category, Customer, Dish, Ingredient};

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub categories: Vec<Category>,
    pub ingredients: Vec<Ingredient>,
    pub dishes: Vec<Dish>,
    pub customers: Vec<Customer>,
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, E>
where
    E: From<ApiError>,
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled.into()),
        res = fut => res,
    }
}

impl ReferenceData {
    pub async fn load(client: &ApiClient, cancel: &CancellationToken) -> Result<Self, ApiError> {
        let (categories, ingredients, dishes, customers) = cancellable(cancel, async {
            tokio::try_join!(
                client.categories(),
                client.ingredients(),
                client.dishes(),
                client.customers(),
            )
        })
        .await?;
        info!(
            categories = categories.len(),
            ingredients = ingredients.len(),
            dishes = dishes.len(),
            customers = customers.len(),
            "reference data loaded"
        );
        Ok(Self {
            categories,
            ingredients,
            dishes,
            customers,
        })
    }

    pub fn find_dish(&self, id: i64) -> Option<&Dish> {
        self.dishes.iter().find(|d| d.id == id)
    }

    pub fn find_customer(&self, id: i64) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    pub fn find_ingredient(&self, id: i64) -> Option<&Ingredient> {
        self.ingredients.iter().find(|i| i.id == id)
    }

    pub fn category_index(&self) -> CategoryIndex {
        CategoryIndex::build(&self.categories, &self.ingredients)
    }

    /// Ingredients attached to each category id.
    pub fn ingredient_counts(&self) -> HashMap<i64, usize> {
        let mut counts = HashMap::new();
        for ing in &self.ingredients {
            if let Some(cat) = ing.category_id {
                *counts.entry(cat).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Catalogue listing with ingredient counts per category.
    pub fn summary(&self) -> String {
        let counts = self.ingredient_counts();
        let mut out = String::new();

        out.push_str(&format!("Categories ({})\n", self.categories.len()));
        for c in &self.categories {
            out.push_str(&format!(
                "  [{}] {} ({} ingredients)\n",
                c.id,
                c.name,
                counts.get(&c.id).copied().unwrap_or(0)
            ));
        }

        out.push_str(&format!("Ingredients ({})\n", self.ingredients.len()));
        let cat_names: HashMap<i64, &str> = self
            .categories
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect();
        for i in &self.ingredients {
            let category = i
                .category_id
                .and_then(|id| cat_names.get(&id).copied())
                .or(i.category_name.as_deref())
                .unwrap_or("-");
            out.push_str(&format!("  [{}] {} ({category})\n", i.id, i.name));
        }

        out.push_str(&format!("Dishes ({})\n", self.dishes.len()));
        for d in &self.dishes {
            let marker = if d.is_orderable() { "" } else { " [no ingredients]" };
            out.push_str(&format!(
                "  [{}] {} per {} {}, {} ingredient(s){marker}\n",
                d.id,
                d.name,
                crate::slips::format_amount(d.base_quantity),
                d.base_unit,
                d.ingredients.len()
            ));
        }

        out.push_str(&format!("Customers ({})\n", self.customers.len()));
        for c in &self.customers {
            let phone = c.phone.as_deref().unwrap_or("");
            out.push_str(&format!("  [{}] {} {phone}\n", c.id, c.name));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_server::{serve_routes, Canned};

    fn canned(body: &str) -> Canned {
        Canned {
            status: 200,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn loads_all_four_lists_concurrently() {
        let (base, handle) = serve_routes(
            vec![
                ("/api/categories", canned(r#"[{"id":1,"name":"Grains"}]"#)),
                ("/api/ingredients", canned(r#"[{"id":10,"name":"Rice","category_id":1}]"#)),
                (
                    "/api/dishes",
                    canned(
                        r#"[{"id":5,"name":"Biryani","base_quantity":10,
                             "base_unit":"kg","ingredients":[]}]"#,
                    ),
                ),
                ("/api/customers", canned(r#"[{"id":7,"name":"Asha"}]"#)),
            ],
            4,
        )
        .await;
        let client = ApiClient::new(&base, crate::api::DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("t");
        let data = ReferenceData::load(&client, &CancellationToken::new())
            .await
            .expect("load");
        assert_eq!(data.categories[0].name, "Grains");
        assert_eq!(data.ingredients[0].category_id, Some(1));
        assert!(!data.find_dish(5).expect("dish").is_orderable());
        assert_eq!(data.find_customer(7).map(|c| c.name.as_str()), Some("Asha"));
        assert_eq!(data.category_index().category_for("rice"), "Grains");

        let requests = handle.await.expect("server");
        assert_eq!(requests.len(), 4);
        assert!(requests
            .iter()
            .all(|r| r.to_ascii_lowercase().contains("authorization: bearer t")));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_load() {
        let token = CancellationToken::new();
        token.cancel();
        let client = ApiClient::new("http://127.0.0.1:9", crate::api::DEFAULT_TIMEOUT)
            .expect("client");
        let err = ReferenceData::load(&client, &token).await.expect_err("cancelled");
        assert!(matches!(err, ApiError::Cancelled));
    }

    #[test]
    fn counts_and_lookups() {
        let data = ReferenceData {
            categories: vec![Category { id: 1, name: "Grains".into() }],
            ingredients: vec![
                Ingredient {
                    id: 10,
                    name: "Basmati  Rice".into(),
                    category_id: Some(1),
                    ..Default::default()
                },
                Ingredient {
                    id: 11,
                    name: "Wheat".into(),
                    category_id: Some(1),
                    ..Default::default()
                },
                Ingredient { id: 12, name: "Salt".into(), ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(data.ingredient_counts().get(&1), Some(&2));
        assert_eq!(data.find_ingredient(11).map(|i| i.name.as_str()), Some("Wheat"));
        assert!(data.find_ingredient(99).is_none());
        let summary = data.summary();
        assert!(summary.contains("[1] Grains (2 ingredients)"));
        assert!(summary.contains("Salt (-)"));
    }
}
