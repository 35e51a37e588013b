//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::composer::{CheckoutLine, OrderDetails};
use crate::models::NewDishIngredient;
use crate::scaling::OverrideMap;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_SHA"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, Parser)]
#[command(
    name = "catering-desk",
    version,
    long_version = LONG_VERSION,
    about = "Catering order desk"
)]
pub struct Cli {
    /// Directory holding the local store, logs and printed slips.
    #[arg(long, env = "CATERING_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// API base URL for this run only (overrides `config set api_base`).
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CATERING_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the logged-in user and role.
    Whoami,
    /// Build info and local store status.
    Status,
    /// List categories, ingredients, dishes and customers.
    Catalog,
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    Ingredient {
        #[command(subcommand)]
        action: IngredientAction,
    },
    Customer {
        #[command(subcommand)]
        action: CustomerAction,
    },
    Dish {
        #[command(subcommand)]
        action: DishAction,
    },
    /// Show the scaled ingredient table for a dish without ordering.
    Preview {
        #[arg(long)]
        dish: i64,
        #[arg(long)]
        quantity: f64,
        /// Manual amount, as INGREDIENT_ID=AMOUNT. Repeatable.
        #[arg(long = "override", value_parser = parse_override)]
        overrides: Vec<(i64, String)>,
    },
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Place several dishes for one customer as one group.
    Checkout {
        #[arg(long)]
        customer: i64,
        /// DISH_ID:QUANTITY[:UNIT]. Repeatable, submitted in order.
        #[arg(long = "line", required = true, value_parser = parse_checkout_line)]
        lines: Vec<CheckoutLine>,
        #[command(flatten)]
        details: DetailsArgs,
    },
    /// List orders with their inferred groups.
    Orders,
    Slip {
        #[command(subcommand)]
        kind: SlipKind,
    },
    /// Revenue, cost and profit per period (admin).
    Reports {
        #[arg(long, default_value = "daily")]
        range: String,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect or reset the local order-group cache.
    Groups {
        #[command(subcommand)]
        action: GroupsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum CategoryAction {
    Add { name: String },
    Delete {
        id: i64,
        /// Send the delete even if ingredients still use the category.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum IngredientAction {
    Add {
        name: String,
        #[arg(long)]
        category: i64,
    },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum CustomerAction {
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum DishAction {
    Add {
        name: String,
        #[arg(long)]
        base_quantity: f64,
        #[arg(long)]
        base_unit: String,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        cost: Option<f64>,
        /// INGREDIENT_ID:AMOUNT_PER_BASE[:UNIT]. Repeatable.
        #[arg(long = "ingredient", value_parser = parse_dish_ingredient)]
        ingredients: Vec<NewDishIngredient>,
    },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum OrderAction {
    Place {
        #[arg(long)]
        dish: i64,
        #[arg(long)]
        customer: i64,
        #[arg(long)]
        quantity: f64,
        /// Defaults to the dish's base unit.
        #[arg(long)]
        unit: Option<String>,
        #[arg(long = "override", value_parser = parse_override)]
        overrides: Vec<(i64, String)>,
        #[command(flatten)]
        details: DetailsArgs,
    },
}

#[derive(Debug, Clone, Args, Default)]
pub struct DetailsArgs {
    /// YYYY-MM-DD
    #[arg(long)]
    pub booking_date: Option<String>,
    /// HH:MM
    #[arg(long)]
    pub booking_time: Option<String>,
    #[arg(long)]
    pub delivery_date: Option<String>,
    #[arg(long)]
    pub delivery_time: Option<String>,
    #[arg(long)]
    pub delivery_address: Option<String>,
}

impl From<DetailsArgs> for OrderDetails {
    fn from(a: DetailsArgs) -> Self {
        OrderDetails {
            booking_date: a.booking_date,
            booking_time: a.booking_time,
            delivery_date: a.delivery_date,
            delivery_time: a.delivery_time,
            delivery_address: a.delivery_address,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Write the printable page and open it in the browser.
    #[arg(long)]
    pub print: bool,
    /// With --print, only write the file.
    #[arg(long, requires = "print")]
    pub no_open: bool,
    /// Emit HTML on stdout instead of plain text.
    #[arg(long, conflicts_with = "print")]
    pub html: bool,
}

#[derive(Debug, Subcommand)]
pub enum SlipKind {
    /// Ingredient slip for one order.
    Ingredient {
        order_id: i64,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Order and customer details for one order.
    Order {
        order_id: i64,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Combined ingredient slip for the group containing an order.
    Group {
        order_id: i64,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
    /// Remove a stored value so the default applies again.
    Unset { key: String },
    List,
}

#[derive(Debug, Subcommand)]
pub enum GroupsAction {
    List,
    /// Drop every cached group.
    Clear,
    /// Drop entries older than 30 days.
    Prune,
}

// ---------------------------------------------------------------------------
// Value parsers
// ---------------------------------------------------------------------------

fn parse_id(raw: &str, what: &str) -> Result<i64, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid {what} id: {raw}"))
}

fn parse_number(raw: &str, what: &str) -> Result<f64, String> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("invalid {what}: {raw}")),
    }
}

/// `ID=AMOUNT`. The amount stays raw so scaling reports bad values per line.
pub fn parse_override(raw: &str) -> Result<(i64, String), String> {
    let (id, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INGREDIENT_ID=AMOUNT, got {raw}"))?;
    Ok((parse_id(id, "ingredient")?, amount.trim().to_string()))
}

pub fn overrides_map(pairs: &[(i64, String)]) -> OverrideMap {
    pairs.iter().cloned().collect()
}

pub fn parse_dish_ingredient(raw: &str) -> Result<NewDishIngredient, String> {
    let mut parts = raw.splitn(3, ':');
    let id = parts.next().unwrap_or_default();
    let amount = parts
        .next()
        .ok_or_else(|| format!("expected INGREDIENT_ID:AMOUNT[:UNIT], got {raw}"))?;
    Ok(NewDishIngredient {
        ingredient_id: parse_id(id, "ingredient")?,
        amount_per_base: parse_number(amount, "amount")?,
        unit: parts.next().map(|u| u.trim().to_string()).unwrap_or_default(),
    })
}

pub fn parse_checkout_line(raw: &str) -> Result<CheckoutLine, String> {
    let mut parts = raw.splitn(3, ':');
    let dish = parts.next().unwrap_or_default();
    let qty = parts
        .next()
        .ok_or_else(|| format!("expected DISH_ID:QUANTITY[:UNIT], got {raw}"))?;
    Ok(CheckoutLine {
        dish_id: parse_id(dish, "dish")?,
        quantity: parse_number(qty, "quantity")?,
        unit: parts
            .next()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty()),
        overrides: OverrideMap::new(),
    })
}
