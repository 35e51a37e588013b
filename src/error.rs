//! Error types shared by the API client, the composer and the CLI commands.

use thiserror::Error;

/// Failures talking to the catering REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Cannot reach catering API at {0}")]
    Network(String),

    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// Non-2xx response. `message` is the server's `error` string when present.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Session expired or invalid, please log in again")]
    Unauthorized,

    #[error("Invalid response from catering API: {0}")]
    InvalidResponse(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("This action requires the {required} role (current role: {actual})")]
    Forbidden { required: String, actual: String },
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

/// Input problems caught before any network call.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Select a dish")]
    MissingDish,

    #[error("Select a customer")]
    MissingCustomer,

    #[error("Enter a valid quantity")]
    InvalidQuantity,

    #[error("Dish '{0}' has no ingredients and cannot be ordered")]
    DishNotOrderable(String),

    #[error("Ingredient {ingredient_id} has a negative amount per base ({amount})")]
    NegativeAmount { ingredient_id: i64, amount: f64 },

    #[error("Override for ingredient {ingredient_id} is not a valid amount: {raw}")]
    InvalidOverride { ingredient_id: i64, raw: String },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Category still has {0} ingredient(s); delete them first or use --force")]
    CategoryInUse(usize),

    #[error("Ingredient {0} is already added to this dish")]
    DuplicateIngredient(i64),
}

/// Either kind of failure, for operations that validate and then call the API.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Local storage error: {0}")]
    Storage(String),
}

pub type DeskResult<T> = Result<T, DeskError>;
