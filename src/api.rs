//! Catering REST API client.
//!
//! Provides bearer-authenticated HTTP communication with the catering API for
//! login, reference data, catalogue mutations, orders, slips and reports.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::ApiError;
use crate::models::{
    Category, CreateOrderRequest, CreatedResponse, Customer, Dish, Ingredient, LoginRequest,
    LoginResponse, NewCategory, NewCustomer, NewDish, NewIngredient, OrderSummary, ReportResponse,
    SlipBundle,
};
use crate::reports::ReportRange;

/// Default timeout for API requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the API base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - append `/api` when the URL has no path segment ending in `api`
pub fn normalize_api_base(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if !url.ends_with("/api") {
        url.push_str("/api");
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into an [`ApiError`].
fn map_transport_error(base: &str, err: &reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout(base.to_string());
    }
    if err.is_connect() {
        return ApiError::Network(base.to_string());
    }
    if err.is_decode() {
        return ApiError::InvalidResponse(err.to_string());
    }
    ApiError::Network(format!("{base} ({err})"))
}

/// Generic message for a status code when the body carries none.
fn status_fallback(status: StatusCode) -> String {
    match status.as_u16() {
        400 => "Request rejected by the server".to_string(),
        403 => "You do not have permission to do that".to_string(),
        404 => "Not found".to_string(),
        409 => "Conflicts with existing data".to_string(),
        s if s >= 500 => format!("Catering API server error (HTTP {s})"),
        s => format!("Request failed (HTTP {s})"),
    }
}

/// Build the error for a non-2xx response. The body's `error` (or `message`)
/// string is surfaced verbatim when present.
pub fn error_from_response(status: StatusCode, body_text: &str) -> ApiError {
    let message = serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

    if status == StatusCode::UNAUTHORIZED && message.is_none() {
        return ApiError::Unauthorized;
    }

    ApiError::Status {
        status: status.as_u16(),
        message: message.unwrap_or_else(|| status_fallback(status)),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiClient {
    base: String,
    http: Client,
    token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = normalize_api_base(api_base);
        if base.is_empty() {
            return Err(ApiError::Network("empty API base URL".to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base,
            http,
            token: None,
        })
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(Zeroizing::new(token.to_string()));
        self
    }

    #[cfg(test)]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Perform a request and return the raw JSON body (`Null` for empty bodies).
    ///
    /// `path` should include the leading slash, e.g. `/orders`.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let full_url = format!("{}{path}", self.base);
        let mut req = self
            .http
            .request(method.clone(), &full_url)
            .header("Content-Type", "application/json");
        if let Some(token) = self.token.as_ref() {
            req = req.bearer_auth(token.as_str());
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let start = Instant::now();
        let resp = req
            .send()
            .await
            .map_err(|e| map_transport_error(&self.base, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        debug!(
            method = %method,
            path,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "api request"
        );

        if !status.is_success() {
            return Err(error_from_response(status, &body_text));
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.request::<Value>(Method::GET, path, None).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("{path}: {e}")))
    }

    async fn post_typed<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = self.request(Method::POST, path, Some(body)).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("{path}: {e}")))
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request::<Value>(Method::DELETE, path, None).await?;
        Ok(())
    }

    // -- Auth ----------------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let resp: LoginResponse = self.post_typed("/auth/login", &body).await?;
        info!(email = %resp.user.email, role = %resp.user.role, "login succeeded");
        Ok(resp)
    }

    // -- Reference data ------------------------------------------------------

    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.get_typed("/categories").await
    }

    pub async fn ingredients(&self) -> Result<Vec<Ingredient>, ApiError> {
        self.get_typed("/ingredients").await
    }

    pub async fn dishes(&self) -> Result<Vec<Dish>, ApiError> {
        self.get_typed("/dishes").await
    }

    pub async fn customers(&self) -> Result<Vec<Customer>, ApiError> {
        self.get_typed("/customers").await
    }

    // -- Catalogue mutations -------------------------------------------------

    pub async fn create_category(&self, body: &NewCategory) -> Result<Value, ApiError> {
        self.request(Method::POST, "/categories", Some(body)).await
    }

    pub async fn delete_category(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/categories/{id}")).await
    }

    pub async fn create_ingredient(&self, body: &NewIngredient) -> Result<Value, ApiError> {
        self.request(Method::POST, "/ingredients", Some(body)).await
    }

    pub async fn delete_ingredient(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/ingredients/{id}")).await
    }

    pub async fn create_customer(&self, body: &NewCustomer) -> Result<Value, ApiError> {
        self.request(Method::POST, "/customers", Some(body)).await
    }

    pub async fn delete_customer(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/customers/{id}")).await
    }

    pub async fn create_dish(&self, body: &NewDish) -> Result<Value, ApiError> {
        self.request(Method::POST, "/dishes", Some(body)).await
    }

    pub async fn delete_dish(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/dishes/{id}")).await
    }

    // -- Orders --------------------------------------------------------------

    pub async fn create_order(&self, body: &CreateOrderRequest) -> Result<i64, ApiError> {
        let created: CreatedResponse = self.post_typed("/orders", body).await?;
        Ok(created.id)
    }

    pub async fn orders(&self) -> Result<Vec<OrderSummary>, ApiError> {
        self.get_typed("/orders").await
    }

    pub async fn order_slips(&self, order_id: i64) -> Result<SlipBundle, ApiError> {
        self.get_typed(&format!("/orders/{order_id}/slips")).await
    }

    // -- Reports -------------------------------------------------------------

    pub async fn report(&self, range: ReportRange) -> Result<ReportResponse, ApiError> {
        self.get_typed(&format!("/reports?range={}", range.as_str()))
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{serve, Canned};
    use super::*;

    #[test]
    fn normalizes_api_base() {
        assert_eq!(
            normalize_api_base("localhost:4000"),
            "http://localhost:4000/api"
        );
        assert_eq!(
            normalize_api_base("https://kitchen.example.com/api/"),
            "https://kitchen.example.com/api"
        );
        assert_eq!(
            normalize_api_base("kitchen.example.com"),
            "https://kitchen.example.com/api"
        );
        assert_eq!(normalize_api_base("   "), "");
    }

    #[test]
    fn error_body_message_is_surfaced_verbatim() {
        let err = error_from_response(StatusCode::BAD_REQUEST, r#"{"error":"Dish not found"}"#);
        assert_eq!(err.to_string(), "Dish not found");
        assert_eq!(err.status_code(), Some(400));
    }

    #[test]
    fn error_without_body_uses_fallback() {
        let err = error_from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.to_string(), "Catering API server error (HTTP 500)");
        let err = error_from_response(StatusCode::UNAUTHORIZED, "<html>nope</html>");
        assert!(matches!(err, ApiError::Unauthorized));
        let err =
            error_from_response(StatusCode::UNAUTHORIZED, r#"{"error":"Invalid credentials"}"#);
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[tokio::test]
    async fn create_order_sends_bearer_token_and_returns_id() {
        let (base, handle) = serve(vec![Canned {
            status: 201,
            body: r#"{"id":42}"#.to_string(),
        }])
        .await;
        let client = ApiClient::new(&base, DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("tok-123");
        let id = client
            .create_order(&CreateOrderRequest {
                dish_id: 1,
                customer_id: 2,
                requested_quantity: 5.0,
                requested_unit: "kg".into(),
                ..CreateOrderRequest::default()
            })
            .await
            .expect("create order");
        assert_eq!(id, 42);

        let requests = handle.await.expect("server");
        let raw = &requests[0];
        assert!(raw.starts_with("POST /api/orders"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer tok-123"));
        assert!(raw.contains("\"requested_quantity\":5.0"));
    }

    #[tokio::test]
    async fn non_success_response_maps_to_status_error() {
        let (base, handle) = serve(vec![Canned {
            status: 422,
            body: r#"{"error":"Quantity must be positive"}"#.to_string(),
        }])
        .await;
        let client = ApiClient::new(&base, DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("tok");
        let err = client.orders().await.expect_err("should fail");
        assert_eq!(err.to_string(), "Quantity must be positive");
        handle.await.expect("server");
    }

    #[tokio::test]
    async fn empty_delete_body_is_ok() {
        let (base, handle) = serve(vec![Canned {
            status: 204,
            body: String::new(),
        }])
        .await;
        let client = ApiClient::new(&base, DEFAULT_TIMEOUT)
            .expect("client")
            .with_token("tok");
        client.delete_dish(9).await.expect("delete");
        let requests = handle.await.expect("server");
        assert!(requests[0].starts_with("DELETE /api/dishes/9"));
    }
}
