//! Payment provider API client implementation.

use std::time::Duration;

use reqwest::Client;

use crate::error::{PayError, Result};
use crate::types::{
    Amount, ConfirmationRequest, CreatePaymentRequest, ProviderErrorResponse, ProviderPayment,
};

/// Default provider API base URL.
const DEFAULT_BASE_URL: &str = "https://api.yookassa.ru/v3";

/// Payment provider API client.
///
/// Authenticates with HTTP basic auth (shop id as username, secret key as
/// password). Every create call carries an `Idempotence-Key` header so a
/// retried request cannot double-charge.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    shop_id: String,
    secret_key: String,
}

impl ProviderClient {
    /// Create a new client against the production API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(shop_id: impl Into<String>, secret_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(shop_id, secret_key, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom base URL, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        shop_id: impl Into<String>,
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            shop_id: shop_id.into(),
            secret_key: secret_key.into(),
        })
    }

    /// Create a payment and return the provider's payment object, including
    /// the confirmation URL the user must visit.
    ///
    /// `idempotence_key` must be unique per logical purchase attempt and
    /// stable across retries of the same attempt.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a provider error response.
    pub async fn create_payment(
        &self,
        amount_minor: i64,
        currency: &str,
        description: &str,
        return_url: &str,
        metadata: serde_json::Value,
        idempotence_key: &str,
    ) -> Result<ProviderPayment> {
        let body = CreatePaymentRequest {
            amount: Amount::from_minor(amount_minor, currency),
            capture: true,
            confirmation: ConfirmationRequest {
                kind: "redirect".to_string(),
                return_url: return_url.to_string(),
            },
            description: description.to_string(),
            metadata,
        };

        tracing::debug!(
            amount_minor,
            currency,
            idempotence_key,
            "creating provider payment"
        );

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", idempotence_key)
            .json(&body)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Fetch the current state of a payment.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a provider error response.
    pub async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?;

        handle_response(response).await
    }
}

/// Handle an API response and convert errors.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return Ok(response.json().await?);
    }

    let error_body: std::result::Result<ProviderErrorResponse, _> = response.json().await;

    match error_body {
        Ok(body) => Err(PayError::Api {
            code: body.code.unwrap_or_else(|| "unknown".to_string()),
            description: body
                .description
                .unwrap_or_else(|| format!("HTTP {status}")),
        }),
        Err(_) => Err(PayError::Api {
            code: "unknown".to_string(),
            description: format!("HTTP {status}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderStatus;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn create_payment_sends_idempotence_key() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(header_exists("Idempotence-Key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-1",
                "status": "pending",
                "paid": false,
                "confirmation": { "confirmation_url": "https://pay.example/p/1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ProviderClient::with_base_url("shop", "secret", server.uri()).unwrap();
        let payment = client
            .create_payment(
                49_00,
                "RUB",
                "Single job",
                "https://bot.example/return",
                serde_json::json!({"user_id": 1}),
                "idem-1",
            )
            .await
            .unwrap();

        assert_eq!(payment.id, "pay-1");
        assert_eq!(payment.status, ProviderStatus::Pending);
        assert_eq!(
            payment.confirmation.unwrap().confirmation_url.as_deref(),
            Some("https://pay.example/p/1")
        );
    }

    #[tokio::test]
    async fn get_payment_reports_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/payments/pay-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-2",
                "status": "succeeded",
                "paid": true
            })))
            .mount(&server)
            .await;

        let client = ProviderClient::with_base_url("shop", "secret", server.uri()).unwrap();
        let payment = client.get_payment("pay-2").await.unwrap();
        assert_eq!(payment.status, ProviderStatus::Succeeded);
        assert!(payment.paid);
    }

    #[tokio::test]
    async fn api_errors_surface_code_and_description() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/payments/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": "not_found",
                "description": "Payment not found"
            })))
            .mount(&server)
            .await;

        let client = ProviderClient::with_base_url("shop", "secret", server.uri()).unwrap();
        let err = client.get_payment("missing").await.unwrap_err();
        match err {
            PayError::Api { code, description } => {
                assert_eq!(code, "not_found");
                assert_eq!(description, "Payment not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
