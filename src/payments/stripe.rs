// Stripe PaymentIntents client
// Amounts travel in minor units; requests are form-encoded with the secret key as bearer token

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

use crate::payments::{GatewayError, PaymentGateway, PaymentIntent, PaymentIntentStatus};

/// Default Stripe API root
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Configuration for connecting to Stripe
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key
    pub secret_key: String,

    /// API root, normally `DEFAULT_API_BASE`
    pub api_base: String,
}

/// HTTP client for the Stripe PaymentIntents API
#[derive(Debug, Clone)]
pub struct StripeGateway {
    config: StripeConfig,
    http: Client,
}

impl StripeGateway {
    /// Create a new StripeGateway
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn parse_intent(
        response: reqwest::Response,
        id: Option<&str>,
    ) -> Result<PaymentIntent, GatewayError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(GatewayError::NotFound(id.to_string()));
            }
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);

            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: StripeIntent = response.json().await?;
        parsed.try_into()
    }
}

/// Encode intent parameters the way the Stripe form API expects them
fn intent_form(
    amount: i64,
    currency: &str,
    metadata: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), amount.to_string()),
        ("currency".to_string(), currency.to_lowercase()),
        (
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ),
    ];

    let mut keys: Vec<&String> = metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{}]", key), metadata[key].clone()));
    }

    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<PaymentIntent, GatewayError> {
        let response = self
            .http
            .post(self.url("/v1/payment_intents"))
            .bearer_auth(&self.config.secret_key)
            .form(&intent_form(amount, currency, metadata))
            .send()
            .await?;

        let intent = Self::parse_intent(response, None).await?;
        tracing::info!(intent_id = %intent.id, amount, "Created Stripe payment intent");
        Ok(intent)
    }

    async fn get_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/payment_intents/{}", id)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        Self::parse_intent(response, Some(id)).await
    }
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    amount: i64,
    #[serde(default)]
    amount_received: i64,
    currency: String,
    status: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl TryFrom<StripeIntent> for PaymentIntent {
    type Error = GatewayError;

    fn try_from(intent: StripeIntent) -> Result<Self, Self::Error> {
        let status = intent.status.parse::<PaymentIntentStatus>().map_err(GatewayError::Decode)?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            amount_received: intent.amount_received,
            currency: intent.currency,
            status,
            metadata: intent.metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}
