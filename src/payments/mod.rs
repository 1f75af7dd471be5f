// Payment gateway abstraction
// The checkout engine only creates intents and reads them back; capture happens client-side

pub mod simulated;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub use simulated::SimulatedGateway;
pub use stripe::{StripeConfig, StripeGateway};

/// Lifecycle status of a payment intent, as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentIntentStatus::RequiresPaymentMethod => "requires_payment_method",
            PaymentIntentStatus::RequiresConfirmation => "requires_confirmation",
            PaymentIntentStatus::RequiresAction => "requires_action",
            PaymentIntentStatus::Processing => "processing",
            PaymentIntentStatus::RequiresCapture => "requires_capture",
            PaymentIntentStatus::Canceled => "canceled",
            PaymentIntentStatus::Succeeded => "succeeded",
        };
        write!(f, "{}", label)
    }
}

impl std::str::FromStr for PaymentIntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requires_payment_method" => Ok(PaymentIntentStatus::RequiresPaymentMethod),
            "requires_confirmation" => Ok(PaymentIntentStatus::RequiresConfirmation),
            "requires_action" => Ok(PaymentIntentStatus::RequiresAction),
            "processing" => Ok(PaymentIntentStatus::Processing),
            "requires_capture" => Ok(PaymentIntentStatus::RequiresCapture),
            "canceled" => Ok(PaymentIntentStatus::Canceled),
            "succeeded" => Ok(PaymentIntentStatus::Succeeded),
            _ => Err(format!("Invalid payment intent status: {}", s)),
        }
    }
}

/// A payment intent as seen by the checkout engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the client so it can complete payment
    pub client_secret: Option<String>,
    /// Requested amount in minor units
    pub amount: i64,
    /// Amount actually captured in minor units
    pub amount_received: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == PaymentIntentStatus::Succeeded
    }
}

/// Errors talking to the payment gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Payment intent not found: {0}")]
    NotFound(String),

    #[error("Unexpected gateway response: {0}")]
    Decode(String),
}

/// Outbound port to the card processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an intent for `amount` minor units
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Fetch the current state of an intent
    async fn get_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError>;
}
