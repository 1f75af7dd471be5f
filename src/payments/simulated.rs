// In-process payment gateway
// Used for local runs and tests; the test or operator plays the card holder via `capture`

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::payments::{GatewayError, PaymentGateway, PaymentIntent, PaymentIntentStatus};

/// Payment gateway that keeps intents in memory
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    intents: RwLock<HashMap<String, PaymentIntent>>,
    sequence: AtomicU64,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the full requested amount, as a successful card payment would
    pub async fn capture(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        let mut intents = self.intents.write().await;
        let intent = intents
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        intent.amount_received = intent.amount;
        intent.status = PaymentIntentStatus::Succeeded;
        Ok(intent.clone())
    }

    /// Capture an arbitrary amount; lets tests produce a mismatched capture
    pub async fn capture_amount(&self, id: &str, amount: i64) -> Result<PaymentIntent, GatewayError> {
        let mut intents = self.intents.write().await;
        let intent = intents
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        intent.amount_received = amount;
        intent.status = PaymentIntentStatus::Succeeded;
        Ok(intent.clone())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<PaymentIntent, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::Rejected {
                status: 400,
                message: format!("Amount must be positive, got {}", amount),
            });
        }

        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("pi_sim_{:06}", n);
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret", id)),
            id: id.clone(),
            amount,
            amount_received: 0,
            currency: currency.to_lowercase(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            metadata: metadata.clone(),
        };

        self.intents.write().await.insert(id.clone(), intent.clone());
        tracing::debug!(intent_id = %id, amount, "Created simulated payment intent");
        Ok(intent)
    }

    async fn get_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
        self.intents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }
}
