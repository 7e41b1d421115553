//! Entitlement gate
//!
//! The service revokes streaming with `payment_required` once a trial is
//! used up. The gate owns the conversation with the external payment
//! capability and tells the session what to do with the outcome; it never
//! changes session state itself and only ever produces one kind of message
//! for the transport (the payment verification).

mod bridge;

pub use bridge::{HttpPaymentBridge, PendingPayment};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::protocol::ClientMessage;

/// What the user is charged to continue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeDescriptor {
    /// Amount in the currency's minor unit (kobo, cents, ...)
    pub amount: u64,
    /// ISO 4217 code
    pub currency: String,
}

impl Default for ChargeDescriptor {
    fn default() -> Self {
        Self {
            amount: 500_000, // 5000 NGN
            currency: "NGN".to_string(),
        }
    }
}

/// How a payment flow ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success { reference: String },
    Cancelled,
}

/// External payment provider (checkout UI, popup, ...)
///
/// `open` resolves when the user completes or abandons the flow. It may
/// stay pending for as long as the user takes.
#[async_trait::async_trait]
pub trait PaymentCapability: Send + Sync {
    async fn open(&self, identity: &str, charge: &ChargeDescriptor) -> PaymentOutcome;
}

/// Instruction from the gate back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Send `verification` and resume streaming
    Resume { verification: ClientMessage },
    /// Stay suspended until the user retries
    Hold,
}

pub struct EntitlementGate {
    capability: Arc<dyn PaymentCapability>,
    charge: ChargeDescriptor,
    timeout: Option<Duration>,
    attempts: u32,
}

impl EntitlementGate {
    pub fn new(capability: Arc<dyn PaymentCapability>, charge: ChargeDescriptor) -> Self {
        Self {
            capability,
            charge,
            timeout: None,
            attempts: 0,
        }
    }

    /// Give up on a payment flow after `timeout` (treated as a cancellation)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn charge(&self) -> &ChargeDescriptor {
        &self.charge
    }

    /// Number of payment flows opened so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Open the payment flow for `identity`
    ///
    /// The flow runs in its own task; the session picks up the outcome as an
    /// event when it resolves.
    pub fn on_payment_required(&mut self, identity: &str) -> JoinHandle<PaymentOutcome> {
        self.attempts += 1;

        info!(
            "Opening payment flow for {} ({} {}, attempt {})",
            identity, self.charge.amount, self.charge.currency, self.attempts
        );

        let capability = Arc::clone(&self.capability);
        let charge = self.charge.clone();
        let identity = identity.to_string();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let flow = capability.open(&identity, &charge);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, flow).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("Payment flow timed out after {}ms", limit.as_millis());
                        PaymentOutcome::Cancelled
                    }
                },
                None => flow.await,
            }
        })
    }

    /// Turn a payment outcome into an instruction for the session
    pub fn on_payment_outcome(&self, outcome: PaymentOutcome) -> GateDecision {
        match outcome {
            PaymentOutcome::Success { reference } => {
                info!("Payment confirmed (reference {})", reference);
                GateDecision::Resume {
                    verification: ClientMessage::PaymentVerification { reference },
                }
            }
            PaymentOutcome::Cancelled => {
                info!("Payment cancelled; streaming stays suspended");
                GateDecision::Hold
            }
        }
    }
}
