use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{ChargeDescriptor, PaymentCapability, PaymentOutcome};

/// A payment flow waiting on the external UI
#[derive(Debug, Clone, Serialize)]
pub struct PendingPayment {
    pub identity: String,
    pub charge: ChargeDescriptor,
    pub requested_at: DateTime<Utc>,
}

type Slot = Option<(PendingPayment, oneshot::Sender<PaymentOutcome>)>;

/// Payment capability that parks the request until the UI reports back
///
/// The external UI polls `pending()`, runs the real checkout, then calls
/// `complete(reference)` or `cancel()` (the control API exposes these).
#[derive(Clone, Default)]
pub struct HttpPaymentBridge {
    slot: Arc<Mutex<Slot>>,
}

impl HttpPaymentBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// The payment currently waiting for the UI, if any
    pub fn pending(&self) -> Option<PendingPayment> {
        let mut slot = self.slot.lock().ok()?;

        // The session may have abandoned the flow (stop, reconnect)
        if slot.as_ref().is_some_and(|(_, tx)| tx.is_closed()) {
            *slot = None;
        }

        slot.as_ref().map(|(pending, _)| pending.clone())
    }

    /// Report a successful checkout; false if nothing was pending
    pub fn complete(&self, reference: impl Into<String>) -> bool {
        self.resolve(PaymentOutcome::Success {
            reference: reference.into(),
        })
    }

    /// Report an abandoned checkout; false if nothing was pending
    pub fn cancel(&self) -> bool {
        self.resolve(PaymentOutcome::Cancelled)
    }

    fn resolve(&self, outcome: PaymentOutcome) -> bool {
        let taken = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };

        match taken {
            Some((_, tx)) => tx.send(outcome).is_ok(),
            None => {
                warn!("No payment pending; ignoring {:?}", outcome);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl PaymentCapability for HttpPaymentBridge {
    async fn open(&self, identity: &str, charge: &ChargeDescriptor) -> PaymentOutcome {
        let (tx, rx) = oneshot::channel();
        let pending = PendingPayment {
            identity: identity.to_string(),
            charge: charge.clone(),
            requested_at: Utc::now(),
        };

        if let Ok(mut slot) = self.slot.lock() {
            // A previous flow still parked here is superseded (its sender is
            // dropped, which resolves it as cancelled)
            *slot = Some((pending, tx));
        }

        info!("Payment request parked for the UI ({})", identity);

        rx.await.unwrap_or(PaymentOutcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_resolves_open_flow() {
        let bridge = HttpPaymentBridge::new();
        let flow = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.open("u1", &ChargeDescriptor::default()).await })
        };

        // Wait for the request to be parked
        let mut pending = None;
        for _ in 0..50 {
            pending = bridge.pending();
            if pending.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(pending.unwrap().identity, "u1");

        assert!(bridge.complete("ref-9"));
        assert_eq!(
            flow.await.unwrap(),
            PaymentOutcome::Success {
                reference: "ref-9".to_string()
            }
        );
        assert!(bridge.pending().is_none());
    }

    #[test]
    fn test_resolve_without_pending() {
        let bridge = HttpPaymentBridge::new();
        assert!(!bridge.complete("ref"));
        assert!(!bridge.cancel());
    }
}
