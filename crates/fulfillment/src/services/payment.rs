//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use common::Money;
use domain::PaymentStatus;

use crate::error::FulfillmentError;

/// Result of initializing a charge with the gateway.
#[derive(Debug, Clone)]
pub struct ChargeInit {
    /// Gateway reference for the transaction.
    pub reference: String,
    /// URL the buyer completes payment at.
    pub authorization_url: String,
}

/// Result of verifying a charge.
#[derive(Debug, Clone)]
pub struct Verification {
    pub status: PaymentStatus,
    pub amount: Money,
}

/// Trait for payment processing operations.
///
/// Charge and refund calls are attempted once per triggering event;
/// repeated failures surface to an operator queue rather than retrying.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initializes a charge for the buyer, returning the gateway reference.
    async fn charge(&self, buyer_email: &str, amount: Money)
    -> Result<ChargeInit, FulfillmentError>;

    /// Verifies the state of a previously initialized charge.
    async fn verify(&self, reference: &str) -> Result<Verification, FulfillmentError>;

    /// Refunds up to `amount` against a charge.
    async fn refund(
        &self,
        reference: &str,
        amount: Money,
        reason: &str,
    ) -> Result<(), FulfillmentError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: HashMap<String, (Money, PaymentStatus)>,
    refunds: Vec<(String, Money)>,
    next_id: u32,
    fail_on_verify: bool,
    fail_on_refund: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a successful charge so `verify` can confirm it.
    pub fn seed_success(&self, reference: &str, amount: Money) {
        self.state
            .write()
            .unwrap()
            .charges
            .insert(reference.to_string(), (amount, PaymentStatus::Success));
    }

    /// Registers a failed charge for a reference.
    pub fn seed_failed(&self, reference: &str, amount: Money) {
        self.state
            .write()
            .unwrap()
            .charges
            .insert(reference.to_string(), (amount, PaymentStatus::Failed));
    }

    /// Configures verification calls to fail with a gateway error.
    pub fn set_fail_on_verify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_verify = fail;
    }

    /// Configures refund calls to fail with a gateway error.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    /// Returns the total amount refunded against a reference.
    pub fn refunded_amount(&self, reference: &str) -> Money {
        self.state
            .read()
            .unwrap()
            .refunds
            .iter()
            .filter(|(r, _)| r == reference)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        _buyer_email: &str,
        amount: Money,
    ) -> Result<ChargeInit, FulfillmentError> {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let reference = format!("PAY_{:04}", state.next_id);
        state
            .charges
            .insert(reference.clone(), (amount, PaymentStatus::Success));
        Ok(ChargeInit {
            authorization_url: format!("https://checkout.gateway.local/{reference}"),
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<Verification, FulfillmentError> {
        let state = self.state.read().unwrap();
        if state.fail_on_verify {
            return Err(FulfillmentError::PaymentFailed {
                reference: reference.to_string(),
                reason: "gateway unavailable".to_string(),
            });
        }
        match state.charges.get(reference) {
            Some((amount, status)) => Ok(Verification {
                status: *status,
                amount: *amount,
            }),
            None => Err(FulfillmentError::PaymentFailed {
                reference: reference.to_string(),
                reason: "unknown reference".to_string(),
            }),
        }
    }

    async fn refund(
        &self,
        reference: &str,
        amount: Money,
        _reason: &str,
    ) -> Result<(), FulfillmentError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_refund {
            return Err(FulfillmentError::PaymentFailed {
                reference: reference.to_string(),
                reason: "refund declined by gateway".to_string(),
            });
        }
        state.refunds.push((reference.to_string(), amount));
        Ok(())
    }
}
