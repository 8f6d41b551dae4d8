use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::collaborators::{CollaboratorGuard, PaymentGateway};
use crate::domain::order::{Money, Order, OrderCommand, OrderEvent};
use crate::error::EngineError;

// ============================================================================
// Refund Ledger - cumulative refunds against the paid amount
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundSource {
    Cancellation,
    Return,
}

impl RefundSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RefundSource::Cancellation => "cancellation",
            RefundSource::Return => "return",
        }
    }
}

#[derive(Clone)]
pub struct RefundLedger {
    gateway: Arc<dyn PaymentGateway>,
    guard: CollaboratorGuard,
}

impl RefundLedger {
    pub fn new(gateway: Arc<dyn PaymentGateway>, guard: CollaboratorGuard) -> Self {
        Self { gateway, guard }
    }

    /// Fail early when `amount` would push refunds past the paid amount.
    pub fn check_cap(order: &Order, amount: Money) -> Result<(), EngineError> {
        if amount <= Money::ZERO {
            return Err(EngineError::Validation("refund amount must be positive".to_string()));
        }
        let available = order.refundable_balance();
        if amount > available {
            return Err(EngineError::RefundExceedsPaid {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// Record a refund that was already settled with the gateway.
    pub fn record(
        &self,
        order: &mut Order,
        amount: Money,
        reason: &str,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, EngineError> {
        Self::check_cap(order, amount)?;
        let events = order.execute(OrderCommand::RecordRefund {
            amount,
            reason: reason.to_string(),
            transaction_id: transaction_id.to_string(),
            at,
        })?;

        tracing::info!(
            order_id = %order.id,
            %amount,
            refunded_total = %order.payment_details.refunded_amount,
            transaction_id,
            "Refund recorded"
        );
        Ok(events)
    }

    /// Ask the gateway for the money back, then record it. The cap is
    /// checked before the gateway is called.
    pub async fn refund_through_gateway(
        &self,
        order: &mut Order,
        amount: Money,
        reason: &str,
        idempotency_key: &str,
        at: DateTime<Utc>,
    ) -> Result<(String, Vec<OrderEvent>), EngineError> {
        Self::check_cap(order, amount)?;
        let transaction_id = self.settle(order.id, amount, idempotency_key).await?;
        let events = self.record(order, amount, reason, &transaction_id, at)?;
        Ok((transaction_id, events))
    }

    /// Gateway call only; returns the transaction id. Retrying with the same
    /// key after a failed commit gets the original transaction back.
    pub async fn settle(&self, order_ref: Uuid, amount: Money, idempotency_key: &str) -> Result<String, EngineError> {
        let receipt = self
            .guard
            .call(self.gateway.refund(order_ref, amount, idempotency_key))
            .await
            .map_err(EngineError::external("payment gateway"))?;
        Ok(receipt.transaction_id)
    }
}
