use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::domain::{Actor, Address};
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::*;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub user_id: Uuid,
    pub customer: CustomerContact,

    // Purchase snapshot
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub discount_code: Option<String>,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub total_amount: Money,

    // Lifecycle
    pub status: OrderStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    pub payment_details: PaymentDetails,
    pub return_status: OrderReturnStatus,

    // Fulfillment
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_method: ShippingMethod,
    pub estimated_delivery_date: DateTime<Utc>,
    pub tracking_number: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<DateTime<Utc>>,

    // Cancellation
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Actor>,
    pub cancelled_at: Option<DateTime<Utc>>,

    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validate a checkout snapshot and build the pending order from it.
    pub fn place(placed: OrderPlaced) -> Result<(Self, OrderEvent), OrderError> {
        Self::validate_placement(&placed)?;
        let order = Self::apply_first_event(&placed);
        Ok((order, OrderEvent::Placed(placed)))
    }

    pub fn expected_total(subtotal: Money, discount: Money, shipping: Money, tax: Money) -> Money {
        subtotal - discount + shipping + tax
    }

    pub fn totals_consistent(&self) -> bool {
        self.total_amount
            == Self::expected_total(self.subtotal, self.discount_amount, self.shipping_cost, self.tax_amount)
    }

    /// When the order reached `delivered`, if it did.
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.status_history
            .iter()
            .rev()
            .find(|entry| entry.status == OrderStatus::Delivered)
            .map(|entry| entry.timestamp)
    }

    pub fn refundable_balance(&self) -> Money {
        self.payment_details.refundable_balance()
    }

    pub fn has_seller(&self, seller_id: Uuid) -> bool {
        self.items.iter().any(|item| item.seller_id == seller_id)
    }

    pub fn item(&self, product_id: Uuid) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    fn validate_placement(placed: &OrderPlaced) -> Result<(), OrderError> {
        if placed.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        let mut seen = std::collections::HashSet::with_capacity(placed.items.len());
        for item in &placed.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity(item.product_id));
            }
            if !seen.insert(item.product_id) {
                return Err(OrderError::DuplicateLine(item.product_id));
            }
        }

        for (name, amount) in [
            ("subtotal", placed.subtotal),
            ("discount", placed.discount_amount),
            ("shipping cost", placed.shipping_cost),
            ("tax", placed.tax_amount),
        ] {
            if amount.is_sign_negative() {
                return Err(OrderError::NegativeAmount(name));
            }
        }

        if placed.discount_amount > placed.subtotal {
            return Err(OrderError::DiscountExceedsSubtotal {
                discount: placed.discount_amount,
                subtotal: placed.subtotal,
            });
        }

        let expected = Self::expected_total(
            placed.subtotal,
            placed.discount_amount,
            placed.shipping_cost,
            placed.tax_amount,
        );
        if placed.total_amount != expected {
            return Err(OrderError::TotalMismatch {
                total: placed.total_amount,
                expected,
            });
        }

        if placed.payment_method.trim().is_empty() {
            return Err(OrderError::MissingField("payment method"));
        }

        Ok(())
    }

    fn apply_first_event(e: &OrderPlaced) -> Self {
        Self {
            id: e.order_id,
            version: 1,
            user_id: e.user_id,
            customer: e.customer.clone(),
            items: e.items.clone(),
            subtotal: e.subtotal,
            discount_amount: e.discount_amount,
            discount_code: e.discount_code.clone(),
            shipping_cost: e.shipping_cost,
            tax_amount: e.tax_amount,
            total_amount: e.total_amount,
            status: OrderStatus::Pending,
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Pending,
                timestamp: e.placed_at,
                actor: Actor::System,
                notes: Some("order created".to_string()),
                location: None,
            }],
            payment_details: PaymentDetails::unpaid(e.payment_method.clone()),
            return_status: OrderReturnStatus::None,
            shipping_address: e.shipping_address.clone(),
            billing_address: e.billing_address.clone(),
            shipping_method: e.shipping_method,
            estimated_delivery_date: e.estimated_delivery_date,
            tracking_number: None,
            invoice_number: None,
            invoice_date: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            idempotency_key: e.idempotency_key.clone(),
            created_at: e.placed_at,
            updated_at: e.placed_at,
        }
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::ChangeStatus { to, actor, notes, location, tracking_number, at } => {
                if *to == OrderStatus::Cancelled {
                    return Err(OrderError::CancelViaStatusChange);
                }
                if !self.status.can_transition_to(*to) {
                    return Err(OrderError::InvalidTransition { from: self.status, to: *to });
                }

                let assigned = if *to == OrderStatus::Shipped && self.tracking_number.is_none() {
                    Some(tracking_number.clone().ok_or(OrderError::MissingTrackingNumber)?)
                } else {
                    None
                };

                Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
                    from: self.status,
                    to: *to,
                    actor: *actor,
                    notes: notes.clone(),
                    location: location.clone(),
                    tracking_number: assigned,
                    changed_at: *at,
                })])
            }

            OrderCommand::Cancel { reason, actor, at } => {
                if !self.status.is_cancellable() {
                    return Err(OrderError::NotCancellable { order_id: self.id, status: self.status });
                }
                if reason.trim().is_empty() {
                    return Err(OrderError::MissingField("cancellation reason"));
                }

                Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                    from: self.status,
                    reason: reason.clone(),
                    cancelled_by: *actor,
                    cancelled_at: *at,
                })])
            }

            OrderCommand::RecordPayment { amount, reference, at } => {
                if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
                    return Err(OrderError::PaymentNotAccepted(self.status));
                }
                if !matches!(self.payment_details.status, PaymentStatus::Pending | PaymentStatus::Failed) {
                    return Err(OrderError::PaymentAlreadyRecorded);
                }
                if *amount <= Money::ZERO || *amount > self.total_amount {
                    return Err(OrderError::InvalidPaymentAmount { amount: *amount, total: self.total_amount });
                }
                if reference.trim().is_empty() {
                    return Err(OrderError::MissingField("payment reference"));
                }

                Ok(vec![OrderEvent::PaymentRecorded(OrderPaymentRecorded {
                    amount: *amount,
                    reference: reference.clone(),
                    paid_at: *at,
                })])
            }

            OrderCommand::RecordRefund { amount, reason, transaction_id, at } => {
                if *amount <= Money::ZERO {
                    return Err(OrderError::NonPositiveRefund);
                }
                let available = self.refundable_balance();
                if *amount > available {
                    return Err(OrderError::RefundExceedsPaid { requested: *amount, available });
                }
                if transaction_id.trim().is_empty() {
                    return Err(OrderError::MissingField("refund transaction id"));
                }

                Ok(vec![OrderEvent::RefundRecorded(OrderRefundRecorded {
                    amount: *amount,
                    reason: reason.clone(),
                    transaction_id: transaction_id.clone(),
                    refunded_total: self.payment_details.refunded_amount + *amount,
                    refunded_at: *at,
                })])
            }

            OrderCommand::IssueInvoice { invoice_number, at } => {
                if self.invoice_number.is_some() {
                    return Ok(vec![]);
                }

                Ok(vec![OrderEvent::InvoiceIssued(OrderInvoiceIssued {
                    invoice_number: invoice_number.clone(),
                    issued_at: *at,
                })])
            }

            OrderCommand::SetReturnStatus { return_status, at } => {
                if self.return_status == *return_status {
                    return Ok(vec![]);
                }

                Ok(vec![OrderEvent::ReturnStatusChanged(OrderReturnStatusChanged {
                    return_status: *return_status,
                    changed_at: *at,
                })])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(_) => {
                // Applied through `place`
                return;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                if let Some(tracking) = &e.tracking_number {
                    self.tracking_number = Some(tracking.clone());
                }
                self.status_history.push(StatusHistoryEntry {
                    status: e.to,
                    timestamp: e.changed_at,
                    actor: e.actor,
                    notes: e.notes.clone(),
                    location: e.location.clone(),
                });
                self.updated_at = e.changed_at;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = Some(e.reason.clone());
                self.cancelled_by = Some(e.cancelled_by);
                self.cancelled_at = Some(e.cancelled_at);
                self.status_history.push(StatusHistoryEntry {
                    status: OrderStatus::Cancelled,
                    timestamp: e.cancelled_at,
                    actor: e.cancelled_by,
                    notes: Some(e.reason.clone()),
                    location: None,
                });
                self.updated_at = e.cancelled_at;
            }
            OrderEvent::PaymentRecorded(e) => {
                self.payment_details.status = PaymentStatus::Completed;
                self.payment_details.paid_amount = e.amount;
                self.payment_details.reference = Some(e.reference.clone());
                self.payment_details.paid_at = Some(e.paid_at);
                self.updated_at = e.paid_at;
            }
            OrderEvent::RefundRecorded(e) => {
                let payment = &mut self.payment_details;
                payment.refunded_amount = e.refunded_total;
                payment.status = if payment.refunded_amount >= payment.paid_amount {
                    PaymentStatus::Refunded
                } else {
                    PaymentStatus::PartiallyRefunded
                };
                self.updated_at = e.refunded_at;
            }
            OrderEvent::InvoiceIssued(e) => {
                self.invoice_number = Some(e.invoice_number.clone());
                self.invoice_date = Some(e.issued_at);
                self.updated_at = e.issued_at;
            }
            OrderEvent::ReturnStatusChanged(e) => {
                self.return_status = e.return_status;
                self.updated_at = e.changed_at;
            }
        }

        self.version += 1;
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn change(to: OrderStatus, tracking: Option<&str>) -> OrderCommand {
        OrderCommand::ChangeStatus {
            to,
            actor: Actor::User(Uuid::new_v4()),
            notes: Some("moved".to_string()),
            location: Some("Hub 4".to_string()),
            tracking_number: tracking.map(str::to_string),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_place_creates_pending_order_with_one_history_entry() {
        let order = order(vec![item(Uuid::new_v4(), 2, 100)]);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.version, 1);
        assert_eq!(order.status_history.len(), 1);
        assert_eq!(order.status_history[0].actor, Actor::System);
        assert_eq!(order.status_history[0].notes.as_deref(), Some("order created"));
        assert_eq!(order.total_amount, Money::from(200));
        assert!(order.totals_consistent());
    }

    #[test]
    fn test_place_rejects_inconsistent_total() {
        let mut placed = placed(vec![item(Uuid::new_v4(), 1, 100)]);
        placed.shipping_cost = Money::from(40);

        let err = Order::place(placed).unwrap_err();
        assert!(matches!(err, OrderError::TotalMismatch { .. }));
    }

    #[test]
    fn test_place_rejects_empty_items_and_zero_quantity() {
        assert!(matches!(Order::place(placed(vec![])), Err(OrderError::EmptyItems)));

        let product = Uuid::new_v4();
        let mut zero = item(product, 1, 10);
        zero.quantity = 0;
        assert!(matches!(
            Order::place(placed(vec![zero])),
            Err(OrderError::InvalidQuantity(id)) if id == product
        ));
    }

    #[test]
    fn test_place_rejects_split_lines_for_one_product() {
        let product = Uuid::new_v4();
        let err = Order::place(placed(vec![item(product, 1, 10), item(product, 2, 10)])).unwrap_err();
        assert!(matches!(err, OrderError::DuplicateLine(id) if id == product));
    }

    #[test]
    fn test_invalid_transition_leaves_state_unchanged() {
        let mut order = order(vec![item(Uuid::new_v4(), 1, 50)]);
        let before = order.clone();

        let err = order.execute(change(OrderStatus::Shipped, Some("TRK1"))).unwrap_err();

        assert!(matches!(
            err,
            OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped }
        ));
        assert_eq!(order, before);
    }

    #[test]
    fn test_tracking_number_assigned_once() {
        let mut order = order(vec![item(Uuid::new_v4(), 1, 50)]);
        advance(&mut order, OrderStatus::Confirmed);
        advance(&mut order, OrderStatus::Processing);

        let events = order.execute(change(OrderStatus::Shipped, Some("TRK-FIRST"))).unwrap();
        assert!(matches!(
            &events[0],
            OrderEvent::StatusChanged(e) if e.tracking_number.as_deref() == Some("TRK-FIRST")
        ));
        assert_eq!(order.tracking_number.as_deref(), Some("TRK-FIRST"));

        order.execute(change(OrderStatus::Delivered, Some("TRK-SECOND"))).unwrap();
        assert_eq!(order.tracking_number.as_deref(), Some("TRK-FIRST"));
    }

    #[test]
    fn test_shipping_without_tracking_candidate_fails() {
        let mut order = order(vec![item(Uuid::new_v4(), 1, 50)]);
        advance(&mut order, OrderStatus::Confirmed);
        advance(&mut order, OrderStatus::Processing);

        let err = order.execute(change(OrderStatus::Shipped, None)).unwrap_err();
        assert!(matches!(err, OrderError::MissingTrackingNumber));
    }

    #[test]
    fn test_history_pairs_are_table_edges() {
        let order = delivered(vec![item(Uuid::new_v4(), 1, 50)]);

        assert_eq!(order.status_history.len(), 5);
        for pair in order.status_history.windows(2) {
            assert!(pair[0].status.can_transition_to(pair[1].status));
        }
        assert!(order.delivered_at().is_some());
    }

    #[test]
    fn test_cancel_records_reason_and_history() {
        let mut order = order(vec![item(Uuid::new_v4(), 1, 50)]);
        let user = Uuid::new_v4();

        order
            .execute(OrderCommand::Cancel {
                reason: "changed my mind".to_string(),
                actor: Actor::User(user),
                at: Utc::now(),
            })
            .unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancelled_by, Some(Actor::User(user)));
        assert_eq!(order.cancellation_reason.as_deref(), Some("changed my mind"));
        assert_eq!(order.status_history.last().unwrap().status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_delivery_is_rejected() {
        let mut order = delivered(vec![item(Uuid::new_v4(), 1, 50)]);
        let err = order
            .execute(OrderCommand::Cancel {
                reason: "too late".to_string(),
                actor: Actor::System,
                at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, OrderError::NotCancellable { status: OrderStatus::Delivered, .. }));
    }

    #[test]
    fn test_status_change_to_cancelled_is_refused() {
        let mut order = order(vec![item(Uuid::new_v4(), 1, 50)]);
        let err = order.execute(change(OrderStatus::Cancelled, None)).unwrap_err();
        assert!(matches!(err, OrderError::CancelViaStatusChange));
    }

    #[test]
    fn test_refunds_accumulate_up_to_paid_amount() {
        let mut order = order(vec![item(Uuid::new_v4(), 2, 500)]);
        order
            .execute(OrderCommand::RecordPayment {
                amount: Money::from(1000),
                reference: "pay_1".to_string(),
                at: Utc::now(),
            })
            .unwrap();

        let refund = |amount: i64| OrderCommand::RecordRefund {
            amount: Money::from(amount),
            reason: "return".to_string(),
            transaction_id: "rf_1".to_string(),
            at: Utc::now(),
        };

        order.execute(refund(400)).unwrap();
        assert_eq!(order.payment_details.refunded_amount, Money::from(400));
        assert_eq!(order.payment_details.status, PaymentStatus::PartiallyRefunded);

        let err = order.execute(refund(700)).unwrap_err();
        assert!(matches!(err, OrderError::RefundExceedsPaid { .. }));
        assert_eq!(order.payment_details.refunded_amount, Money::from(400));

        order.execute(refund(600)).unwrap();
        assert_eq!(order.payment_details.status, PaymentStatus::Refunded);
        assert!(order.payment_details.refunded_amount <= order.payment_details.paid_amount);
    }

    #[test]
    fn test_payment_recorded_once() {
        let mut order = order(vec![item(Uuid::new_v4(), 1, 300)]);
        let pay = |amount: i64| OrderCommand::RecordPayment {
            amount: Money::from(amount),
            reference: "pay".to_string(),
            at: Utc::now(),
        };

        assert!(matches!(order.execute(pay(301)), Err(OrderError::InvalidPaymentAmount { .. })));
        order.execute(pay(300)).unwrap();
        assert!(matches!(order.execute(pay(300)), Err(OrderError::PaymentAlreadyRecorded)));
    }

    #[test]
    fn test_invoice_issued_only_once() {
        let mut order = order(vec![item(Uuid::new_v4(), 1, 300)]);
        let issue = |number: &str| OrderCommand::IssueInvoice {
            invoice_number: number.to_string(),
            at: Utc::now(),
        };

        assert_eq!(order.execute(issue("INV-1")).unwrap().len(), 1);
        let version = order.version;
        assert!(order.execute(issue("INV-2")).unwrap().is_empty());
        assert_eq!(order.invoice_number.as_deref(), Some("INV-1"));
        assert_eq!(order.version, version);
    }

    #[test]
    fn test_order_document_serialization() {
        let order = delivered(vec![item(Uuid::new_v4(), 3, 120)]);
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
