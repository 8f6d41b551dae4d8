use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::DomainEvent;
use crate::domain::{Actor, Address};
use super::value_objects::{CustomerContact, Money, OrderItem, OrderReturnStatus, OrderStatus, ShippingMethod};

// ============================================================================
// Order Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
    Cancelled(OrderCancelled),
    PaymentRecorded(OrderPaymentRecorded),
    RefundRecorded(OrderRefundRecorded),
    InvoiceIssued(OrderInvoiceIssued),
    ReturnStatusChanged(OrderReturnStatusChanged),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::PaymentRecorded(_) => "OrderPaymentRecorded",
            OrderEvent::RefundRecorded(_) => "OrderRefundRecorded",
            OrderEvent::InvoiceIssued(_) => "OrderInvoiceIssued",
            OrderEvent::ReturnStatusChanged(_) => "OrderReturnStatusChanged",
        }
    }
}

/// First event of every order; carries the complete checkout snapshot.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub customer: CustomerContact,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub discount_code: Option<String>,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub payment_method: String,
    pub shipping_method: ShippingMethod,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub estimated_delivery_date: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub notes: Option<String>,
    pub location: Option<String>,
    /// Set only when this change assigned the tracking number
    pub tracking_number: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderCancelled {
    pub from: OrderStatus,
    pub reason: String,
    pub cancelled_by: Actor,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderPaymentRecorded {
    pub amount: Money,
    pub reference: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderRefundRecorded {
    pub amount: Money,
    pub reason: String,
    pub transaction_id: String,
    /// Cumulative refunded amount after this refund
    pub refunded_total: Money,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderInvoiceIssued {
    pub invoice_number: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderReturnStatusChanged {
    pub return_status: OrderReturnStatus,
    pub changed_at: DateTime<Utc>,
}
