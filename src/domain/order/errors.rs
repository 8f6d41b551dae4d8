use uuid::Uuid;

use super::value_objects::{Money, OrderStatus};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order {order_id} cannot be cancelled in status {status}")]
    NotCancellable { order_id: Uuid, status: OrderStatus },

    #[error("Cancellation goes through the cancel operation")]
    CancelViaStatusChange,

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity for product {0}")]
    InvalidQuantity(Uuid),

    #[error("Product {0} appears on more than one line")]
    DuplicateLine(Uuid),

    #[error("{0} cannot be negative")]
    NegativeAmount(&'static str),

    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Money, subtotal: Money },

    #[error("Total {total} does not equal subtotal - discount + shipping + tax ({expected})")]
    TotalMismatch { total: Money, expected: Money },

    #[error("A tracking number is required to ship")]
    MissingTrackingNumber,

    #[error("Payment already recorded")]
    PaymentAlreadyRecorded,

    #[error("Payment amount {amount} must be positive and at most the order total {total}")]
    InvalidPaymentAmount { amount: Money, total: Money },

    #[error("Cannot record payment for order in status {0}")]
    PaymentNotAccepted(OrderStatus),

    #[error("Refund amount must be positive")]
    NonPositiveRefund,

    #[error("Refund of {requested} exceeds refundable balance {available}")]
    RefundExceedsPaid { requested: Money, available: Money },

    #[error("{0} is required")]
    MissingField(&'static str),
}
