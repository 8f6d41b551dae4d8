use uuid::Uuid;

use super::value_objects::ReturnStatus;

// ============================================================================
// Return Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReturnError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: ReturnStatus, to: ReturnStatus },

    #[error("Return {return_id} cannot be cancelled in status {status}")]
    NotCancellable { return_id: Uuid, status: ReturnStatus },

    #[error("Only the requesting user may cancel this return")]
    NotRequester,

    #[error("Return items cannot be empty")]
    EmptyItems,

    #[error("Invalid return quantity for product {0}")]
    InvalidQuantity(Uuid),

    #[error("{0} is not a carrier-reported status")]
    NotCarrierReported(ReturnStatus),

    #[error("Refund amount must be positive")]
    NonPositiveRefund,

    #[error("Return has no initiated refund")]
    NoRefundInitiated,

    #[error("{0} is required")]
    MissingField(&'static str),
}
