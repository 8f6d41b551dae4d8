use serde::Serialize;
use uuid::Uuid;

use crate::collaborators::CollaboratorError;
use crate::domain::order::{Money, OrderError};
use crate::domain::returns::ReturnError;
use crate::store::StoreError;

// ============================================================================
// Engine Errors - What callers of the lifecycle managers see
// ============================================================================

/// A cart line that could not be reserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockShortfall {
    pub product_id: Uuid,
    pub requested: u32,
    pub available: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Order {0} already has an active return")]
    DuplicateReturn(Uuid),

    #[error("{entity} {id} cannot be cancelled in status {status}")]
    NotCancellable {
        entity: &'static str,
        id: Uuid,
        status: String,
    },

    #[error("Order {order_id} is not returnable: {reason}")]
    NotReturnable { order_id: Uuid, reason: String },

    #[error("Refund of {requested} exceeds refundable balance {available}")]
    RefundExceedsPaid { requested: Money, available: Money },

    #[error("{service} call failed: {source}")]
    ExternalService {
        service: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    pub fn order_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Order", id }
    }

    pub fn return_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Return", id }
    }

    pub fn external(service: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| Self::ExternalService { service, source }
    }

    /// Stable machine-readable code for rendering in thin API layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound { .. } => "not_found",
            Self::NotAuthorized(_) => "not_authorized",
            Self::DuplicateReturn(_) => "duplicate_return",
            Self::NotCancellable { .. } => "not_cancellable",
            Self::NotReturnable { .. } => "not_returnable",
            Self::RefundExceedsPaid { .. } => "refund_exceeds_paid",
            Self::ExternalService { .. } => "external_service_error",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<OrderError> for EngineError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            OrderError::NotCancellable { order_id, status } => Self::NotCancellable {
                entity: "Order",
                id: order_id,
                status: status.to_string(),
            },
            OrderError::RefundExceedsPaid { requested, available } => {
                Self::RefundExceedsPaid { requested, available }
            }
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<ReturnError> for EngineError {
    fn from(err: ReturnError) -> Self {
        match err {
            ReturnError::InvalidTransition { from, to } => Self::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            ReturnError::NotCancellable { return_id, status } => Self::NotCancellable {
                entity: "Return",
                id: return_id,
                status: status.to_string(),
            },
            ReturnError::NotRequester => {
                Self::NotAuthorized("only the requesting user may cancel a return".to_string())
            }
            other => Self::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;

    #[test]
    fn test_order_transition_error_maps_to_invalid_transition() {
        let err: EngineError = OrderError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Shipped,
        }
        .into();

        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(err.to_string(), "Invalid transition from pending to shipped");
    }

    #[test]
    fn test_shortfall_message_counts_lines() {
        let err = EngineError::InsufficientStock(vec![
            StockShortfall { product_id: Uuid::new_v4(), requested: 3, available: 1 },
            StockShortfall { product_id: Uuid::new_v4(), requested: 1, available: 0 },
        ]);
        assert_eq!(err.to_string(), "Insufficient stock for 2 line(s)");
    }
}
