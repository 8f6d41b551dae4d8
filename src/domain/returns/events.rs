use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::DomainEvent;
use crate::domain::order::Money;
use crate::domain::{Actor, Address};
use super::value_objects::*;

// ============================================================================
// Return Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReturnEvent {
    Requested(ReturnRequested),
    Reviewed(ReturnReviewed),
    PickupScheduled(ReturnPickupScheduled),
    StatusAdvanced(ReturnStatusAdvanced),
    Inspected(ReturnInspected),
    RefundInitiated(ReturnRefundInitiated),
    RefundCompleted(ReturnRefundCompleted),
    Cancelled(ReturnCancelled),
}

impl DomainEvent for ReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnEvent::Requested(_) => "ReturnRequested",
            ReturnEvent::Reviewed(_) => "ReturnReviewed",
            ReturnEvent::PickupScheduled(_) => "ReturnPickupScheduled",
            ReturnEvent::StatusAdvanced(_) => "ReturnStatusAdvanced",
            ReturnEvent::Inspected(_) => "ReturnInspected",
            ReturnEvent::RefundInitiated(_) => "ReturnRefundInitiated",
            ReturnEvent::RefundCompleted(_) => "ReturnRefundCompleted",
            ReturnEvent::Cancelled(_) => "ReturnCancelled",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnRequested {
    pub return_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub items: Vec<ReturnItem>,
    pub return_reason: ReturnReason,
    pub return_description: String,
    pub images: Vec<String>,
    pub pickup_address: Address,
    pub return_eligible_until: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnReviewed {
    pub review: AdminReview,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnPickupScheduled {
    pub pickup: PickupDetails,
    pub actor: Actor,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnStatusAdvanced {
    pub from: ReturnStatus,
    pub to: ReturnStatus,
    pub notes: Option<String>,
    pub actor: Actor,
    pub advanced_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnInspected {
    pub inspection: Inspection,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnRefundInitiated {
    pub amount: Money,
    pub method: String,
    pub actor: Actor,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnRefundCompleted {
    pub amount: Money,
    pub transaction_id: String,
    pub actor: Actor,
    pub completed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReturnCancelled {
    pub reason: String,
    pub cancelled_by: Uuid,
    pub cancelled_at: DateTime<Utc>,
}
