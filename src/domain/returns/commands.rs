use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::collaborators::PickupBooking;
use crate::domain::order::Money;
use crate::domain::Actor;
use super::value_objects::{ItemCondition, ReturnStatus, ReviewDecision};

// ============================================================================
// Return Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum ReturnCommand {
    Review {
        decision: ReviewDecision,
        reviewer: Uuid,
        notes: Option<String>,
        at: DateTime<Utc>,
    },
    SchedulePickup {
        booking: PickupBooking,
        actor: Actor,
        at: DateTime<Utc>,
    },
    /// Carrier-reported progress (picked up, in transit, received)
    Advance {
        to: ReturnStatus,
        notes: Option<String>,
        actor: Actor,
        at: DateTime<Utc>,
    },
    Inspect {
        inspector: Uuid,
        condition: ItemCondition,
        notes: Option<String>,
        images: Vec<String>,
        at: DateTime<Utc>,
    },
    InitiateRefund {
        amount: Money,
        method: String,
        actor: Actor,
        at: DateTime<Utc>,
    },
    CompleteRefund {
        transaction_id: String,
        actor: Actor,
        at: DateTime<Utc>,
    },
    Cancel {
        user_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
}
