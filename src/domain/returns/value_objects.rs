use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::order::Money;
use crate::domain::Actor;

// ============================================================================
// Return Value Objects
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReturnItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    /// Unit price paid, copied from the order line
    pub price: Money,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Defective,
    Damaged,
    WrongItem,
    NotAsDescribed,
    SizeIssue,
    QualityIssue,
    ChangedMind,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Requested,
    Approved,
    Rejected,
    PickupScheduled,
    PickedUp,
    InTransit,
    Received,
    Inspected,
    RefundInitiated,
    RefundCompleted,
    Cancelled,
}

impl ReturnStatus {
    pub const ALL: [ReturnStatus; 11] = [
        ReturnStatus::Requested,
        ReturnStatus::Approved,
        ReturnStatus::Rejected,
        ReturnStatus::PickupScheduled,
        ReturnStatus::PickedUp,
        ReturnStatus::InTransit,
        ReturnStatus::Received,
        ReturnStatus::Inspected,
        ReturnStatus::RefundInitiated,
        ReturnStatus::RefundCompleted,
        ReturnStatus::Cancelled,
    ];

    /// States reported by the carrier rather than decided by the engine.
    pub const CARRIER_REPORTED: [ReturnStatus; 3] = [
        ReturnStatus::PickedUp,
        ReturnStatus::InTransit,
        ReturnStatus::Received,
    ];

    pub fn allowed_targets(self) -> &'static [ReturnStatus] {
        use ReturnStatus::*;
        match self {
            Requested => &[Approved, Rejected, Cancelled],
            Approved => &[PickupScheduled, Cancelled],
            PickupScheduled => &[PickedUp],
            PickedUp => &[InTransit],
            InTransit => &[Received],
            Received => &[Inspected],
            Inspected => &[RefundInitiated],
            RefundInitiated => &[RefundCompleted],
            Rejected | Cancelled | RefundCompleted => &[],
        }
    }

    pub fn can_transition_to(self, target: ReturnStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnStatus::Requested => "requested",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
            ReturnStatus::PickupScheduled => "pickup_scheduled",
            ReturnStatus::PickedUp => "picked_up",
            ReturnStatus::InTransit => "in_transit",
            ReturnStatus::Received => "received",
            ReturnStatus::Inspected => "inspected",
            ReturnStatus::RefundInitiated => "refund_initiated",
            ReturnStatus::RefundCompleted => "refund_completed",
            ReturnStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReturnStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown return status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdminReview {
    pub reviewed_by: Uuid,
    pub reviewed_at: DateTime<Utc>,
    pub decision: ReviewDecision,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Good,
    Damaged,
    Used,
    Incomplete,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Inspection {
    pub inspected_by: Uuid,
    pub inspected_at: DateTime<Utc>,
    pub condition: ItemCondition,
    pub notes: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RefundInfo {
    pub amount: Money,
    pub method: String,
    pub status: RefundStatus,
    pub transaction_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Reverse-shipment booking returned by the carrier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PickupDetails {
    pub carrier_return_id: String,
    pub tracking_code: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TimelineEntry {
    pub status: ReturnStatus,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
    pub updated_by: Actor,
}
