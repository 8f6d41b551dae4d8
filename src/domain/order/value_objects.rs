use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::Actor;

// ============================================================================
// Order Value Objects
// ============================================================================

pub type Money = Decimal;

/// Line item snapshot taken when the order is placed. Never changes
/// afterwards, whatever happens to the catalog.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub image_ref: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub seller_id: Uuid,
    pub seller_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
        OrderStatus::Refunded,
    ];

    /// Fixed transition table.
    pub fn allowed_targets(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered => &[Returned],
            Returned => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub notes: Option<String>,
    pub location: Option<String>,
}

/// Order-side mirror of the linked return's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderReturnStatus {
    #[default]
    None,
    Requested,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    PartiallyRefunded,
    Refunded,
}

impl PaymentStatus {
    /// Money has been captured and some of it may still be refunded
    pub fn is_captured(self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::PartiallyRefunded)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentDetails {
    pub method: String,
    pub status: PaymentStatus,
    pub paid_amount: Money,
    pub refunded_amount: Money,
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentDetails {
    pub fn unpaid(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            status: PaymentStatus::Pending,
            paid_amount: Money::ZERO,
            refunded_amount: Money::ZERO,
            reference: None,
            paid_at: None,
        }
    }

    pub fn refundable_balance(&self) -> Money {
        (self.paid_amount - self.refunded_amount).max(Money::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Express,
    Overnight,
}

impl ShippingMethod {
    pub fn base_days(self) -> i64 {
        match self {
            ShippingMethod::Standard => 7,
            ShippingMethod::Express => 3,
            ShippingMethod::Overnight => 1,
        }
    }

    /// Remote destinations take two extra days whatever the method.
    pub fn estimate_delivery(self, from: DateTime<Utc>, remote_destination: bool) -> DateTime<Utc> {
        let extra = if remote_destination { 2 } else { 0 };
        from + Duration::days(self.base_days() + extra)
    }
}

/// Contact details of the purchasing customer, captured at checkout.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
}
