use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::aggregate::{DomainEvent, EventEnvelope};
use crate::domain::order::{Money, OrderStatus};
use crate::domain::returns::ReturnStatus;
use crate::domain::Address;
use crate::utils::IsTransient;

mod carrier;
mod guard;
mod in_memory;

pub use carrier::{CarrierApi, CarrierCredentials, CarrierSession, SessionCarrier};
pub use guard::CollaboratorGuard;
pub use in_memory::{
    InMemoryCarts, RecordingCarrier, RecordingGateway, RecordingNotifier, RecordingPublisher,
    StaticCatalog, TracingNotifier, TracingPublisher,
};

// ============================================================================
// External Collaborators
// ============================================================================
//
// The engine only sees these traits. Every call goes through a
// `CollaboratorGuard` (timeout + circuit breaker), so implementations do not
// need their own.
//
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("circuit open for {0}")]
    CircuitOpen(&'static str),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn kind(&self) -> &'static str {
        match self {
            CollaboratorError::Timeout(_) => "timeout",
            CollaboratorError::CircuitOpen(_) => "circuit_open",
            CollaboratorError::Unauthorized(_) => "unauthorized",
            CollaboratorError::Rejected(_) => "rejected",
            CollaboratorError::Unavailable(_) => "unavailable",
        }
    }
}

impl IsTransient for CollaboratorError {
    fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Timeout(_) | CollaboratorError::Unavailable(_))
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Cart with its already-priced totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartLine>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub discount_code: Option<String>,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub final_amount: Money,
}

impl Cart {
    /// Build a cart whose subtotal and final amount are the sum of its lines.
    pub fn priced(items: Vec<CartLine>) -> Self {
        let subtotal: Money = items
            .iter()
            .map(|line| line.unit_price * Money::from(line.quantity))
            .sum();
        Self {
            items,
            subtotal,
            final_amount: subtotal,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub sku: Option<String>,
    pub image_ref: Option<String>,
    pub price: Money,
    pub seller_id: Uuid,
    pub seller_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupBooking {
    pub carrier_return_id: String,
    pub tracking_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum StatusNotification {
    Order {
        order_id: Uuid,
        user_id: Uuid,
        email: String,
        status: OrderStatus,
        tracking_number: Option<String>,
    },
    Return {
        return_id: Uuid,
        order_id: Uuid,
        user_id: Uuid,
        email: String,
        status: ReturnStatus,
    },
}

impl StatusNotification {
    pub fn subject_id(&self) -> Uuid {
        match self {
            StatusNotification::Order { order_id, .. } => *order_id,
            StatusNotification::Return { return_id, .. } => *return_id,
        }
    }
}

/// Serialized audit event, keyed by aggregate id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedEvent {
    pub topic: &'static str,
    pub key: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl PublishedEvent {
    pub fn from_envelope<E: DomainEvent>(
        topic: &'static str,
        envelope: &EventEnvelope<E>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic,
            key: envelope.aggregate_id,
            event_type: envelope.event_type.clone(),
            payload: serde_json::to_value(envelope)?,
        })
    }
}

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait CartProvider: Send + Sync {
    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, CollaboratorError>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CollaboratorError>;
}

#[async_trait]
pub trait FulfillmentCarrier: Send + Sync {
    async fn book_return_pickup(
        &self,
        order_ref: Uuid,
        pickup_address: &Address,
    ) -> Result<PickupBooking, CollaboratorError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// A repeated `idempotency_key` must return the original receipt
    /// without moving money again.
    async fn refund(
        &self,
        order_ref: Uuid,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RefundReceipt, CollaboratorError>;
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify_status_change(&self, notification: &StatusNotification) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PublishedEvent) -> Result<(), CollaboratorError>;
}
