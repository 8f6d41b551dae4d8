use chrono::{DateTime, Utc};

use crate::domain::Actor;
use super::value_objects::{Money, OrderReturnStatus, OrderStatus};

// ============================================================================
// Order Commands - Represent intent against an existing order
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    /// Move along the fulfillment table (never to `cancelled`, see `Cancel`)
    ChangeStatus {
        to: OrderStatus,
        actor: Actor,
        notes: Option<String>,
        location: Option<String>,
        /// Candidate tracking number, used only if none is assigned yet
        tracking_number: Option<String>,
        at: DateTime<Utc>,
    },
    Cancel {
        reason: String,
        actor: Actor,
        at: DateTime<Utc>,
    },
    RecordPayment {
        amount: Money,
        reference: String,
        at: DateTime<Utc>,
    },
    RecordRefund {
        amount: Money,
        reason: String,
        transaction_id: String,
        at: DateTime<Utc>,
    },
    /// No-op when an invoice number already exists
    IssueInvoice {
        invoice_number: String,
        at: DateTime<Utc>,
    },
    SetReturnStatus {
        return_status: OrderReturnStatus,
        at: DateTime<Utc>,
    },
}
