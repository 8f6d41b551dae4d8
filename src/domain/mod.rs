// ============================================================================
// Domain Layer
// ============================================================================
//
// - order/     - Order aggregate and its lifecycle manager
// - returns/   - Return aggregate and its lifecycle manager
// - inventory  - Stock reservation / release against the store
// - refund     - Cumulative refund accounting against paid amounts
//
// ============================================================================

pub mod inventory;
pub mod order;
pub mod refund;
pub mod returns;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    System,
    User(Uuid),
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::User(id) => write!(f, "{}", id),
        }
    }
}

/// Postal address, always stored as a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub phone: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    /// State, province or region
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Returns the name of the first missing required field.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("full_name", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}
