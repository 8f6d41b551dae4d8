// ============================================================================
// Order Lifecycle & Return/Refund Engine
// ============================================================================
//
// Converts carts into durable orders, keeps inventory consistent under
// concurrent checkouts, drives the order fulfillment state machine and the
// post-delivery return/refund workflow.
//
// Layout:
// - aggregate/      - Generic aggregate + event envelope abstractions
// - domain/         - Order and Return aggregates, inventory and refund ledgers
// - store/          - Transactional storage (in-memory and Postgres)
// - collaborators/  - External services consumed by the engine
// - dispatch        - Best-effort notifications and audit events
//
// ============================================================================

pub mod aggregate;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod store;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{Collaborators, Engine};
pub use error::{EngineError, StockShortfall};
