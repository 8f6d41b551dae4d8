// ============================================================================
// Return Domain
// ============================================================================
//
// Post-delivery return requests: admin review, reverse pickup, carrier
// progress, inspection and the refund that closes the return.
//
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod value_objects;

pub use aggregate::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use lifecycle::*;
pub use value_objects::*;
