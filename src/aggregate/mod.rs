// ============================================================================
// Aggregate Core - Generic abstractions shared by Order and Return
// ============================================================================
//
// Commands are validated against current state and produce events; events
// are the only thing that mutates state. Persisted state is the aggregate
// snapshot, the events go out to audit subscribers after commit.
//
// ============================================================================

mod event;
mod root;

pub use event::{DomainEvent, EventEnvelope};
pub use root::Aggregate;
