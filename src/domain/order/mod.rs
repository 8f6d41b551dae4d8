// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (OrderItem, OrderStatus + transition table, PaymentDetails)
// - Events / Commands / Errors
// - Aggregate (Order)
// - Lifecycle manager (checkout, status changes, cancellation, invoicing)
//
// ============================================================================

pub mod aggregate;
pub mod commands;
pub mod errors;
pub mod events;
pub mod invoice;
pub mod lifecycle;
pub mod numbering;
pub mod value_objects;

pub use aggregate::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use invoice::InvoiceView;
pub use lifecycle::*;
pub use value_objects::*;
