//! Delivery handlers: one per recipient class

mod external;
mod local;

pub use external::ExternalDelivery;
pub use local::LocalDelivery;
