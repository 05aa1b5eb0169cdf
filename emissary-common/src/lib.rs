//! Shared building blocks for the emissary delivery workspace.

pub mod address;
pub mod domain;
pub mod logging;

pub use domain::Domain;
pub use tracing;

/// Lifecycle signals broadcast to long-running services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop accepting new work and drain what is in flight.
    Shutdown,
    /// Everything has been shut down.
    Finalised,
}
