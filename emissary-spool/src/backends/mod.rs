//! Backing store implementations
//!
//! Production stores live with the embedding application; this crate ships
//! the in-memory store used by tests and by embedders that keep their queue
//! in process.

pub mod memory;

pub use memory::MemoryMessageStore;
