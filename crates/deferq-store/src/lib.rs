//! Backing-store contract for the deferq scheduler.
//!
//! This crate defines the operations a backing store must provide for
//! deferred delivery (a scored holding collection, an order-preserving
//! queue, and an optional atomic promotion primitive), along with the
//! value types shared by every implementation.
//!
//! ## Features
//!
//! - **`DelayStore`**: the store contract, one implementor per connection
//! - **`MemoryStore`**: a process-local store for tests and single-process use
//! - **Version/identity types**: `ServerVersion` for capability negotiation,
//!   `ConnectionId` for detecting handle reuse

mod error;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::DelayStore;
pub use types::{ConnectionId, Score, ServerVersion, now_ms};
