//! Durable session persistence shared across service instances.

pub mod reaper;
pub mod schema;
pub mod store;

pub use reaper::{ReapSummary, StaleSessionReaper};
pub use store::{SessionStore, SharedSessionStore, StoreError, StoreResult};
