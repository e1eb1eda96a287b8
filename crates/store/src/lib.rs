//! Realtime key-path store adapters for the ResqPulse gateway.

pub mod config;
pub mod health;
pub mod memory;
pub mod paths;
pub mod rest;
pub mod store;

pub use config::*;
pub use memory::MemoryStore;
pub use rest::RestStore;
pub use store::{Store, NO_LIMIT};

use resq_core::Result;
use std::sync::Arc;

/// Builds the configured store.
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Rest => Ok(Arc::new(RestStore::new(config)?)),
    }
}
