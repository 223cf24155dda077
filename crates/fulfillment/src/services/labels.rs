//! Shipping label archival.
//!
//! Courier providers serve labels from URLs that expire; the store copies
//! the document into durable storage and returns a stable URL. When the
//! copy fails the orchestrator falls back to the provider's own URL.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use common::OrderId;

#[derive(Debug, Error)]
#[error("label storage failed: {0}")]
pub struct LabelError(pub String);

/// Trait for copying a shipping label into durable storage.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Fetches the label at `source_url` and stores it under the order,
    /// returning the stable URL.
    async fn store(&self, order_id: OrderId, source_url: &str) -> Result<String, LabelError>;
}

#[derive(Debug, Default)]
struct InMemoryLabelStoreState {
    stored: Vec<(OrderId, String)>,
    fail_on_store: bool,
}

/// In-memory label store for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLabelStore {
    state: Arc<RwLock<InMemoryLabelStoreState>>,
}

impl InMemoryLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every copy.
    pub fn set_fail_on_store(&self, fail: bool) {
        self.state.write().unwrap().fail_on_store = fail;
    }

    /// Returns the number of labels stored.
    pub fn stored_count(&self) -> usize {
        self.state.read().unwrap().stored.len()
    }
}

#[async_trait]
impl LabelStore for InMemoryLabelStore {
    async fn store(&self, order_id: OrderId, source_url: &str) -> Result<String, LabelError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_store {
            return Err(LabelError("storage unreachable".to_string()));
        }
        state.stored.push((order_id, source_url.to_string()));
        Ok(format!("https://storage.local/labels/{order_id}.pdf"))
    }
}
