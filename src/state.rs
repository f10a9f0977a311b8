//! Shared, read-only state handed to every handler.

use crate::services::{gatekeeper::Gatekeeper, storage::ObjectStore};
use std::sync::Arc;

/// Cheap to clone: both members are behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub gate: Arc<Gatekeeper>,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, gate: Gatekeeper) -> Self {
        Self {
            store,
            gate: Arc::new(gate),
        }
    }
}
