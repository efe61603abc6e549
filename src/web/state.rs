//! Shared state for the edge HTTP handlers.

use std::sync::Arc;

use crate::correlator::QueryGateway;
use crate::messaging::BusProvider;
use crate::storage::StorageProvider;

/// Application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<QueryGateway>,
    pub bus: Arc<BusProvider>,
    pub storage: Arc<StorageProvider>,
}

impl AppState {
    pub fn new(
        gateway: Arc<QueryGateway>,
        bus: Arc<BusProvider>,
        storage: Arc<StorageProvider>,
    ) -> Self {
        Self {
            gateway,
            bus,
            storage,
        }
    }
}
