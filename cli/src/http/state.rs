//! Shared state for the tool-surface handlers.

use std::sync::Arc;

use tokio::sync::broadcast;

use spector_core::api::Scheduler;

use crate::registry::SetupRegistry;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub registry: Arc<SetupRegistry>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        scheduler: Arc<Scheduler>,
        registry: Arc<SetupRegistry>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            scheduler,
            registry,
            shutdown_tx,
        }
    }
}
