use crate::api::CatalogSource;
use crate::config::SyncConfig;
use crate::observer::{SyncEvent, SyncObserver, TracingObserver};
use crate::store::CatalogStore;
use std::sync::Arc;

/// Shared resources handed to every operation.
#[derive(Clone)]
pub struct SyncContext {
    /// Remote catalog to pull from and write back to.
    pub source: Arc<dyn CatalogSource>,

    pub store: CatalogStore,

    /// Receives every event operations emit.
    pub observer: Arc<dyn SyncObserver>,

    pub settings: SyncConfig,
}

impl SyncContext {
    /// Context reporting through [`TracingObserver`] with default settings.
    pub fn new(source: Arc<dyn CatalogSource>, store: CatalogStore) -> Self {
        Self {
            source,
            store,
            observer: Arc::new(TracingObserver),
            settings: SyncConfig::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_settings(mut self, settings: SyncConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn emit(&self, event: SyncEvent) {
        self.observer.on_event(&event);
    }
}
