//! Shared application state

use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;

use trustline_classifiers::{HttpImageClassifier, HttpTextClassifier};
use trustline_core::{Result, TrustConfig};
use trustline_ledger::{
    JournalConfig, JournalReader, JournalWriter, MemoryTrustStore, NotificationQueue, TrustEngine,
    TrustStore,
};
use trustline_pipeline::{AsyncCoordinator, MemoryMessageStore, TrustPipeline};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The content trust pipeline
    pub pipeline: Arc<TrustPipeline>,

    /// Chat send-then-verify coordinator
    pub coordinator: Arc<AsyncCoordinator>,

    /// Chat message records the coordinator patches
    pub messages: Arc<MemoryMessageStore>,

    /// Strike ledger and trust state machine
    pub engine: Arc<TrustEngine>,

    /// Event and profile store
    pub store: Arc<dyn TrustStore>,

    /// Guardian notification queue
    pub queue: Arc<NotificationQueue>,

    /// Durable journal reader for exports
    pub journal: Arc<JournalReader>,

    /// Prometheus render handle
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Build the full pipeline state from configuration
    pub fn new(
        config: TrustConfig,
        journal_dir: PathBuf,
        metrics_handle: PrometheusHandle,
    ) -> Result<Self> {
        let journal_config = JournalConfig {
            journal_dir,
            ..JournalConfig::default()
        };
        let writer = JournalWriter::new(journal_config.clone())?;
        let journal = Arc::new(JournalReader::new(journal_config));

        let store: Arc<dyn TrustStore> = Arc::new(MemoryTrustStore::new().with_journal(writer));
        let queue = Arc::new(NotificationQueue::new());
        let engine = Arc::new(TrustEngine::new(
            store.clone(),
            queue.clone(),
            config.strikes,
        ));

        let classifier = Arc::new(HttpTextClassifier::new(&config.classifier)?);
        let image_classifier = Arc::new(HttpImageClassifier::new(&config.classifier)?);

        let pipeline = Arc::new(TrustPipeline::new(
            classifier,
            image_classifier,
            store.clone(),
            engine.clone(),
            config,
        )?);

        let messages = Arc::new(MemoryMessageStore::new());
        let coordinator = Arc::new(AsyncCoordinator::new(pipeline.clone(), messages.clone()));

        Ok(Self {
            pipeline,
            coordinator,
            messages,
            engine,
            store,
            queue,
            journal,
            metrics_handle,
        })
    }
}
