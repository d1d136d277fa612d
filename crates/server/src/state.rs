use std::sync::Arc;

use stickerkit_core::{Config, FileReaper, PublicConfig, StickerProcessor, SubscriptionBroker};

/// Shared application state
pub struct AppState {
    config: Config,
    processor: Arc<StickerProcessor>,
    broker: SubscriptionBroker,
    reaper: FileReaper,
}

impl AppState {
    pub fn new(
        config: Config,
        processor: Arc<StickerProcessor>,
        broker: SubscriptionBroker,
        reaper: FileReaper,
    ) -> Self {
        Self {
            config,
            processor,
            broker,
            reaper,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn public_config(&self) -> PublicConfig {
        PublicConfig::from(&self.config)
    }

    pub fn processor(&self) -> &StickerProcessor {
        self.processor.as_ref()
    }

    /// Owned handle for jobs spawned off the request task.
    pub fn processor_handle(&self) -> Arc<StickerProcessor> {
        Arc::clone(&self.processor)
    }

    pub fn broker(&self) -> &SubscriptionBroker {
        &self.broker
    }

    /// Delayed-delete queue, used for uploads rejected before a job starts.
    pub fn reaper(&self) -> &FileReaper {
        &self.reaper
    }
}
