//! Wiring of the production collaborators.

use std::sync::Arc;
use tracing::info;

use crate::config::LabelerConfig;
use crate::error::Result;
use crate::fortune::{Assigner, Clock, SystemClock};
use crate::labels::{LabelStore, LocalLabelPublisher, SqliteLabelStore};
use crate::membership::BskyClient;
use crate::orchestrator::{DayBoundaryScheduler, EventBus, ReconciliationEngine};

pub struct Labeler {
    pub config: LabelerConfig,
    pub store: Arc<dyn LabelStore>,
    pub client: Arc<BskyClient>,
    pub engine: Arc<ReconciliationEngine>,
    pub bus: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
}

impl Labeler {
    /// Open the store, log in to the social graph and assemble the engine.
    pub async fn build(config: LabelerConfig) -> Result<Self> {
        let store: Arc<dyn LabelStore> = Arc::new(SqliteLabelStore::new(&config.db_path).await?);
        info!("Label store at {}", config.db_path.display());

        let client = Arc::new(BskyClient::new(
            config.bsky_service.clone(),
            config.labeler_did.clone(),
            config.labeler_password.clone(),
            config.http_timeout,
        )?);
        client.login().await?;

        let assigner: Arc<dyn Assigner> = Arc::from(config.assignment_mode.build());
        info!(mode = ?config.assignment_mode, "Assignment mode selected");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let publisher = Arc::new(LocalLabelPublisher::new(store.clone()));
        let engine = Arc::new(
            ReconciliationEngine::new(client.clone(), store.clone(), publisher, assigner, clock.clone())
                .with_settings(config.engine_settings()),
        );

        Ok(Self {
            config,
            store,
            client,
            engine,
            bus: Arc::new(EventBus::new()),
            clock,
        })
    }

    pub fn scheduler(&self) -> DayBoundaryScheduler {
        DayBoundaryScheduler::new(self.engine.clone(), self.clock.clone(), self.config.utc_offset)
    }
}
