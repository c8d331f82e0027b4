//! Label publishing seam

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{LabelPlan, LabelStore};
use crate::error::Result;

/// Publishes a subject's create and negate lists in one request.
#[async_trait]
pub trait LabelPublisher: Send + Sync {
    async fn apply_labels(&self, subject: &str, plan: &LabelPlan) -> Result<()>;
}

/// Publishes by writing straight into the labeler's own label table.
///
/// Signing and federation of the records are left to the server that
/// serves the table.
pub struct LocalLabelPublisher {
    store: Arc<dyn LabelStore>,
}

impl LocalLabelPublisher {
    pub fn new(store: Arc<dyn LabelStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LabelPublisher for LocalLabelPublisher {
    async fn apply_labels(&self, subject: &str, plan: &LabelPlan) -> Result<()> {
        debug!(
            subject,
            create = plan.create.len(),
            negate = plan.negate.len(),
            "Publishing label plan"
        );
        self.store.apply_plan(subject, plan).await
    }
}
