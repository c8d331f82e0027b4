//! Reconciliation Engine
//!
//! One pass walks `FetchMembership -> FetchTracked -> Diff -> Apply -> Done`.
//! A membership or tracked-set failure aborts before any write; per-identity
//! failures are logged and skipped. Every write is idempotent, so an
//! interrupted pass is healed by the next one.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::fortune::{Assigner, CivilDay, Clock, Identity};
use crate::labels::{LabelPlan, LabelPublisher, LabelStore};
use crate::membership::{fetch_all_members, MembershipProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPhase {
    FetchMembership,
    FetchTracked,
    Diff,
    Apply,
    Done,
    Aborted,
}

/// How the current members and the tracked identities relate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDiff {
    /// Members with no asserted labels yet.
    pub new: BTreeSet<Identity>,
    /// Members already carrying labels.
    pub update: BTreeSet<Identity>,
    /// Tracked identities that are no longer members.
    pub stale: BTreeSet<Identity>,
}

impl ReconcileDiff {
    pub fn compute(members: &BTreeSet<Identity>, tracked: &BTreeSet<Identity>) -> Self {
        Self {
            new: members.difference(tracked).cloned().collect(),
            update: members.intersection(tracked).cloned().collect(),
            stale: tracked.difference(members).cloned().collect(),
        }
    }
}

/// What happened to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    Published(LabelPlan),
    /// Already in the desired state; nothing sent.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub day: String,
    pub members: usize,
    pub tracked: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: Vec<(Identity, String)>,
}

/// Result of asking for a pass without waiting.
#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(PassReport),
    /// Another pass or event assignment holds the lock.
    Busy,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Pause between per-identity label operations.
    pub member_pacing: Duration,
    /// Pause between membership pages.
    pub page_pacing: Duration,
    /// Timezone that defines the civil day.
    pub offset: FixedOffset,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            member_pacing: Duration::from_millis(50),
            page_pacing: Duration::from_millis(100),
            offset: crate::fortune::jst(),
        }
    }
}

pub struct ReconciliationEngine {
    membership: Arc<dyn MembershipProvider>,
    store: Arc<dyn LabelStore>,
    publisher: Arc<dyn LabelPublisher>,
    assigner: Arc<dyn Assigner>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    pass_lock: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        membership: Arc<dyn MembershipProvider>,
        store: Arc<dyn LabelStore>,
        publisher: Arc<dyn LabelPublisher>,
        assigner: Arc<dyn Assigner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            membership,
            store,
            publisher,
            assigner,
            clock,
            settings: EngineSettings::default(),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The civil day at the engine's clock.
    pub fn today(&self) -> CivilDay {
        CivilDay::at(self.clock.now(), self.settings.offset)
    }

    /// Run a full pass, waiting for any pass already in progress.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let _guard = self.pass_lock.lock().await;
        self.run_pass_locked().await
    }

    /// Run a full pass unless one is already running.
    pub async fn try_run_pass(&self) -> Result<TriggerOutcome> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!("Pass already running, dropping trigger");
            return Ok(TriggerOutcome::Busy);
        };
        self.run_pass_locked().await.map(TriggerOutcome::Completed)
    }

    /// Assign today's labels to a single identity outside a full pass.
    pub async fn assign_member(&self, identity: &str) -> Result<MemberOutcome> {
        let _guard = self.pass_lock.lock().await;
        let day = self.today();
        let outcome = self.apply_member(identity, &day).await?;
        if let MemberOutcome::Published(plan) = &outcome {
            info!(identity, day = %day, create = ?plan.create, "Assigned labels");
        }
        Ok(outcome)
    }

    async fn run_pass_locked(&self) -> Result<PassReport> {
        let day = self.today();
        info!(day = %day, "[Batch] Starting reconciliation pass");
        let mut phase = PassPhase::FetchMembership;

        let members = match fetch_all_members(self.membership.as_ref(), self.settings.page_pacing).await {
            Ok(members) => members,
            Err(e) => {
                error!(from = ?phase, to = ?PassPhase::Aborted, "[Batch] Failed to fetch members, aborting pass: {}", e);
                return Err(e);
            }
        };
        info!("[Batch] Fetched {} members", members.len());

        phase = PassPhase::FetchTracked;
        let tracked: BTreeSet<Identity> = match self.store.list_tracked_identities().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                error!(from = ?phase, to = ?PassPhase::Aborted, "[Batch] Failed to read tracked identities, aborting pass: {}", e);
                return Err(e);
            }
        };
        info!("[Batch] Store tracks {} identities", tracked.len());

        phase = PassPhase::Diff;
        let diff = ReconcileDiff::compute(&members, &tracked);
        debug!(
            ?phase,
            new = diff.new.len(),
            update = diff.update.len(),
            stale = diff.stale.len(),
            "[Batch] Diff computed"
        );

        let mut report = PassReport {
            day: day.to_string(),
            members: members.len(),
            tracked: tracked.len(),
            ..Default::default()
        };

        phase = PassPhase::Apply;
        debug!(?phase, "[Batch] Applying plans");
        let mut first = true;
        for (identity, is_new) in diff
            .new
            .iter()
            .map(|id| (id, true))
            .chain(diff.update.iter().map(|id| (id, false)))
        {
            self.pace(&mut first).await;
            match self.apply_member(identity, &day).await {
                Ok(MemberOutcome::Published(_)) if is_new => report.created += 1,
                Ok(MemberOutcome::Published(_)) => report.updated += 1,
                Ok(MemberOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!(identity = %identity, "Failed to label member: {}", e);
                    report.failed.push((identity.clone(), e.to_string()));
                }
            }
        }

        for identity in &diff.stale {
            self.pace(&mut first).await;
            match self.remove_member(identity).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(identity = %identity, "Failed to clean up former member: {}", e);
                    report.failed.push((identity.clone(), e.to_string()));
                }
            }
        }

        phase = PassPhase::Done;
        info!(
            ?phase,
            "[Batch] Summary: created {}, updated {}, unchanged {}, removed {}, failed {}",
            report.created,
            report.updated,
            report.unchanged,
            report.removed,
            report.failed.len()
        );
        Ok(report)
    }

    async fn pace(&self, first: &mut bool) {
        if !*first && !self.settings.member_pacing.is_zero() {
            tokio::time::sleep(self.settings.member_pacing).await;
        }
        *first = false;
    }

    async fn apply_member(&self, identity: &str, day: &CivilDay) -> Result<MemberOutcome> {
        let selected = self.assigner.select(identity, day);
        let plan = self.assigner.vocabulary().plan(&selected);
        let asserted = self.store.asserted_outcomes(identity).await?;

        if self.assigner.is_deterministic() && plan.is_noop_for(&asserted) {
            return Ok(MemberOutcome::Unchanged);
        }

        let plan = plan.with_stale(&asserted);
        debug!(identity, create = ?plan.create, negate = ?plan.negate, "Applying label plan");
        self.publisher.apply_labels(identity, &plan).await?;
        Ok(MemberOutcome::Published(plan))
    }

    async fn remove_member(&self, identity: &str) -> Result<()> {
        info!(identity, "Opt-out cleanup: removing labels");
        let asserted = self.store.asserted_outcomes(identity).await?;
        let plan = self.assigner.vocabulary().removal_plan().with_stale(&asserted);
        self.publisher.apply_labels(identity, &plan).await?;
        self.store.purge_identity(identity).await
    }
}
