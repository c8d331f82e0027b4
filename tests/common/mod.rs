#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

use fortune_labeler::error::{LabelerError, Result};
use fortune_labeler::fortune::{Assigner, Clock, DailyFortune, Outcome};
use fortune_labeler::labels::{
    LabelPlan, LabelPublisher, LabelStore, LabelVocabulary, LocalLabelPublisher, SqliteLabelStore,
};
use fortune_labeler::membership::{MembersPage, MembershipProvider};
use fortune_labeler::orchestrator::{EngineSettings, ReconciliationEngine};

/// Clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn at(instant: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(instant)))
    }

    /// 2024-01-01 10:00 JST.
    pub fn jst_morning() -> Arc<Self> {
        Self::at(Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap())
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Serves a fixed follower list in pages of `page_size`.
pub struct MockMembership {
    members: Mutex<Vec<String>>,
    page_size: usize,
    fail_on_page: Mutex<Option<usize>>,
    /// When set, every fetch waits for `release` after signalling `entered`.
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MockMembership {
    pub fn new(members: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(members.iter().map(|m| m.to_string()).collect()),
            page_size: 2,
            fail_on_page: Mutex::new(None),
            gate: None,
        })
    }

    pub fn gated(members: &[&str], entered: Arc<Notify>, release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(members.iter().map(|m| m.to_string()).collect()),
            page_size: 100,
            fail_on_page: Mutex::new(None),
            gate: Some((entered, release)),
        })
    }

    pub fn set_members(&self, members: &[&str]) {
        *self.members.lock().unwrap() = members.iter().map(|m| m.to_string()).collect();
    }

    pub fn fail_on_page(&self, page: Option<usize>) {
        *self.fail_on_page.lock().unwrap() = page;
    }
}

#[async_trait]
impl MembershipProvider for MockMembership {
    async fn fetch_members_page(&self, cursor: Option<&str>) -> Result<MembersPage> {
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }

        let page: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        if *self.fail_on_page.lock().unwrap() == Some(page) {
            return Err(LabelerError::Transport("getFollowers timed out".into()));
        }

        let members = self.members.lock().unwrap().clone();
        let start = page * self.page_size;
        let end = (start + self.page_size).min(members.len());
        let identities = if start < members.len() { members[start..end].to_vec() } else { Vec::new() };
        Ok(MembersPage {
            identities,
            next_cursor: (end < members.len()).then(|| (page + 1).to_string()),
        })
    }
}

/// Records every published plan and fails for chosen subjects.
pub struct RecordingPublisher {
    inner: LocalLabelPublisher,
    pub calls: Mutex<Vec<(String, LabelPlan)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingPublisher {
    pub fn new(store: Arc<dyn LabelStore>) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalLabelPublisher::new(store),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail_for(&self, subject: &str) {
        self.failing.lock().unwrap().insert(subject.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, subject: &str) -> Vec<LabelPlan> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl LabelPublisher for RecordingPublisher {
    async fn apply_labels(&self, subject: &str, plan: &LabelPlan) -> Result<()> {
        if self.failing.lock().unwrap().contains(subject) {
            return Err(LabelerError::Transport(format!("signing failed for {}", subject)));
        }
        self.calls.lock().unwrap().push((subject.to_string(), plan.clone()));
        self.inner.apply_labels(subject, plan).await
    }
}

pub struct Harness {
    pub _dir: TempDir,
    pub store: Arc<SqliteLabelStore>,
    pub membership: Arc<MockMembership>,
    pub publisher: Arc<RecordingPublisher>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<ReconciliationEngine>,
}

pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        member_pacing: std::time::Duration::ZERO,
        page_pacing: std::time::Duration::ZERO,
        ..EngineSettings::default()
    }
}

impl Harness {
    pub async fn new(membership: Arc<MockMembership>) -> Self {
        Self::with_assigner(membership, Arc::new(DailyFortune::default())).await
    }

    pub async fn with_assigner(membership: Arc<MockMembership>, assigner: Arc<dyn Assigner>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteLabelStore::new(dir.path().join("labels.db")).await.unwrap());
        let publisher = RecordingPublisher::new(store.clone());
        let clock = ManualClock::jst_morning();
        let engine = Arc::new(
            ReconciliationEngine::new(
                membership.clone(),
                store.clone(),
                publisher.clone(),
                assigner,
                clock.clone(),
            )
            .with_settings(fast_settings()),
        );
        Self { _dir: dir, store, membership, publisher, clock, engine }
    }

    /// Seed the store as if `subject` had been labelled with `vals` earlier.
    pub async fn seed(&self, subject: &str, vals: &[&str]) {
        let plan = LabelPlan {
            create: outcomes(vals),
            negate: BTreeSet::new(),
        };
        self.store.apply_plan(subject, &plan).await.unwrap();
    }

    pub async fn asserted(&self, subject: &str) -> BTreeSet<Outcome> {
        self.store.asserted_outcomes(subject).await.unwrap()
    }
}

pub fn outcomes(vals: &[&str]) -> BTreeSet<Outcome> {
    vals.iter().map(|v| Outcome::from(*v)).collect()
}

pub fn fortune_vocabulary() -> LabelVocabulary {
    DailyFortune::default().vocabulary()
}
