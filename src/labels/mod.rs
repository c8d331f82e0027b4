//! Labels Module
//!
//! Diff planning between the outcomes an identity should carry and the full
//! label vocabulary, plus the persisted store and publisher seams.

pub mod publisher;
pub mod store;

pub use publisher::{LabelPublisher, LocalLabelPublisher};
pub use store::{LabelRecord, LabelStore, SqliteLabelStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::fortune::Outcome;

/// Every label the labeler has ever defined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelVocabulary {
    current: Vec<Outcome>,
    legacy: Vec<Outcome>,
}

impl LabelVocabulary {
    pub fn new(current: Vec<Outcome>, legacy: Vec<Outcome>) -> Self {
        Self { current, legacy }
    }

    /// Labels the active assigner can emit.
    pub fn current(&self) -> &[Outcome] {
        &self.current
    }

    /// Retired labels that may still be asserted from an earlier table.
    pub fn legacy(&self) -> &[Outcome] {
        &self.legacy
    }

    /// Current and legacy labels together.
    pub fn all(&self) -> BTreeSet<Outcome> {
        self.current.iter().chain(self.legacy.iter()).cloned().collect()
    }

    pub fn contains(&self, outcome: &Outcome) -> bool {
        self.current.contains(outcome) || self.legacy.contains(outcome)
    }

    /// Create exactly `selected`, negate everything else the labeler knows.
    pub fn plan(&self, selected: &BTreeSet<Outcome>) -> LabelPlan {
        LabelPlan {
            create: selected.clone(),
            negate: self.all().difference(selected).cloned().collect(),
        }
    }

    /// Plan that retracts every known label.
    pub fn removal_plan(&self) -> LabelPlan {
        LabelPlan {
            create: BTreeSet::new(),
            negate: self.all(),
        }
    }
}

/// Labels to assert and retract for one subject, submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPlan {
    pub create: BTreeSet<Outcome>,
    pub negate: BTreeSet<Outcome>,
}

impl LabelPlan {
    /// Also negate asserted values this plan would otherwise leave behind,
    /// such as labels no longer in any known vocabulary.
    pub fn with_stale(mut self, asserted: &BTreeSet<Outcome>) -> Self {
        for outcome in asserted {
            if !self.create.contains(outcome) {
                self.negate.insert(outcome.clone());
            }
        }
        self
    }

    /// True when applying this plan would not change `asserted`.
    pub fn is_noop_for(&self, asserted: &BTreeSet<Outcome>) -> bool {
        &self.create == asserted
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.negate.is_empty()
    }
}
