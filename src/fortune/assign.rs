//! Assignment of outcomes to identities
//!
//! `DailyFortune` is the deterministic hash-based mode: the same identity on
//! the same civil day always draws the same fortune, in any process.
//! `RandomDraw` is the explicitly non-deterministic mode kept for label
//! experiments; it must be selected by configuration.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::str::FromStr;

use super::{CivilDay, Outcome, OutcomeTable, DRAW_LABELS};
use crate::error::LabelerError;
use crate::labels::LabelVocabulary;

/// Bucket value in `0..modulus` for an identity on a day.
///
/// SHA-256 over `identity || day`, first four bytes big-endian, reduced
/// modulo `modulus`.
pub fn bucket(identity: &str, day: &CivilDay, modulus: u32) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(day.as_str().as_bytes());
    let digest = hasher.finalize();
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % modulus.max(1)
}

/// The outcome `table` assigns to `identity` on `day`.
pub fn assign<'a>(table: &'a OutcomeTable, identity: &str, day: &CivilDay) -> &'a Outcome {
    table.lookup(bucket(identity, day, table.total()))
}

/// Chooses the label set an identity should carry on a given day.
pub trait Assigner: Send + Sync {
    /// Labels this assigner may emit, plus retired labels it must clean up.
    fn vocabulary(&self) -> LabelVocabulary;

    fn select(&self, identity: &str, day: &CivilDay) -> BTreeSet<Outcome>;

    /// Whether `select` is a pure function of its inputs.
    fn is_deterministic(&self) -> bool;
}

/// One fortune per identity per day, from the weighted outcome table.
#[derive(Debug, Clone, Default)]
pub struct DailyFortune {
    table: OutcomeTable,
    legacy: Vec<Outcome>,
}

impl DailyFortune {
    pub fn new(table: OutcomeTable) -> Self {
        Self { table, legacy: Vec::new() }
    }

    /// Labels from earlier deployments that may still be asserted.
    pub fn with_legacy(mut self, legacy: impl IntoIterator<Item = Outcome>) -> Self {
        self.legacy = legacy.into_iter().collect();
        self
    }

    pub fn table(&self) -> &OutcomeTable {
        &self.table
    }

    pub fn fortune(&self, identity: &str, day: &CivilDay) -> Outcome {
        assign(&self.table, identity, day).clone()
    }
}

impl Assigner for DailyFortune {
    fn vocabulary(&self) -> LabelVocabulary {
        LabelVocabulary::new(self.table.outcomes(), self.legacy.clone())
    }

    fn select(&self, identity: &str, day: &CivilDay) -> BTreeSet<Outcome> {
        BTreeSet::from([self.fortune(identity, day)])
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Uniformly draws `count` distinct labels, ignoring identity and day.
#[derive(Debug, Clone)]
pub struct RandomDraw {
    labels: Vec<Outcome>,
    count: usize,
    legacy: Vec<Outcome>,
}

impl RandomDraw {
    pub fn new(labels: Vec<Outcome>, count: usize) -> Self {
        Self { labels, count, legacy: Vec::new() }
    }

    pub fn with_legacy(mut self, legacy: impl IntoIterator<Item = Outcome>) -> Self {
        self.legacy = legacy.into_iter().collect();
        self
    }
}

impl Default for RandomDraw {
    fn default() -> Self {
        Self::new(DRAW_LABELS.iter().map(|l| Outcome::from(*l)).collect(), 3)
    }
}

impl Assigner for RandomDraw {
    fn vocabulary(&self) -> LabelVocabulary {
        LabelVocabulary::new(self.labels.clone(), self.legacy.clone())
    }

    fn select(&self, _identity: &str, _day: &CivilDay) -> BTreeSet<Outcome> {
        let mut rng = rand::thread_rng();
        self.labels
            .choose_multiple(&mut rng, self.count)
            .cloned()
            .collect()
    }

    fn is_deterministic(&self) -> bool {
        false
    }
}

/// Which assigner a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    #[default]
    Daily,
    Draw,
}

impl AssignmentMode {
    /// Build the assigner; each mode treats the other's labels as legacy.
    pub fn build(self) -> Box<dyn Assigner> {
        let fortunes = OutcomeTable::fortunes();
        let draw = RandomDraw::default();
        match self {
            AssignmentMode::Daily => {
                let legacy = draw.vocabulary().current().to_vec();
                Box::new(DailyFortune::new(fortunes).with_legacy(legacy))
            }
            AssignmentMode::Draw => Box::new(draw.with_legacy(fortunes.outcomes())),
        }
    }
}

impl FromStr for AssignmentMode {
    type Err = LabelerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "fortune" => Ok(AssignmentMode::Daily),
            "draw" | "random" => Ok(AssignmentMode::Draw),
            other => Err(LabelerError::Config(format!("unknown assignment mode '{}'", other))),
        }
    }
}
