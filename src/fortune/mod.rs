//! Fortune Module
//!
//! The closed outcome vocabulary, the weighted outcome table, and the pure
//! functions that map an identity and a civil day onto an outcome.

pub mod assign;
pub mod day;
pub mod definitions;

pub use assign::{assign, Assigner, AssignmentMode, DailyFortune, RandomDraw};
pub use day::{jst, offset_hours, CivilDay, Clock, SystemClock};

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, stable identifier for a population member (a DID).
pub type Identity = String;

/// One label value from a closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outcome(String);

impl Outcome {
    pub fn new(val: impl Into<String>) -> Self {
        Self(val.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Outcome {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Daily fortune values with their cumulative thresholds (percent).
pub const FORTUNES: [(&str, u32); 7] = [
    ("daikichi", 6),  // 6%
    ("kichi", 28),    // 22%
    ("chukichi", 50), // 22%
    ("shokichi", 70), // 20%
    ("suekichi", 88), // 18%
    ("kyo", 97),      // 9%
    ("daikyo", 100),  // 3%
];

/// Labels used by the random-draw mode.
pub const DRAW_LABELS: [&str; 10] = ["A", "B", "C", "D", "E", "1", "2", "3", "4", "5"];

/// An ordered partition of `0..total` into outcomes.
///
/// Entries are `(outcome, cumulative_threshold)` with strictly increasing
/// thresholds; the last threshold is the modulus used for bucketing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeTable {
    entries: Vec<(Outcome, u32)>,
}

impl OutcomeTable {
    /// Build a table, rejecting empty or non-increasing threshold lists.
    pub fn new(entries: Vec<(Outcome, u32)>) -> Option<Self> {
        if entries.is_empty() || entries[0].1 == 0 {
            return None;
        }
        if entries.windows(2).any(|w| w[1].1 <= w[0].1) {
            return None;
        }
        Some(Self { entries })
    }

    /// The daily fortune table.
    pub fn fortunes() -> Self {
        Self {
            entries: FORTUNES
                .iter()
                .map(|(val, threshold)| (Outcome::from(*val), *threshold))
                .collect(),
        }
    }

    /// Modulus for bucketing: the final cumulative threshold.
    pub fn total(&self) -> u32 {
        self.entries.last().map(|(_, t)| *t).unwrap_or(0)
    }

    pub fn entries(&self) -> &[(Outcome, u32)] {
        &self.entries
    }

    /// Every outcome, in table order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.entries.iter().map(|(o, _)| o.clone()).collect()
    }

    /// First outcome whose threshold exceeds `bucket`.
    ///
    /// Falls back to the last outcome when `bucket >= total()`.
    pub fn lookup(&self, bucket: u32) -> &Outcome {
        // Constructors guarantee at least one entry.
        let fallback = &self.entries[self.entries.len() - 1].0;
        self.entries
            .iter()
            .find(|(_, threshold)| bucket < *threshold)
            .map(|(o, _)| o)
            .unwrap_or(fallback)
    }
}

impl Default for OutcomeTable {
    fn default() -> Self {
        Self::fortunes()
    }
}
