//! Daily Fortune Labeler
//!
//! Assigns every follower of the labeler account one deterministic fortune
//! label per civil day and keeps the published labels consistent as the
//! follower set changes:
//! - Hash-based daily assignment over a weighted outcome table
//! - Create/negate planning across current and retired label vocabularies
//! - Idempotent reconciliation passes against the persisted label store
//! - Day-boundary scheduling with event-driven first assignment

pub mod app;
pub mod config;
pub mod error;
pub mod fortune;
pub mod labels;
pub mod membership;
pub mod orchestrator;
pub mod server;
pub mod utils;

// Re-exports for convenience
pub use app::Labeler;
pub use config::LabelerConfig;
pub use error::{LabelerError, Result};
pub use fortune::{CivilDay, Outcome, OutcomeTable};
pub use labels::{LabelPlan, LabelVocabulary};
pub use orchestrator::{DayBoundaryScheduler, ReconciliationEngine};
