//! Orchestrator Module
//!
//! Coordinates reconciliation passes, the day-boundary scheduler and the
//! member event bus.

pub mod engine;
pub mod event_bus;
pub mod scheduler;

pub use engine::{
    EngineSettings, MemberOutcome, PassPhase, PassReport, ReconcileDiff, ReconciliationEngine,
    TriggerOutcome,
};
pub use event_bus::{EventBus, MemberEvent, Subscription};
pub use scheduler::{DayBoundaryScheduler, SchedulerSettings};
