//! Day-boundary scheduler
//!
//! Polls the clock and runs one reconciliation pass each time the civil day
//! changes. Member events get an immediate single-identity assignment.

use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::engine::{MemberOutcome, PassReport, ReconciliationEngine, TriggerOutcome};
use super::event_bus::{MemberEvent, Subscription};
use crate::error::Result;
use crate::fortune::{CivilDay, Clock};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    /// Run one pass shortly after startup to repair drift from downtime.
    pub run_on_startup: bool,
    pub startup_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            run_on_startup: true,
            startup_delay: Duration::from_secs(10),
        }
    }
}

pub struct DayBoundaryScheduler {
    engine: Arc<ReconciliationEngine>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    last_seen_day: CivilDay,
}

impl DayBoundaryScheduler {
    /// Starts with `last_seen_day` set to today.
    pub fn new(engine: Arc<ReconciliationEngine>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        let last_seen_day = CivilDay::at(clock.now(), offset);
        Self { engine, clock, offset, last_seen_day }
    }

    pub fn last_seen_day(&self) -> &CivilDay {
        &self.last_seen_day
    }

    /// Record the current day; returns it if it differs from the last seen.
    pub fn observe_day(&mut self) -> Option<CivilDay> {
        let today = CivilDay::at(self.clock.now(), self.offset);
        if today == self.last_seen_day {
            return None;
        }
        info!("Midnight detected! {} -> {}", self.last_seen_day, today);
        self.last_seen_day = today.clone();
        Some(today)
    }

    /// One poll step: runs a pass if the day changed since the last step.
    pub async fn tick(&mut self) -> Option<Result<PassReport>> {
        self.observe_day()?;
        Some(self.engine.run_pass().await)
    }

    /// Run a pass now unless one is already in progress.
    pub async fn trigger_now(&self) -> Result<TriggerOutcome> {
        self.engine.try_run_pass().await
    }

    pub async fn handle_event(&self, event: &MemberEvent) -> Result<MemberOutcome> {
        match event {
            MemberEvent::NewMember(id) => info!("New follower: {}", id),
            MemberEvent::Engagement(id) => info!("New like from: {}", id),
        }
        self.engine.assign_member(event.identity()).await
    }

    pub async fn run(
        mut self,
        settings: SchedulerSettings,
        mut events: Option<Subscription>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if settings.run_on_startup {
            info!("Starting initial batch run in {:?}", settings.startup_delay);
            tokio::select! {
                _ = tokio::time::sleep(settings.startup_delay) => {
                    if let Err(e) = self.engine.run_pass().await {
                        error!("Startup batch failed: {}", e);
                    }
                }
                _ = shutdown.changed() => return,
            }
        }

        let mut ticker = tokio::time::interval(settings.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(Err(e)) = self.tick().await {
                        error!("Batch execution failed: {}", e);
                    }
                }
                event = next_event(&mut events) => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(&event).await {
                            warn!("Failed to label {}: {}", event.identity(), e);
                        }
                    }
                    None => {
                        warn!("Event source closed, continuing with day-boundary passes only");
                        events = None;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        if let Some(sub) = events {
            sub.unsubscribe();
        }
        info!("Scheduler stopped");
    }
}

async fn next_event(events: &mut Option<Subscription>) -> Option<MemberEvent> {
    match events {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
