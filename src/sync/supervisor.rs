use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, Span, error, info};

use super::{CycleReport, SyncEngine};
use crate::config::{BackoffConfig, SyncConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Succeeded,
    Failed,
}

/// How long to wait before the next cycle.
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, outcome: CycleOutcome, consecutive_failures: u32) -> Duration;
}

/// Same pause after every cycle, whatever happened.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    pub interval: Duration,
}

impl BackoffPolicy for FixedInterval {
    fn delay(&self, _outcome: CycleOutcome, _consecutive_failures: u32) -> Duration {
        self.interval
    }
}

/// Normal interval after a success; after failures the pause starts at
/// `initial` and doubles up to `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub interval: Duration,
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, outcome: CycleOutcome, consecutive_failures: u32) -> Duration {
        if outcome == CycleOutcome::Succeeded || consecutive_failures == 0 {
            return self.interval;
        }
        let mut delay = self.initial;
        for _ in 1..consecutive_failures {
            delay = delay.saturating_mul(2).min(self.max);
            if delay == self.max {
                break;
            }
        }
        delay.min(self.max)
    }
}

/// Builds the policy selected in the `sync.backoff` section.
pub fn backoff_from_config(config: &SyncConfig) -> Box<dyn BackoffPolicy> {
    match config.backoff {
        BackoffConfig::Fixed => Box::new(FixedInterval {
            interval: config.interval(),
        }),
        BackoffConfig::Exponential {
            initial_secs,
            max_secs,
        } => Box::new(ExponentialBackoff {
            interval: config.interval(),
            initial: Duration::from_secs(initial_secs),
            max: Duration::from_secs(max_secs),
        }),
    }
}

impl BackoffPolicy for Box<dyn BackoffPolicy> {
    fn delay(&self, outcome: CycleOutcome, consecutive_failures: u32) -> Duration {
        self.as_ref().delay(outcome, consecutive_failures)
    }
}

/// Result of one supervised cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub outcome: CycleOutcome,
    pub report: Option<CycleReport>,
    /// Pause the policy asks for before the next cycle.
    pub delay: Duration,
}

/// Runs cycles forever. Cycle errors are logged and turned into a pause;
/// they never stop the loop.
pub struct Supervisor<B: BackoffPolicy> {
    engine: Arc<SyncEngine>,
    backoff: B,
    consecutive_failures: u32,
    span: Span,
}

impl<B: BackoffPolicy> Supervisor<B> {
    pub fn new(engine: Arc<SyncEngine>, backoff: B, span: Span) -> Self {
        Self {
            engine,
            backoff,
            consecutive_failures: 0,
            span,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One cycle with its outcome logged, without sleeping.
    pub async fn step(&mut self) -> Step {
        let span = self.span.clone();
        let result = self.engine.run_cycle().instrument(span.clone()).await;
        let _entered = span.enter();

        let (outcome, report) = match result {
            Ok(report) => {
                self.consecutive_failures = 0;
                info!(
                    channels = report.channels_live,
                    groups = report.groups_fetched,
                    published = report.published,
                    duplicates = report.duplicates,
                    rejected = report.rejected,
                    recorded = report.messages_recorded,
                    "sync cycle finished"
                );
                (CycleOutcome::Succeeded, Some(report))
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                error!(
                    failures = self.consecutive_failures,
                    "sync cycle failed: {:#}", err
                );
                (CycleOutcome::Failed, None)
            }
        };

        let delay = self.backoff.delay(outcome, self.consecutive_failures);
        Step {
            outcome,
            report,
            delay,
        }
    }

    pub async fn run_forever(mut self) {
        loop {
            let step = self.step().await;
            info!(
                parent: &self.span,
                "next sync cycle in {} seconds",
                step.delay.as_secs()
            );
            tokio::time::sleep(step.delay).await;
        }
    }
}
