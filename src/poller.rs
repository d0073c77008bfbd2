// Poll loop: fetch -> evaluate -> report once per tick, with a consecutive-error budget.
// Strictly sequential; the next tick is only awaited after the current report is done.

use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::evaluator::{self, EvaluatorOptions, Thresholds};
use crate::fetcher::StatsSource;

pub const GIVE_UP_MESSAGE: &str = "Unable to fetch server statistic";
pub const SHUTDOWN_MESSAGE: &str = "Shutting down monitor";

/// What happens when consecutive failures reach the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeilingPolicy {
    /// Report and stop polling.
    #[default]
    Stop,
    /// Report, reset the counter and keep polling.
    Continue,
}

/// Consecutive fetch failures, owned by the loop.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    ceiling: u32,
    consecutive: u32,
}

impl ErrorBudget {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling: ceiling.max(1),
            consecutive: 0,
        }
    }

    /// Counts a failure; returns true when the ceiling is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive >= self.ceiling
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Reporting,
}

/// Result of a single fetch-evaluate-report cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fetch succeeded; this many warnings were printed.
    Reported(usize),
    /// Fetch failed below the ceiling (or at it under `Continue`, after the reset).
    Failed { consecutive: u32 },
    /// Ceiling reached under `Stop`.
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Shutdown,
    GaveUp,
}

/// Destination for operator-facing console lines.
pub trait ReportSink: Send {
    fn emit(&mut self, line: &str);
}

/// Prints each line to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn emit(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// Collects lines in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ReportSink for MemorySink {
    fn emit(&mut self, line: &str) {
        let mut lines = self
            .lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.push(line.to_string());
    }
}

/// Loop timing and policy.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub error_ceiling: u32,
    pub on_error_ceiling: CeilingPolicy,
    pub thresholds: Thresholds,
    pub evaluator: EvaluatorOptions,
}

pub struct Poller<S, R> {
    source: S,
    sink: R,
    config: PollerConfig,
    budget: ErrorBudget,
    state: PollState,
}

impl<S, R> Poller<S, R>
where
    S: StatsSource,
    R: ReportSink,
{
    pub fn new(source: S, sink: R, config: PollerConfig) -> Self {
        let budget = ErrorBudget::new(config.error_ceiling);
        Self {
            source,
            sink,
            config,
            budget,
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    fn transition(&mut self, next: PollState) {
        tracing::trace!(from = ?self.state, to = ?next, "poll state");
        self.state = next;
    }

    /// Runs one fetch-evaluate-report cycle and returns to `Idle`.
    pub async fn tick(&mut self) -> TickOutcome {
        self.transition(PollState::Fetching);
        let result = self.source.fetch().await;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.transition(PollState::Idle);
                let at_ceiling = self.budget.record_failure();
                tracing::warn!(
                    error = %e,
                    kind = ?e.kind(),
                    consecutive_errors = self.budget.consecutive(),
                    operation = "fetch_stats",
                    "stats fetch failed"
                );
                self.sink.emit(&format!("Error fetching stats: {}", e));
                if !at_ceiling {
                    return TickOutcome::Failed {
                        consecutive: self.budget.consecutive(),
                    };
                }

                self.sink.emit(GIVE_UP_MESSAGE);
                return match self.config.on_error_ceiling {
                    CeilingPolicy::Stop => {
                        tracing::error!(
                            ceiling = self.budget.ceiling(),
                            "error ceiling reached, stopping"
                        );
                        TickOutcome::GaveUp
                    }
                    CeilingPolicy::Continue => {
                        tracing::warn!(
                            ceiling = self.budget.ceiling(),
                            "error ceiling reached, resetting and continuing"
                        );
                        self.budget.reset();
                        TickOutcome::Failed { consecutive: 0 }
                    }
                };
            }
        };

        self.budget.record_success();
        self.transition(PollState::Reporting);
        let warnings =
            evaluator::evaluate(&snapshot, &self.config.thresholds, self.config.evaluator);
        for warning in &warnings {
            self.sink.emit(&warning.to_string());
        }
        tracing::debug!(
            operation = "evaluate",
            load_average = snapshot.load_average,
            warnings = warnings.len(),
            "stats evaluated"
        );
        self.transition(PollState::Idle);
        TickOutcome::Reported(warnings.len())
    }

    /// Ticks every `poll_interval` (first tick immediately) until shutdown or give-up.
    /// Shutdown is only observed while idle; an in-flight fetch is bounded by its own timeout.
    #[tracing::instrument(
        name = "poller",
        skip_all,
        fields(poll_interval_ms = self.config.poll_interval.as_millis() as u64)
    )]
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) -> PollExit {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::debug!("Poller shutting down");
                    self.sink.emit(SHUTDOWN_MESSAGE);
                    return PollExit::Shutdown;
                }
                _ = ticker.tick() => {
                    if self.tick().await == TickOutcome::GaveUp {
                        return PollExit::GaveUp;
                    }
                }
            }
        }
    }
}

pub fn spawn<S, R>(
    poller: Poller<S, R>,
    shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<PollExit>
where
    S: StatsSource + Send + 'static,
    R: ReportSink + 'static,
{
    tokio::spawn(poller.run(shutdown_rx))
}
