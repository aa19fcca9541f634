//! Execution loop: the plan-act-observe cycle
//!
//! One run is strictly sequential: at most one outstanding LLM call and one
//! outstanding browser action at any time, because the page is a single
//! shared mutable resource. Per-iteration failures become `Outcome`s in
//! history rather than errors; only LLM unavailability, the consecutive
//! failure threshold, cancellation, or the step budget end a run, and every
//! termination path returns whatever data was extracted so far.

use brin_browser::Driver;
use brin_core::{
    Action, BrinError, FailureKind, HistoryEntry, Outcome, PageSnapshot, Result, RunConfig,
    RunResult, RunStatus,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::extraction::ExtractionAssembler;
use crate::history::ExecutionHistory;
use crate::planner::{Decision, PlanContext, Planner};

/// The BRIN execution engine
///
/// Generic over the planner and driver capabilities so tests run with
/// deterministic stubs instead of a live model and browser.
pub struct Engine<P, D> {
    planner: P,
    driver: D,
    config: RunConfig,
    cancel: CancelToken,
}

impl<P: Planner, D: Driver> Engine<P, D> {
    pub fn new(planner: P, driver: D, config: RunConfig) -> Self {
        Self {
            planner,
            driver,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token that cancels this run cooperatively, checked between
    /// iterations only
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one instruction to completion
    ///
    /// This is the only externally callable entry point of the core. The
    /// returned `RunResult` is produced exactly once per run; its status
    /// always explains the termination class.
    pub async fn run(&self, instruction: &str) -> Result<RunResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting run {}: {}", run_id, instruction);

        let mut history = ExecutionHistory::new(self.config.history_window);
        let mut assembler = ExtractionAssembler::new();
        let mut transcript: Vec<String> = Vec::new();
        let mut consecutive_failures = 0usize;
        let mut message: Option<String> = None;

        // Ground the first plan in whatever the browser is showing
        let mut snapshot = match self.driver.observe().await {
            Ok(s) => s,
            Err(e) => {
                warn!("Initial observation failed: {}", e);
                PageSnapshot::blank()
            }
        };

        let status = loop {
            if history.len() >= self.config.step_budget {
                warn!("Step budget ({}) exhausted", self.config.step_budget);
                transcript.push(format!(
                    "Stopped: step budget of {} reached",
                    self.config.step_budget
                ));
                break RunStatus::BudgetExhausted;
            }

            if self.cancel.is_cancelled() {
                info!("Run {} cancelled", run_id);
                transcript.push("Stopped: cancelled".to_string());
                break RunStatus::Failed(FailureKind::Cancelled);
            }

            let step = history.len() + 1;
            info!("=== Step {} of {} ===", step, self.config.step_budget);

            let ctx = PlanContext {
                instruction,
                snapshot: &snapshot,
                history: &history,
                step,
                step_budget: self.config.step_budget,
            };

            let decision = match self.planner.plan(&ctx).await {
                Ok(decision) => decision,
                Err(BrinError::MalformedPlan(msg)) => {
                    // Recoverable: recorded as a failure outcome so the
                    // planner sees its own mistake next iteration
                    warn!("Unusable plan at step {}: {}", step, msg);
                    transcript.push(format!("Step {}: plan could not be parsed", step));
                    history.push(HistoryEntry::planning_failure(
                        step,
                        Outcome::failure(FailureKind::MalformedPlan, msg),
                        snapshot.digest(),
                    ));
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.consecutive_failure_threshold {
                        warn!(
                            "Aborting after {} consecutive failures",
                            consecutive_failures
                        );
                        break RunStatus::Failed(FailureKind::MalformedPlan);
                    }
                    continue;
                }
                Err(err) => {
                    warn!("LLM capability failed: {}", err);
                    transcript.push(format!("Stopped: LLM unavailable ({})", err));
                    break RunStatus::Failed(FailureKind::LlmUnavailable);
                }
            };

            let action = match decision {
                Decision::Done { message: m } => {
                    info!("Planner signaled completion at step {}", step);
                    transcript.push(match &m {
                        Some(msg) => format!("Task finished: {}", msg),
                        None => "Task finished".to_string(),
                    });
                    message = m;
                    break RunStatus::Completed;
                }
                Decision::Act(action) => action,
            };

            let outcome = self.execute_with_retry(&action, &snapshot).await;

            // Fold successful extractions into the assembler
            if let (
                Action::Extract { field, .. },
                Outcome::Success {
                    result: Some(text),
                },
            ) = (&action, &outcome)
            {
                let value = serde_json::Value::String(text.trim().to_string());
                if let Err(e) = assembler.record(field, value) {
                    warn!("Discarding extraction: {}", e);
                }
            }

            transcript.push(format!("Step {}: {} -> {}", step, action, outcome));

            if outcome.is_success() {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
            }

            // Refresh state; on observer failure keep planning against the
            // last good snapshot
            match self.driver.observe().await {
                Ok(fresh) => snapshot = fresh,
                Err(e) => warn!("Snapshot refresh failed, keeping previous: {}", e),
            }

            let threshold_hit = !outcome.is_success()
                && consecutive_failures >= self.config.consecutive_failure_threshold;
            // Threshold aborts carry the failing kind; a bare timeout is
            // its own class
            let abort_kind = outcome.failure_kind().unwrap_or(FailureKind::Timeout);

            history.push(HistoryEntry::new(step, action, outcome, snapshot.digest()));

            if threshold_hit {
                warn!(
                    "Aborting after {} consecutive failures",
                    consecutive_failures
                );
                transcript.push(format!(
                    "Stopped: {} consecutive failures",
                    consecutive_failures
                ));
                break RunStatus::Failed(abort_kind);
            }
        };

        let steps_taken = history.len();
        let result = RunResult {
            run_id,
            status,
            message,
            data: assembler.finalize(),
            history: history.into_entries(),
            transcript,
            steps_taken,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "Run {} finished: {} ({} steps, {} fields extracted)",
            run_id,
            result.status,
            result.steps_taken,
            result.data.len()
        );
        Ok(result)
    }

    /// Dispatch one action with the retry policy from the loop contract
    ///
    /// Transient outcomes (timeout, network) allow one re-issue. Idempotent
    /// actions are re-issued directly. Non-idempotent actions are re-issued
    /// only after a fresh observation confirms the first attempt did not
    /// already take effect; if the page changed, the action is treated as
    /// applied.
    async fn execute_with_retry(&self, action: &Action, before: &PageSnapshot) -> Outcome {
        let first = self.driver.execute(action).await;

        let transient = matches!(first, Outcome::Timeout)
            || matches!(
                first,
                Outcome::Failure {
                    kind: FailureKind::Network,
                    ..
                }
            );
        if !transient {
            return first;
        }

        if action.is_idempotent() {
            debug!("Retrying idempotent action '{}' once", action.name());
            return self.driver.execute(action).await;
        }

        match self.driver.observe().await {
            Ok(fresh) if fresh.digest() == before.digest() => {
                debug!(
                    "Page unchanged after transient failure; retrying '{}' once",
                    action.name()
                );
                self.driver.execute(action).await
            }
            Ok(_) => {
                debug!(
                    "Page changed after transient failure; treating '{}' as applied",
                    action.name()
                );
                Outcome::success_with("applied; page changed after transient failure")
            }
            Err(_) => first,
        }
    }
}
