//! End-to-end loop behavior against scripted planner and driver stubs
//!
//! No live model or browser is involved; the stubs implement the same
//! capability traits the real implementations do.

use async_trait::async_trait;
use brin_browser::Driver;
use brin_core::{
    Action, BrinError, ElementDescriptor, FailureKind, Outcome, PageSnapshot, Result, RunConfig,
    RunStatus,
};
use brin_engine::{Decision, Engine, PlanContext, Planner};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted planner reply
#[derive(Debug, Clone)]
enum Step {
    Decide(Decision),
    Malformed(String),
    Unavailable(String),
}

/// Planner that replays a fixed script; repeats the last step when the
/// script runs out
struct ScriptedPlanner {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
}

impl ScriptedPlanner {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _ctx: &PlanContext<'_>) -> Result<Decision> {
        let step = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            match script.pop_front() {
                Some(step) => {
                    *last = Some(step.clone());
                    step
                }
                None => last
                    .clone()
                    .expect("scripted planner called before any step"),
            }
        };
        match step {
            Step::Decide(decision) => Ok(decision),
            Step::Malformed(msg) => Err(BrinError::MalformedPlan(msg)),
            Step::Unavailable(msg) => Err(BrinError::LlmUnavailable(msg)),
        }
    }
}

/// Driver that replays scripted outcomes and snapshots; internals are
/// shared so tests keep a handle after the engine takes ownership
#[derive(Clone)]
struct FakeDriver {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    snapshots: Arc<Mutex<VecDeque<PageSnapshot>>>,
    base_snapshot: PageSnapshot,
    executed: Arc<Mutex<Vec<Action>>>,
}

impl FakeDriver {
    fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            snapshots: Arc::new(Mutex::new(VecDeque::new())),
            base_snapshot: example_snapshot("base"),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_snapshots(self, snapshots: Vec<PageSnapshot>) -> Self {
        *self.snapshots.lock().unwrap() = snapshots.into();
        self
    }

    fn executed(&self) -> Vec<Action> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn execute(&self, action: &Action) -> Outcome {
        self.executed.lock().unwrap().push(action.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Outcome::success)
    }

    async fn observe(&self) -> Result<PageSnapshot> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.base_snapshot.clone()))
    }
}

fn example_snapshot(marker: &str) -> PageSnapshot {
    PageSnapshot {
        url: "https://example.com".to_string(),
        title: "Example Domain".to_string(),
        visible_text: format!("Example Domain {}", marker),
        truncated: false,
        interactive_elements: vec![ElementDescriptor {
            id: 0,
            role: "link".to_string(),
            label: "More information".to_string(),
            in_viewport: true,
        }],
    }
}

fn config(step_budget: usize) -> RunConfig {
    RunConfig {
        step_budget,
        ..RunConfig::default()
    }
}

fn navigate() -> Decision {
    Decision::Act(Action::Navigate {
        url: "https://example.com".to_string(),
    })
}

#[tokio::test]
async fn scenario_a_navigate_then_extract_completes() {
    let planner = ScriptedPlanner::new(vec![
        Step::Decide(navigate()),
        Step::Decide(Decision::Act(Action::Extract {
            field: "title".to_string(),
            element_id: None,
        })),
        Step::Decide(Decision::Done {
            message: Some("extracted the title".to_string()),
        }),
    ]);
    let driver = FakeDriver::new(vec![
        Outcome::success(),
        Outcome::success_with("Example Domain"),
    ]);

    let engine = Engine::new(planner, driver, config(25));
    let result = engine
        .run("go to example.com and extract the page title")
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps_taken, 2);
    assert_eq!(result.history.len(), 2);
    assert_eq!(
        result.data.get("title"),
        Some(&serde_json::json!("Example Domain"))
    );
    assert_eq!(result.message.as_deref(), Some("extracted the title"));
}

#[tokio::test]
async fn scenario_b_element_missing_hits_failure_threshold() {
    // Planner keeps asking for the same element; the page never has it
    let planner = ScriptedPlanner::new(vec![Step::Decide(Decision::Act(Action::Click {
        element_id: 0,
    }))]);
    let driver = FakeDriver::new(vec![
        Outcome::failure(FailureKind::ElementMissing, "gone"),
        Outcome::failure(FailureKind::ElementMissing, "gone"),
        Outcome::failure(FailureKind::ElementMissing, "gone"),
    ]);

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("click the missing button").await.unwrap();

    assert_eq!(result.status, RunStatus::Failed(FailureKind::ElementMissing));
    assert_eq!(result.history.len(), 3);
    assert!(result.data.is_empty());
}

#[tokio::test]
async fn scenario_c_step_budget_exhaustion_is_graceful() {
    let planner = ScriptedPlanner::new(vec![Step::Decide(Decision::Act(Action::Wait {
        millis: 1,
    }))]);
    let driver = FakeDriver::new(vec![]);

    let engine = Engine::new(planner, driver, config(5));
    let result = engine.run("an eight step task").await.unwrap();

    assert_eq!(result.status, RunStatus::BudgetExhausted);
    assert_eq!(result.history.len(), 5);
    assert_eq!(result.steps_taken, 5);
}

#[tokio::test]
async fn scenario_d_malformed_plans_abort_after_third() {
    let planner = ScriptedPlanner::new(vec![Step::Malformed("not json".to_string())]);
    let driver = FakeDriver::new(vec![]);

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("anything").await.unwrap();

    assert_eq!(result.status, RunStatus::Failed(FailureKind::MalformedPlan));
    assert_eq!(result.history.len(), 3);
    assert!(result.history.iter().all(|e| e.action.is_none()));
}

#[tokio::test]
async fn malformed_plan_then_recovery_resets_failure_count() {
    let planner = ScriptedPlanner::new(vec![
        Step::Malformed("garbage".to_string()),
        Step::Malformed("garbage".to_string()),
        Step::Decide(navigate()),
        Step::Malformed("garbage".to_string()),
        Step::Malformed("garbage".to_string()),
        Step::Decide(Decision::Done { message: None }),
    ]);
    let driver = FakeDriver::new(vec![Outcome::success()]);

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("flaky planning").await.unwrap();

    // Two failures, a success, two more failures: threshold (3) never hit
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.history.len(), 5);
}

#[tokio::test]
async fn llm_unavailable_is_fatal_but_returns_partial_data() {
    let planner = ScriptedPlanner::new(vec![
        Step::Decide(Decision::Act(Action::Extract {
            field: "title".to_string(),
            element_id: None,
        })),
        Step::Unavailable("rate limited beyond retry".to_string()),
    ]);
    let driver = FakeDriver::new(vec![Outcome::success_with("Example Domain")]);

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("extract then die").await.unwrap();

    assert_eq!(
        result.status,
        RunStatus::Failed(FailureKind::LlmUnavailable)
    );
    // Data extracted before the failure is never discarded
    assert_eq!(
        result.data.get("title"),
        Some(&serde_json::json!("Example Domain"))
    );
}

#[tokio::test]
async fn cancellation_checked_between_iterations() {
    let planner = ScriptedPlanner::new(vec![Step::Decide(navigate())]);
    let driver = FakeDriver::new(vec![]);

    let engine = Engine::new(planner, driver, config(25));
    engine.cancel_token().cancel();
    let result = engine.run("never starts").await.unwrap();

    assert_eq!(result.status, RunStatus::Failed(FailureKind::Cancelled));
    assert_eq!(result.steps_taken, 0);
}

#[tokio::test]
async fn idempotent_action_retried_after_timeout() {
    let planner = ScriptedPlanner::new(vec![
        Step::Decide(navigate()),
        Step::Decide(Decision::Done { message: None }),
    ]);
    let driver = FakeDriver::new(vec![Outcome::Timeout, Outcome::success()]);
    let handle = driver.clone();

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("retry the navigate").await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.history.len(), 1);
    assert!(result.history[0].outcome.is_success());
    // One logical step, two dispatches
    assert_eq!(handle.executed().len(), 2);
}

#[tokio::test]
async fn non_idempotent_action_attempted_at_most_twice() {
    let planner = ScriptedPlanner::new(vec![
        Step::Decide(Decision::Act(Action::Click { element_id: 0 })),
        Step::Decide(Decision::Done { message: None }),
    ]);
    // Page unchanged between observations, so the single retry is allowed;
    // both attempts time out
    let driver = FakeDriver::new(vec![Outcome::Timeout, Outcome::Timeout, Outcome::Timeout]);
    let handle = driver.clone();

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("click something flaky").await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.history.len(), 1);
    assert_eq!(result.history[0].outcome, Outcome::Timeout);
    assert_eq!(handle.executed().len(), 2);
}

#[tokio::test]
async fn non_idempotent_action_not_reissued_when_page_changed() {
    let planner = ScriptedPlanner::new(vec![
        Step::Decide(Decision::Act(Action::Click { element_id: 0 })),
        Step::Decide(Decision::Done { message: None }),
    ]);
    let driver = FakeDriver::new(vec![Outcome::Timeout])
        // Initial observation, then a changed page seen by the retry check
        .with_snapshots(vec![example_snapshot("before"), example_snapshot("after")]);
    let handle = driver.clone();

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("click that probably landed").await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.history.len(), 1);
    // Treated as applied; no blind second click
    assert!(result.history[0].outcome.is_success());
    assert_eq!(handle.executed().len(), 1);
}

#[tokio::test]
async fn repeated_timeouts_abort_with_timeout_kind() {
    let planner = ScriptedPlanner::new(vec![Step::Decide(navigate())]);
    let driver = FakeDriver::new(vec![Outcome::Timeout; 6]);
    let handle = driver.clone();

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("navigate into a dead network").await.unwrap();

    assert_eq!(result.status, RunStatus::Failed(FailureKind::Timeout));
    assert_eq!(result.history.len(), 3);
    // Navigate is idempotent, so every step gets exactly one retry
    assert_eq!(handle.executed().len(), 6);
}

#[tokio::test]
async fn history_never_exceeds_step_budget() {
    for budget in [1, 3, 7] {
        let planner = ScriptedPlanner::new(vec![Step::Decide(Decision::Act(Action::Wait {
            millis: 1,
        }))]);
        let driver = FakeDriver::new(vec![]);
        let engine = Engine::new(planner, driver, config(budget));
        let result = engine.run("spin").await.unwrap();
        assert!(result.history.len() <= budget);
        assert_eq!(result.status, RunStatus::BudgetExhausted);
    }
}

#[tokio::test]
async fn re_extraction_overwrites_same_field() {
    let planner = ScriptedPlanner::new(vec![
        Step::Decide(Decision::Act(Action::Extract {
            field: "title".to_string(),
            element_id: None,
        })),
        Step::Decide(Decision::Act(Action::Extract {
            field: "title".to_string(),
            element_id: None,
        })),
        Step::Decide(Decision::Done { message: None }),
    ]);
    // Page state unchanged, so re-extraction yields the same value
    let driver = FakeDriver::new(vec![
        Outcome::success_with("Example Domain"),
        Outcome::success_with("Example Domain"),
    ]);

    let engine = Engine::new(planner, driver, config(25));
    let result = engine.run("extract twice").await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.data.len(), 1);
    assert_eq!(
        result.data.get("title"),
        Some(&serde_json::json!("Example Domain"))
    );
}
