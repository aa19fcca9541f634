//! Browser driver adapter: executes one typed action at a time
//!
//! The engine is generic over the [`Driver`] trait, so tests run against an
//! in-memory fake. [`CdpDriver`] is the real implementation: it dispatches
//! each action to the CDP session on a blocking task, bounded by the
//! per-action timeout. Exceeding the timeout yields `Outcome::Timeout`
//! rather than an error, so the loop decides retry vs. abort.

use async_trait::async_trait;
use brin_core::{Action, BrinError, FailureKind, Outcome, PageSnapshot, Result, RunConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::observer::PageObserver;
use crate::session::BrowserSession;

/// Browser automation capability consumed by the execution loop
#[async_trait]
pub trait Driver: Send + Sync {
    /// Execute one action against the live page
    async fn execute(&self, action: &Action) -> Outcome;

    /// Capture a fresh snapshot of the current page
    async fn observe(&self) -> Result<PageSnapshot>;
}

/// Real driver over a Chrome DevTools Protocol session
pub struct CdpDriver {
    session: Arc<BrowserSession>,
    observer: PageObserver,
    action_timeout: Duration,
    /// Serializes CDP calls: at most one touches the page at a time, even
    /// when a timed-out call is still draining on its blocking thread
    gate: Arc<Mutex<()>>,
}

impl CdpDriver {
    pub fn new(session: BrowserSession, run_config: &RunConfig) -> Self {
        let observer = PageObserver::new(session.config());
        Self {
            session: Arc::new(session),
            observer,
            action_timeout: Duration::from_secs(run_config.per_action_timeout_secs),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// CSS selector targeting an element tagged by the observer
    fn selector_for(element_id: usize) -> String {
        format!("[data-brin-id=\"{}\"]", element_id)
    }
}

/// Run one blocking CDP call behind the session gate, bounded by `timeout`
///
/// The guard moves into the blocking task, so a call abandoned by the
/// timeout keeps the gate until it actually returns; the next call waits
/// on the gate instead of racing the stale one. Lock acquisition counts
/// against the same timeout. `None` means the budget elapsed.
async fn run_gated<T, F>(
    gate: Arc<Mutex<()>>,
    timeout: Duration,
    work: F,
) -> Option<Result<T>>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let gated = async move {
        let guard = gate.lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _gate = guard;
            work()
        })
        .await
        .map_err(|e| BrinError::Browser(format!("Browser task failed: {}", e)))?
    };
    tokio::time::timeout(timeout, gated).await.ok()
}

fn run_blocking(session: &BrowserSession, action: &Action) -> Result<Option<String>> {
    match action {
        Action::Navigate { url } => {
            session.navigate(url)?;
            Ok(None)
        }
        Action::Click { element_id } => {
            session.click(&CdpDriver::selector_for(*element_id))?;
            Ok(None)
        }
        Action::Type { element_id, text } => {
            session.type_into(&CdpDriver::selector_for(*element_id), text)?;
            Ok(None)
        }
        Action::Extract {
            element_id: Some(id),
            ..
        } => {
            let text = session.text_of(&CdpDriver::selector_for(*id))?;
            Ok(Some(text))
        }
        Action::Extract {
            element_id: None, ..
        } => {
            let value =
                session.evaluate_script("document.body ? document.body.innerText : ''")?;
            Ok(Some(value.as_str().unwrap_or("").to_string()))
        }
        Action::Scroll { direction, amount } => {
            let delta = match direction {
                brin_core::ScrollDirection::Up => -(*amount as i64),
                brin_core::ScrollDirection::Down => *amount as i64,
            };
            session.evaluate_script(&format!("window.scrollBy(0, {})", delta))?;
            Ok(None)
        }
        Action::Select { element_id, value } => {
            let selector = CdpDriver::selector_for(*element_id);
            // Set the value in-page and fire change events; CDP has no
            // first-class select-option primitive.
            let script = format!(
                "(() => {{ const el = document.querySelector('{}'); if (!el) return 'missing'; \
                 el.value = {}; el.dispatchEvent(new Event('input', {{bubbles: true}})); \
                 el.dispatchEvent(new Event('change', {{bubbles: true}})); return 'ok'; }})()",
                selector,
                serde_json::to_string(value)?
            );
            let result = session.evaluate_script(&script)?;
            if result.as_str() == Some("missing") {
                return Err(BrinError::ElementNotFound(selector));
            }
            Ok(None)
        }
        Action::Wait { .. } => Ok(None),
    }
}

/// Map a driver error to the failure kind that drives recovery
///
/// Missing elements mean the page changed and the planner should re-plan;
/// navigation failures are transient network conditions worth retrying.
fn classify(action: &Action, err: &BrinError) -> FailureKind {
    match err {
        BrinError::ElementNotFound(_) => FailureKind::ElementMissing,
        BrinError::Browser(_) if matches!(action, Action::Navigate { .. }) => FailureKind::Network,
        _ => FailureKind::Browser,
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn execute(&self, action: &Action) -> Outcome {
        debug!("Executing action: {}", action);

        // Wait never touches the browser but still honors the action budget
        if let Action::Wait { millis } = action {
            let slept = tokio::time::timeout(
                self.action_timeout,
                tokio::time::sleep(Duration::from_millis(*millis)),
            )
            .await;
            return match slept {
                Ok(()) => Outcome::success(),
                Err(_) => Outcome::Timeout,
            };
        }

        let session = Arc::clone(&self.session);
        let dispatched = action.clone();
        let result = run_gated(Arc::clone(&self.gate), self.action_timeout, move || {
            run_blocking(&session, &dispatched)
        })
        .await;

        match result {
            Some(Ok(result)) => Outcome::Success { result },
            Some(Err(err)) => {
                let kind = classify(action, &err);
                warn!("Action failed ({}): {}", kind, err);
                Outcome::failure(kind, err.to_string())
            }
            None => {
                warn!(
                    "Action '{}' timed out after {:?}",
                    action.name(),
                    self.action_timeout
                );
                Outcome::Timeout
            }
        }
    }

    async fn observe(&self) -> Result<PageSnapshot> {
        let session = Arc::clone(&self.session);
        let observer = self.observer.clone();

        match run_gated(Arc::clone(&self.gate), self.action_timeout, move || {
            observer.observe(&session)
        })
        .await
        {
            Some(result) => result,
            None => Err(BrinError::Browser(format!(
                "Observation timed out after {:?}",
                self.action_timeout
            ))),
        }
    }
}
