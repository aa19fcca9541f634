//! Core type definitions for the BRIN plan-act-observe loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Scroll direction for the `scroll` action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

impl std::fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            _ => Err(format!("Invalid scroll direction: {}", s)),
        }
    }
}

fn default_scroll_amount() -> u32 {
    600
}

/// One discrete browser operation with typed parameters
///
/// This is the full action vocabulary. The planner produces exactly one
/// action per loop iteration; the driver consumes it exactly once.
/// Element ids refer to ordinals from the most recent [`PageSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Load a URL in the session's page
    Navigate { url: String },
    /// Click an interactive element by its observed id
    Click { element_id: usize },
    /// Type text into an input element by its observed id
    Type { element_id: usize, text: String },
    /// Extract text into a named field; without an element id the
    /// whole visible page text is used
    Extract {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element_id: Option<usize>,
    },
    /// Pause for a fixed duration (e.g. waiting for content to settle)
    Wait { millis: u64 },
    /// Scroll the viewport
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: u32,
    },
    /// Choose an option in a select element by its observed id
    Select { element_id: usize, value: String },
}

impl Action {
    /// Short operation name, matching the serde tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Extract { .. } => "extract",
            Self::Wait { .. } => "wait",
            Self::Scroll { .. } => "scroll",
            Self::Select { .. } => "select",
        }
    }

    /// Whether re-issuing this action after a failure is safe
    ///
    /// Navigate, extract, wait and scroll do not submit anything and can
    /// be retried freely. Click, type and select mutate page state and
    /// are retried at most once, only after re-observation.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Self::Navigate { .. } | Self::Extract { .. } | Self::Wait { .. } | Self::Scroll { .. }
        )
    }

    /// Element id this action targets, if any
    pub fn element_id(&self) -> Option<usize> {
        match self {
            Self::Click { element_id }
            | Self::Type { element_id, .. }
            | Self::Select { element_id, .. } => Some(*element_id),
            Self::Extract { element_id, .. } => *element_id,
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigate { url } => write!(f, "navigate to {}", url),
            Self::Click { element_id } => write!(f, "click element #{}", element_id),
            Self::Type { element_id, text } => {
                write!(f, "type '{}' into element #{}", text, element_id)
            }
            Self::Extract {
                field,
                element_id: Some(id),
            } => write!(f, "extract '{}' from element #{}", field, id),
            Self::Extract {
                field,
                element_id: None,
            } => write!(f, "extract '{}' from page", field),
            Self::Wait { millis } => write!(f, "wait {}ms", millis),
            Self::Scroll { direction, amount } => write!(f, "scroll {} {}px", direction, amount),
            Self::Select { element_id, value } => {
                write!(f, "select '{}' in element #{}", value, element_id)
            }
        }
    }
}

/// Classification of action failures
///
/// The kind drives recovery: `Network` is transient and retried,
/// `ElementMissing` means the page likely changed and the planner should
/// re-plan from a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    ElementMissing,
    MalformedPlan,
    Browser,
    /// Per-action timeout hit; used when timeouts exhaust the failure threshold
    Timeout,
    LlmUnavailable,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::ElementMissing => write!(f, "element_missing"),
            Self::MalformedPlan => write!(f, "malformed_plan"),
            Self::Browser => write!(f, "browser"),
            Self::Timeout => write!(f, "timeout"),
            Self::LlmUnavailable => write!(f, "llm_unavailable"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Typed result of executing one action
///
/// Never mutated after creation; attached to the corresponding
/// [`HistoryEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
    Timeout,
}

impl Outcome {
    pub fn success() -> Self {
        Self::Success { result: None }
    }

    pub fn success_with(result: impl Into<String>) -> Self {
        Self::Success {
            result: Some(result.into()),
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure kind, treating `Timeout` as its own class (no kind)
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { result: Some(r) } => write!(f, "ok: {}", r),
            Self::Success { result: None } => write!(f, "ok"),
            Self::Failure { kind, message } => write!(f, "failed ({}): {}", kind, message),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

/// One interactive element as seen by the page observer
///
/// Ids are per-snapshot ordinals, assigned viewport-first. They are only
/// meaningful against the snapshot that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub id: usize,
    /// Element role (tag name or ARIA role): "button", "link", "input", ...
    pub role: String,
    /// Visible label, placeholder or accessible name (truncated)
    pub label: String,
    /// Whether the element was inside the viewport at observation time
    pub in_viewport: bool,
}

impl std::fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} \"{}\"", self.id, self.role, self.label)?;
        if !self.in_viewport {
            write!(f, " (offscreen)")?;
        }
        Ok(())
    }
}

/// Bounded structural summary of the current page
///
/// Regenerated after every action; the previous snapshot is discarded.
/// Only the digest survives into history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    /// Visible page text, truncated at the observer's cap
    pub visible_text: String,
    /// True when visible_text was cut off at the cap
    pub truncated: bool,
    /// Interactive elements, viewport-first, capped at the observer's limit
    pub interactive_elements: Vec<ElementDescriptor>,
}

impl PageSnapshot {
    /// Snapshot representing "no page observed yet" (before first navigate)
    pub fn blank() -> Self {
        Self {
            url: "about:blank".to_string(),
            ..Default::default()
        }
    }

    /// Look up an element by its observed id
    pub fn element(&self, id: usize) -> Option<&ElementDescriptor> {
        self.interactive_elements.iter().find(|e| e.id == id)
    }

    /// Stable content digest, recorded in history entries
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        hasher.update(self.title.as_bytes());
        hasher.update(self.visible_text.as_bytes());
        for el in &self.interactive_elements {
            hasher.update(el.role.as_bytes());
            hasher.update(el.label.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// One completed loop iteration, as recorded in [`ExecutionHistory`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 1-based iteration number
    pub step: usize,
    /// Action dispatched this iteration; `None` when the planner's output
    /// could not be parsed into one
    pub action: Option<Action>,
    pub outcome: Outcome,
    /// Digest of the snapshot observed after the action
    pub snapshot_digest: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(step: usize, action: Action, outcome: Outcome, snapshot_digest: String) -> Self {
        Self {
            step,
            action: Some(action),
            outcome,
            snapshot_digest,
            timestamp: Utc::now(),
        }
    }

    /// Entry for an iteration whose plan never became an action
    pub fn planning_failure(step: usize, outcome: Outcome, snapshot_digest: String) -> Self {
        Self {
            step,
            action: None,
            outcome,
            snapshot_digest,
            timestamp: Utc::now(),
        }
    }
}

/// Structured data accumulated by extract actions
///
/// Field assignment is last-write-wins; the map is immutable once the run
/// terminates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData(BTreeMap<String, serde_json::Value>);

impl ExtractedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: serde_json::Value) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Why a run terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Planner signaled completion
    Completed,
    /// Consecutive-failure threshold hit, fatal LLM error, or cancellation
    Failed(FailureKind),
    /// Step budget exhausted; accumulated data is still returned
    BudgetExhausted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(kind) => write!(f, "failed ({})", kind),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
        }
    }
}

/// Terminal record of a run, produced exactly once at loop termination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Completion message from the planner, when one was given
    pub message: Option<String>,
    pub data: ExtractedData,
    pub history: Vec<HistoryEntry>,
    /// Human-readable log of what happened, one line per step
    pub transcript: Vec<String>,
    pub steps_taken: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serde_tagged() {
        let action = Action::Navigate {
            url: "https://example.com".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "navigate");
        assert_eq!(json["url"], "https://example.com");

        let parsed: Action =
            serde_json::from_str(r#"{"action":"click","element_id":3}"#).unwrap();
        assert_eq!(parsed, Action::Click { element_id: 3 });
    }

    #[test]
    fn test_action_idempotence() {
        assert!(Action::Navigate {
            url: "https://example.com".into()
        }
        .is_idempotent());
        assert!(Action::Wait { millis: 100 }.is_idempotent());
        assert!(!Action::Click { element_id: 0 }.is_idempotent());
        assert!(!Action::Type {
            element_id: 0,
            text: "x".into()
        }
        .is_idempotent());
        assert!(!Action::Select {
            element_id: 0,
            value: "x".into()
        }
        .is_idempotent());
    }

    #[test]
    fn test_extract_without_element_id() {
        let parsed: Action =
            serde_json::from_str(r#"{"action":"extract","field":"title"}"#).unwrap();
        assert_eq!(
            parsed,
            Action::Extract {
                field: "title".into(),
                element_id: None
            }
        );
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(Outcome::success().is_success());
        let failure = Outcome::failure(FailureKind::Network, "dns");
        assert!(!failure.is_success());
        assert_eq!(failure.failure_kind(), Some(FailureKind::Network));
        assert_eq!(Outcome::Timeout.failure_kind(), None);
    }

    #[test]
    fn test_snapshot_digest_changes_with_content() {
        let a = PageSnapshot {
            url: "https://example.com".into(),
            title: "Example".into(),
            ..Default::default()
        };
        let mut b = a.clone();
        assert_eq!(a.digest(), b.digest());

        b.visible_text = "something new".into();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_snapshot_element_lookup() {
        let snapshot = PageSnapshot {
            interactive_elements: vec![ElementDescriptor {
                id: 2,
                role: "button".into(),
                label: "Submit".into(),
                in_viewport: true,
            }],
            ..Default::default()
        };
        assert!(snapshot.element(2).is_some());
        assert!(snapshot.element(0).is_none());
    }

    #[test]
    fn test_extracted_data_last_write_wins() {
        let mut data = ExtractedData::new();
        data.insert("title", serde_json::json!("first"));
        data.insert("title", serde_json::json!("second"));
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("title"), Some(&serde_json::json!("second")));
    }
}
