//! Bounded execution history
//!
//! Every completed iteration is recorded; the full record goes into the
//! final `RunResult`. The bound applies to the LLM prompt only: the last
//! `window` entries are rendered verbatim, anything older is folded into a
//! one-line summary so prompt size stays stable no matter how long the run.

use brin_core::{HistoryEntry, Outcome};

/// Append-only record of completed loop iterations
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    entries: Vec<HistoryEntry>,
    /// Entries rendered verbatim into the prompt; older ones are summarized
    window: usize,
}

impl ExecutionHistory {
    pub fn new(window: usize) -> Self {
        Self {
            entries: Vec::new(),
            window: window.max(1),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }

    /// Render the history for inclusion in the planner prompt
    ///
    /// The most recent `window` entries appear verbatim; older ones are
    /// collapsed into a single summary line.
    pub fn render_for_prompt(&self) -> String {
        if self.entries.is_empty() {
            return "(no actions taken yet)".to_string();
        }

        let mut out = String::new();
        let overflow = self.entries.len().saturating_sub(self.window);

        if overflow > 0 {
            out.push_str(&summarize(&self.entries[..overflow]));
            out.push('\n');
        }

        for entry in &self.entries[overflow..] {
            let action = entry
                .action
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "(unparsable plan)".to_string());
            out.push_str(&format!("{}. {} -> {}\n", entry.step, action, entry.outcome));
        }

        out.trim_end().to_string()
    }
}

/// One-line summary of entries that fell out of the verbatim window
fn summarize(entries: &[HistoryEntry]) -> String {
    let succeeded = entries
        .iter()
        .filter(|e| e.outcome.is_success())
        .count();
    let failed = entries.len() - succeeded;

    let mut failure_notes: Vec<String> = Vec::new();
    for entry in entries {
        if let Outcome::Failure { kind, .. } = &entry.outcome {
            failure_notes.push(kind.to_string());
        } else if matches!(entry.outcome, Outcome::Timeout) {
            failure_notes.push("timeout".to_string());
        }
    }
    failure_notes.dedup();

    if failed == 0 {
        format!("[steps 1-{}: {} actions succeeded]", entries.len(), succeeded)
    } else {
        format!(
            "[steps 1-{}: {} succeeded, {} failed ({})]",
            entries.len(),
            succeeded,
            failed,
            failure_notes.join(", ")
        )
    }
}
