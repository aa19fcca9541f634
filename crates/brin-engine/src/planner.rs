//! Planner: instruction + observed state -> next action
//!
//! The LLM is asked for exactly one JSON object per step, grounded in the
//! element ids of the current snapshot. Parsing is a strict tagged-variant
//! parse: anything that does not map to a known operation with parameters
//! of the right shape is a `MalformedPlan` error, which the loop records as
//! a recoverable failure outcome rather than aborting.

use async_trait::async_trait;
use brin_core::{Action, BrinError, PageSnapshot, Result};
use brin_llm::CompletionClient;
use tracing::debug;

use crate::history::ExecutionHistory;

/// Everything the planner may ground a decision in
#[derive(Debug)]
pub struct PlanContext<'a> {
    pub instruction: &'a str,
    pub snapshot: &'a PageSnapshot,
    pub history: &'a ExecutionHistory,
    /// 1-based step about to be planned
    pub step: usize,
    pub step_budget: usize,
}

/// What the planner decided for this iteration
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Dispatch one action to the browser
    Act(Action),
    /// The task is finished; stop the loop
    Done { message: Option<String> },
}

/// Planning capability consumed by the execution loop
///
/// Tests use deterministic scripted implementations; the live model is
/// never exercised in tests.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, ctx: &PlanContext<'_>) -> Result<Decision>;
}

/// Planner backed by an LLM completion client
pub struct LlmPlanner<C: CompletionClient> {
    client: C,
}

impl<C: CompletionClient> LlmPlanner<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: CompletionClient> Planner for LlmPlanner<C> {
    async fn plan(&self, ctx: &PlanContext<'_>) -> Result<Decision> {
        let prompt = build_prompt(ctx);
        debug!("Prompt length: {} chars", prompt.len());

        let completion = self.client.complete(&prompt).await?;
        let decision = parse_decision(&completion.text)?;

        if let Decision::Act(action) = &decision {
            validate_grounding(action, ctx.snapshot)?;
        }
        Ok(decision)
    }
}

/// Build the per-step planning prompt
///
/// The snapshot and bounded history are re-embedded every step; their caps
/// keep this size-stable across long runs.
pub fn build_prompt(ctx: &PlanContext<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# BRIN BROWSER AGENT - Step {} of {}\n\n",
        ctx.step, ctx.step_budget
    ));

    prompt.push_str("## INSTRUCTION\n\n");
    prompt.push_str(ctx.instruction);
    prompt.push_str("\n\n");

    prompt.push_str("## CURRENT PAGE\n\n");
    prompt.push_str(&format!("URL: {}\n", ctx.snapshot.url));
    prompt.push_str(&format!("Title: {}\n\n", ctx.snapshot.title));

    prompt.push_str("Interactive elements (reference these by id):\n");
    if ctx.snapshot.interactive_elements.is_empty() {
        prompt.push_str("(none observed)\n");
    } else {
        for el in &ctx.snapshot.interactive_elements {
            prompt.push_str(&format!("{}\n", el));
        }
    }
    prompt.push('\n');

    prompt.push_str("Visible text:\n");
    prompt.push_str(&ctx.snapshot.visible_text);
    prompt.push_str("\n\n");

    prompt.push_str("## HISTORY\n\n");
    prompt.push_str(&ctx.history.render_for_prompt());
    prompt.push_str("\n\n");

    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

const RESPONSE_FORMAT: &str = r#"## RESPONSE FORMAT

Reply with EXACTLY ONE JSON object and nothing else. Available actions:

{"action": "navigate", "url": "https://..."}
{"action": "click", "element_id": <id from the element list>}
{"action": "type", "element_id": <id>, "text": "..."}
{"action": "extract", "field": "<name for the data>", "element_id": <id, optional>}
{"action": "select", "element_id": <id>, "value": "..."}
{"action": "scroll", "direction": "up"|"down", "amount": <pixels>}
{"action": "wait", "millis": <milliseconds>}
{"action": "done", "message": "<short summary for the user>"}

Rules:
- element_id MUST be an id from the element list above. Never invent one.
- Use "extract" to record data the instruction asks for, one field per step.
- Reply {"action": "done", ...} once the instruction is fully satisfied.
"#;

/// Parse the model's free-form response into a strict [`Decision`]
pub fn parse_decision(text: &str) -> Result<Decision> {
    let json = extract_json_object(text)
        .ok_or_else(|| BrinError::MalformedPlan("No JSON object in response".to_string()))?;

    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BrinError::MalformedPlan(format!("Invalid JSON: {}", e)))?;

    let tag = value
        .get("action")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BrinError::MalformedPlan("Missing 'action' tag".to_string()))?;

    if tag == "done" {
        let message = value
            .get("message")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        return Ok(Decision::Done { message });
    }

    let action: Action = serde_json::from_value(value)
        .map_err(|e| BrinError::MalformedPlan(format!("Unknown or ill-typed action: {}", e)))?;

    Ok(Decision::Act(action))
}

/// The planner must reference elements the page has actually shown
fn validate_grounding(action: &Action, snapshot: &PageSnapshot) -> Result<()> {
    if let Some(id) = action.element_id() {
        if snapshot.element(id).is_none() {
            return Err(BrinError::MalformedPlan(format!(
                "Action references element #{} which is not in the observed page",
                id
            )));
        }
    }
    Ok(())
}

/// Pull the first balanced JSON object out of the response, stripping any
/// surrounding prose or code fences
fn extract_json_object(text: &str) -> Option<&str> {
    let cleaned = text.trim();
    let start = cleaned.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in cleaned[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&cleaned[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
