//! Page observer: bounded structural snapshots of the current page
//!
//! One injected script collects the URL, title, visible text and
//! interactive elements, viewport-first. Kept elements are tagged with a
//! `data-brin-id` attribute so later actions can target them by the id the
//! planner saw. The snapshot is re-embedded in every LLM prompt, so both
//! the element count and the text length are capped.

use brin_core::{BrinError, BrowserConfig, ElementDescriptor, PageSnapshot, Result};
use serde::Deserialize;
use tracing::debug;

use crate::session::BrowserSession;

/// Script evaluated in the page to collect an observation
///
/// Sorting is stable, so document order is preserved within the
/// in-viewport and offscreen groups. Tags from any previous observation
/// are cleared before re-tagging, so `data-brin-id` selectors always
/// resolve to the element this snapshot described.
const OBSERVE_JS: &str = r#"
(() => {
    document.querySelectorAll('[data-brin-id]')
        .forEach((el) => el.removeAttribute('data-brin-id'));
    const sel = 'a, button, input, select, textarea, [role="button"], [role="link"], [onclick]';
    const inViewport = (el) => {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0 && r.bottom > 0 && r.right > 0
            && r.top < window.innerHeight && r.left < window.innerWidth;
    };
    const labelOf = (el) => {
        const t = el.getAttribute('aria-label') || el.innerText || el.value
            || el.getAttribute('placeholder') || el.getAttribute('name') || '';
        return t.replace(/\s+/g, ' ').trim().slice(0, 80);
    };
    const roleOf = (el) => el.getAttribute('role') || el.tagName.toLowerCase();
    const ranked = Array.from(document.querySelectorAll(sel))
        .map((el) => ({ el, vis: inViewport(el) }));
    ranked.sort((a, b) => (b.vis ? 1 : 0) - (a.vis ? 1 : 0));
    const elements = ranked.slice(0, __MAX_ELEMENTS__).map((entry, i) => {
        entry.el.setAttribute('data-brin-id', String(i));
        return { id: i, role: roleOf(entry.el), label: labelOf(entry.el), in_viewport: entry.vis };
    });
    const text = document.body ? document.body.innerText : '';
    return JSON.stringify({ url: location.href, title: document.title, text, elements });
})()
"#;

#[derive(Debug, Deserialize)]
struct RawObservation {
    url: String,
    title: String,
    text: String,
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    id: usize,
    role: String,
    label: String,
    in_viewport: bool,
}

/// Captures deterministic, size-bounded page snapshots
#[derive(Debug, Clone)]
pub struct PageObserver {
    max_elements: usize,
    max_text_chars: usize,
}

impl PageObserver {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            max_elements: config.max_elements,
            max_text_chars: config.max_text_chars,
        }
    }

    /// Capture a snapshot of the session's current page
    pub fn observe(&self, session: &BrowserSession) -> Result<PageSnapshot> {
        let script = OBSERVE_JS.replace("__MAX_ELEMENTS__", &self.max_elements.to_string());
        let value = session.evaluate_script(&script)?;

        let raw = value
            .as_str()
            .ok_or_else(|| BrinError::Browser("Observation script returned no value".into()))?;

        let snapshot = self.snapshot_from_json(raw)?;
        debug!(
            "Observed {} ({} elements, {} text chars)",
            snapshot.url,
            snapshot.interactive_elements.len(),
            snapshot.visible_text.len()
        );
        Ok(snapshot)
    }

    /// Build a bounded snapshot from the raw observation JSON
    fn snapshot_from_json(&self, raw: &str) -> Result<PageSnapshot> {
        let observation: RawObservation = serde_json::from_str(raw)
            .map_err(|e| BrinError::Browser(format!("Malformed observation: {}", e)))?;

        let (visible_text, truncated) = truncate_text(&observation.text, self.max_text_chars);

        Ok(PageSnapshot {
            url: observation.url,
            title: observation.title,
            visible_text,
            truncated,
            interactive_elements: observation
                .elements
                .into_iter()
                .take(self.max_elements)
                .map(|e| ElementDescriptor {
                    id: e.id,
                    role: e.role,
                    label: e.label,
                    in_viewport: e.in_viewport,
                })
                .collect(),
        })
    }
}

/// Truncate text at a character cap, with an explicit marker when cut
fn truncate_text(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("\n[truncated]");
    (cut, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer() -> PageObserver {
        PageObserver {
            max_elements: 3,
            max_text_chars: 10,
        }
    }

    #[test]
    fn test_observe_script_clears_stale_tags_before_retagging() {
        // A re-observation must not leave two elements carrying the same
        // id; the clear pass has to run before any tag is assigned
        let clear = OBSERVE_JS
            .find("removeAttribute('data-brin-id')")
            .expect("script clears previous tags");
        let tag = OBSERVE_JS
            .find("setAttribute('data-brin-id'")
            .expect("script assigns tags");
        assert!(clear < tag);
    }

    #[test]
    fn test_truncate_text_short_is_untouched() {
        let (text, truncated) = truncate_text("hello", 10);
        assert_eq!(text, "hello");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_text_marks_cut() {
        let (text, truncated) = truncate_text("hello world, this is long", 11);
        assert!(truncated);
        assert!(text.ends_with("[truncated]"));
        assert!(text.starts_with("hello world"));
    }

    #[test]
    fn test_snapshot_from_json_caps_elements() {
        let raw = serde_json::json!({
            "url": "https://example.com",
            "title": "Example",
            "text": "short",
            "elements": [
                {"id": 0, "role": "link", "label": "Home", "in_viewport": true},
                {"id": 1, "role": "button", "label": "Go", "in_viewport": true},
                {"id": 2, "role": "input", "label": "Search", "in_viewport": false},
                {"id": 3, "role": "link", "label": "Extra", "in_viewport": false}
            ]
        })
        .to_string();

        let snapshot = observer().snapshot_from_json(&raw).unwrap();
        assert_eq!(snapshot.interactive_elements.len(), 3);
        assert_eq!(snapshot.url, "https://example.com");
        assert!(!snapshot.truncated);
    }

    #[test]
    fn test_snapshot_from_json_truncates_text() {
        let raw = serde_json::json!({
            "url": "https://example.com",
            "title": "Example",
            "text": "a very long body text that exceeds the cap",
            "elements": []
        })
        .to_string();

        let snapshot = observer().snapshot_from_json(&raw).unwrap();
        assert!(snapshot.truncated);
        assert!(snapshot.visible_text.contains("[truncated]"));
    }

    #[test]
    fn test_snapshot_from_json_rejects_garbage() {
        assert!(observer().snapshot_from_json("not json").is_err());
    }
}
