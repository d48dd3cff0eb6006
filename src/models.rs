//! Persisted and wire data model: `Event`, `ChildProfile`, `Analysis`,
//! `Decision`, and the outward-facing `DecisionMessage`.

use serde::{Deserialize, Serialize};

use crate::types::Strictness;

/// A browsing event as ingested from a child's device.
///
/// `data_json` is opaque to everything except the analyzers; it is replaced
/// wholesale, exactly once, by an [upgrade](crate::runner::MonitorApp::ingest_upgrade)
/// submission that supplies screenshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub child_id: String,
    pub ts: i64,
    pub kind: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub tab_id: Option<String>,
    pub referrer: Option<String>,
    /// Opaque JSON object: `{ dom_sample?, text?, screenshots_b64[]? }`.
    pub data_json: serde_json::Value,
}

impl Event {
    pub fn dom_sample(&self) -> Option<&str> {
        self.data_json.get("dom_sample").and_then(|v| v.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.data_json.get("text").and_then(|v| v.as_str())
    }

    pub fn screenshots_b64(&self) -> Vec<&str> {
        self.data_json
            .get("screenshots_b64")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn domain(&self) -> String {
        let Some(url) = self.url.as_deref() else {
            return String::new();
        };
        url.split("//")
            .next_back()
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("")
            .to_lowercase()
    }
}

/// The wire shape for `ingest`/`ingest_upgrade`: `data_json` travels as an
/// opaque JSON-encoded string, exactly as spec.md §6 describes it, and is
/// parsed into [`Event::data_json`] at the ingestion boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    pub child_id: String,
    pub ts: i64,
    pub kind: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub tab_id: Option<String>,
    pub referrer: Option<String>,
    pub data_json: String,
}

/// A guardian-managed child profile, created lazily on first event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildProfile {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub strictness: Strictness,
    pub age: i32,
}

impl ChildProfile {
    pub fn clamped_age(&self) -> i32 {
        self.age.clamp(3, 18)
    }
}

/// An append-only analysis artifact keyed to one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: String,
    pub event_id: String,
    pub model: String,
    pub version: String,
    pub scores_json: serde_json::Value,
    pub label: Option<String>,
    pub latency_ms: i64,
}

/// The final (possibly overridden) outcome for one event.
///
/// `original_action` is written once at insert time and is never mutated
/// afterward; `action` may diverge from it only through [`Decision::apply_override`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub event_id: String,
    pub policy_version: String,
    pub action: String,
    pub reason: String,
    pub categories: Vec<String>,
    pub original_action: String,
    pub manual_action: Option<String>,
    pub manual_flagged: bool,
    pub manual_processed: bool,
    pub manual_updated_at: Option<i64>,
}

impl Decision {
    /// Construct a freshly policy-produced decision. `original_action` is
    /// captured from `action` here and nowhere else.
    pub fn new(
        id: String,
        event_id: String,
        policy_version: String,
        action: String,
        reason: String,
        categories: Vec<String>,
    ) -> Self {
        Decision {
            id,
            event_id,
            policy_version,
            original_action: action.clone(),
            action,
            reason,
            categories,
            manual_action: None,
            manual_flagged: false,
            manual_processed: false,
            manual_updated_at: None,
        }
    }
}

/// The outward-facing decision message, published on the bus and returned
/// directly from `ingest`/`ingest_upgrade`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionMessage {
    pub decision_id: String,
    pub event_id: String,
    pub action: String,
    pub reason: String,
    pub categories: Vec<String>,
    pub upgrade: bool,
    pub needs_ocr: bool,
    pub confidence: f64,
    pub url: Option<String>,
    pub title: Option<String>,
    pub ts: i64,
    pub child_id: String,
    pub headline_agent: Option<HeadlineAgentSummary>,
    pub manual_flagged: bool,
    pub manual_action: Option<String>,
    pub original_action: String,
}

/// The subset of a headline analysis result carried on a [`DecisionMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlineAgentSummary {
    pub risk: String,
    pub flags: Vec<String>,
    pub confidence: f64,
    pub action: String,
}
