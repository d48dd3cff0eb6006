//! The guardian-feedback learning loop: periodically distills operator
//! overrides into natural-language guidance the judge reads on every call.
//!
//! Grounded in `runtime/guardian_learning.py: GuardianLearningLoop` — same
//! fetch-summarize-merge-persist shape, same sentence-level dedup on merge.
//! The summarizer is reached through [`AdvisorBackend`] rather than a
//! judge-shaped contract: the Python original reuses its `ChatOllama` client
//! with a bespoke prompt, which is exactly what `AdvisorBackend` models.

use std::time::Duration;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::capabilities::advisor::AdvisorBackend;
use crate::error::GuardianError;
use crate::models::{Decision, Event};
use crate::store::SqliteStore;

/// How many of the most recent overrides are summarized in one prompt.
const PROMPT_SAMPLE: usize = 15;
/// How many unprocessed overrides are fetched per cycle.
const FETCH_LIMIT: i64 = 100;

const SYSTEM_PROMPT: &str = "You review guardian overrides of a parental-control system. \
Infer likely reasons (maturity, educational purpose, harmless fun, etc.) why a guardian \
corrected decisions. Respond in JSON with keys 'guidance' (short paragraph) and 'patterns' \
(array of short bullet strings).";

/// The persisted shape of the `guardian_feedback` setting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GuardianGuidance {
    pub generated_at: i64,
    pub guidance: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    pub sample_count: usize,
}

/// Raw `{guidance, patterns}` shape the summarizer is asked to emit.
#[derive(Debug, Clone, Deserialize, Default)]
struct RawGuidance {
    #[serde(default)]
    guidance: String,
    #[serde(default)]
    patterns: Vec<String>,
}

/// Object-safe handle so [`crate::runner::MonitorApp`] can hold a learning
/// loop without being generic over its advisor backend.
#[async_trait::async_trait]
pub trait GuardianHandle: Send + Sync {
    async fn refresh_once(&self) -> Result<(), GuardianError>;
}

pub struct GuardianLearningLoop<A: AdvisorBackend> {
    store: SqliteStore,
    advisor: A,
    interval: Duration,
}

#[async_trait::async_trait]
impl<A: AdvisorBackend> GuardianHandle for GuardianLearningLoop<A> {
    async fn refresh_once(&self) -> Result<(), GuardianError> {
        self.process_once().await
    }
}

impl<A: AdvisorBackend> GuardianLearningLoop<A> {
    pub fn new(store: SqliteStore, advisor: A, interval: Duration) -> Self {
        GuardianLearningLoop { store, advisor, interval }
    }

    /// Run forever on the configured interval until `cancel` is signalled.
    /// In-flight work always completes before exit; no work is abandoned
    /// mid-cycle.
    pub async fn run_forever(&self, mut cancel: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(err) = self.process_once().await {
                        tracing::warn!(error = %err, "guardian learning cycle failed; overrides remain unprocessed");
                    }
                }
            }
        }
    }

    /// One learning-loop tick: fetch, summarize, merge, persist, mark
    /// processed. Returns `Ok(())` with nothing done if there were no
    /// unprocessed overrides.
    pub async fn process_once(&self) -> Result<(), GuardianError> {
        let overrides = self.store.fetch_unprocessed_overrides(FETCH_LIMIT).await?;
        if overrides.is_empty() {
            return Ok(());
        }

        let raw = self.infer_guidance(&overrides).await;
        let existing = self.load_existing().await?;
        let (guidance, patterns) = merge_guidance(existing.as_ref(), &raw);

        let payload = GuardianGuidance {
            generated_at: chrono::Utc::now().timestamp(),
            guidance,
            patterns,
            sample_count: overrides.len(),
        };
        let payload_json = serde_json::to_string(&payload)?;
        self.store.set_setting("guardian_feedback", &payload_json).await?;

        let ids: Vec<String> = overrides.iter().map(|(d, _)| d.id.clone()).collect();
        self.store.mark_override_processed(&ids).await?;
        tracing::info!(sample_count = overrides.len(), "updated guardian feedback");
        Ok(())
    }

    async fn load_existing(&self) -> Result<Option<GuardianGuidance>, GuardianError> {
        match self.store.get_setting("guardian_feedback").await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    async fn infer_guidance(&self, overrides: &[(Decision, Event)]) -> RawGuidance {
        let lines: Vec<String> = overrides
            .iter()
            .take(PROMPT_SAMPLE)
            .map(|(decision, event)| {
                let manual = decision.manual_action.clone().unwrap_or_else(|| decision.action.clone());
                format!(
                    "- URL:{} title:{} original:{} manual:{}",
                    event.url.as_deref().unwrap_or(""),
                    event.title.as_deref().unwrap_or(""),
                    decision.original_action,
                    manual,
                )
            })
            .collect();
        let sample = if lines.is_empty() { "No overrides.".to_string() } else { lines.join("\n") };
        let user_prompt = format!(
            "Recent overrides (each line: url/title/original->manual action):\n{sample}\n\n\
             Summarize motivations so the model can improve future moderation."
        );

        match self.advisor.complete(SYSTEM_PROMPT, &user_prompt).await {
            Ok(raw) => serde_json::from_str::<RawGuidance>(raw.trim()).unwrap_or(RawGuidance {
                guidance: raw,
                patterns: Vec::new(),
            }),
            Err(reason) => {
                tracing::warn!(reason, "guardian summarizer call failed");
                RawGuidance {
                    guidance: format!("LLM feedback unavailable: {reason}"),
                    patterns: Vec::new(),
                }
            }
        }
    }
}

/// Split on `.`/`?`/`!` runs, trim, drop empties, and de-duplicate
/// case-insensitively while preserving first-seen order.
fn dedup_sentences(text: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    for part in text.split(['.', '?', '!']) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Merge newly-inferred guidance with whatever was previously stored:
/// sentence-dedup the guidance text, set-union the patterns.
fn merge_guidance(existing: Option<&GuardianGuidance>, new_guidance: &RawGuidance) -> (String, Vec<String>) {
    let existing_guidance = existing.map(|g| g.guidance.as_str()).unwrap_or("");
    let existing_patterns = existing.map(|g| g.patterns.as_slice()).unwrap_or(&[]);

    let existing_sents = dedup_sentences(existing_guidance);
    let new_sents = dedup_sentences(&new_guidance.guidance);

    let mut seen = FxHashSet::default();
    let mut merged_sents = Vec::new();
    for sentence in existing_sents.into_iter().chain(new_sents) {
        let key = sentence.to_lowercase();
        if seen.insert(key) {
            merged_sents.push(sentence);
        }
    }
    let mut merged_guidance = merged_sents.join(". ");
    if !merged_guidance.is_empty() && !merged_guidance.ends_with('.') {
        merged_guidance.push('.');
    }
    if merged_guidance.is_empty() {
        merged_guidance = if !new_guidance.guidance.is_empty() {
            new_guidance.guidance.clone()
        } else {
            existing_guidance.to_string()
        };
    }

    let mut seen_patterns = FxHashSet::default();
    let mut merged_patterns = Vec::new();
    for pattern in existing_patterns.iter().cloned().chain(new_guidance.patterns.iter().cloned()) {
        let key = pattern.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        if seen_patterns.insert(key) {
            merged_patterns.push(pattern.trim().to_string());
        }
    }

    (merged_guidance, merged_patterns)
}
