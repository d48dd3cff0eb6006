//! The Judge capability: an abstract, structured generative classifier.
//!
//! The concrete backend (which model, which runtime, which prompt template)
//! is an external collaborator and deliberately unconstrained here — only
//! the contract and its fallback behavior live in this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::scorer::FastScores;
use crate::types::Strictness;

/// Everything the judge needs to classify one page/text sample.
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub title: Option<String>,
    pub domain: String,
    pub fast_scores: FastScores,
    /// Already capped to 2,000 characters by the caller.
    pub text_sample: String,
    pub age: i32,
    pub strictness: Strictness,
    /// Guardian guidance, cached by value from the settings store.
    pub guidance: Option<String>,
}

/// The judge's structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutput {
    pub is_harmful: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    pub severity: String,
    pub rationale: String,
    pub action: String,
    pub confidence: f64,
}

impl JudgeOutput {
    /// The call itself failed (timeout, connection refused, backend error).
    /// Treated as non-harmful rather than as a reason to escalate.
    pub fn call_failed_fallback() -> Self {
        JudgeOutput {
            is_harmful: false,
            categories: Vec::new(),
            severity: "low".into(),
            rationale: "judge call failed".into(),
            action: "allow".into(),
            confidence: 0.0,
        }
    }

    /// The call succeeded but the response could not be parsed as a
    /// structured object even after attempting to extract a balanced JSON
    /// object from the raw text. Treated conservatively.
    pub fn parse_failed_fallback() -> Self {
        JudgeOutput {
            is_harmful: true,
            categories: vec!["model_refusal".into()],
            severity: "medium".into(),
            rationale: "response could not be parsed".into(),
            action: "block".into(),
            confidence: 0.2,
        }
    }

    pub fn clamp_confidence(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// The underlying text-completion capability. Implementations talk to
/// whatever LLM runtime is deployed; this crate only calls through the
/// trait and never assumes a particular backend.
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    async fn complete(&self, request: &JudgeRequest) -> Result<String, String>;
}

/// Call the backend and resolve to a [`JudgeOutput`], applying the fallback
/// ladder described in the contract: call failure first, then the
/// balanced-JSON-extraction retry, then the parse-failure fallback.
pub async fn judge(backend: &dyn JudgeBackend, request: &JudgeRequest) -> JudgeOutput {
    let raw = match backend.complete(request).await {
        Ok(raw) => raw,
        Err(reason) => {
            tracing::warn!(reason, "judge call failed");
            return JudgeOutput::call_failed_fallback();
        }
    };

    parse_judge_output(&raw)
}

/// Parse a judge response, retrying with balanced-JSON extraction before
/// giving up.
pub fn parse_judge_output(raw: &str) -> JudgeOutput {
    if let Ok(parsed) = serde_json::from_str::<JudgeOutput>(raw) {
        return parsed.clamp_confidence();
    }

    if let Some(candidate) = extract_first_json_object(raw) {
        if let Ok(parsed) = serde_json::from_str::<JudgeOutput>(&candidate) {
            return parsed.clamp_confidence();
        }
    }

    tracing::warn!(raw, "judge response failed to parse; using conservative fallback");
    JudgeOutput::parse_failed_fallback()
}

/// Extract the first balanced `{...}` substring, tolerating leading or
/// trailing prose around the JSON object (a common failure mode for
/// chat-tuned models asked to emit strict JSON).
pub(crate) fn extract_first_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(raw[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    #[async_trait]
    impl JudgeBackend for FailingBackend {
        async fn complete(&self, _request: &JudgeRequest) -> Result<String, String> {
            Err("connection refused".into())
        }
    }

    struct PrefixedJsonBackend;

    #[async_trait]
    impl JudgeBackend for PrefixedJsonBackend {
        async fn complete(&self, _request: &JudgeRequest) -> Result<String, String> {
            Ok(r#"Sure thing! {"is_harmful":false,"categories":[],"severity":"low","rationale":"fine","action":"allow","confidence":0.9} Hope that helps."#.into())
        }
    }

    fn sample_request() -> JudgeRequest {
        JudgeRequest {
            title: Some("t".into()),
            domain: "example.com".into(),
            fast_scores: FastScores {
                violence: 0.0,
                sexual: 0.0,
                profanity: 0.0,
            },
            text_sample: String::new(),
            age: 12,
            strictness: Strictness::Standard,
            guidance: None,
        }
    }

    #[tokio::test]
    async fn call_failure_yields_allow_zero_confidence() {
        let out = judge(&FailingBackend, &sample_request()).await;
        assert_eq!(out.action, "allow");
        assert_eq!(out.confidence, 0.0);
    }

    #[tokio::test]
    async fn prefixed_json_is_extracted() {
        let out = judge(&PrefixedJsonBackend, &sample_request()).await;
        assert_eq!(out.action, "allow");
        assert_eq!(out.confidence, 0.9);
    }

    #[test]
    fn garbage_yields_parse_failed_fallback() {
        let out = parse_judge_output("not json at all");
        assert_eq!(out.action, "block");
        assert_eq!(out.categories, vec!["model_refusal".to_string()]);
    }
}
