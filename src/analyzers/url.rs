//! URL analyzer: aggregates text signals and invokes the judge.
//!
//! A confident headline result (see [`crate::analyzers::headlines`]) can
//! short-circuit this analyzer entirely — [`synthesize_from_headline`]
//! builds a judge-shaped object without ever calling the judge backend.

use crate::analyzers::headlines::HeadlineResult;
use crate::capabilities::judge::{self, JudgeBackend, JudgeOutput, JudgeRequest};
use crate::models::{ChildProfile, Event};
use crate::scorer::{self, FastScores};
use crate::types::Strictness;

/// Aggregation cap named explicitly in the component contract.
const TEXT_SAMPLE_CAP: usize = 2000;

#[derive(Debug, Clone)]
pub struct UrlAnalysisResult {
    pub fast_scores: FastScores,
    pub judge_output: JudgeOutput,
    pub confidence: f64,
    /// Set when the judge output is ambiguous enough to warrant an OCR pass:
    /// action in {warn, blur, notify}, severity in {medium, high}, or
    /// confidence below the configured OCR threshold.
    pub need_ocr: bool,
}

fn aggregate_text(dom_sample: Option<&str>, text: Option<&str>, extra_text: Option<&str>) -> String {
    let joined = [dom_sample, text, extra_text]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = joined.trim();
    if trimmed.chars().count() <= TEXT_SAMPLE_CAP {
        trimmed.to_string()
    } else {
        trimmed.chars().take(TEXT_SAMPLE_CAP).collect()
    }
}

fn is_uncertain(output: &JudgeOutput, confidence: f64, ocr_confidence_threshold: f64) -> bool {
    matches!(output.action.as_str(), "warn" | "blur" | "notify")
        || matches!(output.severity.as_str(), "medium" | "high")
        || confidence < ocr_confidence_threshold
}

/// Build a judge-shaped object from a confident headline result instead of
/// calling the judge. Severity is a literal constant by action, not
/// inferred from the underlying scores: `medium` for a synthesized block,
/// `low` for a synthesized allow.
pub fn synthesize_from_headline(headline: &HeadlineResult) -> JudgeOutput {
    let severity = if headline.action == "block" { "medium" } else { "low" };
    JudgeOutput {
        is_harmful: headline.action == "block",
        categories: Vec::new(),
        severity: severity.to_string(),
        rationale: "headline short-circuit".to_string(),
        action: headline.action.clone(),
        confidence: headline.confidence,
    }
}

/// Run the full URL analyzer: aggregate text, call the judge, clamp
/// confidence, and decide whether OCR should follow.
pub async fn analyze(
    backend: &dyn JudgeBackend,
    event: &Event,
    profile: &ChildProfile,
    precomputed_fast_scores: Option<FastScores>,
    extra_text: Option<&str>,
    guidance: Option<String>,
    ocr_confidence_threshold: f64,
) -> UrlAnalysisResult {
    let fast_scores =
        precomputed_fast_scores.unwrap_or_else(|| scorer::analyze_event_fast(event, extra_text));

    let text_sample = aggregate_text(event.dom_sample(), event.text(), extra_text);
    let age = profile.clamped_age().clamp(3, 18);
    let strictness: Strictness = profile.strictness;

    let request = JudgeRequest {
        title: event.title.clone(),
        domain: event.domain(),
        fast_scores,
        text_sample,
        age,
        strictness,
        guidance,
    };

    let judge_output = judge::judge(backend, &request).await;
    let confidence = judge_output.confidence.clamp(0.0, 1.0);
    let need_ocr = is_uncertain(&judge_output, confidence, ocr_confidence_threshold);

    UrlAnalysisResult {
        fast_scores,
        judge_output,
        confidence,
        need_ocr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::headlines::Risk;

    #[test]
    fn synthesized_block_gets_medium_severity_regardless_of_scores() {
        let headline = HeadlineResult {
            risk: Risk::High,
            flags: vec!["porn".into()],
            confidence: 0.9,
            action: "block".to_string(),
            fast_scores: FastScores {
                violence: 0.0,
                sexual: 0.0,
                profanity: 0.0,
            },
        };
        let synthesized = synthesize_from_headline(&headline);
        assert_eq!(synthesized.severity, "medium");
        assert_eq!(synthesized.action, "block");
    }

    #[test]
    fn synthesized_allow_gets_low_severity() {
        let headline = HeadlineResult {
            risk: Risk::Low,
            flags: vec![],
            confidence: 0.88,
            action: "allow".to_string(),
            fast_scores: FastScores {
                violence: 0.0,
                sexual: 0.0,
                profanity: 0.0,
            },
        };
        let synthesized = synthesize_from_headline(&headline);
        assert_eq!(synthesized.severity, "low");
    }

    #[test]
    fn text_sample_is_capped_and_joined_with_newlines() {
        let long = "x".repeat(3000);
        let aggregated = aggregate_text(Some(&long), Some("extra"), None);
        assert_eq!(aggregated.chars().count(), TEXT_SAMPLE_CAP);
    }

    #[test]
    fn uncertain_when_action_is_warn() {
        let out = JudgeOutput {
            is_harmful: true,
            categories: vec![],
            severity: "low".into(),
            rationale: "x".into(),
            action: "warn".into(),
            confidence: 0.95,
        };
        assert!(is_uncertain(&out, 0.95, 0.7));
    }

    #[test]
    fn uncertain_when_confidence_below_threshold() {
        let out = JudgeOutput {
            is_harmful: false,
            categories: vec![],
            severity: "low".into(),
            rationale: "x".into(),
            action: "allow".into(),
            confidence: 0.5,
        };
        assert!(is_uncertain(&out, 0.5, 0.7));
    }
}
