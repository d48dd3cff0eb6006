//! OCR analyzer: a single-shot, at-most-once vision path that re-invokes the
//! URL analyzer once text has been extracted from screenshots.

use crate::analyzers::url::{self, UrlAnalysisResult};
use crate::capabilities::judge::JudgeBackend;
use crate::capabilities::ocr::{self, OcrBackend};
use crate::models::{ChildProfile, Event};
use crate::scorer::FastScores;

const MAX_SCREENSHOTS: usize = 3;

/// What happened when the OCR node ran, driving the caller's `MonitorState`
/// updates (`has_ocr_run`, `needs_screenshot`, `need_ocr`).
#[derive(Debug)]
pub enum OcrOutcome {
    /// OCR already ran for this event; this invocation is a no-op.
    AlreadyRun,
    /// No screenshots were present on the event; caller must resubmit as an
    /// upgrade.
    NeedsScreenshot,
    /// OCR ran but produced no usable text; the planner proceeds without a
    /// re-judge.
    RanNoText,
    /// OCR produced text and the URL analyzer was re-invoked with it. Carries
    /// the extracted text so the caller can accumulate it onto the planner's
    /// running `ocr_text`.
    Rejudged {
        ocr_text: String,
        result: Box<UrlAnalysisResult>,
    },
}

#[allow(clippy::too_many_arguments)]
pub async fn analyze(
    ocr_backend: &dyn OcrBackend,
    judge_backend: &dyn JudgeBackend,
    event: &Event,
    profile: &ChildProfile,
    has_ocr_run: bool,
    fast_scores: Option<FastScores>,
    guidance: Option<String>,
    ocr_confidence_threshold: f64,
) -> (bool, OcrOutcome) {
    if has_ocr_run {
        return (true, OcrOutcome::AlreadyRun);
    }

    let screenshots = event.screenshots_b64();
    if screenshots.is_empty() {
        return (true, OcrOutcome::NeedsScreenshot);
    }

    let ocr_text = ocr::extract_concatenated(ocr_backend, &screenshots, MAX_SCREENSHOTS).await;
    if ocr_text.trim().is_empty() {
        return (true, OcrOutcome::RanNoText);
    }

    let result = url::analyze(
        judge_backend,
        event,
        profile,
        fast_scores,
        Some(&ocr_text),
        guidance,
        ocr_confidence_threshold,
    )
    .await;

    (true, OcrOutcome::Rejudged { ocr_text, result: Box::new(result) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EmptyOcr;

    #[async_trait]
    impl OcrBackend for EmptyOcr {
        async fn extract_text(&self, _screenshot_b64: &str) -> Result<String, String> {
            Ok(String::new())
        }
    }

    struct TextOcr;

    #[async_trait]
    impl OcrBackend for TextOcr {
        async fn extract_text(&self, _screenshot_b64: &str) -> Result<String, String> {
            Ok("some extracted text".into())
        }
    }

    struct AllowJudge;

    #[async_trait]
    impl JudgeBackend for AllowJudge {
        async fn complete(
            &self,
            _request: &crate::capabilities::judge::JudgeRequest,
        ) -> Result<String, String> {
            Ok(r#"{"is_harmful":false,"categories":[],"severity":"low","rationale":"ok","action":"allow","confidence":0.8}"#.into())
        }
    }

    fn event_with_shots(n: usize) -> Event {
        let shots: Vec<String> = (0..n).map(|i| format!("shot{i}")).collect();
        Event {
            id: "e1".into(),
            child_id: "c1".into(),
            ts: 0,
            kind: "navigation".into(),
            url: Some("https://example.com".into()),
            title: Some("t".into()),
            tab_id: None,
            referrer: None,
            data_json: json!({ "screenshots_b64": shots }),
        }
    }

    fn profile() -> ChildProfile {
        ChildProfile {
            id: "c1".into(),
            name: "kid".into(),
            timezone: "UTC".into(),
            strictness: crate::types::Strictness::Standard,
            age: 12,
        }
    }

    #[tokio::test]
    async fn already_run_is_noop() {
        let event = event_with_shots(1);
        let (_, outcome) =
            analyze(&TextOcr, &AllowJudge, &event, &profile(), true, None, None, 0.7).await;
        assert!(matches!(outcome, OcrOutcome::AlreadyRun));
    }

    #[tokio::test]
    async fn no_screenshots_requests_upgrade() {
        let event = event_with_shots(0);
        let (has_run, outcome) =
            analyze(&TextOcr, &AllowJudge, &event, &profile(), false, None, None, 0.7).await;
        assert!(has_run);
        assert!(matches!(outcome, OcrOutcome::NeedsScreenshot));
    }

    #[tokio::test]
    async fn empty_ocr_text_tolerated() {
        let event = event_with_shots(2);
        let (has_run, outcome) =
            analyze(&EmptyOcr, &AllowJudge, &event, &profile(), false, None, None, 0.7).await;
        assert!(has_run);
        assert!(matches!(outcome, OcrOutcome::RanNoText));
    }

    #[tokio::test]
    async fn text_triggers_rejudge() {
        let event = event_with_shots(2);
        let (has_run, outcome) =
            analyze(&TextOcr, &AllowJudge, &event, &profile(), false, None, None, 0.7).await;
        assert!(has_run);
        assert!(matches!(outcome, OcrOutcome::Rejudged { .. }));
    }
}
