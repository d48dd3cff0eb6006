//! The planner: a bounded state machine over [`MonitorState`] that chooses,
//! one step at a time, which analyzer node runs next.
//!
//! The advisor (an LLM used as a planner, not as the judge) is treated as an
//! untrusted oracle — the post-condition rewrites in [`step`] always apply
//! regardless of what it returns, which is what makes termination provable
//! without trusting any particular advisor model.

use async_trait::async_trait;

pub mod advisor_adapter;

pub use advisor_adapter::ChatPlannerAdvisor;

use crate::analyzers::headlines::HeadlineResult;
use crate::capabilities::judge::JudgeOutput;
use crate::graph::NextTool;
use crate::models::{ChildProfile, Event};
use crate::scorer::FastScores;
use crate::types::NodeKind;

/// Planner visits per event never exceed this bound; the fifth visit is
/// forced to `policy` unconditionally.
pub const MAX_LOOPS: u32 = 5;

/// An event's working memory as it moves through the planner loop.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub event: Event,
    pub profile: ChildProfile,
    pub fast_scores: Option<FastScores>,
    pub judge_output: Option<JudgeOutput>,
    pub headline_result: Option<HeadlineResult>,
    pub confidence: f64,
    pub ocr_text: Option<String>,
    pub need_llm: bool,
    pub need_ocr: bool,
    pub needs_screenshot: bool,
    pub has_ocr_run: bool,
    pub is_upgrade: bool,
    pub last_tool_run: Option<NodeKind>,
    pub next_tool: Option<NextTool>,
    pub loop_count: u32,
}

impl MonitorState {
    pub fn new(event: Event, profile: ChildProfile, is_upgrade: bool) -> Self {
        MonitorState {
            event,
            profile,
            fast_scores: None,
            judge_output: None,
            headline_result: None,
            confidence: 0.0,
            ocr_text: None,
            need_llm: true,
            need_ocr: false,
            needs_screenshot: false,
            has_ocr_run: false,
            is_upgrade,
            last_tool_run: None,
            next_tool: None,
            loop_count: 0,
        }
    }
}

/// The advisor's answer for one step.
#[derive(Debug, Clone)]
pub struct AdvisorResponse {
    pub next_tool: NextTool,
    pub reason: String,
}

/// The judge capability re-purposed as a planner advisor. A distinct trait
/// from [`crate::capabilities::judge::JudgeBackend`] even though a real
/// deployment may route both through the same model: the contracts differ
/// (tool choice vs. structured moderation output) and the planner must be
/// able to run against a stub advisor independent of the judge.
#[async_trait]
pub trait PlannerAdvisor: Send + Sync {
    async fn advise(&self, state: &MonitorState) -> Result<AdvisorResponse, String>;
}

/// The outcome of one planner step: where to go next, and why.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub next_tool: NextTool,
    pub reason: String,
}

/// Run exactly one planner step, mutating `state.loop_count` and
/// `state.next_tool` and returning the routing decision.
pub async fn step(advisor: &dyn PlannerAdvisor, state: &mut MonitorState) -> StepOutcome {
    state.loop_count += 1;

    let outcome = if state.loop_count >= MAX_LOOPS {
        StepOutcome {
            next_tool: NextTool::Policy,
            reason: "max_loops_reached".to_string(),
        }
    } else if state.is_upgrade && !state.has_ocr_run {
        StepOutcome {
            next_tool: NextTool::Ocr,
            reason: "upgrade_forces_ocr".to_string(),
        }
    } else {
        match advisor.advise(state).await {
            Ok(response) => StepOutcome {
                next_tool: response.next_tool,
                reason: response.reason,
            },
            Err(reason) => {
                tracing::warn!(reason, "planner advisor failed; falling back to policy");
                StepOutcome {
                    next_tool: NextTool::Policy,
                    reason: "planner_fallback".to_string(),
                }
            }
        }
    };

    let outcome = apply_post_conditions(state, outcome);
    state.next_tool = Some(outcome.next_tool);
    outcome
}

/// Enforced regardless of what the advisor (or the forced-OCR branch)
/// returned:
/// - once OCR has run, a further `ocr` or `headline` request is redundant
///   and is rewritten to `url_llm`.
/// - on an upgrade, a `headline` request is rewritten to `ocr` (if OCR
///   hasn't run yet) or `url_llm` (if it has).
fn apply_post_conditions(state: &MonitorState, outcome: StepOutcome) -> StepOutcome {
    if state.has_ocr_run && matches!(outcome.next_tool, NextTool::Ocr | NextTool::Headline) {
        return StepOutcome {
            next_tool: NextTool::UrlLlm,
            reason: outcome.reason,
        };
    }
    if state.is_upgrade && outcome.next_tool == NextTool::Headline {
        let next_tool = if state.has_ocr_run { NextTool::UrlLlm } else { NextTool::Ocr };
        return StepOutcome { next_tool, reason: outcome.reason };
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Event {
        Event {
            id: "e1".into(),
            child_id: "c1".into(),
            ts: 0,
            kind: "navigation".into(),
            url: Some("https://example.com".into()),
            title: Some("t".into()),
            tab_id: None,
            referrer: None,
            data_json: json!({}),
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

    struct FixedAdvisor(NextTool);

    #[async_trait]
    impl PlannerAdvisor for FixedAdvisor {
        async fn advise(&self, _state: &MonitorState) -> Result<AdvisorResponse, String> {
            Ok(AdvisorResponse {
                next_tool: self.0,
                reason: "test".into(),
            })
        }
    }

    struct FailingAdvisor;

    #[async_trait]
    impl PlannerAdvisor for FailingAdvisor {
        async fn advise(&self, _state: &MonitorState) -> Result<AdvisorResponse, String> {
            Err("backend unavailable".into())
        }
    }

    #[tokio::test]
    async fn fifth_visit_forces_policy() {
        let mut state = MonitorState::new(event(), profile(), false);
        state.loop_count = MAX_LOOPS - 1;
        let outcome = step(&FixedAdvisor(NextTool::Headline), &mut state).await;
        assert_eq!(outcome.next_tool, NextTool::Policy);
        assert_eq!(outcome.reason, "max_loops_reached");
        assert_eq!(state.loop_count, MAX_LOOPS);
    }

    #[tokio::test]
    async fn upgrade_without_ocr_forces_ocr_before_advisor_runs() {
        let mut state = MonitorState::new(event(), profile(), true);
        // advisor would say headline, but the upgrade guard wins
        let outcome = step(&FixedAdvisor(NextTool::Headline), &mut state).await;
        assert_eq!(outcome.next_tool, NextTool::Ocr);
        assert_eq!(outcome.reason, "upgrade_forces_ocr");
    }

    #[tokio::test]
    async fn post_ocr_headline_or_ocr_request_rewritten_to_url_llm() {
        let mut state = MonitorState::new(event(), profile(), false);
        state.has_ocr_run = true;
        let outcome = step(&FixedAdvisor(NextTool::Ocr), &mut state).await;
        assert_eq!(outcome.next_tool, NextTool::UrlLlm);

        let mut state2 = MonitorState::new(event(), profile(), false);
        state2.has_ocr_run = true;
        let outcome2 = step(&FixedAdvisor(NextTool::Headline), &mut state2).await;
        assert_eq!(outcome2.next_tool, NextTool::UrlLlm);
    }

    #[tokio::test]
    async fn upgrade_headline_request_rewritten_to_ocr_then_url_llm() {
        let mut state = MonitorState::new(event(), profile(), true);
        state.has_ocr_run = true; // already ran OCR due to forced first step
        let outcome = step(&FixedAdvisor(NextTool::Headline), &mut state).await;
        assert_eq!(outcome.next_tool, NextTool::UrlLlm);
    }

    #[tokio::test]
    async fn advisor_failure_falls_back_to_policy() {
        let mut state = MonitorState::new(event(), profile(), false);
        state.loop_count = 1; // avoid the max-loops branch
        let outcome = step(&FailingAdvisor, &mut state).await;
        assert_eq!(outcome.next_tool, NextTool::Policy);
        assert_eq!(outcome.reason, "planner_fallback");
    }
}
