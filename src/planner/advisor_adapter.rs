//! Adapts a raw [`AdvisorBackend`] chat completion into the planner's
//! [`PlannerAdvisor`] contract.
//!
//! Grounded in `analysis/agents/planner_agent.py`: same system prompt shape
//! (describe the five nodes and the current state, ask for `{next_tool,
//! reason}`), same fall back to `policy` on an unparseable or malformed
//! response rather than surfacing the parse error up through [`step`].

use async_trait::async_trait;

use crate::capabilities::advisor::AdvisorBackend;
use crate::capabilities::judge::extract_first_json_object;
use crate::graph::NextTool;
use crate::planner::{AdvisorResponse, MonitorState, PlannerAdvisor};

const SYSTEM_PROMPT: &str = "You are the planning node of a content-safety pipeline. Given the \
current analysis state, choose exactly one next tool: 'headline', 'url_llm', 'ocr', or 'policy'. \
Respond as JSON: {\"next_tool\": <tool>, \"reason\": <short string>}. Prefer 'policy' once enough \
signal has been gathered; never repeat a tool that has already run on this event.";

/// Wraps any [`AdvisorBackend`] as a [`PlannerAdvisor`].
pub struct ChatPlannerAdvisor<B: AdvisorBackend> {
    backend: B,
}

impl<B: AdvisorBackend> ChatPlannerAdvisor<B> {
    pub fn new(backend: B) -> Self {
        ChatPlannerAdvisor { backend }
    }
}

#[async_trait]
impl<B: AdvisorBackend> PlannerAdvisor for ChatPlannerAdvisor<B> {
    async fn advise(&self, state: &MonitorState) -> Result<AdvisorResponse, String> {
        let prompt = build_user_prompt(state);
        let raw = self.backend.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_advisor_response(&raw)
    }
}

fn build_user_prompt(state: &MonitorState) -> String {
    format!(
        "url={:?} title={:?} has_ocr_run={} needs_screenshot={} is_upgrade={} loop_count={} \
         fast_scores_present={} judge_output_present={} headline_present={}",
        state.event.url,
        state.event.title,
        state.has_ocr_run,
        state.needs_screenshot,
        state.is_upgrade,
        state.loop_count,
        state.fast_scores.is_some(),
        state.judge_output.is_some(),
        state.headline_result.is_some(),
    )
}

/// Pull the first balanced JSON object out of `raw` (models routinely wrap
/// answers in prose or code fences) and decode `{next_tool, reason}`.
fn parse_advisor_response(raw: &str) -> Result<AdvisorResponse, String> {
    let object = extract_first_json_object(raw).ok_or_else(|| "no JSON object in advisor reply".to_string())?;
    let parsed: serde_json::Value =
        serde_json::from_str(&object).map_err(|err| format!("advisor reply is not valid JSON: {err}"))?;

    let next_tool_str = parsed
        .get("next_tool")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "advisor reply missing next_tool".to_string())?;
    let next_tool = NextTool::decode(next_tool_str)
        .ok_or_else(|| format!("advisor returned unknown next_tool: {next_tool_str}"))?;
    let reason = parsed
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("advisor_choice")
        .to_string();

    Ok(AdvisorResponse { next_tool, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let resp = parse_advisor_response(r#"{"next_tool":"url_llm","reason":"need more signal"}"#).unwrap();
        assert_eq!(resp.next_tool, NextTool::UrlLlm);
        assert_eq!(resp.reason, "need more signal");
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let resp = parse_advisor_response(
            "Sure, here's my choice:\n```json\n{\"next_tool\": \"policy\", \"reason\": \"enough signal\"}\n```",
        )
        .unwrap();
        assert_eq!(resp.next_tool, NextTool::Policy);
    }

    #[test]
    fn missing_next_tool_is_an_error() {
        let err = parse_advisor_response(r#"{"reason":"no tool given"}"#).unwrap_err();
        assert!(err.contains("missing next_tool"));
    }

    #[test]
    fn unknown_next_tool_is_an_error() {
        let err = parse_advisor_response(r#"{"next_tool":"teleport","reason":"?"}"#).unwrap_err();
        assert!(err.contains("unknown next_tool"));
    }

    #[test]
    fn non_json_reply_is_an_error() {
        let err = parse_advisor_response("I have no idea what to do").unwrap_err();
        assert!(err.contains("no JSON object"));
    }
}
