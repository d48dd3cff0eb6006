//! The planner's advisor capability.
//!
//! A second text-completion contract, distinct from [`crate::capabilities::judge::JudgeBackend`]:
//! the advisor answers "which tool runs next", not "is this harmful". Grounded
//! in `analysis/agents/planner_agent.py`, which reuses the very same chat
//! client as the judge but with a different system prompt and a different
//! response shape (`{next_tool, reason}` instead of a moderation verdict).
//! Kept as a separate trait so the planner can be tested against a stub
//! advisor without pulling in judge-shaped fixtures.

use async_trait::async_trait;

/// A raw chat-completion capability: system prompt in, raw text out. The
/// caller is responsible for prompt construction and response parsing.
#[async_trait]
pub trait AdvisorBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String>;
}
