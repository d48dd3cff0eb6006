//! Small enums shared across the crate: actions, strictness, categories, and
//! the planner's node identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five-way decision surface a [`crate::policy::PolicyEngine`] narrows
/// everything down to. Upstream components (judge, analyzers) may use a
/// wider vocabulary (`warn`, `notify`) that flows through `Decision` as-is;
/// `Action` is the policy engine's own output type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Warn,
    Blur,
    Block,
    Notify,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Allow => "allow",
            Action::Warn => "warn",
            Action::Blur => "blur",
            Action::Block => "block",
            Action::Notify => "notify",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Action::Allow),
            "warn" => Ok(Action::Warn),
            "blur" => Ok(Action::Blur),
            "block" => Ok(Action::Block),
            "notify" => Ok(Action::Notify),
            _ => Err(()),
        }
    }
}

/// A guardian's configured strictness for a child profile. Affects both the
/// headline analyzer's confidence nudges and the policy engine's block
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Lenient,
    #[default]
    Standard,
    Strict,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strictness::Lenient => "lenient",
            Strictness::Standard => "standard",
            Strictness::Strict => "strict",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Strictness {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lenient" => Ok(Strictness::Lenient),
            "standard" => Ok(Strictness::Standard),
            "strict" => Ok(Strictness::Strict),
            _ => Err(()),
        }
    }
}

/// Fast scorer category, also doubling as a judge/decision content category
/// label in a few call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Violence,
    Sexual,
    Profanity,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Violence => "violence",
            Category::Sexual => "sexual",
            Category::Profanity => "profanity",
        };
        f.write_str(s)
    }
}

/// A node in the fixed five-node planner graph. `encode`/`decode` mirror the
/// string-oriented round trip used for persistence and advisor I/O, where
/// tool choices travel as plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Planner,
    Headline,
    UrlLlm,
    Ocr,
    Policy,
}

impl NodeKind {
    pub fn encode(self) -> &'static str {
        match self {
            NodeKind::Planner => "planner",
            NodeKind::Headline => "headline",
            NodeKind::UrlLlm => "url_llm",
            NodeKind::Ocr => "ocr",
            NodeKind::Policy => "policy",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "planner" => Some(NodeKind::Planner),
            "headline" => Some(NodeKind::Headline),
            "url_llm" => Some(NodeKind::UrlLlm),
            "ocr" => Some(NodeKind::Ocr),
            "policy" => Some(NodeKind::Policy),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}
