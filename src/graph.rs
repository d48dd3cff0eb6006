//! The fixed five-node planner graph: one start edge into `planner`, a
//! conditional edge out of it into the three analyzer layers or policy, and
//! an edge from every analyzer layer back into `planner`. `policy` is the
//! only terminal node.
//!
//! Unlike a general-purpose compiled graph, this shape never changes at
//! runtime, so the routing table is a plain function rather than a
//! generic edge-predicate registry.

use serde::{Deserialize, Serialize};

use crate::types::NodeKind;

/// The advisor's (or a forced override's) choice of what runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextTool {
    Headline,
    UrlLlm,
    Ocr,
    Policy,
    Stop,
}

impl NextTool {
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "headline" => Some(NextTool::Headline),
            "url_llm" => Some(NextTool::UrlLlm),
            "ocr" => Some(NextTool::Ocr),
            "policy" => Some(NextTool::Policy),
            "stop" => Some(NextTool::Stop),
            _ => None,
        }
    }

    pub fn encode(self) -> &'static str {
        match self {
            NextTool::Headline => "headline",
            NextTool::UrlLlm => "url_llm",
            NextTool::Ocr => "ocr",
            NextTool::Policy => "policy",
            NextTool::Stop => "stop",
        }
    }
}

/// Where the conditional edge out of `planner` sends control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Node(NodeKind),
    Terminal,
}

/// `{headline→headline_layer, url_llm→url_layer, ocr→ocr_layer,
/// policy→policy_layer, stop→terminal}`, exactly as named in the planner
/// graph description.
pub fn route_for(next_tool: NextTool) -> Route {
    match next_tool {
        NextTool::Headline => Route::Node(NodeKind::Headline),
        NextTool::UrlLlm => Route::Node(NodeKind::UrlLlm),
        NextTool::Ocr => Route::Node(NodeKind::Ocr),
        NextTool::Policy => Route::Node(NodeKind::Policy),
        NextTool::Stop => Route::Terminal,
    }
}

/// Every analyzer node returns control to `planner`; `policy` is terminal.
pub fn is_terminal(node: NodeKind) -> bool {
    matches!(node, NodeKind::Policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_table_matches_named_mapping() {
        assert_eq!(route_for(NextTool::Headline), Route::Node(NodeKind::Headline));
        assert_eq!(route_for(NextTool::UrlLlm), Route::Node(NodeKind::UrlLlm));
        assert_eq!(route_for(NextTool::Ocr), Route::Node(NodeKind::Ocr));
        assert_eq!(route_for(NextTool::Policy), Route::Node(NodeKind::Policy));
        assert_eq!(route_for(NextTool::Stop), Route::Terminal);
    }

    #[test]
    fn only_policy_is_terminal() {
        assert!(is_terminal(NodeKind::Policy));
        assert!(!is_terminal(NodeKind::Headline));
        assert!(!is_terminal(NodeKind::UrlLlm));
        assert!(!is_terminal(NodeKind::Ocr));
        assert!(!is_terminal(NodeKind::Planner));
    }
}
