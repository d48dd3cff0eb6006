//! Headlines analyzer: cheap, pure triage on domain/title/fast-scores alone.
//! No I/O, no judge call — this is the analyzer the planner runs first and
//! the one whose high-confidence result can short-circuit the URL analyzer.

use serde::{Deserialize, Serialize};

use crate::models::{ChildProfile, Event};
use crate::scorer::{self, FastScores};
use crate::types::Strictness;

const HIGH_RISK_TOKENS: &[&str] = &["porn", "xxx", "casino", "bet", "nsfw", "escort"];
const LOW_RISK_DOMAINS: &[&str] = &["wikipedia.org", "khanacademy.org", ".edu"];

/// Risk bucket assigned by the decision table, not a general-purpose
/// severity — only `high`/`medium`/`low` are produced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    High,
    Medium,
    Low,
}

impl Risk {
    pub fn as_str(self) -> &'static str {
        match self {
            Risk::High => "high",
            Risk::Medium => "medium",
            Risk::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlineResult {
    pub risk: Risk,
    pub flags: Vec<String>,
    pub confidence: f64,
    pub action: String,
    pub fast_scores: FastScores,
}

impl HeadlineResult {
    /// The early-exit gate the URL analyzer checks.
    pub fn is_confident_shortcircuit(&self) -> bool {
        (self.action == "allow" || self.action == "block") && self.confidence >= 0.85
    }
}

fn matched_high_risk_tokens(domain: &str, title: &str) -> Vec<String> {
    let title_lower = title.to_lowercase();
    HIGH_RISK_TOKENS
        .iter()
        .filter(|token| domain.contains(*token) || title_lower.contains(*token))
        .map(|t| t.to_string())
        .collect()
}

fn matches_low_risk_domain(domain: &str) -> bool {
    LOW_RISK_DOMAINS.iter().any(|frag| domain.contains(frag))
}

/// Run the headlines decision table against one event.
pub fn analyze(event: &Event, profile: &ChildProfile) -> HeadlineResult {
    let fast_scores = scorer::analyze_event_fast(event, None);
    let domain = event.domain();
    let title = event.title.clone().unwrap_or_default();
    let high_risk_hits = matched_high_risk_tokens(&domain, &title);

    let (risk, flags, mut confidence, action) = if !high_risk_hits.is_empty()
        || fast_scores.sexual >= 0.9
        || fast_scores.violence >= 0.95
    {
        (Risk::High, vec!["headline_high_risk".to_string()], 0.9, "block".to_string())
    } else if fast_scores.sexual < 0.15
        && fast_scores.violence < 0.2
        && fast_scores.profanity < 0.2
        && matches_low_risk_domain(&domain)
    {
        (Risk::Low, vec!["headline_low_risk".to_string()], 0.88, "allow".to_string())
    } else {
        let risk = if fast_scores.sexual > 0.4 || fast_scores.violence > 0.4 {
            Risk::Medium
        } else {
            Risk::Low
        };
        (risk, vec!["headline_uncertain".to_string()], 0.55, "allow".to_string())
    };

    if profile.strictness == Strictness::Strict {
        confidence = if action == "block" {
            (confidence + 0.05).clamp(0.0, 1.0)
        } else {
            (confidence - 0.05).clamp(0.0, 1.0)
        };
    }

    HeadlineResult {
        risk,
        flags,
        confidence,
        action,
        fast_scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strictness;
    use serde_json::json;

    fn event(url: &str, title: &str, dom_sample: &str) -> Event {
        Event {
            id: "e1".into(),
            child_id: "c1".into(),
            ts: 0,
            kind: "navigation".into(),
            url: Some(url.into()),
            title: Some(title.into()),
            tab_id: None,
            referrer: None,
            data_json: json!({ "dom_sample": dom_sample }),
        }
    }

    fn profile(strictness: Strictness) -> ChildProfile {
        ChildProfile {
            id: "c1".into(),
            name: "kid".into(),
            timezone: "UTC".into(),
            strictness,
            age: 12,
        }
    }

    #[test]
    fn high_risk_token_in_domain_blocks() {
        let e = event("https://pornhub.com/x", "whatever", "");
        let result = analyze(&e, &profile(Strictness::Standard));
        assert_eq!(result.action, "block");
        assert_eq!(result.risk, Risk::High);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn low_risk_domain_allows_with_high_confidence() {
        let e = event("https://en.wikipedia.org/wiki/Cat", "Cat", "an encyclopedia article");
        let result = analyze(&e, &profile(Strictness::Standard));
        assert_eq!(result.action, "allow");
        assert_eq!(result.confidence, 0.88);
        assert!(result.is_confident_shortcircuit());
    }

    #[test]
    fn strict_strictness_adjusts_confidence() {
        let e = event("https://pornhub.com/x", "whatever", "");
        let result = analyze(&e, &profile(Strictness::Strict));
        assert_eq!(result.confidence, 0.95);

        let e2 = event("https://en.wikipedia.org/wiki/Cat", "Cat", "article");
        let result2 = analyze(&e2, &profile(Strictness::Strict));
        assert_eq!(result2.confidence, 0.83);
    }

    #[test]
    fn default_case_is_low_confidence_allow() {
        let e = event("https://example.com/page", "a normal page", "some text");
        let result = analyze(&e, &profile(Strictness::Standard));
        assert_eq!(result.action, "allow");
        assert_eq!(result.confidence, 0.55);
        assert!(!result.is_confident_shortcircuit());
    }
}
