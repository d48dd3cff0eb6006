//! The deterministic policy engine: the single place that turns signals,
//! schedule, and profile into a final five-way action. Every step is pure
//! and ordered — first match wins.

use chrono::{Datelike, NaiveDateTime, NaiveTime};

use crate::analyzers::headlines::{HeadlineResult, Risk};
use crate::capabilities::judge::JudgeOutput;
use crate::models::{ChildProfile, Event};
use crate::scorer::FastScores;
use crate::types::{Action, Strictness};

const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

fn block_threshold_for(strictness: Strictness) -> f64 {
    match strictness {
        Strictness::Lenient => 0.95,
        Strictness::Standard => 0.9,
        Strictness::Strict => 0.8,
    }
}

/// Configuration the policy engine evaluates against: domain lists, the
/// quiet-hours schedule, and the policy version stamped onto every decision.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    pub policy_version: String,
    pub allow_domains: Vec<String>,
    pub block_domains: Vec<String>,
    /// Weekday abbreviations the quiet window is active on, e.g. `["Mon", "Tue"]`.
    pub sched_days: Vec<String>,
    /// `"HH:MM-HH:MM"`, may wrap midnight (start > end).
    pub sched_quiet: String,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        PolicyEngine {
            policy_version: "1.0.0".to_string(),
            allow_domains: vec![
                "wikipedia.org".to_string(),
                "khanacademy.org".to_string(),
                ".edu".to_string(),
            ],
            block_domains: vec![
                "pornhub.com".to_string(),
                "xvideos.com".to_string(),
                "redtube.com".to_string(),
            ],
            sched_days: vec!["Mon", "Tue", "Wed", "Thu"].into_iter().map(String::from).collect(),
            sched_quiet: "21:00-07:00".to_string(),
        }
    }
}

/// Everything the decision table needs, gathered by the caller (the policy
/// node in the planner graph).
pub struct PolicyInput<'a> {
    pub event: &'a Event,
    pub fast_scores: FastScores,
    pub judge_output: Option<&'a JudgeOutput>,
    pub profile: &'a ChildProfile,
    pub headline_result: Option<&'a HeadlineResult>,
    /// `paused_until` setting, epoch-ms, if set.
    pub paused_until_ms: Option<i64>,
    pub now_ms: i64,
    /// Current local time (already converted by the caller; the engine
    /// itself does no timezone math).
    pub now_local: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutput {
    pub action: Action,
    pub reason: String,
    pub categories: Vec<String>,
}

fn parse_time_range(spec: &str) -> Option<(NaiveTime, NaiveTime)> {
    let (start, end) = spec.split_once('-')?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    Some((start, end))
}

fn in_quiet_hours(now_local: NaiveDateTime, sched_days: &[String], sched_quiet: &str) -> bool {
    let weekday_name = WEEKDAY_NAMES[now_local.weekday().num_days_from_monday() as usize];
    if !sched_days.iter().any(|d| d == weekday_name) {
        return false;
    }
    let Some((start, end)) = parse_time_range(sched_quiet) else {
        return false;
    };
    let t = now_local.time();
    if start <= end {
        start <= t && t <= end
    } else {
        // wraps midnight: window is [start, 24:00) U [00:00, end]
        !(end < t && t < start)
    }
}

impl PolicyEngine {
    pub fn decide(&self, input: &PolicyInput<'_>) -> PolicyOutput {
        let domain = input.event.domain();

        // 1. Pause
        if let Some(paused_until) = input.paused_until_ms {
            if paused_until > input.now_ms {
                return PolicyOutput {
                    action: Action::Allow,
                    reason: "paused".to_string(),
                    categories: Vec::new(),
                };
            }
        }

        // 2. Schedule (quiet hours), unless the domain is allowlisted
        let domain_allowlisted = self.allow_domains.iter().any(|a| domain.contains(a.as_str()));
        if !domain_allowlisted && in_quiet_hours(input.now_local, &self.sched_days, &self.sched_quiet) {
            return PolicyOutput {
                action: Action::Block,
                reason: "schedule quiet hours".to_string(),
                categories: vec!["schedule".to_string()],
            };
        }

        // 3. Allowlist
        if let Some(fragment) = self.allow_domains.iter().find(|a| domain.contains(a.as_str())) {
            return PolicyOutput {
                action: Action::Allow,
                reason: format!("allowlist {fragment}"),
                categories: Vec::new(),
            };
        }

        // 4. Blocklist
        if let Some(fragment) = self.block_domains.iter().find(|b| domain.contains(b.as_str())) {
            return PolicyOutput {
                action: Action::Block,
                reason: format!("blocklist {fragment}"),
                categories: vec!["adult".to_string()],
            };
        }

        // 5. Threshold
        let threshold = block_threshold_for(input.profile.strictness);
        let exceeding = input.fast_scores.categories_at_or_above(threshold);
        if !exceeding.is_empty() {
            return PolicyOutput {
                action: Action::Block,
                reason: "prefilter high".to_string(),
                categories: exceeding.into_iter().map(|c| c.to_string()).collect(),
            };
        }

        // 6. Headline risk
        if let Some(headline) = input.headline_result {
            if headline.risk == Risk::High {
                return PolicyOutput {
                    action: Action::Block,
                    reason: "headline risk high".to_string(),
                    categories: vec!["headline".to_string()],
                };
            }
        }

        // 7. Judge
        if let Some(judge) = input.judge_output {
            let action = match judge.action.as_str() {
                "allow" => Action::Allow,
                "block" => Action::Block,
                _ => Action::Block, // coerced per the open-question resolution
            };
            return PolicyOutput {
                action,
                reason: format!("llm:{}", judge.severity),
                categories: judge.categories.clone(),
            };
        }

        // 8. Default
        PolicyOutput {
            action: Action::Allow,
            reason: "default allow".to_string(),
            categories: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn event(url: &str) -> Event {
        Event {
            id: "e1".into(),
            child_id: "c1".into(),
            ts: 0,
            kind: "navigation".into(),
            url: Some(url.into()),
            title: Some("t".into()),
            tab_id: None,
            referrer: None,
            data_json: json!({}),
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

    fn base_input<'a>(event: &'a Event, profile: &'a ChildProfile, now_local: NaiveDateTime) -> PolicyInput<'a> {
        PolicyInput {
            event,
            fast_scores: FastScores {
                violence: 0.0,
                sexual: 0.0,
                profanity: 0.0,
            },
            judge_output: None,
            profile,
            headline_result: None,
            paused_until_ms: None,
            now_ms: 0,
            now_local,
        }
    }

    #[test]
    fn pornhub_is_blocked_by_blocklist() {
        let e = event("https://pornhub.com/x");
        let p = profile(Strictness::Standard);
        let now = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let out = PolicyEngine::default().decide(&base_input(&e, &p, now));
        assert_eq!(out.action, Action::Block);
        assert_eq!(out.reason, "blocklist pornhub.com");
        assert_eq!(out.categories, vec!["adult".to_string()]);
    }

    #[test]
    fn wikipedia_allowed_despite_quiet_hours() {
        let e = event("https://en.wikipedia.org/wiki/Cat");
        let p = profile(Strictness::Standard);
        // Wednesday 23:00, within default Mon-Thu 21:00-07:00 quiet window.
        let now = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap().and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(now.weekday().to_string(), "Wed");
        let out = PolicyEngine::default().decide(&base_input(&e, &p, now));
        assert_eq!(out.action, Action::Allow);
    }

    #[test]
    fn high_sexual_score_blocks_over_standard_threshold() {
        let e = event("https://example.com/page");
        let p = profile(Strictness::Standard);
        let now = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let mut input = base_input(&e, &p, now);
        input.fast_scores.sexual = 0.96;
        let out = PolicyEngine::default().decide(&input);
        assert_eq!(out.action, Action::Block);
        assert_eq!(out.reason, "prefilter high");
        assert_eq!(out.categories, vec!["sexual".to_string()]);
    }

    #[test]
    fn quiet_hours_wrap_midnight() {
        let e = event("https://example.com/page");
        let p = profile(Strictness::Standard);
        // 03:00 Wednesday, inside 21:00-07:00 wrapped window.
        let now = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap().and_hms_opt(3, 0, 0).unwrap();
        let out = PolicyEngine::default().decide(&base_input(&e, &p, now));
        assert_eq!(out.action, Action::Block);
        assert_eq!(out.reason, "schedule quiet hours");
    }

    #[test]
    fn pause_wins_over_blocklist() {
        let e = event("https://pornhub.com/x");
        let p = profile(Strictness::Standard);
        let now = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let mut input = base_input(&e, &p, now);
        input.paused_until_ms = Some(i64::MAX);
        input.now_ms = 0;
        let out = PolicyEngine::default().decide(&input);
        assert_eq!(out.action, Action::Allow);
        assert_eq!(out.reason, "paused");
    }

    #[test]
    fn judge_non_allow_block_action_is_coerced_to_block() {
        let e = event("https://example.com/page");
        let p = profile(Strictness::Standard);
        let now = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let judge = JudgeOutput {
            is_harmful: true,
            categories: vec!["sexual".to_string()],
            severity: "medium".to_string(),
            rationale: "r".to_string(),
            action: "warn".to_string(),
            confidence: 0.7,
        };
        let mut input = base_input(&e, &p, now);
        input.judge_output = Some(&judge);
        let out = PolicyEngine::default().decide(&input);
        assert_eq!(out.action, Action::Block);
        assert_eq!(out.reason, "llm:medium");
    }

    #[test]
    fn headline_allow_short_circuit_flows_to_judge_low_reason() {
        // A non-allowlisted domain so we exercise the judge step, not the allowlist step.
        let e = event("https://neutral-example.test/page");
        let p = profile(Strictness::Standard);
        let now = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let judge = JudgeOutput {
            is_harmful: false,
            categories: vec![],
            severity: "low".to_string(),
            rationale: "headline short-circuit".to_string(),
            action: "allow".to_string(),
            confidence: 0.9,
        };
        let mut input = base_input(&e, &p, now);
        input.judge_output = Some(&judge);
        let out = PolicyEngine::default().decide(&input);
        assert_eq!(out.action, Action::Allow);
        assert_eq!(out.reason, "llm:low");
    }
}
