//! Property coverage for `PolicyEngine::decide`'s first-match-wins ordering,
//! in the `proptest!`-block style `graphs_property.rs` uses for the planner
//! graph's structural invariants.

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use serde_json::json;
use watchit_core::{Action, ChildProfile, Strictness};

fn event(url: &str) -> watchit_core::Event {
    watchit_core::Event {
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

fn profile() -> ChildProfile {
    ChildProfile {
        id: "c1".into(),
        name: "kid".into(),
        timezone: "UTC".into(),
        strictness: Strictness::Standard,
        age: 12,
    }
}

fn noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 10).unwrap().and_hms_opt(12, 0, 0).unwrap()
}

proptest! {
    /// Whatever the fast-scorer scores are, a paused event is always allowed:
    /// step 1 of the decision table wins over every later step.
    #[test]
    fn pause_always_wins_regardless_of_scores(
        violence in 0.0f64..=1.0,
        sexual in 0.0f64..=1.0,
        profanity in 0.0f64..=1.0,
    ) {
        let e = event("https://pornhub.com/x");
        let p = profile();
        let engine = watchit_core::PolicyEngine::default();
        let input = watchit_core::policy::PolicyInput {
            event: &e,
            fast_scores: watchit_core::scorer::FastScores { violence, sexual, profanity },
            judge_output: None,
            profile: &p,
            headline_result: None,
            paused_until_ms: Some(i64::MAX),
            now_ms: 0,
            now_local: noon(),
        };
        let out = engine.decide(&input);
        prop_assert_eq!(out.action, Action::Allow);
        prop_assert_eq!(out.reason, "paused");
    }

    /// A blocklisted domain is blocked no matter how low the fast scores are,
    /// since the blocklist step precedes the threshold step.
    #[test]
    fn blocklist_wins_over_low_scores(
        violence in 0.0f64..0.5,
        sexual in 0.0f64..0.5,
        profanity in 0.0f64..0.5,
    ) {
        let e = event("https://xvideos.com/x");
        let p = profile();
        let engine = watchit_core::PolicyEngine::default();
        let input = watchit_core::policy::PolicyInput {
            event: &e,
            fast_scores: watchit_core::scorer::FastScores { violence, sexual, profanity },
            judge_output: None,
            profile: &p,
            headline_result: None,
            paused_until_ms: None,
            now_ms: 0,
            now_local: noon(),
        };
        let out = engine.decide(&input);
        prop_assert_eq!(out.action, Action::Block);
        prop_assert!(out.reason.starts_with("blocklist"));
    }
}
