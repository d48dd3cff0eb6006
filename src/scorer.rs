//! Fast, deterministic keyword scorer.
//!
//! Grounded in the category/keyword-list organization used for heuristic
//! pattern matching elsewhere in this codebase's ecosystem, but scoring is
//! intentionally simple: word-boundary keyword counts per category, scaled
//! and clamped to `[0, 1]`. No regex weighting or severity ensemble — three
//! categories, one formula.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Category;

const VIOLENCE_WORDS: &[&str] = &["kill", "shoot", "gun", "fight", "blood", "weapon"];
const SEXUAL_WORDS: &[&str] = &["sex", "porn", "nude", "xxx", "18+", "adult only"];
const PROFANITY_WORDS: &[&str] = &["damn", "shit", "fuck", "bitch"];

fn keywords_for(category: Category) -> &'static [&'static str] {
    match category {
        Category::Violence => VIOLENCE_WORDS,
        Category::Sexual => SEXUAL_WORDS,
        Category::Profanity => PROFANITY_WORDS,
    }
}

/// Lazily-compiled, case-insensitive regex per category.
///
/// Plain alphanumeric keywords get `\b...\b` word-boundary matching; keywords
/// containing punctuation or spaces (`18+`, `adult only`) fall back to a bare
/// literal match, since `\b` is only meaningful at a word/non-word
/// transition and a trailing `+` never provides one.
static CATEGORY_REGEXES: LazyLock<HashMap<Category, Regex>> = LazyLock::new(|| {
    [Category::Violence, Category::Sexual, Category::Profanity]
        .into_iter()
        .map(|category| {
            let alternation = keywords_for(category)
                .iter()
                .map(|w| {
                    let escaped = regex::escape(w);
                    if w.chars().all(|c| c.is_ascii_alphanumeric()) {
                        format!(r"\b{escaped}\b")
                    } else {
                        escaped
                    }
                })
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)(?:{alternation})");
            (category, Regex::new(&pattern).expect("static pattern compiles"))
        })
        .collect()
});

/// Per-category scores in `[0, 1]`, each rounded to three decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastScores {
    pub violence: f64,
    pub sexual: f64,
    pub profanity: f64,
}

impl FastScores {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Violence => self.violence,
            Category::Sexual => self.sexual,
            Category::Profanity => self.profanity,
        }
    }

    /// Categories whose score meets or exceeds `threshold`, in a stable order.
    pub fn categories_at_or_above(&self, threshold: f64) -> Vec<Category> {
        [Category::Violence, Category::Sexual, Category::Profanity]
            .into_iter()
            .filter(|c| self.get(*c) >= threshold)
            .collect()
    }

    pub fn max(&self) -> f64 {
        self.violence.max(self.sexual).max(self.profanity)
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Score a single text blob. `W = max(1, word_count)`; each category's score
/// is `min(1, 5 * matches / W)`.
pub fn analyze_text(text: &str) -> FastScores {
    let words = text.split_whitespace().count().max(1) as f64;
    let score_for = |category: Category| {
        let regex = &CATEGORY_REGEXES[&category];
        let matches = regex.find_iter(text).count() as f64;
        round3((5.0 * matches / words).min(1.0))
    };
    FastScores {
        violence: score_for(Category::Violence),
        sexual: score_for(Category::Sexual),
        profanity: score_for(Category::Profanity),
    }
}

/// Aggregate the event's text surfaces (`dom_sample`, `text`, search
/// titles, and OCR output) and score the concatenation.
pub fn analyze_event_fast(event: &crate::models::Event, extra_text: Option<&str>) -> FastScores {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(dom) = event.dom_sample() {
        parts.push(dom);
    }
    if let Some(text) = event.text() {
        parts.push(text);
    }
    if event.kind == "search" {
        if let Some(title) = event.title.as_deref() {
            parts.push(title);
        }
    }
    if let Some(extra) = extra_text {
        parts.push(extra);
    }
    let combined = parts.join(" ");
    analyze_text(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_text_scores_zero() {
        let scores = analyze_text("");
        assert_eq!(scores.violence, 0.0);
        assert_eq!(scores.sexual, 0.0);
        assert_eq!(scores.profanity, 0.0);
    }

    #[test]
    fn matches_are_case_insensitive_and_word_bounded() {
        let scores = analyze_text("KILL a killer, not kills");
        assert!(scores.violence > 0.0);
    }

    #[test]
    fn scaling_matches_formula() {
        // 2 words, 1 match -> min(1, 5*1/2) = 1.0
        let scores = analyze_text("porn site");
        assert_eq!(scores.sexual, 1.0);
    }

    #[test]
    fn plus_and_space_keywords_match() {
        let scores = analyze_text("this site is for 18+ adult only content");
        assert!(scores.sexual > 0.0);
    }

    #[test]
    fn search_title_included_only_for_search_kind() {
        let event = crate::models::Event {
            id: "e1".into(),
            child_id: "c1".into(),
            ts: 0,
            kind: "search".into(),
            url: None,
            title: Some("guns and blood".into()),
            tab_id: None,
            referrer: None,
            data_json: json!({}),
        };
        let scores = analyze_event_fast(&event, None);
        assert!(scores.violence > 0.0);
    }
}
