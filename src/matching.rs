//! Fuzzy matching of free-text answers against option texts
//!
//! Scoring strategies, strongest first:
//!
//! | Strategy | Score |
//! |----------|-------|
//! | case-insensitive equality | 1.0 |
//! | case-insensitive substring, either direction | 0.8 |
//! | token-set Jaccard | \|A ∩ B\| / \|A ∪ B\| |
//!
//! An empty option text is contained in every non-blank input, so it
//! scores 0.8 too.
//!
//! Equality and containment must beat partial token overlap, so a later
//! strategy is only consulted when the earlier ones fail.

use std::collections::HashSet;

use regex::Regex;

use crate::model::DecisionOption;

pub const EXACT_SCORE: f64 = 1.0;
pub const CONTAINS_SCORE: f64 = 0.8;
/// Best scores below this are treated as "no match"
pub const DEFAULT_THRESHOLD: f64 = 0.3;

lazy_static::lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("word pattern compiles");
}

/// Lowercase word tokens of `text`
pub fn tokens(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Token-set Jaccard similarity; 0.0 when either side has no tokens
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

/// Similarity between user input and one option text, in `[0.0, 1.0]`
pub fn similarity(input: &str, option_text: &str) -> f64 {
    let input = input.trim().to_lowercase();
    let option = option_text.trim().to_lowercase();
    // Blank input never matches. A blank option text (the last step of a
    // converted path) is contained in any input and scores as a substring.
    if input.is_empty() {
        return 0.0;
    }

    if input == option {
        EXACT_SCORE
    } else if option.contains(&input) || input.contains(&option) {
        CONTAINS_SCORE
    } else {
        jaccard(&input, &option)
    }
}

/// An option picked for some input, with how well it matched
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedOption<'a> {
    /// Zero-based position in the node's option list
    pub index: usize,
    pub option: &'a DecisionOption,
    pub score: f64,
}

/// Scores inputs against options with a configurable acceptance threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    pub threshold: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Pick the option for `input`: a 1-based number in range wins outright,
    /// otherwise the highest-scoring option at or above the threshold.
    /// Ties keep the earlier option.
    pub fn pick<'a>(&self, input: &str, options: &'a [DecisionOption]) -> Option<MatchedOption<'a>> {
        if let Ok(choice) = input.trim().parse::<usize>() {
            if (1..=options.len()).contains(&choice) {
                return Some(MatchedOption {
                    index: choice - 1,
                    option: &options[choice - 1],
                    score: EXACT_SCORE,
                });
            }
        }

        let mut best: Option<MatchedOption<'a>> = None;
        for (index, option) in options.iter().enumerate() {
            let score = similarity(input, &option.text);
            let better = match &best {
                Some(b) => score > b.score,
                None => true,
            };
            if better {
                best = Some(MatchedOption { index, option, score });
            }
        }

        best.filter(|b| b.score >= self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn opts(texts: &[&str]) -> Vec<DecisionOption> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| DecisionOption::new(*t, format!("n{}", i)))
            .collect()
    }

    #[test]
    fn test_exact_match_ignores_case() {
        assert_eq!(similarity("NETWORK", "network"), EXACT_SCORE);
        assert_eq!(similarity("  Network ", "network"), EXACT_SCORE);
    }

    #[test]
    fn test_substring_either_direction() {
        assert_eq!(similarity("network issue", "Network"), CONTAINS_SCORE);
        assert_eq!(similarity("wifi", "WiFi connection"), CONTAINS_SCORE);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard("red green", "blue yellow"), 0.0);
        assert_eq!(jaccard("slow network", "slow network"), 1.0);
        assert_eq!(jaccard("slow wired network", "network is slow"), 0.5);
        assert_eq!(jaccard("", "anything"), 0.0);
        assert_eq!(jaccard("?!", "anything"), 0.0);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        assert_eq!(similarity("", "Network"), 0.0);
        assert_eq!(similarity("   ", "Network"), 0.0);
    }

    #[test]
    fn test_empty_option_accepts_any_answer() {
        assert_eq!(similarity("done", ""), CONTAINS_SCORE);
        assert_eq!(similarity("yes it works", "  "), CONTAINS_SCORE);

        let options = vec![DecisionOption::new("", "solution")];
        let m = Matcher::default().pick("done", &options).unwrap();
        assert_eq!(m.option.next_node, "solution");
        assert_eq!(m.score, CONTAINS_SCORE);
        assert!(Matcher::default().pick("  ", &options).is_none());
    }

    #[test]
    fn test_numeric_choice() {
        let options = opts(&["Network", "Hardware"]);
        let m = Matcher::default().pick("2", &options).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.score, 1.0);

        // Out of range falls through to fuzzy matching, which finds nothing
        assert!(Matcher::default().pick("3", &options).is_none());
        assert!(Matcher::default().pick("0", &options).is_none());
    }

    #[test]
    fn test_exact_beats_token_overlap() {
        let options = opts(&["slow network connection", "network"]);
        let m = Matcher::default().pick("Network", &options).unwrap();
        // Both contain/equal "network"; equality wins over containment
        assert_eq!(m.index, 1);
    }

    #[test]
    fn test_tie_keeps_first() {
        let options = opts(&["network slow", "network down"]);
        let m = Matcher::default().pick("network", &options).unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.score, CONTAINS_SCORE);
    }

    #[test]
    fn test_below_threshold_is_no_match() {
        let options = opts(&["printer jammed paper tray"]);
        // 1 shared token out of 5
        assert!(Matcher::default().pick("paper cut", &options).is_none());
        assert!(Matcher::new(0.1).pick("paper cut", &options).is_some());
    }

    proptest! {
        #[test]
        fn prop_similarity_in_unit_range(a in "[a-zA-Z ]{0,20}", b in "[a-zA-Z ]{0,20}") {
            let s = similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn prop_exact_match_ignores_case(word in "[a-zA-Z]{1,12}") {
            prop_assert_eq!(similarity(&word.to_uppercase(), &word.to_lowercase()), 1.0);
        }

        #[test]
        fn prop_pick_is_deterministic(input in "[a-z ]{0,16}") {
            let options = opts(&["network down", "disk full", "screen flickers"]);
            let first = Matcher::default().pick(&input, &options).map(|m| m.index);
            let second = Matcher::default().pick(&input, &options).map(|m| m.index);
            prop_assert_eq!(first, second);
        }
    }
}
