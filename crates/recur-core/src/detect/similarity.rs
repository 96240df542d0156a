//! Description normalization and fuzzy text similarity
//!
//! The fuzzy pass only talks to [`TextSimilarity`], so the measure can be
//! swapped or tuned without touching grouping or scoring.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::Result;

/// Maximum characters kept from a normalized description
const MAX_NORMALIZED_LEN: usize = 50;

/// Similarity between two normalized texts, in [0, 1]
pub trait TextSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Token-set ratio over normalized Levenshtein similarity
///
/// Compares the shared tokens against each side's full token set, so
/// "netflix" and "netflix premium" match fully while "paypal netflix" and
/// "paypal spotify" do not.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetRatio;

impl TextSimilarity for TokenSetRatio {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
        let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
        if tokens_a.is_empty() || tokens_b.is_empty() {
            return 0.0;
        }
        if tokens_a == tokens_b {
            return 1.0;
        }

        let common = join_tokens(tokens_a.intersection(&tokens_b).copied());
        let only_a = join_tokens(tokens_a.difference(&tokens_b).copied());
        let only_b = join_tokens(tokens_b.difference(&tokens_a).copied());

        let with_a = join_parts(&common, &only_a);
        let with_b = join_parts(&common, &only_b);

        let mut best = ratio(&with_a, &with_b);
        if !common.is_empty() {
            best = best.max(ratio(&common, &with_a)).max(ratio(&common, &with_b));
        }
        best
    }
}

fn join_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.collect::<Vec<_>>().join(" ")
}

fn join_parts(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}

/// 1 - edit distance / length of the longer string
fn ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / longest as f64
}

fn levenshtein_distance(left: &str, right: &str) -> usize {
    if left == right {
        return 0;
    }

    if left.is_empty() {
        return right.chars().count();
    }

    if right.is_empty() {
        return left.chars().count();
    }

    let right_chars = right.chars().collect::<Vec<char>>();
    let mut previous = (0..=right_chars.len()).collect::<Vec<usize>>();

    for (left_index, left_char) in left.chars().enumerate() {
        let mut current = vec![left_index + 1];

        for (right_index, right_char) in right_chars.iter().enumerate() {
            let insertion = current[right_index] + 1;
            let deletion = previous[right_index + 1] + 1;
            let substitution = previous[right_index] + usize::from(left_char != *right_char);
            current.push(insertion.min(deletion).min(substitution));
        }

        previous = current;
    }

    previous[right_chars.len()]
}

/// Normalizes free-text descriptions for fuzzy comparison
///
/// Lowercases, strips common domain suffixes, replaces digits and separator
/// punctuation with spaces, collapses whitespace and truncates.
#[derive(Debug, Clone)]
pub struct DescriptionNormalizer {
    domain_suffix: Regex,
    noise: Regex,
}

impl DescriptionNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            domain_suffix: Regex::new(r"\.(?:co\.uk|com|de|at|ch|fr|es|it|nl)\b")?,
            noise: Regex::new(r"[0-9\-._:/*#]+")?,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        let lower = text.trim().to_lowercase();
        let without_domains = self.domain_suffix.replace_all(&lower, "");
        let without_noise = self.noise.replace_all(&without_domains, " ");

        let collapsed = without_noise.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed
            .chars()
            .take(MAX_NORMALIZED_LEN)
            .collect::<String>()
            .trim_end()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_description() {
        let n = DescriptionNormalizer::new().unwrap();
        assert_eq!(n.normalize("NETFLIX.COM*12345"), "netflix");
        assert_eq!(n.normalize("  Spotify   AB  Stockholm "), "spotify ab stockholm");
        assert_eq!(n.normalize("amazon.co.uk/prime 2024-01-05"), "amazon prime");
        assert_eq!(n.normalize("SEPA-LASTSCHRIFT #4711"), "sepa lastschrift");
        assert_eq!(n.normalize("12.03.2024 - 99"), "");
        assert_eq!(n.normalize(""), "");
    }

    #[test]
    fn test_normalize_keeps_words_containing_suffix_letters() {
        let n = DescriptionNormalizer::new().unwrap();
        assert_eq!(n.normalize("food.delivery"), "food delivery");
    }

    #[test]
    fn test_normalize_truncates() {
        let n = DescriptionNormalizer::new().unwrap();
        let long = "abcdefghij ".repeat(10);
        let normalized = n.normalize(&long);
        assert!(normalized.chars().count() <= MAX_NORMALIZED_LEN);
        assert!(!normalized.ends_with(' '));
    }

    #[test]
    fn test_token_set_ratio() {
        let sim = TokenSetRatio;
        assert_eq!(sim.similarity("netflix", "netflix"), 1.0);
        assert_eq!(sim.similarity("netflix", "netflix premium"), 1.0);
        assert_eq!(sim.similarity("spotify ab", "ab spotify"), 1.0);
        assert!(sim.similarity("paypal netflix", "paypal spotify") < 0.8);
        assert!(sim.similarity("rewe markt", "stadtwerke strom") < 0.5);
        assert!(sim.similarity("spotfy", "spotify") >= 0.8);
        assert_eq!(sim.similarity("", "netflix"), 0.0);
        assert_eq!(sim.similarity("   ", ""), 0.0);
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }
}
