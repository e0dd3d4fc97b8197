use crate::db::models::KeywordRule;

const FALLBACK_FULL_MARKS_WORDS: f64 = 20.0;
const MISSING_HINT_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeywordHit {
    pub(crate) keyword: String,
    pub(crate) weight: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeywordScore {
    pub(crate) score: i32,
    pub(crate) is_correct: bool,
    pub(crate) found: Vec<KeywordHit>,
    pub(crate) missing: Vec<KeywordHit>,
    pub(crate) forbidden: Vec<KeywordHit>,
}

/// Weighted substring scoring of a free-text answer.
///
/// Positive rules contribute `weight` when their keyword appears (case-insensitive);
/// negative rules subtract `|weight|` percentage points from the ratio. Without any
/// positive rule the score falls back to answer length, full marks at 20 words.
pub(crate) fn score_answer(
    text: &str,
    rules: &[KeywordRule],
    correct_threshold: u32,
) -> KeywordScore {
    let haystack = text.to_lowercase();

    let mut found = Vec::new();
    let mut missing = Vec::new();
    let mut forbidden = Vec::new();
    let mut positive_max: i64 = 0;
    let mut positive_found: i64 = 0;
    let mut penalty: i64 = 0;

    for rule in rules {
        let keyword = rule.keyword.trim().to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        let present = haystack.contains(&keyword);
        let hit = KeywordHit { keyword: rule.keyword.trim().to_string(), weight: rule.weight };

        if rule.weight > 0 {
            positive_max += i64::from(rule.weight);
            if present {
                positive_found += i64::from(rule.weight);
                found.push(hit);
            } else {
                missing.push(hit);
            }
        } else if rule.weight < 0 && present {
            penalty += i64::from(rule.weight).abs();
            forbidden.push(hit);
        }
    }

    let raw = if positive_max > 0 {
        let ratio = 100.0 * positive_found as f64 / positive_max as f64;
        ratio.round() as i64 - penalty
    } else {
        let words = text.split_whitespace().count() as f64;
        (100.0 * words / FALLBACK_FULL_MARKS_WORDS).round() as i64
    };
    let score = raw.clamp(0, 100) as i32;

    KeywordScore {
        score,
        is_correct: score >= correct_threshold as i32,
        found,
        missing,
        forbidden,
    }
}

impl KeywordScore {
    /// Learner-facing explanation of the verdict.
    pub(crate) fn feedback(&self) -> String {
        let mut lines = Vec::new();
        let headline = if self.is_correct { "Correct answer" } else { "Incomplete answer" };
        lines.push(format!("{headline} ({}/100).", self.score));

        if !self.found.is_empty() {
            lines.push("Correct elements identified:".to_string());
            for hit in &self.found {
                lines.push(format!("- {} (+{})", hit.keyword, hit.weight));
            }
        }

        if !self.missing.is_empty() {
            lines.push("Elements to improve:".to_string());
            for hit in self.missing.iter().take(MISSING_HINT_LIMIT) {
                lines.push(format!("- consider mentioning \"{}\"", hit.keyword));
            }
        }

        if !self.forbidden.is_empty() {
            lines.push("Errors detected:".to_string());
            for hit in &self.forbidden {
                lines.push(format!("- \"{}\" ({})", hit.keyword, hit.weight));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(keyword: &str, weight: i32) -> KeywordRule {
        KeywordRule { keyword: keyword.to_string(), weight }
    }

    fn cell_rules() -> Vec<KeywordRule> {
        vec![rule("mitochondria", 20), rule("wrong", -15)]
    }

    #[test]
    fn matching_required_keyword_gives_full_marks() {
        let result = score_answer("the mitochondria is the powerhouse", &cell_rules(), 50);

        assert_eq!(result.score, 100);
        assert!(result.is_correct);
        assert_eq!(result.found, vec![KeywordHit { keyword: "mitochondria".into(), weight: 20 }]);
        assert!(result.missing.is_empty());
        assert!(result.forbidden.is_empty());
    }

    #[test]
    fn forbidden_keyword_penalty_clamps_at_zero() {
        let result = score_answer("wrong cell part", &cell_rules(), 50);

        assert_eq!(result.score, 0);
        assert!(!result.is_correct);
        assert_eq!(result.forbidden.len(), 1);
        assert_eq!(result.missing.len(), 1);
    }

    #[test]
    fn partial_match_rounds_ratio_before_penalty() {
        let rules =
            vec![
                rule("nucleus", 20),
                rule("membrane", 10),
                rule("ribosome", 10),
                rule("virus", -5),
            ];
        // 30 of 40 = 75%, minus 5.
        let result = score_answer("Nucleus and membrane, not a virus", &rules, 50);

        assert_eq!(result.score, 70);
        assert!(result.is_correct);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let result = score_answer("MITOCHONDRIA everywhere", &cell_rules(), 50);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn no_positive_rules_scores_by_word_count() {
        let ten_words = "one two three four five six seven eight nine ten";
        assert_eq!(score_answer(ten_words, &[], 50).score, 50);

        let long = "word ".repeat(45);
        assert_eq!(score_answer(&long, &[rule("bad", -10)], 50).score, 100);

        assert_eq!(score_answer("three short words", &[], 50).score, 15);
    }

    #[test]
    fn threshold_is_inclusive_and_configurable() {
        let rules = vec![rule("alpha", 10), rule("beta", 10)];
        assert!(score_answer("alpha", &rules, 50).is_correct);
        assert!(!score_answer("alpha", &rules, 60).is_correct);
    }

    #[test]
    fn score_stays_in_range_for_mixed_rules() {
        let rules = vec![rule("a", 100), rule("b", -100), rule("c", 1)];
        for text in ["", "a", "b", "a b c", "abc", "zzz"] {
            let first = score_answer(text, &rules, 50);
            let second = score_answer(text, &rules, 50);
            assert!((0..=100).contains(&first.score), "{text}: {}", first.score);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn feedback_lists_at_most_three_missing_keywords() {
        let rules = vec![
            rule("alpha", 20),
            rule("beta", 20),
            rule("gamma", 20),
            rule("delta", 20),
            rule("epsilon", 20),
            rule("oops", -10),
        ];
        let feedback = score_answer("alpha oops", &rules, 50).feedback();

        assert!(feedback.starts_with("Incomplete answer (10/100)."));
        assert!(feedback.contains("- alpha (+20)"));
        assert!(feedback.contains("\"beta\""));
        assert!(feedback.contains("\"delta\""));
        assert!(!feedback.contains("\"epsilon\""));
        assert!(feedback.contains("\"oops\" (-10)"));
    }
}
