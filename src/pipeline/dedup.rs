//! Title deduplication: undo the repetition that ensemble OCR introduces.
//!
//! Joining several recognition candidates, or several overlapping lines of
//! one band, repeats the same words: `AI WORKSHOP\nAI WORKSHOP ON ROBOTICS`.
//! Four deterministic passes reduce a reconstructed title to one clean line:
//!
//! 1. collapse consecutive duplicate lines
//! 2. drop lines carrying administrative-role keywords (`PRINCIPAL`, `HOD`, ...)
//! 3. remove repeated token runs, longest first
//! 4. remove immediately adjacent duplicate tokens
//!
//! All comparisons ignore ASCII case. Already-clean input comes back as the
//! same tokens joined by single spaces.

use std::collections::HashSet;

/// Shortest token run treated as a repeatable phrase. Single tokens are only
/// removed when directly adjacent (pass 4).
const MIN_PHRASE: usize = 2;

/// Longest token run tested at each position.
const MAX_PHRASE: usize = 12;

/// Apply all four passes and return the title as one space-joined line.
pub fn clean_title(input: &str, role_keywords: &[String]) -> String {
    let lines = collapse_duplicate_lines(input);
    let lines = strip_role_lines(lines, role_keywords);
    let tokens: Vec<&str> = lines.iter().flat_map(|l| l.split_whitespace()).collect();
    let tokens = remove_repeated_phrases(&tokens);
    remove_adjacent_duplicates(tokens).join(" ")
}

// ── Pass 1 ───────────────────────────────────────────────────────────────

fn collapse_duplicate_lines(input: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = Vec::new();
    for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let repeat = lines
            .last()
            .is_some_and(|prev| normalise_ws(prev).eq_ignore_ascii_case(&normalise_ws(line)));
        if !repeat {
            lines.push(line);
        }
    }
    lines
}

fn normalise_ws(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Pass 2 ───────────────────────────────────────────────────────────────

fn strip_role_lines<'a>(lines: Vec<&'a str>, role_keywords: &[String]) -> Vec<&'a str> {
    lines
        .into_iter()
        .filter(|line| !has_role_keyword(line, role_keywords))
        .collect()
}

/// Whether any whitespace token of `line`, stripped of surrounding
/// punctuation, equals one of `keywords` (ASCII case-insensitive).
pub(crate) fn has_role_keyword(line: &str, keywords: &[String]) -> bool {
    line.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
        .any(|t| keywords.iter().any(|k| k.eq_ignore_ascii_case(t)))
}

// ── Pass 3 ───────────────────────────────────────────────────────────────

/// Scan left to right. At each position try the longest run first; a run
/// already seen is skipped whole, otherwise every run starting here is
/// recorded and the token is kept.
fn remove_repeated_phrases<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
    let mut seen: HashSet<&[String]> = HashSet::new();
    let mut kept = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < upper.len() {
        let longest = (upper.len() - i).min(MAX_PHRASE);
        let repeated = (MIN_PHRASE..=longest)
            .rev()
            .find(|&len| seen.contains(&upper[i..i + len]));
        if let Some(len) = repeated {
            i += len;
            continue;
        }
        for len in MIN_PHRASE..=longest {
            seen.insert(&upper[i..i + len]);
        }
        kept.push(tokens[i]);
        i += 1;
    }
    kept
}

// ── Pass 4 ───────────────────────────────────────────────────────────────

fn remove_adjacent_duplicates(mut tokens: Vec<&str>) -> Vec<&str> {
    tokens.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> Vec<String> {
        vec!["PRINCIPAL".into(), "HOD".into(), "CO-ORDINATOR".into()]
    }

    #[test]
    fn repeated_phrase_removed() {
        assert_eq!(
            clean_title("AI WORKSHOP AI WORKSHOP ON ROBOTICS", &roles()),
            "AI WORKSHOP ON ROBOTICS"
        );
    }

    #[test]
    fn duplicate_lines_collapsed() {
        let input = "CLOUD COMPUTING\ncloud   computing\nESSENTIALS";
        assert_eq!(clean_title(input, &roles()), "CLOUD COMPUTING ESSENTIALS");
    }

    #[test]
    fn overlapping_lines_merged() {
        let input = "AI WORKSHOP\nAI WORKSHOP ON ROBOTICS";
        assert_eq!(clean_title(input, &roles()), "AI WORKSHOP ON ROBOTICS");
    }

    #[test]
    fn role_lines_dropped() {
        let input = "QUANTUM COMPUTING\nDR. A. KUMAR, HOD\nPRINCIPAL";
        assert_eq!(clean_title(input, &roles()), "QUANTUM COMPUTING");
    }

    #[test]
    fn role_keyword_must_be_whole_token() {
        // "HODGE" is not "HOD"
        assert!(!has_role_keyword("HODGE THEORY", &roles()));
        assert!(has_role_keyword("Mr. X (HOD)", &roles()));
        assert!(has_role_keyword("co-ordinator: Ms. Y", &roles()));
    }

    #[test]
    fn adjacent_duplicate_tokens_removed() {
        assert_eq!(clean_title("ON ON THE THE EDGE", &roles()), "ON THE EDGE");
    }

    #[test]
    fn clean_input_is_unchanged() {
        let clean = "INTRODUCTION TO MACHINE LEARNING";
        assert_eq!(clean_title(clean, &roles()), clean);
        assert_eq!(clean_title(&clean_title(clean, &roles()), &roles()), clean);
    }

    #[test]
    fn single_token_repeats_kept_when_not_adjacent() {
        assert_eq!(
            clean_title("DATA AND MODELS AND SYSTEMS", &roles()),
            "DATA AND MODELS AND SYSTEMS"
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(clean_title("", &roles()), "");
        assert_eq!(clean_title("\n  \n", &roles()), "");
    }
}
