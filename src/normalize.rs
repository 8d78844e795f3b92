//! Turns annotated move text into a clean sequence of SAN tokens.
//!
//! The input dialect is the one found in the Lichess "AN" column: move
//! numbers (`1.` / `1...`), brace comments, `?`/`!` marks and a trailing
//! result. Each stage is public so callers can inspect intermediate text;
//! the stages must run in the order [`clean_movetext`] applies them.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::GameError;
use crate::types::MoveSequence;

static MOVE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.+").unwrap());
static MARKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?!]+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const RESULT_MARKERS: [&str; 3] = ["1-0", "0-1", "1/2-1/2"];

/// Drop every `{...}` span, braces included. Braces do not nest: the first
/// `}` closes the span, and an unclosed `{` swallows the rest of the text.
pub fn remove_braces(s: &str) -> String {
    let mut output = String::with_capacity(s.len());
    let mut in_brace = false;

    for c in s.chars() {
        if c == '{' {
            in_brace = true;
        }
        if !in_brace {
            output.push(c);
        } else if c == '}' {
            in_brace = false;
        }
    }

    output
}

/// Drop move numbers such as `12.` or `12...`, then leading whitespace.
pub fn remove_move_numbers(s: &str) -> String {
    MOVE_NUMBER.replace_all(s, "").trim_start().to_string()
}

/// Strip the trailing `1-0`, `0-1` or `1/2-1/2`. `None` when the text does
/// not end with one of them.
pub fn remove_result(s: &str) -> Option<&str> {
    let s = s.trim_end();
    RESULT_MARKERS
        .iter()
        .find_map(|marker| s.strip_suffix(marker))
        .map(str::trim_end)
}

/// Drop `?` and `!` annotation marks.
pub fn remove_marks(s: &str) -> String {
    MARKS.replace_all(s, "").into_owned()
}

/// Collapse every whitespace run to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").into_owned()
}

/// Run all text stages and return the space-separated move list.
pub fn clean_movetext(raw: &str) -> Result<String, GameError> {
    let without_braces = remove_braces(raw);
    let without_numbers = remove_move_numbers(&without_braces);
    let without_result = remove_result(&without_numbers).ok_or_else(|| {
        GameError::malformed("move text does not end with 1-0, 0-1 or 1/2-1/2")
    })?;
    Ok(collapse_whitespace(&remove_marks(without_result)))
}

/// Normalize raw move text into SAN tokens. A finished game with no moves
/// yields an empty sequence; text without a result marker is malformed.
pub fn normalize(raw: &str) -> Result<MoveSequence, GameError> {
    let cleaned = clean_movetext(raw)?;
    Ok(cleaned
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &str) -> Vec<String> {
        normalize(raw).unwrap().into_vec()
    }

    #[test]
    fn test_remove_braces_keeps_surrounding_spaces() {
        assert_eq!(remove_braces("This {is a} message { }"), "This  message ");
    }

    #[test]
    fn test_remove_braces_unclosed_drops_tail() {
        assert_eq!(remove_braces("e4 e5 { never closed Nf3"), "e4 e5 ");
    }

    #[test]
    fn test_remove_braces_does_not_nest() {
        assert_eq!(remove_braces("a {b {c} d} e"), "a  d} e");
    }

    #[test]
    fn test_remove_move_numbers() {
        assert_eq!(remove_move_numbers("1. e4 e5 2.Nf3"), "e4 e5 Nf3");
        assert_eq!(remove_move_numbers("  12... Nc6"), "Nc6");
    }

    #[test]
    fn test_remove_result_markers() {
        assert_eq!(remove_result("e4 e5 1-0"), Some("e4 e5"));
        assert_eq!(remove_result("e4 e5 0-1  "), Some("e4 e5"));
        assert_eq!(remove_result("e4 e5 1/2-1/2"), Some("e4 e5"));
        assert_eq!(remove_result("1-0"), Some(""));
    }

    #[test]
    fn test_remove_result_missing_marker() {
        assert_eq!(remove_result("e4 e5 *"), None);
        assert_eq!(remove_result("e4 e5"), None);
        assert_eq!(remove_result(""), None);
    }

    #[test]
    fn test_remove_marks_collapses_runs() {
        assert_eq!(remove_marks("e4!! e5?! Nf3?"), "e4 e5 Nf3");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("e4 \t e5\n\nNf3"), "e4 e5 Nf3");
    }

    #[test]
    fn test_marks_and_whitespace_stages_are_idempotent() {
        let input = "e4!  e5?? \t Nf3!?  Nc6";
        let once = collapse_whitespace(&remove_marks(input));
        let twice = collapse_whitespace(&remove_marks(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_simple_game() {
        assert_eq!(tokens("1.e4 e5 2.Nf3 1-0"), vec!["e4", "e5", "Nf3"]);
    }

    #[test]
    fn test_normalize_lichess_annotations() {
        let input = "1. d4 { [%eval 0.25] [%clk 1:30:43] } 1... Nf6 { [%eval 0.22] } 2. c4?! e6 0-1";
        assert_eq!(tokens(input), vec!["d4", "Nf6", "c4", "e6"]);
    }

    #[test]
    fn test_normalize_keeps_check_and_castling_suffixes() {
        let input = "1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6?? 4. Qxf7# 1-0";
        assert_eq!(
            tokens(input),
            vec!["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]
        );
        assert_eq!(tokens("1. e4 e5 2. O-O-O+ 1/2-1/2"), vec!["e4", "e5", "O-O-O+"]);
    }

    #[test]
    fn test_normalize_never_emits_marker_or_numbers() {
        for input in [
            "1. e4 e5 2. Nf3 Nc6 1-0",
            "1.e4 e5 2.Nf3 Nc6 0-1",
            "1. e4 {comment} 1... e5 2. Nf3 1/2-1/2",
        ] {
            for token in tokens(input) {
                assert!(!RESULT_MARKERS.contains(&token.as_str()), "{input}");
                assert!(!token.ends_with('.'), "{input}");
            }
        }
    }

    #[test]
    fn test_normalize_zero_ply_game() {
        assert!(normalize("1-0").unwrap().is_empty());
        assert!(normalize("{ abandoned } 0-1").unwrap().is_empty());
    }

    #[test]
    fn test_normalize_without_result_is_malformed() {
        let err = normalize("1. e4 e5 2. Nf3 *").unwrap_err();
        assert!(matches!(err, GameError::MalformedRecord { .. }));
        assert!(matches!(
            normalize("").unwrap_err(),
            GameError::MalformedRecord { .. }
        ));
    }

    #[test]
    fn test_normalize_result_inside_unclosed_comment_is_malformed() {
        assert!(normalize("1. e4 e5 { unfinished 1-0").is_err());
    }

    #[test]
    fn test_normalize_result_followed_by_comment() {
        assert_eq!(tokens("1. e4 e5 1-0 { White resigns? no }"), vec!["e4", "e5"]);
    }
}
