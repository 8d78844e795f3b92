use std::fmt::Write;
use std::io::{self, Read};
use std::mem;
use std::ops::ControlFlow;

use log::warn;
use pgn_reader::{Outcome, RawComment, RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::Color;

use super::RecordSet;
use crate::error::ErrorAccumulator;
use crate::types::GameRecord;

/// How the subject player of a PGN game is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectSelector {
    /// The same side in every game.
    Color(Color),
    /// Whichever side the named player had, from the `White`/`Black` tags.
    Player(String),
}

impl Default for SubjectSelector {
    fn default() -> Self {
        Self::Color(Color::White)
    }
}

impl SubjectSelector {
    fn resolve(&self, white: &str, black: &str) -> Result<Color, String> {
        match self {
            Self::Color(color) => Ok(*color),
            Self::Player(name) => {
                let name = name.trim();
                let is_white = white.trim().eq_ignore_ascii_case(name);
                let is_black = black.trim().eq_ignore_ascii_case(name);
                match (is_white, is_black) {
                    (true, false) => Ok(Color::White),
                    (false, true) => Ok(Color::Black),
                    (true, true) => Err(format!("player '{name}' is on both sides")),
                    (false, false) => Err(format!(
                        "player '{name}' not found (White '{white}', Black '{black}')"
                    )),
                }
            }
        }
    }
}

/// Mainline-only visitor producing one dataset row per game.
///
/// Movetext is rebuilt with move numbers, `{ ... }` comments and the result
/// marker (from the movetext, or the `Result` tag as fallback), which is
/// the shape the normalizer expects.
struct RowVisitor<'a> {
    subject: &'a SubjectSelector,
    white: String,
    black: String,
    result_tag: String,
    move_count: u32,
    result_marker: Option<String>,
    parse_error: ErrorAccumulator,
    current_row: Option<Result<GameRecord, String>>,
}

impl<'a> RowVisitor<'a> {
    fn new(subject: &'a SubjectSelector) -> Self {
        Self {
            subject,
            white: String::new(),
            black: String::new(),
            result_tag: String::new(),
            move_count: 0,
            result_marker: None,
            parse_error: ErrorAccumulator::default(),
            current_row: None,
        }
    }

    fn finalize_game(&mut self, mut movetext: String) {
        let marker = self
            .result_marker
            .take()
            .or_else(|| (!self.result_tag.is_empty()).then(|| mem::take(&mut self.result_tag)));
        if let Some(marker) = marker {
            if !movetext.is_empty() {
                movetext.push(' ');
            }
            movetext.push_str(&marker);
        }

        match self.subject.resolve(&self.white, &self.black) {
            Ok(color) => {
                self.current_row = Some(match self.parse_error.take() {
                    Some(reason) => Err(reason),
                    None => Ok(GameRecord::new(movetext.trim(), color)),
                });
            }
            Err(reason) => {
                self.parse_error.push(&reason);
                self.current_row = self.parse_error.take().map(Err);
            }
        }
    }

    fn finalize_game_with_error(&mut self, error_msg: String) {
        self.parse_error.push(&error_msg);
        self.current_row = self.parse_error.take().map(Err);
    }
}

impl Visitor for RowVisitor<'_> {
    type Tags = ();
    type Movetext = String;
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.white.clear();
        self.black.clear();
        self.result_tag.clear();
        self.move_count = 0;
        self.result_marker = None;
        self.parse_error = ErrorAccumulator::default();
        self.current_row = None;
        ControlFlow::Continue(())
    }

    fn tag(
        &mut self,
        _: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let slot = match key {
            b"White" => &mut self.white,
            b"Black" => &mut self.black,
            b"Result" => &mut self.result_tag,
            _ => return ControlFlow::Continue(()),
        };
        if slot.is_empty() {
            *slot = String::from_utf8_lossy(value.as_bytes()).into_owned();
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(String::with_capacity(256))
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        if !movetext.is_empty() {
            movetext.push(' ');
        }
        if self.move_count.is_multiple_of(2) {
            let _ = write!(movetext, "{}. ", (self.move_count / 2) + 1);
        }
        let _ = write!(movetext, "{}", san);
        self.move_count += 1;
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        movetext: &mut Self::Movetext,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        let comment_str = String::from_utf8_lossy(comment.as_bytes());
        if !movetext.is_empty() {
            movetext.push(' ');
        }
        movetext.push_str("{ ");
        movetext.push_str(comment_str.trim());
        movetext.push_str(" }");
        ControlFlow::Continue(())
    }

    fn outcome(
        &mut self,
        _movetext: &mut Self::Movetext,
        outcome: Outcome,
    ) -> ControlFlow<Self::Output> {
        self.result_marker = Some(outcome.to_string());
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        self.finalize_game(movetext);
    }
}

/// Read every game of a PGN stream, one row per game.
///
/// Games the parser rejects become malformed rows; I/O failures abort.
pub fn parse_pgn<R: Read>(input: R, subject: &SubjectSelector) -> io::Result<RecordSet> {
    let mut reader = Reader::new(input);
    let mut visitor = RowVisitor::new(subject);
    let mut rows = Vec::new();

    loop {
        let game_index = rows.len();
        match reader.read_game(&mut visitor) {
            Ok(Some(())) => {}
            Ok(None) => break,
            Err(error) if error.kind() == io::ErrorKind::InvalidData => {
                let error_msg = format!("pgn parse error in game {game_index}: {error}");
                warn!("{error_msg}");
                visitor.finalize_game_with_error(error_msg);
            }
            Err(error) => return Err(error),
        }
        if let Some(row) = visitor.current_row.take() {
            rows.push(row);
        }
    }
    Ok(RecordSet::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::error::GameError;
    use crate::normalize::normalize;

    const TWO_GAMES: &str = r#"[Event "Casual"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]

1. e4 { best by test } e5 (1... c5 2. Nf3) 2. Qh5?! Nc6 3. Bc4 Nf6?? 4. Qxf7# 1-0

[Event "Casual"]
[White "Bob"]
[Black "Alice"]
[Result "1/2-1/2"]

1. d4 d5 1/2-1/2
"#;

    #[test]
    fn test_rows_follow_fixed_color() {
        let set = parse_pgn(TWO_GAMES.as_bytes(), &SubjectSelector::Color(Color::Black)).unwrap();

        assert_eq!(set.len(), 2);
        let first = set.get_record(0).unwrap();
        assert_eq!(first.subject_color, Color::Black);
        assert_eq!(
            first.move_text,
            "1. e4 { best by test } e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0"
        );
        assert_eq!(set.get_record(1).unwrap().move_text, "1. d4 d5 1/2-1/2");
    }

    #[test]
    fn test_rows_follow_player_name() {
        let subject = SubjectSelector::Player("alice".to_string());
        let set = parse_pgn(TWO_GAMES.as_bytes(), &subject).unwrap();

        assert_eq!(set.get_record(0).unwrap().subject_color, Color::White);
        assert_eq!(set.get_record(1).unwrap().subject_color, Color::Black);
    }

    #[test]
    fn test_missing_player_is_malformed_row() {
        let subject = SubjectSelector::Player("Carol".to_string());
        let set = parse_pgn(TWO_GAMES.as_bytes(), &subject).unwrap();

        assert_eq!(set.len(), 2);
        assert!(matches!(
            set.get_record(0),
            Err(GameError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_result_tag_used_when_movetext_has_none() {
        let pgn = "[Result \"0-1\"]\n\n1. e4 e5\n";
        let set = parse_pgn(pgn.as_bytes(), &SubjectSelector::default()).unwrap();

        assert_eq!(set.get_record(0).unwrap().move_text, "1. e4 e5 0-1");
    }

    #[test]
    fn test_rebuilt_movetext_normalizes() {
        let set = parse_pgn(TWO_GAMES.as_bytes(), &SubjectSelector::default()).unwrap();
        let sequence = normalize(&set.get_record(0).unwrap().move_text).unwrap();

        assert_eq!(
            sequence.as_slice(),
            ["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]
        );
    }

    #[test]
    fn test_subject_selector_resolution() {
        let player = SubjectSelector::Player("Ann".to_string());
        assert_eq!(player.resolve(" ann ", "Bea"), Ok(Color::White));
        assert!(player.resolve("Ann", "Ann").is_err());
        assert_eq!(
            SubjectSelector::Color(Color::Black).resolve("", ""),
            Ok(Color::Black)
        );
    }
}
