use shakmaty::Color;

use crate::engine::Engine;
use crate::error::GameError;
use crate::replay::replay;
use crate::types::{GameResult, PlyRecord};

/// Number of candidate moves requested on the subject's turns.
pub const DEFAULT_TOP_K: usize = 10;

/// Whether the subject is the side to move at `ply` (White moves on even
/// plies).
pub fn subject_to_move(ply: usize, subject: Color) -> bool {
    ply.is_multiple_of(2) == subject.is_white()
}

/// Query `engine` for every position of a game.
///
/// The whole sequence is replayed first, so an illegal move is reported
/// before any engine query is made. Then, in ply order, each position before
/// a move is evaluated, and on the subject's turns the engine's `top_k` best
/// moves are recorded as well. Any engine error fails the whole game.
pub fn collect<E, S>(
    engine: &mut E,
    sequence: &[S],
    subject: Color,
    top_k: usize,
) -> Result<GameResult, GameError>
where
    E: Engine + ?Sized,
    S: AsRef<str>,
{
    let replay = replay(sequence)?;
    let mut plies = Vec::with_capacity(replay.len());

    for ply in replay.plies {
        engine.set_position(&ply.fen_before)?;
        let evaluation = engine.evaluate()?;
        let top_candidates = if subject_to_move(ply.index, subject) {
            Some(engine.top_moves(top_k)?)
        } else {
            None
        };

        plies.push(PlyRecord {
            ply_index: ply.index,
            position: ply.fen_before,
            san: ply.san,
            evaluation,
            top_candidates,
        });
    }

    Ok(GameResult {
        subject_color: subject,
        plies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{Call, MockEngine};
    use crate::normalize::normalize;
    use crate::types::Evaluation;

    const GAME: &str = "1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O 1/2-1/2";

    fn candidate_plies(result: &GameResult) -> Vec<usize> {
        result
            .iter()
            .filter(|p| p.top_candidates.is_some())
            .map(|p| p.ply_index)
            .collect()
    }

    #[test]
    fn test_subject_to_move_parity() {
        assert!(subject_to_move(0, Color::White));
        assert!(!subject_to_move(1, Color::White));
        assert!(subject_to_move(1, Color::Black));
        assert!(!subject_to_move(4, Color::Black));
    }

    #[test]
    fn test_collect_white_subject_candidates_on_even_plies() {
        let sequence = normalize(GAME).unwrap();
        let mut engine = MockEngine::new();

        let result = collect(&mut engine, &sequence, Color::White, DEFAULT_TOP_K).unwrap();

        assert_eq!(result.len(), 9);
        assert_eq!(candidate_plies(&result), vec![0, 2, 4, 6, 8]);
        let indices: Vec<usize> = result.iter().map(|p| p.ply_index).collect();
        assert_eq!(indices, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_collect_black_subject_candidates_on_odd_plies() {
        let sequence = normalize(GAME).unwrap();
        let mut engine = MockEngine::new();

        let result = collect(&mut engine, &sequence, Color::Black, 3).unwrap();

        assert_eq!(candidate_plies(&result), vec![1, 3, 5, 7]);
        for ply in result.iter().filter_map(|p| p.top_candidates.as_ref()) {
            assert_eq!(ply.len(), 3);
        }
    }

    #[test]
    fn test_collect_queries_in_ply_order_before_each_move() {
        let sequence = normalize("1. e4 e5 0-1").unwrap();
        let mut engine = MockEngine::new();

        let result = collect(&mut engine, &sequence, Color::White, 2).unwrap();

        let start = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let after_e4 = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        assert_eq!(
            engine.calls,
            vec![
                Call::SetPosition(start.to_string()),
                Call::Evaluate,
                Call::TopMoves(2),
                Call::SetPosition(after_e4.to_string()),
                Call::Evaluate,
            ]
        );
        assert_eq!(result.plies[0].position, start);
        assert_eq!(result.plies[0].san, "e4");
        assert_eq!(result.plies[0].evaluation, Evaluation::Centipawns(20));
        assert_eq!(result.plies[1].position, after_e4);
    }

    #[test]
    fn test_collect_empty_game() {
        let sequence = normalize("1-0").unwrap();
        let mut engine = MockEngine::new();

        let result = collect(&mut engine, &sequence, Color::White, DEFAULT_TOP_K).unwrap();

        assert!(result.is_empty());
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn test_collect_illegal_move_makes_no_queries() {
        let sequence = normalize("1. e4 e5 2. Ke3 1-0").unwrap();
        let mut engine = MockEngine::new();

        let err = collect(&mut engine, &sequence, Color::White, DEFAULT_TOP_K).unwrap_err();

        assert!(matches!(err, GameError::IllegalMove { ply: 2, .. }));
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn test_collect_engine_failure_fails_game() {
        let sequence = normalize(GAME).unwrap();
        let mut engine = MockEngine::new().failing_at(4, false);

        let err = collect(&mut engine, &sequence, Color::White, DEFAULT_TOP_K).unwrap_err();

        assert!(matches!(err, GameError::EngineQuery(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_collect_candidates_capped_by_legal_moves() {
        let sequence = normalize("1. f3 e5 2. g4 Qh4# 0-1").unwrap();
        let mut engine = MockEngine::new();

        let result = collect(&mut engine, &sequence, Color::Black, 50).unwrap();

        let last = result.ply(3).unwrap();
        let Evaluation::Centipawns(legal) = last.evaluation else {
            panic!("mock engine reports centipawns");
        };
        assert_eq!(
            last.top_candidates.as_ref().map(Vec::len),
            Some(legal as usize)
        );
    }
}
