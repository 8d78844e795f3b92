use shakmaty::{CastlingMode, Chess, EnPassantMode, Position, fen::Fen, san::SanPlus};

use crate::error::GameError;

/// One half-move of a replayed game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ply {
    pub index: usize,
    /// The move as it appeared in the sequence.
    pub san: String,
    pub uci: String,
    /// Position before the move.
    pub fen_before: String,
}

/// Result of replaying a full move sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub plies: Vec<Ply>,
    /// Position after the last move.
    pub final_fen: String,
}

impl Replay {
    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }
}

pub fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Replay SAN tokens from the standard initial position. The first token
/// that does not parse or is not legal aborts the replay.
pub fn replay<S: AsRef<str>>(sequence: &[S]) -> Result<Replay, GameError> {
    let mut pos = Chess::default();
    let mut plies = Vec::with_capacity(sequence.len());

    for (index, token) in sequence.iter().enumerate() {
        let token = token.as_ref();
        let illegal = |reason: String| GameError::IllegalMove {
            ply: index,
            token: token.to_string(),
            reason,
        };

        let san: SanPlus = token.parse().map_err(|e| illegal(format!("{e}")))?;
        let m = san.san.to_move(&pos).map_err(|e| illegal(format!("{e}")))?;

        plies.push(Ply {
            index,
            san: token.to_string(),
            uci: m.to_uci(CastlingMode::Standard).to_string(),
            fen_before: fen_of(&pos),
        });
        pos.play_unchecked(m);
    }

    Ok(Replay {
        plies,
        final_fen: fen_of(&pos),
    })
}
