//! The chess-engine collaborator.
//!
//! [`Engine`] is the seam between the collector and whatever produces
//! evaluations. [`UciEngine`] drives an external UCI binary such as
//! Stockfish; tests use the scripted engine in `mock`.

#[cfg(test)]
pub(crate) mod mock;
mod uci;

pub use uci::{UciConfig, UciEngine};

use crate::error::EngineError;
use crate::types::{EngineMove, Evaluation};

pub trait Engine {
    /// Set the position (FEN) that the following queries refer to.
    fn set_position(&mut self, fen: &str) -> Result<(), EngineError>;

    /// Evaluate the current position, from White's point of view.
    fn evaluate(&mut self) -> Result<Evaluation, EngineError>;

    /// The engine's `k` best moves in the current position, best first.
    /// Fewer are returned when the position has fewer legal moves.
    fn top_moves(&mut self, k: usize) -> Result<Vec<EngineMove>, EngineError>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        (**self).set_position(fen)
    }

    fn evaluate(&mut self) -> Result<Evaluation, EngineError> {
        (**self).evaluate()
    }

    fn top_moves(&mut self, k: usize) -> Result<Vec<EngineMove>, EngineError> {
        (**self).top_moves(k)
    }
}

impl<E: Engine + ?Sized> Engine for &mut E {
    fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        (**self).set_position(fen)
    }

    fn evaluate(&mut self) -> Result<Evaluation, EngineError> {
        (**self).evaluate()
    }

    fn top_moves(&mut self, k: usize) -> Result<Vec<EngineMove>, EngineError> {
        (**self).top_moves(k)
    }
}
