//! Scripted in-process engine for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use shakmaty::{CastlingMode, Chess, Position, fen::Fen};

use super::Engine;
use crate::error::EngineError;
use crate::types::{EngineMove, Evaluation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetPosition(String),
    Evaluate,
    TopMoves(usize),
}

/// Evaluates a position as its number of legal moves and ranks moves in
/// generation order. Every call is logged, and evaluate/top_moves queries
/// are counted on a shared counter.
#[derive(Default)]
pub struct MockEngine {
    position: Option<Chess>,
    pub calls: Vec<Call>,
    queries: Arc<AtomicUsize>,
    local_queries: usize,
    fail_at: Option<(usize, bool)>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter(queries: Arc<AtomicUsize>) -> Self {
        Self {
            queries,
            ..Self::default()
        }
    }

    /// Make the query with this 0-based number fail, fatally or not.
    pub fn failing_at(mut self, query: usize, fatal: bool) -> Self {
        self.fail_at = Some((query, fatal));
        self
    }

    fn query(&mut self) -> Result<&Chess, EngineError> {
        let n = self.local_queries;
        self.local_queries += 1;
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some((at, fatal)) = self.fail_at
            && at == n
        {
            return Err(if fatal {
                EngineError::Exited("mock".to_string())
            } else {
                EngineError::Protocol("scripted failure".to_string())
            });
        }
        self.position.as_ref().ok_or(EngineError::NoPosition)
    }
}

impl Engine for MockEngine {
    fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        self.calls.push(Call::SetPosition(fen.to_string()));
        let invalid = |reason: String| EngineError::InvalidPosition {
            fen: fen.to_string(),
            reason,
        };
        let parsed: Fen = fen.parse().map_err(|e| invalid(format!("{e}")))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;
        self.position = Some(pos);
        Ok(())
    }

    fn evaluate(&mut self) -> Result<Evaluation, EngineError> {
        self.calls.push(Call::Evaluate);
        let pos = self.query()?;
        Ok(Evaluation::Centipawns(pos.legal_moves().len() as i32))
    }

    fn top_moves(&mut self, k: usize) -> Result<Vec<EngineMove>, EngineError> {
        self.calls.push(Call::TopMoves(k));
        let pos = self.query()?;
        Ok(pos
            .legal_moves()
            .iter()
            .take(k)
            .map(|m| EngineMove {
                uci: m.to_uci(CastlingMode::Standard).to_string(),
                evaluation: Evaluation::Centipawns(0),
            })
            .collect())
    }
}
