//! Error types for the data-preparation pipeline.
//!
//! [`GameError`] is the per-game error: every variant except the fatal
//! engine and store failures only costs the game it was raised for, and the
//! worker moves on to its next assigned row. The remaining enums describe
//! failures of the collaborators (engine process, output store, dataset
//! loading, configuration).

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GameError {
    /// The record cannot be turned into a move sequence (no result marker,
    /// undecodable row, unknown colour).
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// A move token failed to parse or is illegal in the replayed position.
    #[error("illegal move '{token}' at ply {ply}: {reason}")]
    IllegalMove {
        ply: usize,
        token: String,
        reason: String,
    },

    #[error("engine query failed: {0}")]
    EngineQuery(#[from] EngineError),

    #[error("no record at row {index}")]
    RecordNotFound { index: usize },

    #[error("output store error: {0}")]
    Store(#[from] StoreError),
}

impl GameError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Whether the error ends the worker rather than just the current game.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::EngineQuery(e) => e.is_fatal(),
            Self::Store(_) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine at {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("engine I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}: engine exited unexpectedly")]
    Exited(String),

    #[error("{label}: no answer within {timeout:?}")]
    Timeout { label: String, timeout: Duration },

    #[error("unparsable engine output: {0}")]
    Protocol(String),

    #[error("invalid position '{fen}': {reason}")]
    InvalidPosition { fen: String, reason: String },

    #[error("no position has been set")]
    NoPosition,
}

impl EngineError {
    /// A fatal error means the engine process is gone or its pipes are
    /// broken; the handle cannot serve further queries.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Io(_) | Self::Exited(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("output store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode or decode a stored game: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("a result for game {index} already exists")]
    AlreadyExists { index: usize },

    #[error("game {index} was stored with unsupported format version {version}")]
    UnsupportedVersion { index: usize, version: u32 },
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid path pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no input files match '{0}'")]
    NoInput(String),

    #[error("cannot infer the dataset format of '{0}'; set it explicitly")]
    UnknownFormat(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Collects diagnostics for a single record, joined with `"; "`.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator(Option<String>);

impl ErrorAccumulator {
    pub fn push(&mut self, msg: &str) {
        match &mut self.0 {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(msg);
            }
            None => {
                self.0 = Some(msg.to_string());
            }
        }
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}
