//! Engine-annotated training data from recorded chess games.
//!
//! Each game is normalized to a SAN move sequence, replayed to recover the
//! position before every move, and evaluated by a UCI engine. On the
//! subject player's turns the engine's best candidate moves are recorded as
//! well. Results are written once per game to an [`store::OutputStore`], so
//! an interrupted run resumes where it left off.

pub mod collect;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod log;
pub mod normalize;
pub mod partition;
pub mod pool;
pub mod replay;
pub mod store;
pub mod types;
pub mod worker;

pub use collect::collect;
pub use config::Config;
pub use dataset::{Dataset, RecordSet};
pub use engine::{Engine, UciConfig, UciEngine};
pub use error::{ConfigError, DatasetError, EngineError, GameError, StoreError};
pub use normalize::normalize;
pub use partition::{Partition, assignment};
pub use pool::{PoolSummary, run_pool};
pub use replay::replay;
pub use store::{DirStore, OutputStore};
pub use types::{Evaluation, GameRecord, GameResult, MoveSequence, PlyRecord};
