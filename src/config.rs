//! Run configuration, read from TOML.
//!
//! Every field has a default, so an empty file (or none at all) is a valid
//! configuration apart from the dataset path.
//!
//! ```toml
//! [partition]
//! worker_count = 8
//! games_per_worker = 10000
//!
//! [engine]
//! path = "/usr/games/stockfish"
//! depth = 15
//! options = ["UCI_ShowWDL=false"]
//!
//! [output]
//! dir = "train"
//! compression = "zstd"
//!
//! [dataset]
//! path = "games/*.pgn.zst"
//! subject_player = "Alice"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collect::DEFAULT_TOP_K;
use crate::dataset::{DatasetFormat, DatasetSource, SubjectSelector};
use crate::engine::UciConfig;
use crate::error::ConfigError;
use crate::partition::Partition;
use crate::store::Compression;
use crate::types::parse_color;
use crate::worker::WorkerSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub partition: PartitionConfig,
    pub engine: EngineConfig,
    pub output: OutputConfig,
    pub dataset: DatasetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartitionConfig {
    /// Defaults to the number of available cores.
    pub worker_count: Option<usize>,
    /// Upper bound on the games a single worker takes on.
    pub games_per_worker: usize,
    /// Log progress every this many games; 0 disables it.
    pub report_interval: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            games_per_worker: 10_000,
            report_interval: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub depth: u32,
    pub hash_mb: u32,
    pub threads: usize,
    pub top_k: usize,
    /// Extra UCI options as `Name=Value`.
    pub options: Vec<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let uci = UciConfig::default();
        Self {
            path: uci.path,
            args: uci.args,
            depth: uci.depth,
            hash_mb: uci.hash_mb,
            threads: uci.threads,
            top_k: DEFAULT_TOP_K,
            options: uci.options,
            timeout_secs: uci.timeout.as_secs(),
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub compression: Compression,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            compression: Compression::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// File path or glob pattern.
    pub path: Option<String>,
    pub format: Option<DatasetFormat>,
    pub compression: Compression,
    /// PGN only: fixed subject side (`white`/`black`).
    pub subject_color: Option<String>,
    /// PGN only: the subject is whichever side this player had.
    pub subject_player: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition.worker_count == Some(0) {
            return Err(ConfigError::Invalid(
                "partition.worker_count must be at least 1".to_string(),
            ));
        }
        if self.engine.depth == 0 {
            return Err(ConfigError::Invalid(
                "engine.depth must be at least 1".to_string(),
            ));
        }
        if self.engine.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "engine.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.dataset.subject_color.is_some() && self.dataset.subject_player.is_some() {
            return Err(ConfigError::Invalid(
                "set only one of dataset.subject_color and dataset.subject_player".to_string(),
            ));
        }
        self.subject_selector()?;
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.partition.worker_count.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn partition(&self) -> Result<Partition, ConfigError> {
        Partition::new(self.worker_count(), self.partition.games_per_worker)
    }

    pub fn uci_config(&self) -> UciConfig {
        UciConfig {
            path: self.engine.path.clone(),
            args: self.engine.args.clone(),
            depth: self.engine.depth,
            hash_mb: self.engine.hash_mb,
            threads: self.engine.threads,
            options: self.engine.options.clone(),
            timeout: Duration::from_secs(self.engine.timeout_secs),
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            top_k: self.engine.top_k,
            retries: self.engine.retries,
        }
    }

    pub fn subject_selector(&self) -> Result<SubjectSelector, ConfigError> {
        if let Some(player) = &self.dataset.subject_player {
            return Ok(SubjectSelector::Player(player.clone()));
        }
        match &self.dataset.subject_color {
            Some(raw) => parse_color(raw).map(SubjectSelector::Color).ok_or_else(|| {
                ConfigError::Invalid(format!("dataset.subject_color: unknown colour '{raw}'"))
            }),
            None => Ok(SubjectSelector::default()),
        }
    }

    pub fn dataset_source(&self) -> Result<DatasetSource, ConfigError> {
        let pattern = self
            .dataset
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("dataset.path is not set".to_string()))?;
        Ok(DatasetSource {
            pattern,
            format: self.dataset.format,
            compression: self.dataset.compression,
            subject: self.subject_selector()?,
        })
    }
}
