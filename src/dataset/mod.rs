//! Row-indexed, read-only access to the input games.
//!
//! A dataset is loaded once, up front, into a [`RecordSet`]. Rows that could
//! not be decoded keep their slot so that row indices (and therefore worker
//! assignments and store keys) do not shift; asking for such a row yields
//! [`GameError::MalformedRecord`].

mod jsonl;
mod pgn;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::error::{DatasetError, GameError};
use crate::store::Compression;
use crate::types::GameRecord;

pub use jsonl::parse_json_lines;
pub use pgn::{SubjectSelector, parse_pgn};

pub trait Dataset: Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_record(&self, index: usize) -> Result<GameRecord, GameError>;
}

/// In-memory dataset; each row is a record or the reason it is unusable.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    rows: Vec<Result<GameRecord, String>>,
}

impl RecordSet {
    pub fn new(rows: Vec<Result<GameRecord, String>>) -> Self {
        Self { rows }
    }

    pub fn from_records(records: impl IntoIterator<Item = GameRecord>) -> Self {
        Self {
            rows: records.into_iter().map(Ok).collect(),
        }
    }

    /// Number of rows that could not be decoded.
    pub fn malformed_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_err()).count()
    }

    fn extend(&mut self, other: RecordSet) {
        self.rows.extend(other.rows);
    }
}

impl Dataset for RecordSet {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn get_record(&self, index: usize) -> Result<GameRecord, GameError> {
        match self.rows.get(index) {
            Some(Ok(record)) => Ok(record.clone()),
            Some(Err(reason)) => Err(GameError::malformed(reason.clone())),
            None => Err(GameError::RecordNotFound { index }),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[serde(alias = "jsonl", alias = "ndjson")]
    JsonLines,
    Pgn,
}

impl DatasetFormat {
    /// Infer the format from a file name, looking through a `.zst` suffix.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".zst").unwrap_or(&name);
        if name.ends_with(".pgn") {
            Some(Self::Pgn)
        } else if name.ends_with(".jsonl") || name.ends_with(".ndjson") || name.ends_with(".json")
        {
            Some(Self::JsonLines)
        } else {
            None
        }
    }
}

/// Where and how to load a dataset from.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    /// A file path or a glob pattern.
    pub pattern: String,
    /// Inferred from the first file name when `None`.
    pub format: Option<DatasetFormat>,
    /// `Zstd` forces decompression; otherwise `.zst` files are detected by
    /// name.
    pub compression: Compression,
    /// Only used for PGN input.
    pub subject: SubjectSelector,
}

/// Expand a path or glob pattern into a sorted list of files.
pub fn expand_paths(pattern: &str) -> Result<Vec<PathBuf>, DatasetError> {
    let mut paths: Vec<PathBuf> = if pattern.contains(['*', '?', '[']) {
        glob::glob(pattern)?.filter_map(|entry| entry.ok()).collect()
    } else {
        vec![PathBuf::from(pattern)]
    };
    paths.sort();

    if paths.is_empty() {
        return Err(DatasetError::NoInput(pattern.to_string()));
    }
    Ok(paths)
}

type DatasetInput = Box<dyn Read>;

fn open_input(path: &Path, compression: Compression) -> Result<DatasetInput, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let zstd = compression == Compression::Zstd
        || path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zst"));
    if zstd {
        let decoder = ZstdDecoder::new(file).map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(decoder))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Load every file matched by `source`, in path order, into one dataset.
pub fn load(source: &DatasetSource) -> Result<RecordSet, DatasetError> {
    let paths = expand_paths(&source.pattern)?;
    let format = match source.format {
        Some(format) => format,
        None => DatasetFormat::from_path(&paths[0])
            .ok_or_else(|| DatasetError::UnknownFormat(paths[0].display().to_string()))?,
    };

    let mut records = RecordSet::default();
    for path in &paths {
        let input = open_input(path, source.compression)?;
        let read_error = |source| DatasetError::Read {
            path: path.clone(),
            source,
        };
        let loaded = match format {
            DatasetFormat::JsonLines => parse_json_lines(input).map_err(read_error)?,
            DatasetFormat::Pgn => parse_pgn(input, &source.subject).map_err(read_error)?,
        };
        debug!("{}: {} rows", path.display(), loaded.len());
        records.extend(loaded);
    }

    info!(
        "Loaded {} games from {} file(s) ({} malformed)",
        records.len(),
        paths.len(),
        records.malformed_count()
    );
    Ok(records)
}
