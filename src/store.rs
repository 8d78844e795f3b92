//! Write-once storage of finished games, keyed by dataset row.
//!
//! [`DirStore`] keeps one file per game, `game<row>.json` (or
//! `game<row>.json.zst`), holding a versioned [`StoredGame`] envelope. Files
//! are written to a temporary name in the same directory and then linked
//! into place without overwriting, so a file only ever appears complete and
//! an existing result is never replaced. Temporary files left behind by an
//! interrupted writer are removed the next time the store is opened for
//! writing.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::error::StoreError;
use crate::types::GameResult;

pub const FORMAT_VERSION: u32 = 1;

const FILE_PREFIX: &str = "game";
const PLAIN_SUFFIX: &str = ".json";
const ZSTD_SUFFIX: &str = ".json.zst";
const ZSTD_LEVEL: i32 = 3;
const TEMP_PREFIX: &str = ".game-tmp";

pub trait OutputStore: Sync {
    fn exists(&self, index: usize) -> Result<bool, StoreError>;

    /// Persist the result for `index`. Fails with
    /// [`StoreError::AlreadyExists`] if one is already stored.
    fn write(&self, index: usize, result: &GameResult) -> Result<(), StoreError>;

    fn read(&self, index: usize) -> Result<Option<StoredGame>, StoreError>;
}

/// On-disk record of one finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredGame {
    pub format_version: u32,
    pub game_index: usize,
    #[serde(with = "crate::types::color_name")]
    pub subject_color: Color,
    /// RFC 3339 UTC timestamp.
    pub completed_at: String,
    pub result: GameResult,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

impl Compression {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim();
        if normalized.is_empty() || normalized.eq_ignore_ascii_case("none") {
            Ok(Self::None)
        } else if normalized.eq_ignore_ascii_case("zstd") {
            Ok(Self::Zstd)
        } else {
            Err(format!(
                "Invalid compression value '{}'. Supported values: 'zstd' or 'none'.",
                normalized
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
    compression: Compression,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `dir` for writing.
    ///
    /// Must not be called while another process writes to the same
    /// directory, since its in-flight temporary files would be removed.
    pub fn open(dir: impl Into<PathBuf>, compression: Compression) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        remove_stale_temp_files(&dir)?;
        Ok(Self { dir, compression })
    }

    /// Open a store for inspection only. Nothing is created or removed; a
    /// missing directory reads as an empty store.
    pub fn open_existing(dir: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            dir: dir.into(),
            compression,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a new result for `index` is written to.
    pub fn path_for(&self, index: usize) -> PathBuf {
        match self.compression {
            Compression::None => self.plain_path(index),
            Compression::Zstd => self.zstd_path(index),
        }
    }

    fn plain_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{index}{PLAIN_SUFFIX}"))
    }

    fn zstd_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{index}{ZSTD_SUFFIX}"))
    }

    /// Existing file for `index`, in either encoding.
    fn existing_path(&self, index: usize) -> Result<Option<PathBuf>, StoreError> {
        for path in [self.plain_path(index), self.zstd_path(index)] {
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => return Ok(Some(path)),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Rows that already have a stored result.
    pub fn completed(&self) -> Result<BTreeSet<usize>, StoreError> {
        let escaped = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = Path::new(&escaped).join(format!("{FILE_PREFIX}*{PLAIN_SUFFIX}*"));
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .and_then(index_from_file_name)
            })
            .collect())
    }
}

fn remove_stale_temp_files(dir: &Path) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let stale = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(TEMP_PREFIX));
        if stale {
            warn!("removing unfinished write {}", entry.path().display());
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn index_from_file_name(name: &str) -> Option<usize> {
    let rest = name.strip_prefix(FILE_PREFIX)?;
    let digits = rest
        .strip_suffix(ZSTD_SUFFIX)
        .or_else(|| rest.strip_suffix(PLAIN_SUFFIX))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl OutputStore for DirStore {
    fn exists(&self, index: usize) -> Result<bool, StoreError> {
        Ok(self.existing_path(index)?.is_some())
    }

    fn write(&self, index: usize, result: &GameResult) -> Result<(), StoreError> {
        if self.exists(index)? {
            return Err(StoreError::AlreadyExists { index });
        }

        let record = StoredGame {
            format_version: FORMAT_VERSION,
            game_index: index,
            subject_color: result.subject_color,
            completed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            result: result.clone(),
        };
        let json = serde_json::to_vec(&record)?;
        let bytes = match self.compression {
            Compression::None => json,
            Compression::Zstd => zstd::stream::encode_all(json.as_slice(), ZSTD_LEVEL)?,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(self.path_for(index))
            .map_err(|e| match e.error.kind() {
                io::ErrorKind::AlreadyExists => StoreError::AlreadyExists { index },
                _ => StoreError::Io(e.error),
            })?;
        Ok(())
    }

    fn read(&self, index: usize) -> Result<Option<StoredGame>, StoreError> {
        let Some(path) = self.existing_path(index)? else {
            return Ok(None);
        };

        let raw = fs::read(&path)?;
        let json = if path.to_string_lossy().ends_with(ZSTD_SUFFIX) {
            zstd::stream::decode_all(raw.as_slice())?
        } else {
            raw
        };

        let record: StoredGame = serde_json::from_slice(&json)?;
        if record.format_version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                index,
                version: record.format_version,
            });
        }
        Ok(Some(record))
    }
}
