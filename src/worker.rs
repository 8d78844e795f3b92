//! One worker: an engine handle driving its assigned rows to the store.

use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use crate::collect::{DEFAULT_TOP_K, collect};
use crate::dataset::Dataset;
use crate::engine::Engine;
use crate::error::GameError;
use crate::normalize::normalize;
use crate::store::OutputStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub top_k: usize,
    /// Extra attempts for a game after a non-fatal engine error.
    pub retries: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Written { plies: usize, elapsed: Duration },
    /// A result was already stored.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Finished {
        worker_id: usize,
        index: usize,
        outcome: GameOutcome,
    },
    Failed {
        worker_id: usize,
        index: usize,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub processed: usize,
    pub skipped: usize,
    /// Row index and error message of every game that failed.
    pub failed: Vec<(usize, String)>,
    /// Set when the worker stopped early.
    pub fatal: Option<String>,
}

pub struct Worker<'a, E, D: ?Sized, S: ?Sized> {
    id: usize,
    engine: E,
    dataset: &'a D,
    store: &'a S,
    settings: WorkerSettings,
}

impl<'a, E, D, S> Worker<'a, E, D, S>
where
    E: Engine,
    D: Dataset + ?Sized,
    S: OutputStore + ?Sized,
{
    pub fn new(
        id: usize,
        engine: E,
        dataset: &'a D,
        store: &'a S,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            engine,
            dataset,
            store,
            settings,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Process one row, unless the store already has its result.
    pub fn process_game(&mut self, index: usize) -> Result<GameOutcome, GameError> {
        if self.store.exists(index)? {
            debug!("worker {}: game {index} already stored, skipping", self.id);
            return Ok(GameOutcome::Skipped);
        }

        let start = Instant::now();
        let record = self.dataset.get_record(index)?;
        let sequence = normalize(&record.move_text)?;
        debug!(
            "worker {}: game {index} started ({} plies)",
            self.id,
            sequence.len()
        );

        let mut attempt = 0;
        let result = loop {
            match collect(
                &mut self.engine,
                &sequence,
                record.subject_color,
                self.settings.top_k,
            ) {
                Err(GameError::EngineQuery(e))
                    if !e.is_fatal() && attempt < self.settings.retries =>
                {
                    attempt += 1;
                    warn!(
                        "worker {}: game {index} attempt {attempt} failed ({e}), restarting",
                        self.id
                    );
                }
                other => break other?,
            }
        };

        self.store.write(index, &result)?;
        Ok(GameOutcome::Written {
            plies: result.len(),
            elapsed: start.elapsed(),
        })
    }

    /// Process `indices` in order. Per-game errors are logged and counted;
    /// a fatal error stops the worker.
    pub fn run(
        &mut self,
        indices: &[usize],
        progress: Option<&Sender<ProgressEvent>>,
    ) -> WorkerReport {
        let mut report = WorkerReport {
            worker_id: self.id,
            ..WorkerReport::default()
        };

        for &index in indices {
            match self.process_game(index) {
                Ok(outcome) => {
                    match outcome {
                        GameOutcome::Written { plies, elapsed } => {
                            report.processed += 1;
                            info!(
                                "worker {}: game {index} done, {plies} plies in {:.1}s",
                                self.id,
                                elapsed.as_secs_f64()
                            );
                        }
                        GameOutcome::Skipped => report.skipped += 1,
                    }
                    if let Some(tx) = progress {
                        let _ = tx.send(ProgressEvent::Finished {
                            worker_id: self.id,
                            index,
                            outcome,
                        });
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("worker {}: stopping at game {index}: {e}", self.id);
                    report.fatal = Some(format!("game {index}: {e}"));
                    break;
                }
                Err(e) => {
                    warn!("worker {}: game {index} failed: {e}", self.id);
                    if let Some(tx) = progress {
                        let _ = tx.send(ProgressEvent::Failed {
                            worker_id: self.id,
                            index,
                            error: e.to_string(),
                        });
                    }
                    report.failed.push((index, e.to_string()));
                }
            }
        }
        report
    }
}
