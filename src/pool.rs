//! Fixed pool of worker threads, each owning one engine.

use std::thread;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::dataset::Dataset;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::partition::Partition;
use crate::store::OutputStore;
use crate::worker::{GameOutcome, ProgressEvent, Worker, WorkerReport, WorkerSettings};

#[derive(Debug, Clone, Default)]
pub struct PoolSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<(usize, String)>,
    /// Workers that stopped early, with the reason.
    pub fatal_workers: Vec<(usize, String)>,
    pub elapsed: Duration,
}

impl PoolSummary {
    fn absorb(&mut self, report: WorkerReport) {
        self.processed += report.processed;
        self.skipped += report.skipped;
        self.failed.extend(report.failed);
        if let Some(reason) = report.fatal {
            self.fatal_workers.push((report.worker_id, reason));
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.fatal_workers.is_empty()
    }
}

/// Run every worker of `partition` to completion.
///
/// Each worker thread starts its own engine with `spawn_engine(worker_id)`
/// and drops it when done. The calling thread only collects progress events
/// and logs a line every `report_interval` games (never when 0).
pub fn run_pool<E, D, S, F>(
    partition: &Partition,
    dataset: &D,
    store: &S,
    settings: WorkerSettings,
    spawn_engine: F,
    report_interval: usize,
) -> PoolSummary
where
    E: Engine,
    D: Dataset + ?Sized,
    S: OutputStore + ?Sized,
    F: Fn(usize) -> Result<E, EngineError> + Sync,
{
    let start = Instant::now();
    let row_count = dataset.len();
    let assignments: Vec<Vec<usize>> = (0..partition.worker_count())
        .map(|id| partition.indices(id, Some(row_count)).unwrap_or_default())
        .collect();
    let total: usize = assignments.iter().map(Vec::len).sum();
    info!(
        "Starting {} workers on {total} of {row_count} games",
        partition.worker_count()
    );

    let spawn_engine = &spawn_engine;
    let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
    let mut summary = PoolSummary::default();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(assignments.len());
        for (worker_id, indices) in assignments.iter().enumerate() {
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("worker{worker_id}"))
                .spawn_scoped(scope, move || {
                    let engine = match spawn_engine(worker_id) {
                        Ok(engine) => engine,
                        Err(e) => {
                            error!("worker {worker_id}: engine failed to start: {e}");
                            return WorkerReport {
                                worker_id,
                                fatal: Some(format!("engine failed to start: {e}")),
                                ..WorkerReport::default()
                            };
                        }
                    };
                    let mut worker = Worker::new(worker_id, engine, dataset, store, settings);
                    worker.run(indices, Some(&tx))
                });
            match spawned {
                Ok(handle) => handles.push((worker_id, handle)),
                Err(e) => summary
                    .fatal_workers
                    .push((worker_id, format!("thread spawn failed: {e}"))),
            }
        }
        drop(tx);

        let mut done = 0usize;
        let mut written = 0usize;
        for event in rx.iter() {
            done += 1;
            if let ProgressEvent::Finished {
                outcome: GameOutcome::Written { .. },
                ..
            } = event
            {
                written += 1;
            }
            if report_interval > 0 && done.is_multiple_of(report_interval) {
                info!(
                    "progress: {done}/{total} games handled, {written} written, {:.0}s elapsed",
                    start.elapsed().as_secs_f64()
                );
            }
        }

        for (worker_id, handle) in handles {
            match handle.join() {
                Ok(report) => summary.absorb(report),
                Err(_) => summary
                    .fatal_workers
                    .push((worker_id, "worker panicked".to_string())),
            }
        }
    });

    summary.elapsed = start.elapsed();
    info!(
        "Finished: {} written, {} skipped, {} failed, {} workers stopped early in {:.1}s",
        summary.processed,
        summary.skipped,
        summary.failed.len(),
        summary.fatal_workers.len(),
        summary.elapsed.as_secs_f64()
    );
    summary
}
