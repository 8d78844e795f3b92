//! Static strided partitioning of dataset rows across workers.
//!
//! Worker `w` of `n` handles rows `w, w + n, w + 2n, ...`. Assignments are
//! pure functions of the configuration: a restarted worker gets exactly the
//! same rows back.

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    worker_count: usize,
    games_per_worker: usize,
}

impl Partition {
    pub fn new(worker_count: usize, games_per_worker: usize) -> Result<Self, ConfigError> {
        if worker_count == 0 {
            return Err(ConfigError::Invalid(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            worker_count,
            games_per_worker,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn games_per_worker(&self) -> usize {
        self.games_per_worker
    }

    /// Rows covered by all workers together, before clipping.
    pub fn span(&self) -> usize {
        self.worker_count.saturating_mul(self.games_per_worker)
    }

    /// Rows of `worker_id`, in processing order, limited to rows below
    /// `row_count` when given.
    pub fn indices(
        &self,
        worker_id: usize,
        row_count: Option<usize>,
    ) -> Result<Vec<usize>, ConfigError> {
        if worker_id >= self.worker_count {
            return Err(ConfigError::Invalid(format!(
                "worker_id {worker_id} is out of range for {} workers",
                self.worker_count
            )));
        }
        let limit = row_count.unwrap_or(usize::MAX);
        let stride = self.worker_count;

        Ok((0..self.games_per_worker)
            .map_while(|j| j.checked_mul(stride)?.checked_add(worker_id))
            .take_while(|&index| index < limit)
            .collect())
    }
}

/// Row indices for one worker; see [`Partition::indices`].
pub fn assignment(
    worker_id: usize,
    worker_count: usize,
    games_per_worker: usize,
) -> Result<Vec<usize>, ConfigError> {
    Partition::new(worker_count, games_per_worker)?.indices(worker_id, None)
}
