use crate::{Grid, Params};
use anyhow::{anyhow, Result};
use std::{ops::Range, sync::Arc};
use tokio::task::JoinHandle;

/// Splits `0..height` into `threads` contiguous row ranges.
///
/// Every range has `height / threads` rows except the last one, which also
/// takes the remainder. With more threads than rows the leading ranges are
/// empty, the tiling is still exact.
pub fn partition_rows(height: usize, threads: usize) -> Vec<Range<usize>> {
    let size = height / threads;
    (0..threads)
        .map(|i| {
            let start = i * size;
            let end = if i == threads - 1 { height } else { start + size };
            start..end
        })
        .collect()
}

/// Fan-out/fan-in executor of a single generation.
///
/// Tasks are spawned fresh for every turn and joined before the turn is
/// complete; nothing survives between turns.
pub struct WorkerPool {
    partitions: Vec<Range<usize>>,
}

impl WorkerPool {
    pub fn new(params: &Params) -> Self {
        Self {
            partitions: partition_rows(params.image_height, params.threads),
        }
    }

    pub fn partitions(&self) -> &[Range<usize>] {
        &self.partitions
    }

    /// Computes the next state of every partition, returned in partition order.
    ///
    /// With a single partition the work is done inline. Otherwise one tokio
    /// task per partition is spawned, all of them before the first join.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if any worker panicked; partial results are dropped.
    pub async fn step(&self, grid: Arc<Grid>) -> Result<Vec<Vec<u8>>> {
        if let [rows] = &self.partitions[..] {
            return Ok(vec![grid.next_rows(rows.clone())]);
        }

        let handles: Vec<JoinHandle<Vec<u8>>> = self
            .partitions
            .iter()
            .map(|rows| {
                let (grid, rows) = (Arc::clone(&grid), rows.clone());
                tokio::spawn(async move { grid.next_rows(rows) })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (i, handle) in handles.into_iter().enumerate() {
            let rows = handle
                .await
                .map_err(|e| anyhow!("Worker for rows {:?} failed: {}", self.partitions[i], e))?;
            results.push(rows);
        }
        Ok(results)
    }

    /// Computes the whole next generation of `grid`.
    pub async fn next_grid(&self, grid: Arc<Grid>) -> Result<Grid> {
        let (height, width) = (grid.height(), grid.width());
        let cells = self.step(grid).await?.concat();
        Grid::from_cells(height, width, cells)
    }
}
