use anyhow::{anyhow, Result};
use rand::{Rng, SeedableRng};
use std::ops::Range;

/// Byte value of an alive cell in the row-major stream format.
pub const ALIVE: u8 = 255;
/// Byte value of a dead cell in the row-major stream format.
pub const DEAD: u8 = 0;

/// Coordinates of a single cell: `x` is the column, `y` is the row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Toroidal field of `height x width` cells stored row by row.
///
/// Every byte is either [`ALIVE`] or [`DEAD`], which is exactly the format
/// the I/O collaborator reads and writes, so snapshots are plain copies of
/// the underlying buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    height: usize,
    width: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// Creates a field with all cells dead.
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            cells: vec![DEAD; height * width],
        }
    }

    /// Builds a field from a row-major stream of [`ALIVE`]/[`DEAD`] bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream length is not `height * width` or if
    /// it contains any other byte value.
    pub fn from_cells(height: usize, width: usize, cells: Vec<u8>) -> Result<Self> {
        if height.checked_mul(width) != Some(cells.len()) {
            return Err(anyhow!(
                "Expected {}x{} cells, got {} bytes",
                height,
                width,
                cells.len()
            ));
        }
        if let Some(pos) = cells.iter().position(|&c| c != ALIVE && c != DEAD) {
            return Err(anyhow!(
                "Invalid cell value {} at ({}, {})",
                cells[pos],
                pos % width,
                pos / width
            ));
        }
        Ok(Self {
            height,
            width,
            cells,
        })
    }

    /// Creates a randomly filled field, roughly half of the cells alive.
    ///
    /// * `seed` - Optional seed for the random number generator.
    ///   If None, seeds from the OS.
    pub fn random(height: usize, width: usize, seed: Option<u64>) -> Self {
        let mut cells = vec![0u8; height * width];
        if let Some(x) = seed {
            rand_chacha::ChaCha8Rng::seed_from_u64(x)
        } else {
            rand_chacha::ChaCha8Rng::from_os_rng()
        }
        .fill(&mut cells[..]);
        for c in cells.iter_mut() {
            *c = if *c & 1 == 1 { ALIVE } else { DEAD };
        }
        Self {
            height,
            width,
            cells,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_alive(&self, cell: Cell) -> bool {
        self.cells[cell.y * self.width + cell.x] == ALIVE
    }

    pub fn set(&mut self, cell: Cell, alive: bool) {
        self.cells[cell.y * self.width + cell.x] = if alive { ALIVE } else { DEAD };
    }

    /// Row `y` as a slice of `width` bytes.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    /// The whole field in the row-major stream format.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Coordinates of all alive cells in row-major order.
    pub fn alive_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == ALIVE)
            .map(|(i, _)| Cell::new(i % self.width, i / self.width))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    /// Computes the next generation of the rows in `rows` (B3/S23).
    ///
    /// The whole field is needed because neighbours wrap around both edges.
    /// Returns `rows.len() * width` bytes; `self` is never modified.
    ///
    /// `rows` must lie inside `0..height`, which is only checked in debug
    /// builds.
    pub fn next_rows(&self, rows: Range<usize>) -> Vec<u8> {
        debug_assert!(
            rows.start <= rows.end && rows.end <= self.height,
            "Rows {:?} are out of 0..{}",
            rows,
            self.height
        );
        let (h, w) = (self.height, self.width);
        let mut next = vec![DEAD; rows.len() * w];

        for (dy, y) in rows.enumerate() {
            let (up, down) = ((y + h - 1) % h, (y + 1) % h);
            let (row_up, row_curr, row_down) = (self.row(up), self.row(y), self.row(down));
            let dst = &mut next[dy * w..(dy + 1) * w];

            for x in 0..w {
                let (left, right) = ((x + w - 1) % w, (x + 1) % w);
                let neighbours = [
                    row_up[left],
                    row_up[x],
                    row_up[right],
                    row_curr[left],
                    row_curr[right],
                    row_down[left],
                    row_down[x],
                    row_down[right],
                ]
                .iter()
                .filter(|&&c| c == ALIVE)
                .count();

                dst[x] = match (row_curr[x] == ALIVE, neighbours) {
                    (true, 2) | (true, 3) | (false, 3) => ALIVE,
                    _ => DEAD,
                };
            }
        }
        next
    }

    /// Cells of the rows starting at `start` that differ from `rows`.
    pub fn diff_rows(&self, start: usize, rows: &[u8]) -> Vec<Cell> {
        let offset = start * self.width;
        self.cells[offset..offset + rows.len()]
            .iter()
            .zip(rows)
            .enumerate()
            .filter(|(_, (old, new))| old != new)
            .map(|(i, _)| Cell::new(i % self.width, start + i / self.width))
            .collect()
    }

    /// Overwrites the rows starting at `start` with `rows`.
    pub fn replace_rows(&mut self, start: usize, rows: &[u8]) {
        let offset = start * self.width;
        self.cells[offset..offset + rows.len()].copy_from_slice(rows);
    }
}
