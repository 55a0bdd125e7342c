use anyhow::Result;
use gol_distributor::{Grid, ImageStore};
use tokio::sync::mpsc;

/// Reads commands from stdin on a plain thread; every character of a line
/// is one key press.
pub(super) fn forward_keys(keys: mpsc::Sender<char>) {
    std::thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            for key in line.trim().chars() {
                if keys.blocking_send(key).is_err() {
                    return;
                }
            }
        }
    });
}

/// Serves a seeded random field as the initial image, saves go to `inner`.
pub(super) struct SeededInput<S> {
    seed: u64,
    inner: S,
}

impl<S> SeededInput<S> {
    pub(super) fn new(seed: u64, inner: S) -> Self {
        Self { seed, inner }
    }
}

impl<S: ImageStore> ImageStore for SeededInput<S> {
    fn load(&mut self, _name: &str, height: usize, width: usize) -> Result<Vec<u8>> {
        Ok(Grid::random(height, width, Some(self.seed))
            .as_bytes()
            .to_vec())
    }

    fn save(&mut self, name: &str, height: usize, width: usize, cells: &[u8]) -> Result<()> {
        self.inner.save(name, height, width, cells)
    }
}
