//! The I/O collaborator: a long-lived task that loads the initial image and
//! stores snapshots, one command at a time.
//!
//! Commands are processed strictly in the order they were sent, so once a
//! [`IoCommand::CheckIdle`] is answered every earlier snapshot is durable.

use crate::Grid;
use ahash::AHashMap as HashMap;
use anyhow::{anyhow, Context, Result};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Storage backend of the I/O collaborator.
///
/// Images are addressed by name (see [`Params::input_name`](crate::Params::input_name)
/// and [`Params::output_name`](crate::Params::output_name)) and carried as
/// row-major [`ALIVE`](crate::ALIVE)/[`DEAD`](crate::DEAD) bytes.
pub trait ImageStore: Send + 'static {
    /// Reads the image `name`, which must be `height x width`.
    fn load(&mut self, name: &str, height: usize, width: usize) -> Result<Vec<u8>>;

    /// Writes `cells` as the image `name`, replacing any previous one.
    fn save(&mut self, name: &str, height: usize, width: usize, cells: &[u8]) -> Result<()>;
}

pub enum IoCommand {
    LoadInput {
        name: String,
        height: usize,
        width: usize,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    SaveOutput {
        name: String,
        height: usize,
        width: usize,
        cells: Vec<u8>,
    },
    /// Answered after every previous command is done. Carries the first
    /// error of any earlier `SaveOutput`.
    CheckIdle { reply: oneshot::Sender<Result<()>> },
}

/// Cloneable sender side of the I/O collaborator.
#[derive(Clone)]
pub struct IoHandle {
    commands: mpsc::UnboundedSender<IoCommand>,
}

impl IoHandle {
    /// Wraps a raw command queue, for collaborators other than [`spawn_io`].
    pub fn new(commands: mpsc::UnboundedSender<IoCommand>) -> Self {
        Self { commands }
    }

    fn send(&self, command: IoCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("I/O collaborator has stopped"))
    }

    /// Loads the initial image and validates its contents.
    pub async fn load_input(&self, name: &str, height: usize, width: usize) -> Result<Grid> {
        let (reply, response) = oneshot::channel();
        self.send(IoCommand::LoadInput {
            name: name.to_owned(),
            height,
            width,
            reply,
        })?;
        let cells = response
            .await
            .map_err(|_| anyhow!("I/O collaborator dropped the request for {}", name))??;
        Grid::from_cells(height, width, cells).with_context(|| format!("Malformed image {}", name))
    }

    /// Queues a snapshot of `grid`. Returns as soon as the bytes are queued.
    pub fn save_output(&self, name: &str, grid: &Grid) -> Result<()> {
        self.send(IoCommand::SaveOutput {
            name: name.to_owned(),
            height: grid.height(),
            width: grid.width(),
            cells: grid.as_bytes().to_vec(),
        })
    }

    /// Waits until all queued snapshots are written.
    ///
    /// Fails with the first save error since the previous check.
    pub async fn check_idle(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(IoCommand::CheckIdle { reply })?;
        response
            .await
            .map_err(|_| anyhow!("I/O collaborator dropped the idle check"))?
    }
}

/// Starts the I/O collaborator on the blocking pool of the current runtime.
///
/// The task stops once every [`IoHandle`] is dropped.
pub fn spawn_io<S: ImageStore>(mut store: S) -> (IoHandle, JoinHandle<()>) {
    let (commands, mut queue) = mpsc::unbounded_channel();
    let task = tokio::task::spawn_blocking(move || {
        let mut save_error: Option<anyhow::Error> = None;
        while let Some(command) = queue.blocking_recv() {
            match command {
                IoCommand::LoadInput {
                    name,
                    height,
                    width,
                    reply,
                } => {
                    let _ = reply.send(store.load(&name, height, width));
                }
                IoCommand::SaveOutput {
                    name,
                    height,
                    width,
                    cells,
                } => {
                    if let Err(e) = store.save(&name, height, width, &cells) {
                        tracing::error!("Failed to save {}: {:#}", name, e);
                        save_error.get_or_insert(e);
                    }
                }
                IoCommand::CheckIdle { reply } => {
                    let _ = reply.send(save_error.take().map_or(Ok(()), Err));
                }
            }
        }
    });
    (IoHandle { commands }, task)
}

/// Binary PGM (`P5`) files: `{input_dir}/{name}.pgm` in, `{output_dir}/{name}.pgm` out.
pub struct PgmDirectory {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl PgmDirectory {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Next whitespace-separated header token, skipping `#` comments.
    fn next_token<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
        loop {
            match data.get(*pos) {
                Some(b'#') => {
                    while data.get(*pos).is_some_and(|&c| c != b'\n') {
                        *pos += 1;
                    }
                }
                Some(c) if c.is_ascii_whitespace() => *pos += 1,
                Some(_) => break,
                None => return Err(anyhow!("Unexpected end of PGM header")),
            }
        }
        let start = *pos;
        while data.get(*pos).is_some_and(|c| !c.is_ascii_whitespace()) {
            *pos += 1;
        }
        Ok(&data[start..*pos])
    }

    fn parse(data: &[u8], height: usize, width: usize) -> Result<Vec<u8>> {
        let mut pos = 0;
        let mut fields = [0usize; 3];

        let magic = Self::next_token(data, &mut pos)?;
        if magic != b"P5" {
            return Err(anyhow!(
                "Not a binary PGM, magic is {:?}",
                String::from_utf8_lossy(magic)
            ));
        }
        for field in fields.iter_mut() {
            let token = Self::next_token(data, &mut pos)?;
            *field = std::str::from_utf8(token)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    anyhow!("Invalid PGM header field {:?}", String::from_utf8_lossy(token))
                })?;
        }
        let [w, h, maxval] = fields;
        if (h, w) != (height, width) {
            return Err(anyhow!(
                "Image is {}x{}, expected {}x{}",
                h,
                w,
                height,
                width
            ));
        }
        if maxval != 255 {
            return Err(anyhow!("Unsupported PGM maxval {}", maxval));
        }

        // exactly one whitespace byte separates the header from the raster
        let raster = data.get(pos + 1..).unwrap_or_default();
        if raster.len() != h * w {
            return Err(anyhow!(
                "PGM raster has {} bytes, expected {}",
                raster.len(),
                h * w
            ));
        }
        Ok(raster.to_vec())
    }
}

impl ImageStore for PgmDirectory {
    fn load(&mut self, name: &str, height: usize, width: usize) -> Result<Vec<u8>> {
        let path = self.input_dir.join(format!("{}.pgm", name));
        let data = fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
        Self::parse(&data, height, width).with_context(|| format!("Failed to parse {:?}", path))
    }

    fn save(&mut self, name: &str, height: usize, width: usize, cells: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create {:?}", self.output_dir))?;
        let path = self.output_dir.join(format!("{}.pgm", name));
        let mut data = format!("P5\n{} {}\n255\n", width, height).into_bytes();
        data.extend_from_slice(cells);
        fs::write(&path, data).with_context(|| format!("Failed to write {:?}", path))
    }
}

/// In-memory store; clones share the same images.
#[derive(Clone, Default)]
pub struct MemoryStore {
    images: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, grid: &Grid) {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), grid.as_bytes().to_vec());
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all stored images, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl ImageStore for MemoryStore {
    fn load(&mut self, name: &str, height: usize, width: usize) -> Result<Vec<u8>> {
        let cells = self
            .get(name)
            .ok_or_else(|| anyhow!("No image named {}", name))?;
        if cells.len() != height * width {
            return Err(anyhow!("Image {} is not {}x{}", name, height, width));
        }
        Ok(cells)
    }

    fn save(&mut self, name: &str, _height: usize, _width: usize, cells: &[u8]) -> Result<()> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), cells.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cell, ALIVE};
    use serial_test::serial;
    const SEED: u64 = 42;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gol_distributor_{}", name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_parse_with_comment() {
        let mut data = b"P5\n# made by hand\n3 2\n255\n".to_vec();
        data.extend_from_slice(&[0, 255, 0, 255, 0, 0]);
        let cells = PgmDirectory::parse(&data, 2, 3).unwrap();
        assert_eq!(cells, vec![0, 255, 0, 255, 0, 0]);
    }

    #[test]
    fn test_parse_rejects_bad_headers() {
        let raster = [0u8; 4];
        let headers: [&[u8]; 4] = [b"P2\n2 2\n255\n", b"P5\n2 3\n255\n", b"P5\n2 2\n15\n", b"P5\n2"];
        for header in headers {
            let mut data = header.to_vec();
            data.extend_from_slice(&raster);
            assert!(PgmDirectory::parse(&data, 2, 2).is_err());
        }
        // truncated raster
        assert!(PgmDirectory::parse(b"P5\n2 2\n255\n\0\0\0", 2, 2).is_err());
    }

    #[test]
    #[serial]
    fn test_pgm_files_roundtrip() {
        let dir = temp_dir("pgm_roundtrip");
        let mut store = PgmDirectory::new(&dir, &dir);
        let grid = Grid::random(9, 14, Some(SEED));
        store.save("9x14", 9, 14, grid.as_bytes()).unwrap();
        let cells = store.load("9x14", 9, 14).unwrap();
        assert_eq!(cells, grid.as_bytes());
        assert!(store.load("9x15", 9, 15).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_collaborator_commands() {
        let store = MemoryStore::new();
        let mut grid = Grid::new(4, 4);
        grid.set(Cell::new(2, 1), true);
        store.insert("4x4", &grid);

        let (io, task) = spawn_io(store.clone());
        let loaded = io.load_input("4x4", 4, 4).await.unwrap();
        assert_eq!(loaded, grid);
        assert!(io.load_input("8x8", 8, 8).await.is_err());

        io.save_output("4x4x1", &loaded).unwrap();
        io.check_idle().await.unwrap();
        assert_eq!(store.get("4x4x1").unwrap()[6], ALIVE);

        drop(io);
        task.await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn test_save_failure_reported_on_idle() {
        let dir = temp_dir("save_failure");
        fs::create_dir_all(dir.parent().unwrap()).unwrap();
        // a regular file where the output directory should be
        fs::write(&dir, b"").unwrap();
        let (io, _task) = spawn_io(PgmDirectory::new(&dir, &dir));
        io.save_output("1x1x0", &Grid::new(1, 1)).unwrap();
        assert!(io.check_idle().await.is_err());
        // the error is reported once
        io.check_idle().await.unwrap();
        fs::remove_file(&dir).unwrap();
    }
}
