#![warn(clippy::all)]

mod distributor;
mod events;
mod grid;
mod io;
mod params;
mod workers;

pub use distributor::{Distributor, ALIVE_REPORT_INTERVAL};
pub use events::{Event, State};
pub use grid::{Cell, Grid, ALIVE, DEAD};
pub use io::{spawn_io, ImageStore, IoCommand, IoHandle, MemoryStore, PgmDirectory};
pub use params::Params;
pub use workers::{partition_rows, WorkerPool};

pub const VERSION: &str = "0.1.0";
