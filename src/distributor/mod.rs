//! Turn coordination: owns the field, drives the generations and interleaves
//! them with keyboard control and periodic population reports.
//!
//! All mutable state lives in one [`RunState`] behind a single mutex. The turn
//! loop is the only writer of the field; the control listener and the
//! reporter only read it (or flip the phase) under the same lock, so nobody
//! ever observes a half-merged generation.

mod control;
mod ticker;

use crate::{Event, Grid, IoHandle, Params, State, WorkerPool};
use anyhow::{anyhow, Result};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard, Notify};

/// How often the number of alive cells is reported while running.
pub const ALIVE_REPORT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Initializing,
    Running,
    Paused,
    Quitting,
}

pub(crate) struct RunState {
    grid: Grid,
    /// Number of completed generations.
    turn: u32,
    alive_count: usize,
    phase: Phase,
}

/// What every task of a run shares.
pub(crate) struct Shared {
    params: Params,
    state: Mutex<RunState>,
    /// Wakes the turn loop when the phase leaves `Paused`.
    resume: Notify,
    events: mpsc::UnboundedSender<Event>,
    io: IoHandle,
}

impl Shared {
    fn new(
        params: Params,
        grid: Grid,
        io: IoHandle,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            params,
            state: Mutex::new(RunState {
                alive_count: grid.alive_count(),
                grid,
                turn: 0,
                phase: Phase::Initializing,
            }),
            resume: Notify::new(),
            events,
            io,
        }
    }

    /// A consumer that went away is not a reason to stop the simulation.
    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Queues the field as it is in `state`, returns the output name.
    fn queue_snapshot(&self, state: &RunState) -> Result<String> {
        let filename = self.params.output_name(state.turn);
        self.io.save_output(&filename, &state.grid)?;
        Ok(filename)
    }

    /// Waits for the queued snapshot to be written, then reports it.
    ///
    /// Must be called without holding the state lock.
    async fn confirm_snapshot(&self, turn: u32, filename: String) -> Result<()> {
        self.io.check_idle().await?;
        tracing::info!("Saved snapshot {}", filename);
        self.emit(Event::ImageOutputComplete { turn, filename });
        Ok(())
    }

    /// Locks the state once the phase is `Running`, waiting out a pause.
    ///
    /// Returns `None` when the run is quitting.
    async fn lock_running(&self) -> Option<MutexGuard<'_, RunState>> {
        loop {
            let state = self.state.lock().await;
            match state.phase {
                Phase::Running => return Some(state),
                Phase::Quitting => return None,
                Phase::Initializing | Phase::Paused => {
                    let resumed = self.resume.notified();
                    drop(state);
                    resumed.await;
                }
            }
        }
    }

    /// Moves the run to `Quitting` without any report, used on failures.
    async fn abort(&self) {
        self.state.lock().await.phase = Phase::Quitting;
        self.resume.notify_one();
    }
}

enum Stop {
    TurnLimit,
    Quit,
}

/// Runs a whole simulation: loads the initial image, computes
/// [`Params::turns`] generations and reports everything as [`Event`]s.
///
/// # Example
///
/// ```rust
/// use gol_distributor::{spawn_io, Distributor, Event, Grid, MemoryStore, Params};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let params = Params { image_height: 16, image_width: 16, turns: 10, threads: 4 };
/// let store = MemoryStore::new();
/// store.insert(&params.input_name(), &Grid::random(16, 16, Some(1)));
///
/// let (io, _) = spawn_io(store.clone());
/// let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
/// let (_keys_tx, keys) = tokio::sync::mpsc::channel(10);
/// Distributor::new(params, io, events_tx, keys).run().await.unwrap();
///
/// while let Some(event) = events.recv().await {
///     if let Event::FinalTurnComplete { turn, .. } = event {
///         assert_eq!(turn, 10);
///     }
/// }
/// assert!(store.get("16x16x10").is_some());
/// # });
/// ```
pub struct Distributor {
    params: Params,
    io: IoHandle,
    events: mpsc::UnboundedSender<Event>,
    keys: mpsc::Receiver<char>,
}

impl Distributor {
    /// * `io` - The I/O collaborator, see [`spawn_io`](crate::spawn_io).
    /// * `events` - Where events go; the channel is closed when [`run`](Self::run) returns.
    /// * `keys` - Interactive commands: `s` saves a snapshot, `p` toggles pause,
    ///   `q` saves a snapshot and quits. Everything else is ignored.
    pub fn new(
        params: Params,
        io: IoHandle,
        events: mpsc::UnboundedSender<Event>,
        keys: mpsc::Receiver<char>,
    ) -> Self {
        Self {
            params,
            io,
            events,
            keys,
        }
    }

    /// Drives the simulation to the end. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid, the initial image
    /// cannot be loaded, a worker fails or a snapshot cannot be written.
    /// Nothing is retried.
    pub async fn run(self) -> Result<()> {
        let Self {
            params,
            io,
            events,
            keys,
        } = self;
        params.validate()?;

        let grid = io
            .load_input(&params.input_name(), params.image_height, params.image_width)
            .await?;
        let shared = Arc::new(Shared::new(params, grid, io, events));
        {
            let mut state = shared.state.lock().await;
            for cell in state.grid.alive_cells() {
                shared.emit(Event::CellFlipped { turn: 0, cell });
            }
            state.phase = Phase::Running;
        }
        tracing::info!(
            "Running {} turns of a {}x{} field on {} workers",
            params.turns,
            params.image_height,
            params.image_width,
            params.threads
        );

        let reporter = tokio::spawn(ticker::report_alive_cells(
            Arc::clone(&shared),
            ALIVE_REPORT_INTERVAL,
        ));
        let (stop_tx, stop_rx) = oneshot::channel();
        let listener = tokio::spawn(control::listen(Arc::clone(&shared), keys, stop_rx));

        let pool = WorkerPool::new(&params);
        let stopped = execute_turns(&shared, &pool).await;
        if stopped.is_err() {
            shared.abort().await;
        }

        // a key being handled finishes first, nothing is emitted after the final report
        let _ = stop_tx.send(());
        let listened = listener
            .await
            .map_err(|e| anyhow!("Control listener failed: {}", e))
            .and_then(|r| r);
        let result = match stopped {
            Ok(Stop::TurnLimit) => finish(&shared).await,
            Ok(Stop::Quit) => Ok(()),
            Err(e) => Err(e),
        };

        reporter.abort();
        let _ = reporter.await;
        result.and(listened)
    }
}

/// The turn loop. Pause and quit are observed only between generations.
async fn execute_turns(shared: &Shared, pool: &WorkerPool) -> Result<Stop> {
    loop {
        {
            // the turn limit wins over a pause that came after the last turn
            let state = shared.state.lock().await;
            if state.phase == Phase::Quitting {
                return Ok(Stop::Quit);
            }
            if state.turn >= shared.params.turns {
                return Ok(Stop::TurnLimit);
            }
        }
        let snapshot = {
            let Some(state) = shared.lock_running().await else {
                return Ok(Stop::Quit);
            };
            Arc::new(state.grid.clone())
        };

        let next = pool.step(Arc::clone(&snapshot)).await?;

        // a generation computed while paused is merged after the resume,
        // one computed while quitting is dropped
        let Some(mut state) = shared.lock_running().await else {
            return Ok(Stop::Quit);
        };
        let turn = state.turn + 1;
        let mut flipped = Vec::new();
        for (rows, cells) in pool.partitions().iter().zip(&next) {
            flipped.extend(snapshot.diff_rows(rows.start, cells));
            state.grid.replace_rows(rows.start, cells);
        }
        state.turn = turn;
        state.alive_count = state.grid.alive_count();

        for cell in flipped {
            shared.emit(Event::CellFlipped { turn, cell });
        }
        shared.emit(Event::TurnComplete { turn });
        tracing::debug!("Turn {} complete, {} alive", turn, state.alive_count);
    }
}

/// Final report after the last generation: alive cells, snapshot, flush.
async fn finish(shared: &Shared) -> Result<()> {
    let (turn, filename) = {
        let mut state = shared.state.lock().await;
        if state.phase == Phase::Quitting {
            // quit came first and has reported everything
            return Ok(());
        }
        state.phase = Phase::Quitting;
        shared.emit(Event::FinalTurnComplete {
            turn: state.turn,
            alive: state.grid.alive_cells(),
        });
        (state.turn, shared.queue_snapshot(&state)?)
    };

    shared.confirm_snapshot(turn, filename).await?;
    shared.emit(Event::StateChange {
        turn,
        state: State::Quitting,
    });
    tracing::info!("Finished after {} turns", turn);
    Ok(())
}
