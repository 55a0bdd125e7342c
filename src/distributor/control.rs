use super::{Phase, Shared};
use crate::{Event, State};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Serves keyboard commands until a quit or until `stop` fires.
///
/// A closed `keys` channel only stops the key handling, the task still waits
/// for `stop`.
pub(super) async fn listen(
    shared: Arc<Shared>,
    mut keys: mpsc::Receiver<char>,
    mut stop: oneshot::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            Some(key) = keys.recv() => {
                match handle_key(&shared, key).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => return Ok(()),
                    Err(e) => {
                        shared.abort().await;
                        return Err(e);
                    }
                }
            }
            _ = &mut stop => return Ok(()),
        }
    }
}

async fn handle_key(shared: &Shared, key: char) -> Result<Flow> {
    match key {
        's' => {
            let queued = {
                let state = shared.state.lock().await;
                match state.phase {
                    Phase::Quitting => None,
                    _ => Some((state.turn, shared.queue_snapshot(&state)?)),
                }
            };
            if let Some((turn, filename)) = queued {
                shared.confirm_snapshot(turn, filename).await?;
            }
            Ok(Flow::Continue)
        }
        'p' => {
            let mut state = shared.state.lock().await;
            let turn = state.turn;
            match state.phase {
                Phase::Running => {
                    state.phase = Phase::Paused;
                    shared.emit(Event::StateChange {
                        turn,
                        state: State::Paused,
                    });
                    tracing::info!("Paused at turn {}", turn);
                }
                Phase::Paused => {
                    state.phase = Phase::Running;
                    shared.emit(Event::StateChange {
                        turn,
                        state: State::Executing,
                    });
                    shared.resume.notify_one();
                    tracing::info!("Continuing from turn {}", turn);
                }
                Phase::Initializing | Phase::Quitting => {}
            }
            Ok(Flow::Continue)
        }
        'q' => quit(shared).await,
        _ => {
            tracing::debug!("Ignoring key {:?}", key);
            Ok(Flow::Continue)
        }
    }
}

/// Final report, snapshot, flush, then let the turn loop go.
async fn quit(shared: &Shared) -> Result<Flow> {
    let (turn, filename) = {
        let mut state = shared.state.lock().await;
        if state.phase == Phase::Quitting {
            return Ok(Flow::Quit);
        }
        state.phase = Phase::Quitting;
        let filename = shared.queue_snapshot(&state)?;
        shared.emit(Event::FinalTurnComplete {
            turn: state.turn,
            alive: state.grid.alive_cells(),
        });
        (state.turn, filename)
    };

    shared.confirm_snapshot(turn, filename).await?;
    shared.emit(Event::StateChange {
        turn,
        state: State::Quitting,
    });
    shared.resume.notify_one();
    tracing::info!("Quit at turn {}", turn);
    Ok(Flow::Quit)
}
