use crate::Cell;
use std::fmt;

/// Execution state reported through [`Event::StateChange`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Paused,
    Executing,
    Quitting,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Paused => write!(f, "Paused"),
            State::Executing => write!(f, "Executing"),
            State::Quitting => write!(f, "Quitting"),
        }
    }
}

/// Everything a consumer (display, logger, test) can observe about a run.
///
/// Events arrive in the order they happened. The stream is closed once,
/// after the final [`State::Quitting`] state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A cell changed its state when `turn` was computed.
    /// Turn 0 flips are the alive cells of the initial image.
    CellFlipped { turn: u32, cell: Cell },
    /// Generation `turn` has been merged into the field.
    TurnComplete { turn: u32 },
    /// Periodic population report.
    AliveCellsCount { turn: u32, count: usize },
    StateChange { turn: u32, state: State },
    /// A snapshot has been handed over to the I/O collaborator.
    ImageOutputComplete { turn: u32, filename: String },
    /// Last report of the run, carrying every alive cell in row-major order.
    FinalTurnComplete { turn: u32, alive: Vec<Cell> },
}

impl Event {
    pub fn turn(&self) -> u32 {
        match self {
            Event::CellFlipped { turn, .. }
            | Event::TurnComplete { turn }
            | Event::AliveCellsCount { turn, .. }
            | Event::StateChange { turn, .. }
            | Event::ImageOutputComplete { turn, .. }
            | Event::FinalTurnComplete { turn, .. } => *turn,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CellFlipped { turn, cell } => {
                write!(f, "Turn {}: cell ({}, {}) flipped", turn, cell.x, cell.y)
            }
            Event::TurnComplete { turn } => write!(f, "Turn {} complete", turn),
            Event::AliveCellsCount { turn, count } => {
                write!(f, "Turn {}: {} alive cells", turn, count)
            }
            Event::StateChange { turn, state } => write!(f, "Turn {}: {}", turn, state),
            Event::ImageOutputComplete { turn, filename } => {
                write!(f, "Turn {}: saved {}", turn, filename)
            }
            Event::FinalTurnComplete { turn, alive } => {
                write!(f, "Final turn {}: {} alive cells", turn, alive.len())
            }
        }
    }
}
