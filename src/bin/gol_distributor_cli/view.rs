use ahash::AHashSet;
use gol_distributor::{Cell, Event};
use tokio::sync::mpsc;

pub(super) struct Summary {
    pub(super) turn: u32,
    pub(super) alive: usize,
}

/// Headless stand-in for a display: keeps the alive cells up to date from
/// flips and logs everything else.
pub(super) async fn watch(mut events: mpsc::UnboundedReceiver<Event>) -> Summary {
    let mut alive: AHashSet<Cell> = AHashSet::new();
    let mut summary = Summary { turn: 0, alive: 0 };

    while let Some(event) = events.recv().await {
        match &event {
            Event::CellFlipped { cell, .. } => {
                if !alive.remove(cell) {
                    alive.insert(*cell);
                }
                continue;
            }
            Event::TurnComplete { .. } => {
                tracing::trace!("{}", event);
                continue;
            }
            Event::FinalTurnComplete { turn, alive: reported } => {
                let matches = reported.len() == alive.len()
                    && reported.iter().all(|cell| alive.contains(cell));
                if !matches {
                    tracing::warn!(
                        "Flipped cells disagree with the final report: {} tracked, {} reported",
                        alive.len(),
                        reported.len()
                    );
                }
                summary = Summary {
                    turn: *turn,
                    alive: reported.len(),
                };
            }
            _ => {}
        }
        tracing::info!("{}", event);
    }
    summary
}
