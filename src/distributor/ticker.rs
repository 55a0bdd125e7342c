use super::{Phase, Shared};
use crate::Event;
use std::{sync::Arc, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Emits [`Event::AliveCellsCount`] every `period` while the run is going.
///
/// Paused ticks are skipped silently. Returns once the run is quitting.
pub(super) async fn report_alive_cells(shared: Arc<Shared>, period: Duration) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let state = shared.state.lock().await;
        match state.phase {
            Phase::Running => shared.emit(Event::AliveCellsCount {
                turn: state.turn,
                count: state.alive_count,
            }),
            Phase::Quitting => return,
            Phase::Initializing | Phase::Paused => {}
        }
    }
}
