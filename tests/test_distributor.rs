#[cfg(test)]
mod tests {
    use gol_distributor::*;
    use std::{sync::Arc, time::Duration};
    use tokio::{sync::mpsc, task::JoinHandle};

    const SEED: u64 = 42;

    struct Run {
        events: mpsc::UnboundedReceiver<Event>,
        keys: mpsc::Sender<char>,
        task: JoinHandle<anyhow::Result<()>>,
        store: MemoryStore,
    }

    fn start(params: Params, grid: &Grid) -> Run {
        let store = MemoryStore::new();
        store.insert(&params.input_name(), grid);
        let (io, _) = spawn_io(store.clone());
        let (events_tx, events) = mpsc::unbounded_channel();
        let (keys, keys_rx) = mpsc::channel(10);
        let task = tokio::spawn(Distributor::new(params, io, events_tx, keys_rx).run());
        Run {
            events,
            keys,
            task,
            store,
        }
    }

    async fn drain(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut all = Vec::new();
        while let Some(event) = events.recv().await {
            all.push(event);
        }
        all
    }

    fn params(height: usize, width: usize, turns: u32, threads: usize) -> Params {
        Params {
            image_height: height,
            image_width: width,
            turns,
            threads,
        }
    }

    fn glider_at(height: usize, width: usize, dx: usize, dy: usize) -> Grid {
        let mut grid = Grid::new(height, width);
        for (x, y) in [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)] {
            grid.set(Cell::new((x + dx) % width, (y + dy) % height), true);
        }
        grid
    }

    /// Reference evolution on a single thread.
    fn evolve(grid: &Grid, turns: u32) -> Grid {
        let mut grid = grid.clone();
        for _ in 0..turns {
            let cells = grid.next_rows(0..grid.height());
            grid = Grid::from_cells(grid.height(), grid.width(), cells).unwrap();
        }
        grid
    }

    /// Serves the input from memory and refuses every snapshot.
    struct ReadOnlyStore(MemoryStore);

    impl ImageStore for ReadOnlyStore {
        fn load(&mut self, name: &str, height: usize, width: usize) -> anyhow::Result<Vec<u8>> {
            self.0.load(name, height, width)
        }

        fn save(&mut self, name: &str, _: usize, _: usize, _: &[u8]) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("Read-only file system, cannot write {}", name))
        }
    }

    /// Sends `p` once `turn` is complete and collects events up to the pause.
    async fn pause_after(run: &mut Run, turn: u32) -> (u32, Vec<Event>) {
        let mut events = Vec::new();
        loop {
            let event = run.events.recv().await.unwrap();
            if event == (Event::TurnComplete { turn }) {
                run.keys.send('p').await.unwrap();
            }
            events.push(event.clone());
            if let Event::StateChange {
                turn,
                state: State::Paused,
            } = event
            {
                return (turn, events);
            }
        }
    }

    fn turns_completed(events: &[Event]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::TurnComplete { turn } => Some(*turn),
                _ => None,
            })
            .collect()
    }

    fn final_report(events: &[Event]) -> (u32, Vec<Cell>) {
        let finals: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::FinalTurnComplete { turn, alive } => Some((*turn, alive.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(finals.len(), 1, "Expected exactly one final report");
        finals.into_iter().next().unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_glider_moves_diagonally() {
        let mut run = start(params(8, 8, 4, 4), &glider_at(8, 8, 0, 0));
        let events = drain(&mut run.events).await;
        run.task.await.unwrap().unwrap();

        assert_eq!(turns_completed(&events), vec![1, 2, 3, 4]);
        let (turn, alive) = final_report(&events);
        assert_eq!(turn, 4);
        assert_eq!(alive.len(), 5);
        assert_eq!(alive, glider_at(8, 8, 1, 1).alive_cells());

        // flips are tagged with the turn that produced them, in order
        let flip_turns: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                Event::CellFlipped { turn, .. } => Some(*turn),
                _ => None,
            })
            .collect();
        assert!(flip_turns.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(flip_turns.iter().filter(|&&t| t == 0).count(), 5);

        assert_eq!(
            events.last(),
            Some(&Event::StateChange {
                turn: 4,
                state: State::Quitting
            })
        );
        assert_eq!(
            run.store.get("8x8x4"),
            Some(glider_at(8, 8, 1, 1).as_bytes().to_vec())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_blank_field_never_flips() {
        for threads in [1, 2, 3, 16, 20] {
            let mut run = start(params(16, 16, 10, threads), &Grid::new(16, 16));
            let events = drain(&mut run.events).await;
            run.task.await.unwrap().unwrap();

            assert!(!events
                .iter()
                .any(|e| matches!(e, Event::CellFlipped { .. })));
            assert_eq!(turns_completed(&events), (1..=10).collect::<Vec<_>>());
            assert_eq!(final_report(&events), (10, vec![]));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_count_is_not_observable() {
        let grid = Grid::random(37, 23, Some(SEED));
        let expected = evolve(&grid, 12);
        for threads in [1, 2, 5, 8, 37] {
            let mut run = start(params(37, 23, 12, threads), &grid);
            let events = drain(&mut run.events).await;
            run.task.await.unwrap().unwrap();

            assert_eq!(final_report(&events), (12, expected.alive_cells()));
            assert_eq!(
                run.store.get("37x23x12"),
                Some(expected.as_bytes().to_vec()),
                "Snapshot differs with {} workers",
                threads
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_quit_mid_run() {
        let grid = Grid::random(256, 256, Some(SEED));
        let mut run = start(params(256, 256, 100, 4), &grid);

        let mut events = Vec::new();
        while let Some(event) = run.events.recv().await {
            if event == (Event::TurnComplete { turn: 3 }) {
                run.keys.send('q').await.unwrap();
            }
            events.push(event);
        }
        run.task.await.unwrap().unwrap();

        let (turn, alive) = final_report(&events);
        assert!((3..100).contains(&turn), "Quit at turn {}", turn);
        assert_eq!(turns_completed(&events).last(), Some(&turn));
        let expected = evolve(&grid, turn);
        assert_eq!(alive, expected.alive_cells());
        assert_eq!(
            run.store.get(&format!("256x256x{}", turn)),
            Some(expected.as_bytes().to_vec())
        );
        assert_eq!(
            events.last(),
            Some(&Event::StateChange {
                turn,
                state: State::Quitting
            })
        );
        assert!(!run.store.names().contains(&"256x256x100".to_owned()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pause_stops_turns() {
        let grid = Grid::random(64, 64, Some(SEED));
        let mut run = start(params(64, 64, u32::MAX, 3), &grid);

        let (paused_turn, events) = pause_after(&mut run, 2).await;
        assert_eq!(turns_completed(&events).last(), Some(&paused_turn));

        // snapshots still work while paused, nothing else happens
        run.keys.send('s').await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            run.events.try_recv().unwrap(),
            Event::ImageOutputComplete {
                turn: paused_turn,
                filename: format!("64x64x{}", paused_turn)
            }
        );
        assert!(run.events.try_recv().is_err());

        run.keys.send('p').await.unwrap();
        assert_eq!(
            run.events.recv().await.unwrap(),
            Event::StateChange {
                turn: paused_turn,
                state: State::Executing
            }
        );
        loop {
            let event = run.events.recv().await.unwrap();
            if let Event::TurnComplete { turn } = event {
                assert_eq!(turn, paused_turn + 1);
                break;
            }
        }

        run.keys.send('q').await.unwrap();
        let rest = drain(&mut run.events).await;
        run.task.await.unwrap().unwrap();
        let (turn, alive) = final_report(&rest);
        assert_eq!(alive, evolve(&grid, turn).alive_cells());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_quit_while_paused() {
        let grid = Grid::random(64, 64, Some(SEED));
        let mut run = start(params(64, 64, u32::MAX, 3), &grid);
        let (paused_turn, _) = pause_after(&mut run, 2).await;

        run.keys.send('q').await.unwrap();
        let rest = tokio::time::timeout(Duration::from_secs(10), drain(&mut run.events))
            .await
            .expect("Quit did not wake the paused turn loop");
        run.task.await.unwrap().unwrap();

        assert!(turns_completed(&rest).is_empty());
        let expected = evolve(&grid, paused_turn);
        assert_eq!(final_report(&rest), (paused_turn, expected.alive_cells()));
        assert_eq!(
            run.store.get(&format!("64x64x{}", paused_turn)),
            Some(expected.as_bytes().to_vec())
        );
        assert_eq!(
            rest.last(),
            Some(&Event::StateChange {
                turn: paused_turn,
                state: State::Quitting
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_snapshot_aborts() {
        let params = params(64, 64, u32::MAX, 3);
        let input = MemoryStore::new();
        input.insert(&params.input_name(), &Grid::random(64, 64, Some(SEED)));
        let (io, _) = spawn_io(ReadOnlyStore(input));
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (keys, keys_rx) = mpsc::channel(10);
        let task = tokio::spawn(Distributor::new(params, io, events_tx, keys_rx).run());

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            if event == (Event::TurnComplete { turn: 2 }) {
                keys.send('s').await.unwrap();
            }
            seen.push(event);
        }
        let message = task.await.unwrap().unwrap_err().to_string();
        assert!(message.contains("Read-only"), "{}", message);

        // the stream just ends: no snapshot, no final report, no quit
        assert!(!seen.iter().any(|e| matches!(
            e,
            Event::ImageOutputComplete { .. }
                | Event::FinalTurnComplete { .. }
                | Event::StateChange { .. }
        )));
        let last = *turns_completed(&seen).last().unwrap();
        assert!((2..u32::MAX).contains(&last), "Stopped at turn {}", last);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_alive_count_matches_field() {
        let grid = Grid::random(32, 32, Some(SEED));
        let mut run = start(params(32, 32, u32::MAX, 2), &grid);

        let mut replay = Grid::new(32, 32);
        let mut last_turn = 0;
        let mut reports = 0;
        while let Some(event) = run.events.recv().await {
            match event {
                Event::CellFlipped { cell, .. } => {
                    let alive = replay.is_alive(cell);
                    replay.set(cell, !alive);
                }
                Event::TurnComplete { turn } => last_turn = turn,
                Event::AliveCellsCount { turn, count } => {
                    assert_eq!(turn, last_turn);
                    assert_eq!(count, replay.alive_count());
                    reports += 1;
                    if reports == 1 {
                        run.keys.send('q').await.unwrap();
                    }
                }
                _ => {}
            }
        }
        run.task.await.unwrap().unwrap();
        assert!(reports >= 1);
    }

    #[tokio::test]
    async fn test_worker_pool_standalone() {
        let grid = Arc::new(glider_at(8, 8, 0, 0));
        let pool = WorkerPool::new(&params(8, 8, 1, 3));
        let next = pool.next_grid(grid).await.unwrap();
        assert_eq!(next, evolve(&glider_at(8, 8, 0, 0), 1));
    }
}
