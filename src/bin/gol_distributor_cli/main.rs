mod input;
mod view;

use anyhow::{Context, Result};
use clap::Parser;
use gol_distributor::{spawn_io, Distributor, Params, PgmDirectory};
use input::{forward_keys, SeededInput};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about)]
struct CLIParser {
    /// Number of columns of the field
    #[arg(short = 'w', long, default_value_t = 512)]
    width: usize,

    /// Number of rows of the field
    #[arg(short = 'H', long, default_value_t = 512)]
    height: usize,

    /// Number of generations to compute before quitting
    #[arg(short, long, default_value_t = 10_000)]
    turns: u32,

    /// Number of workers splitting every generation by rows
    #[arg(short = 'j', long, default_value_t = 8)]
    threads: usize,

    /// Directory with the initial `{height}x{width}.pgm` image
    #[arg(long, default_value = "images")]
    images_dir: String,

    /// Directory where `{height}x{width}x{turn}.pgm` snapshots are written
    #[arg(long, default_value = "out")]
    out_dir: String,

    /// Start from a random field generated with this seed instead of an image
    #[arg(long)]
    random: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "gol_distributor=info,gol_distributor_cli=info".into()
        })))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CLIParser::parse();
    let params = Params {
        image_height: args.height,
        image_width: args.width,
        turns: args.turns,
        threads: args.threads,
    };
    params.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.threads.clamp(1, 256))
        .enable_time()
        .build()
        .context("Failed to build the runtime")?;

    runtime.block_on(async {
        let store = PgmDirectory::new(&args.images_dir, &args.out_dir);
        let (io, io_task) = match args.random {
            Some(seed) => spawn_io(SeededInput::new(seed, store)),
            None => spawn_io(store),
        };
        let (events_tx, events) = tokio::sync::mpsc::unbounded_channel();
        let (keys_tx, keys) = tokio::sync::mpsc::channel(10);
        forward_keys(keys_tx);
        println!("Keys: s = snapshot, p = pause/resume, q = quit (followed by Enter)");

        let viewer = tokio::spawn(view::watch(events));
        let timer = std::time::Instant::now();
        let result = Distributor::new(params, io, events_tx, keys).run().await;
        let summary = viewer.await.context("Event viewer failed")?;
        io_task.await.context("I/O collaborator failed")?;
        result?;

        println!(
            "Computed {} turns in {:.1} secs, {} alive cells",
            summary.turn,
            timer.elapsed().as_secs_f64(),
            summary.alive
        );
        Ok(())
    })
}
