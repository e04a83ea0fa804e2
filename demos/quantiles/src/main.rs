use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use trellis::{App, Config, Error};

mod init;
mod ops;

use ops::{Quantiles, SortWindow, StoredInts, Val, Window};

const SEED: u64 = 42;
const NUM_VALUES: usize = 10_000;
const MAX_VALUE: i64 = 1000;
const WINDOW_SIZE: u64 = 100;
const WINDOW_STEP: u64 = 30;
const NUM_QUANTILES: usize = 4;

#[derive(Parser, Debug)]
pub struct Cli {
    /// Configuration file; omit to run single-node with defaults.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Id of the local node within the configured cluster.
    #[arg(long, short, default_value_t = 0)]
    pub node: u32,

    /// Run as a server: serve blocks until a peer requests shutdown.
    #[arg(long, short)]
    pub server: bool,
}

fn main() -> Result<()> {
    dotenv().ok();
    init::tracing();
    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::single_node("quantiles"),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.app.max_threads)
        .enable_all()
        .build()?;
    runtime.block_on(run(args, config))
}

async fn run(args: Cli, config: Config) -> Result<()> {
    let mut app: App<Val> = App::new(config, args.node)?;
    app.set_server(args.server);

    // Every node declares the same graph in the same order.
    let source = app.add_source(StoredInts::seeded(SEED, NUM_VALUES, MAX_VALUE));
    let window = app.add(
        Window {
            size: WINDOW_SIZE,
            step: WINDOW_STEP,
        },
        &[source.clone()],
    );
    let sorted = app.add(SortWindow, &[window]);
    let quantile = app.add(Quantiles { q: NUM_QUANTILES }, &[sorted]);

    app.run().await?;
    if args.server {
        // run() blocked until a peer shut us down.
        return Ok(());
    }

    let mut key = 0u64;
    loop {
        match quantile.get(key).await {
            Ok(Val::Ints(bounds)) => {
                if key % 50 == 0 {
                    info!(key, ?bounds, "quantile boundaries");
                }
            }
            Ok(other) => anyhow::bail!("unexpected payload {other:?}"),
            Err(Error::EndOfArray) => break,
            Err(e) => return Err(e.into()),
        }
        key += 1;
    }
    info!(windows = key, "pipeline complete");
    info!(
        source_metrics = ?source.metrics(),
        source_cache = ?source.cache_stats(),
        "source statistics"
    );

    app.shutdown().await;
    Ok(())
}
