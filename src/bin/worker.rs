//! Worker-side entry point: fetch parameters, play one self-play game,
//! upload the record, repeat.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::warn;

use zeroloop::client::{self, WorkerConfig};
use zeroloop::evaluator::LinearEvaluator;
use zeroloop::games::tictactoe::TttPosition;
use zeroloop::{GamePosition, SearchConfig, SelfplayConfig};

#[derive(Parser, Debug)]
#[command(about = "Self-play worker")]
struct Args {
    /// Coordinator host
    #[arg(short = 'i', long, default_value = "localhost")]
    host: String,

    /// Coordinator port
    #[arg(short, long, default_value_t = 10055)]
    port: u16,

    /// Pull fresh parameters every this many games
    #[arg(short, long, default_value_t = 1)]
    update_iter: u64,

    /// Never pull parameters (fixed-weights data generation)
    #[arg(short = 's', long, default_value_t = false)]
    no_update: bool,

    /// Use CPU-only inference (meaningful for GPU-backed evaluators)
    #[arg(short, long, default_value_t = false)]
    cpu: bool,

    /// Threads for parallel position encoding (defaults to all cores)
    #[arg(short = 't', long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Large simulation budget (full-budget plies become learning targets)
    #[arg(long, default_value_t = 800)]
    simulations: u32,

    /// Small simulation budget used on non-target plies
    #[arg(long, default_value_t = 128)]
    fast_simulations: u32,

    /// Probability of a full-budget ply
    #[arg(long, default_value_t = 0.25)]
    oscillation_frac: f64,

    /// Disable playout cap oscillation (every ply at full budget)
    #[arg(long, default_value_t = false)]
    no_oscillation: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // The bundled evaluator has no accelerator backend; the flag is part of
    // the worker interface for evaluators that do.
    let _ = args.cpu;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let config = WorkerConfig {
        host: args.host,
        port: args.port,
        update_interval: if args.no_update { 0 } else { args.update_iter },
        selfplay: SelfplayConfig {
            playout_cap_oscillation: !args.no_oscillation,
            full_simulations: args.simulations,
            fast_simulations: args.fast_simulations,
            oscillation_frac: args.oscillation_frac,
            ..SelfplayConfig::default()
        },
        search: SearchConfig {
            simulations: args.simulations,
            ..SearchConfig::default()
        },
    };

    let mut evaluator = LinearEvaluator::new(TttPosition::INPUT_SIZE, TttPosition::POLICY_SIZE);
    loop {
        if let Err(e) = client::run::<TttPosition, _>(&config, &mut evaluator) {
            warn!("worker loop failed ({e}); reconnecting shortly");
            std::thread::sleep(Duration::from_secs(5));
        }
    }
}
