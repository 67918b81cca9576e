//! Learner-side entry point: collects game records from workers, trains the
//! evaluator, and serves the current parameters.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use zeroloop::evaluator::LinearEvaluator;
use zeroloop::games::tictactoe::TttPosition;
use zeroloop::server::{Coordinator, CoordinatorConfig};
use zeroloop::GamePosition;

#[derive(Parser, Debug)]
#[command(about = "Self-play training coordinator")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 10055)]
    port: u16,

    /// Only store game records; training will not be conducted
    #[arg(short, long, default_value_t = false)]
    store: bool,

    /// Game record log to resume from (and to keep appending to)
    #[arg(short, long, default_value = "records.jsonl")]
    record_file: PathBuf,

    /// Weight checkpoint to resume from
    #[arg(short, long)]
    weight_file: Option<PathBuf>,

    /// Training mini-batch size, in learning-target plies
    #[arg(long, default_value_t = 1024)]
    batch_size: usize,

    /// Only sample from this many most recent games
    #[arg(long, default_value_t = 100_000)]
    recent: usize,

    /// Directory for periodic weight checkpoints
    #[arg(long, default_value = "weights")]
    weights_dir: PathBuf,

    /// Include optimizer state in checkpoints
    #[arg(long, default_value_t = false)]
    checkpoint_optimizer: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = CoordinatorConfig {
        port: args.port,
        store_only: args.store,
        batch_size: args.batch_size,
        recent_window: args.recent,
        weights_dir: args.weights_dir,
        record_log: args.record_file,
        resume_weights: args.weight_file,
        ..CoordinatorConfig::default()
    };

    let mut evaluator = LinearEvaluator::new(TttPosition::INPUT_SIZE, TttPosition::POLICY_SIZE);
    evaluator.include_optimizer = args.checkpoint_optimizer;

    let coordinator: Coordinator<TttPosition, _> = Coordinator::new(config, evaluator)?;
    coordinator.run()?;
    Ok(())
}
