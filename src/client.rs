//! The self-play worker: pulls parameters, plays a game, uploads the record,
//! forever. Each worker is fully independent of every other worker; the only
//! shared state is on the coordinator's side of the two round trips.

use log::{info, warn};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::protocol;
use crate::search::{SearchConfig, SearchEngine};
use crate::selfplay::{self, SelfplayConfig};
use crate::GamePosition;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    /// Pull fresh parameters every this many games; 0 disables updates
    /// entirely (fixed-weights data generation).
    pub update_interval: u64,
    pub selfplay: SelfplayConfig,
    pub search: SearchConfig,
}

impl WorkerConfig {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Runs the fetch / play / submit loop until a round trip or a game fails.
///
/// The caller owns retry policy; a transient coordinator outage surfaces
/// here as an `Err` and the binary decides whether to reconnect.
pub fn run<P: GamePosition, E: Evaluator>(config: &WorkerConfig, evaluator: &mut E) -> Result<()> {
    let mut search: SearchEngine<P> = SearchEngine::new(config.search.clone());
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let addr = config.addr();

    let mut iteration: u64 = 0;
    loop {
        if config.update_interval > 0 && iteration % config.update_interval == 0 {
            let blob = protocol::fetch_weights(&addr)?;
            match evaluator.load_weights(&blob) {
                Ok(()) => info!("updated parameters ({} bytes)", blob.len()),
                // A half-deployed coordinator can serve weights for another
                // model shape; keep playing with what we have.
                Err(e) => warn!("ignoring served weights: {e}"),
            }
        }

        search.clear();
        let record = selfplay::play(evaluator, &mut search, &config.selfplay, &mut rng)?;
        info!(
            "game finished: {} plies, winner {:?}, {} learning targets",
            record.ply,
            record.winner,
            record.learning_target_plies.len()
        );

        protocol::submit_record(&addr, &record.to_bytes())?;
        iteration += 1;
    }
}
