//! The coordinator: serves parameters to workers, ingests their game records
//! into the reservoir, and runs the training loop.
//!
//! Threading layout: one thread per inbound connection, one sampling
//! producer feeding a bounded queue, and the training loop on the calling
//! thread. Two disjoint critical sections exist - the reservoir lock and the
//! trainer lock (evaluator + published blob + step counter) - and they are
//! never held together, so no lock-ordering deadlock is possible. Publishing
//! new parameters replaces the blob wholesale under the trainer lock, which
//! is what keeps a concurrent `weight` fetch from ever observing a
//! half-written snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::marker::PhantomData;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::protocol::{self, ACK_RECORD, ACK_WEIGHT, TOKEN_READY, VERB_RECORD, VERB_WEIGHT};
use crate::record::GameRecord;
use crate::reservoir::{Reservoir, SampleBatch};
use crate::GamePosition;

/// Capacity of the sampled-batch queue between the producer and the
/// training loop. Small on purpose: batches are large and sampling should
/// track training, not run ahead of it.
const SAMPLE_QUEUE_DEPTH: usize = 10;

/// How long the sampler sleeps while the reservoir is still filling.
const SAMPLER_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub port: u16,
    /// Collect records only; no training loop.
    pub store_only: bool,
    /// Training mini-batch size, in learning-target plies.
    pub batch_size: usize,
    /// Sampling window: only this many most-recent games are candidates,
    /// and older games are discarded when sampling.
    pub recent_window: usize,
    /// Checkpoint parameters to disk every this many steps.
    pub checkpoint_interval: u64,
    pub weights_dir: PathBuf,
    pub record_log: PathBuf,
    pub connection_log: PathBuf,
    pub training_log: PathBuf,
    /// Optional checkpoint to resume from.
    pub resume_weights: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            port: 10055,
            store_only: false,
            batch_size: 1024,
            recent_window: 100_000,
            checkpoint_interval: 5000,
            weights_dir: PathBuf::from("weights"),
            record_log: PathBuf::from("records.jsonl"),
            connection_log: PathBuf::from("connection_log.txt"),
            training_log: PathBuf::from("training_log.txt"),
            resume_weights: None,
        }
    }
}

/// Everything the training loop and the `weight` verb share: guarded by one
/// mutex, disjoint from the reservoir's.
struct TrainerState<E> {
    evaluator: E,
    /// The published parameter snapshot served to workers.
    blob: Vec<u8>,
    steps: u64,
}

pub struct Coordinator<P: GamePosition, E: Evaluator> {
    config: CoordinatorConfig,
    reservoir: Arc<Reservoir>,
    trainer: Arc<Mutex<TrainerState<E>>>,
    _game: PhantomData<P>,
}

/// Piecewise learning-rate schedule keyed on step count.
fn learning_rate(steps: u64) -> f32 {
    if steps < 100_000 {
        1e-1
    } else if steps < 300_000 {
        1e-2
    } else if steps < 500_000 {
        1e-3
    } else {
        1e-4
    }
}

impl<P, E> Coordinator<P, E>
where
    P: GamePosition + 'static,
    E: Evaluator + 'static,
{
    /// Opens the reservoir (replaying any existing record log), optionally
    /// loads a weight checkpoint, and publishes the initial snapshot.
    pub fn new(config: CoordinatorConfig, mut evaluator: E) -> Result<Coordinator<P, E>> {
        let reservoir = Arc::new(Reservoir::open(&config.record_log)?);
        info!(
            "reservoir: {} games, {} learning targets",
            reservoir.len(),
            reservoir.len_learning_targets()
        );

        if let Some(path) = &config.resume_weights {
            evaluator.load_weights(&fs::read(path)?)?;
            info!("resumed weights from {}", path.display());
        }
        let blob = evaluator.save_weights();

        fs::create_dir_all(&config.weights_dir)?;
        fs::write(config.weights_dir.join("iter_0.json"), &blob)?;

        Ok(Coordinator {
            config,
            reservoir,
            trainer: Arc::new(Mutex::new(TrainerState {
                evaluator,
                blob,
                steps: 0,
            })),
            _game: PhantomData,
        })
    }

    /// The reservoir, shared for inspection (tests, store-only tooling).
    pub fn reservoir(&self) -> Arc<Reservoir> {
        self.reservoir.clone()
    }

    /// Current published parameter snapshot.
    pub fn published_weights(&self) -> Vec<u8> {
        self.trainer.lock().blob.clone()
    }

    /// Binds the listener, spawns the connection and sampling threads, and
    /// runs the training loop until a fatal error. In store-only mode the
    /// calling thread just serves connections.
    pub fn run(self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port))?;
        info!("listening on port {}", listener.local_addr()?.port());
        self.serve(listener)
    }

    /// Like [`run`](Self::run) but on an already-bound listener (lets tests
    /// use an ephemeral port).
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        let connection_log = Arc::new(Mutex::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.config.connection_log)?,
        ));

        {
            let reservoir = self.reservoir.clone();
            let trainer = self.trainer.clone();
            let connection_log = connection_log.clone();
            thread::spawn(move || accept_loop(listener, reservoir, trainer, connection_log));
        }
        info!("ready");

        if self.config.store_only {
            loop {
                thread::park();
            }
        }

        let (tx, rx) = sync_channel::<SampleBatch>(SAMPLE_QUEUE_DEPTH);
        {
            let reservoir = self.reservoir.clone();
            let batch_size = self.config.batch_size;
            let recent = self.config.recent_window;
            thread::spawn(move || sampler_loop::<P>(reservoir, batch_size, recent, tx));
        }

        self.training_loop(rx)
    }

    /// Consumes sampled batches forever. Any failure here (a training step
    /// cannot be retried, a checkpoint that cannot be written) is fatal to
    /// the process by design.
    fn training_loop(&self, rx: Receiver<SampleBatch>) -> Result<()> {
        let mut training_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.training_log)?;

        for batch in rx.iter() {
            let mut trainer = self.trainer.lock();
            let lr = learning_rate(trainer.steps);
            let losses = trainer.evaluator.train_step(&batch, lr);

            if trainer.steps % self.config.checkpoint_interval == 0 {
                let path = self
                    .config
                    .weights_dir
                    .join(format!("iter_{}.json", trainer.steps));
                fs::write(path, trainer.evaluator.save_weights())?;
            }

            // Republish: replaced wholesale under the trainer lock.
            trainer.blob = trainer.evaluator.save_weights();
            trainer.steps += 1;

            writeln!(
                training_log,
                "{}, {}, {}, {}, {}",
                Utc::now().to_rfc3339(),
                trainer.steps,
                losses.total,
                losses.policy,
                losses.value
            )?;
            training_log.flush()?;
        }
        Err(Error::IllegalSearchState("sampling channel closed"))
    }
}

fn accept_loop<E: Evaluator + 'static>(
    listener: TcpListener,
    reservoir: Arc<Reservoir>,
    trainer: Arc<Mutex<TrainerState<E>>>,
    connection_log: Arc<Mutex<File>>,
) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let reservoir = reservoir.clone();
        let trainer = trainer.clone();
        let connection_log = connection_log.clone();
        thread::spawn(move || {
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".into());
            // Connection failures are isolated: log and drop this
            // connection, keep serving the rest.
            if let Err(e) = handle_connection(stream, &reservoir, &trainer, &connection_log, &peer)
            {
                error!("connection from {peer} failed: {e}");
            }
        });
    }
}

/// Serves one request on an accepted connection.
fn handle_connection<E: Evaluator>(
    mut stream: TcpStream,
    reservoir: &Reservoir,
    trainer: &Mutex<TrainerState<E>>,
    connection_log: &Mutex<File>,
    peer: &str,
) -> Result<()> {
    let mut verb = [0u8; 6];
    std::io::Read::read_exact(&mut stream, &mut verb)?;

    if &verb == VERB_WEIGHT {
        let blob = trainer.lock().blob.clone();
        protocol::write_frame(&mut stream, &blob)?;
        protocol::expect_token(&mut stream, ACK_WEIGHT)?;
        log_line(connection_log, &format!("sent the parameters to {peer}"));
    } else if &verb == VERB_RECORD {
        std::io::Write::write_all(&mut stream, TOKEN_READY)?;
        stream.flush()?;
        let payload = protocol::read_frame(&mut stream)?;
        let record = GameRecord::from_bytes(&payload)?;
        reservoir.push(record)?;
        // Acknowledge only after the push: the client treats a missing ack
        // as a lost game and can resubmit.
        std::io::Write::write_all(&mut stream, ACK_RECORD)?;
        stream.flush()?;
        log_line(
            connection_log,
            &format!("received a game record from {peer}"),
        );
    } else {
        return Err(Error::ProtocolViolation(format!(
            "unknown verb {:?}",
            String::from_utf8_lossy(&verb)
        )));
    }
    Ok(())
}

fn log_line(log: &Mutex<File>, message: &str) {
    let mut file = log.lock();
    // Observability only; a failed write is not worth a connection error.
    let _ = writeln!(file, "[{}] {}", Utc::now().to_rfc3339(), message);
    let _ = file.flush();
}

/// Produces training batches into the bounded queue. Sleeps while the
/// reservoir has fewer targets than one batch; blocks on the queue when the
/// training loop falls behind.
fn sampler_loop<P: GamePosition>(
    reservoir: Arc<Reservoir>,
    batch_size: usize,
    recent: usize,
    tx: SyncSender<SampleBatch>,
) {
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    loop {
        if reservoir.len_learning_targets() < batch_size {
            thread::sleep(SAMPLER_BACKOFF);
            continue;
        }
        match reservoir.sample::<P>(batch_size, recent, true, &mut rng) {
            Ok(batch) => {
                if tx.send(batch).is_err() {
                    return;
                }
            }
            // Lost a race with a concurrent discard; wait for more games.
            Err(Error::InsufficientData { .. }) => thread::sleep(SAMPLER_BACKOFF),
            Err(e) => {
                error!("sampling failed: {e}");
                return;
            }
        }
    }
}
