//! The reservoir: an append-only, crash-recoverable store of game records
//! with weighted random sampling of training targets.
//!
//! Durability is a JSON-lines log: every push appends one line, and opening
//! the reservoir replays the log to rebuild the in-memory state. A malformed
//! line is reported and skipped; a restart never fails on a single bad line.
//! All reads and writes go through one mutex; sampling truncates to a recent
//! window first when the discard policy is enabled, which is what bounds
//! memory over a long run.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::warn;
use parking_lot::Mutex;
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::record::GameRecord;
use crate::GamePosition;

/// Aligned training batches: evaluator inputs, policy target vectors and
/// scalar value targets, one row per sampled learning-target ply.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub inputs: Vec<Vec<f32>>,
    pub policies: Vec<Vec<f32>>,
    pub values: Vec<f32>,
}

struct State {
    records: Vec<GameRecord>,
    /// Per-game learning-target plies, parallel to `records`.
    learning_targets: Vec<Vec<u32>>,
    log: File,
}

/// Durable, windowed store of finished games.
pub struct Reservoir {
    state: Mutex<State>,
    path: PathBuf,
}

impl Reservoir {
    /// Opens (or creates) a reservoir backed by the log at `path`, replaying
    /// any existing lines.
    pub fn open(path: impl AsRef<Path>) -> Result<Reservoir> {
        let path = path.as_ref().to_path_buf();
        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (number, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<GameRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(source) => {
                        let err = Error::CorruptPersistedRecord {
                            line: number + 1,
                            source,
                        };
                        warn!("skipping bad record log line: {err}");
                    }
                }
            }
        }
        let log = OpenOptions::new().create(true).append(true).open(&path)?;
        let learning_targets = records
            .iter()
            .map(|r| r.learning_target_plies.clone())
            .collect();
        Ok(Reservoir {
            state: Mutex::new(State {
                records,
                learning_targets,
                log,
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record in memory and to the durable log.
    pub fn push(&self, record: GameRecord) -> Result<()> {
        let mut state = self.state.lock();
        state.log.write_all(&record.to_bytes())?;
        state.log.write_all(b"\n")?;
        state.log.flush()?;
        state.learning_targets.push(record.learning_target_plies.clone());
        state.records.push(record);
        Ok(())
    }

    /// Number of stored games.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones the stored records, in arrival order.
    pub fn records(&self) -> Vec<GameRecord> {
        self.state.lock().records.clone()
    }

    /// Total learning-target plies across all stored games.
    pub fn len_learning_targets(&self) -> usize {
        self.state.lock().learning_targets.iter().map(Vec::len).sum()
    }

    /// Draws `size` distinct learning-target plies uniformly from the most
    /// recent `recent` games and builds the training batch for them.
    ///
    /// With `discard` set, games older than the window are dropped first
    /// (irreversibly, in memory only - the log keeps everything). Fails with
    /// [`Error::InsufficientData`] rather than returning a partial batch.
    pub fn sample<P: GamePosition>(
        &self,
        size: usize,
        recent: usize,
        discard: bool,
        rng: &mut impl Rng,
    ) -> Result<SampleBatch> {
        let targets: Vec<(GameRecord, u32)> = {
            let mut state = self.state.lock();
            if discard && state.records.len() > recent {
                let cut = state.records.len() - recent;
                state.records.drain(..cut);
                state.learning_targets.drain(..cut);
            }

            let start = state.records.len().saturating_sub(recent);
            let window = &state.learning_targets[start..];
            let mut cumulative = vec![0usize; window.len() + 1];
            for (i, plies) in window.iter().enumerate() {
                cumulative[i + 1] = cumulative[i] + plies.len();
            }
            let total = cumulative[window.len()];
            if size > total {
                return Err(Error::InsufficientData {
                    requested: size,
                    available: total,
                });
            }

            let mut flat: Vec<usize> = index::sample(rng, total, size).into_vec();
            flat.sort_unstable();

            // The indices are sorted, so one forward cursor over the prefix
            // sums resolves all of them in a single pass.
            let mut cursor = 0usize;
            flat.into_iter()
                .map(|i| {
                    while cumulative[cursor + 1] <= i {
                        cursor += 1;
                    }
                    let ply = window[cursor][i - cumulative[cursor]];
                    (state.records[start + cursor].clone(), ply)
                })
                .collect()
        };

        // Replay and encode outside the lock; every row is independent.
        let rows: Vec<Result<(Vec<f32>, Vec<f32>, f32)>> = targets
            .par_iter()
            .map(|(record, ply)| build_row::<P>(record, *ply))
            .collect();

        let mut batch = SampleBatch {
            inputs: Vec::with_capacity(size),
            policies: Vec::with_capacity(size),
            values: Vec::with_capacity(size),
        };
        for row in rows {
            let (input, policy, value) = row?;
            batch.inputs.push(input);
            batch.policies.push(policy);
            batch.values.push(value);
        }
        Ok(batch)
    }
}

/// Reconstructs the position at `ply` by replaying the record's notations,
/// then derives the three training targets for it.
fn build_row<P: GamePosition>(
    record: &GameRecord,
    ply: u32,
) -> Result<(Vec<f32>, Vec<f32>, f32)> {
    let mut position = P::initial();
    for notation in &record.moves[..ply as usize] {
        let mv = position
            .parse_move(notation)
            .ok_or_else(|| Error::InvalidRecord(format!("unparseable move '{notation}'")))?;
        position.apply(&mv);
    }

    let summary = record
        .search_results
        .get(ply as usize)
        .ok_or_else(|| Error::InvalidRecord(format!("target ply {ply} out of range")))?;
    let mut policy = vec![0.0f32; P::POLICY_SIZE];
    for (notation, visits) in &summary.visits {
        let mv = position
            .parse_move(notation)
            .ok_or_else(|| Error::InvalidRecord(format!("unparseable move '{notation}'")))?;
        policy[position.policy_index(&mv)] = *visits as f32 / summary.total_visits as f32;
    }

    let value = record.winner.value_for(position.side_to_move());
    Ok((position.encode(), policy, value))
}
