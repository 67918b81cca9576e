//! # Zeroloop - Self-Play Training Loop
//!
//! A self-play reinforcement learning engine built around three pieces:
//! - A batched Monte Carlo Tree Search guided by a learned evaluator
//! - A durable, windowed reservoir of finished games used as training data
//! - A coordinator/worker protocol that ties many self-play workers to one
//!   learner while keeping parameter distribution consistent
//!
//! The board game itself and the evaluator internals are pluggable: anything
//! implementing [`GamePosition`] can be searched, and anything implementing
//! [`evaluator::Evaluator`] can guide the search and be trained.

pub mod client;
pub mod error;
pub mod evaluator;
pub mod games;
pub mod protocol;
pub mod record;
pub mod reservoir;
pub mod search;
pub mod selfplay;
pub mod server;

pub use error::Error;
pub use record::{GameRecord, SearchSummary, Winner};
pub use reservoir::{Reservoir, SampleBatch};
pub use search::{SearchConfig, SearchEngine};
pub use selfplay::SelfplayConfig;

/// Repetition status of a position, as reported by the rules engine.
///
/// Repetitions terminate a search line with a rule-defined outcome rather
/// than an evaluator prediction; a repetition reached while giving check is
/// scored differently from a plain one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetition {
    /// The position has not occurred before.
    None,
    /// The position repeats, and the side to move is not in check.
    Plain,
    /// The position repeats with the side to move in check.
    Check,
}

/// A board position. Must be cheaply cloneable so the search can carry
/// independent copies down each simulation path.
///
/// This trait is the seam between the search/self-play machinery and the
/// rules engine. Implementations own legal-move generation, terminal and
/// repetition detection, and move notation; the search never inspects a
/// position beyond these operations.
pub trait GamePosition: Clone + Send + Sync {
    /// The type of a move in the game.
    type Move: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync;

    /// Length of the flat evaluator input encoding.
    const INPUT_SIZE: usize;
    /// Size of the policy vector; every legal move of every position maps
    /// into `0..POLICY_SIZE`.
    const POLICY_SIZE: usize;

    /// Returns the starting position.
    fn initial() -> Self;
    /// Returns all legal moves from this position. An empty vector means the
    /// game is over and the side to move has lost.
    fn legal_moves(&self) -> Vec<Self::Move>;
    /// Applies a move, mutating the position.
    fn apply(&mut self, mv: &Self::Move);
    /// The side to move: 0 for the side that moves first, 1 for the other.
    fn side_to_move(&self) -> u8;
    /// Repetition status of the current position.
    fn repetition(&self) -> Repetition;
    /// Text notation for a move, stable across the game.
    fn notation(&self, mv: &Self::Move) -> String;
    /// Parses a move from its notation in the context of this position.
    fn parse_move(&self, s: &str) -> Option<Self::Move>;
    /// The flat policy-vector index of a move in the context of this position.
    fn policy_index(&self, mv: &Self::Move) -> usize;
    /// Encodes the position into the evaluator's flat input layout.
    fn encode(&self) -> Vec<f32>;

    /// Bounded search for a forced win for the side to move. Returns the
    /// first move of the forcing line if one exists within `depth` plies.
    ///
    /// Games without a forcing-win concept can keep the default.
    fn solve_checkmate(&self, depth: u32) -> Option<Self::Move> {
        let _ = depth;
        None
    }
}
