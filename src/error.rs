//! Error taxonomy shared across the search, reservoir and protocol layers.

use thiserror::Error;

/// Errors produced by the library.
///
/// The split matters operationally: protocol violations are fatal to a single
/// connection but never to the coordinator; insufficient data tells the
/// training side to wait, not to fail; an illegal search state signals game
/// termination to the self-play driver; a corrupt persisted record is skipped
/// on restart rather than aborting the reload.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote peer sent an unexpected acknowledgement token or a frame
    /// the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A training mini-batch was requested before the reservoir held enough
    /// learning-target plies.
    #[error("insufficient data: requested {requested} targets, {available} available")]
    InsufficientData { requested: usize, available: usize },

    /// A best move was requested from a root with no children.
    #[error("illegal search state: {0}")]
    IllegalSearchState(&'static str),

    /// A line of the durable record log could not be parsed.
    #[error("corrupt persisted record at line {line}: {source}")]
    CorruptPersistedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A stored record references a move its own position cannot parse, or
    /// is otherwise internally inconsistent.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A weight blob could not be decoded by the evaluator.
    #[error("malformed weights: {0}")]
    MalformedWeights(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
