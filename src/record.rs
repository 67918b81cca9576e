//! Game records: the unit of data flowing from self-play workers to the
//! reservoir, serialized as one JSON object per line in the durable log.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    /// The side with id 0 (moves first).
    Black,
    /// The side with id 1.
    White,
    Draw,
}

impl Winner {
    /// The winner corresponding to a numeric side id.
    pub fn from_side(side: u8) -> Winner {
        if side == 0 {
            Winner::Black
        } else {
            Winner::White
        }
    }

    /// Training value target from the perspective of `side_to_move`:
    /// +1 if that side won, -1 if it lost, 0 for a draw.
    pub fn value_for(self, side_to_move: u8) -> f32 {
        match self {
            Winner::Draw => 0.0,
            w if w == Winner::from_side(side_to_move) => 1.0,
            _ => -1.0,
        }
    }
}

/// The visit distribution a search produced for one position: total playouts
/// at the root, the root's value estimate, and per-move visit counts in move
/// notation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub total_visits: u32,
    pub root_value: f32,
    pub visits: Vec<(String, u32)>,
}

impl SearchSummary {
    /// Summary for a move found by the checkmate solver rather than the
    /// search: a single playout with full confidence.
    pub fn solved(notation: String) -> SearchSummary {
        SearchSummary {
            total_visits: 1,
            root_value: 1.0,
            visits: vec![(notation, 1)],
        }
    }
}

/// One completed self-play game. Immutable once the game ends; owned by the
/// reservoir after upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Number of plies played.
    pub ply: u32,
    /// Move notations in play order; length equals `ply`.
    pub moves: Vec<String>,
    /// Search summaries aligned with `moves`.
    pub search_results: Vec<SearchSummary>,
    /// Strictly increasing ply indices whose search ran at full budget and
    /// may therefore be used as training targets.
    pub learning_target_plies: Vec<u32>,
    pub winner: Winner,
    /// Unix seconds at game end.
    pub timestamp: i64,
}

impl GameRecord {
    pub fn new() -> GameRecord {
        GameRecord {
            ply: 0,
            moves: Vec::new(),
            search_results: Vec::new(),
            learning_target_plies: Vec::new(),
            winner: Winner::Draw,
            timestamp: 0,
        }
    }

    /// Serializes for the wire and the durable log.
    pub fn to_bytes(&self) -> Vec<u8> {
        // GameRecord contains no map keys or non-string types that could
        // fail JSON serialization.
        serde_json::to_vec(self).expect("game record serialization cannot fail")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<GameRecord> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::ProtocolViolation(format!("undecodable game record: {e}")))
    }
}

impl Default for GameRecord {
    fn default() -> Self {
        GameRecord::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_target_follows_side_to_move() {
        assert_eq!(Winner::Black.value_for(0), 1.0);
        assert_eq!(Winner::Black.value_for(1), -1.0);
        assert_eq!(Winner::White.value_for(1), 1.0);
        assert_eq!(Winner::Draw.value_for(0), 0.0);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = GameRecord::new();
        record.ply = 2;
        record.moves = vec!["b2".into(), "a1".into()];
        record.search_results = vec![
            SearchSummary {
                total_visits: 8,
                root_value: 0.5,
                visits: vec![("b2".into(), 6), ("a1".into(), 2)],
            },
            SearchSummary::solved("a1".into()),
        ];
        record.learning_target_plies = vec![0, 1];
        record.winner = Winner::White;
        record.timestamp = 1_700_000_000;

        let bytes = record.to_bytes();
        assert_eq!(GameRecord::from_bytes(&bytes).unwrap(), record);
    }
}
