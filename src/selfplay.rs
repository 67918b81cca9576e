//! The self-play driver: plays one full game with the search engine and an
//! evaluator, producing the game record that gets uploaded to the learner.

use log::debug;
use rand::Rng;

use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::record::{GameRecord, SearchSummary, Winner};
use crate::search::SearchEngine;
use crate::{GamePosition, Repetition};

/// Self-play parameters.
///
/// Playout cap oscillation draws per move between a large budget `full_simulations`
/// (forced playouts on, tree reuse off, target pruning on) whose plies become
/// learning targets, and a small budget `fast_simulations` (tree reuse and
/// immediate-move on) whose plies are played but not learned from.
#[derive(Debug, Clone)]
pub struct SelfplayConfig {
    pub max_moves: u32,
    pub playout_cap_oscillation: bool,
    pub full_simulations: u32,
    pub fast_simulations: u32,
    pub oscillation_frac: f64,
    /// Depth bound for the forced-win probe run before every search.
    pub checkmate_depth: u32,
}

impl Default for SelfplayConfig {
    fn default() -> Self {
        SelfplayConfig {
            max_moves: 512,
            playout_cap_oscillation: false,
            full_simulations: 800,
            fast_simulations: 128,
            oscillation_frac: 0.25,
            checkmate_depth: 7,
        }
    }
}

/// Plays one game to completion and returns its record.
///
/// A position with no legal moves loses for its side to move; a repeated
/// position ends the game with the rule-defined winner. Otherwise each ply
/// first probes for a forced win; a solved ply is taken directly
/// with a synthetic full-confidence summary and always marked as a learning
/// target. Otherwise the search runs under the oscillation-chosen budget and
/// the ply is marked only when the full budget was used.
pub fn play<P: GamePosition, E: Evaluator>(
    evaluator: &mut E,
    search: &mut SearchEngine<P>,
    config: &SelfplayConfig,
    rng: &mut impl Rng,
) -> Result<GameRecord> {
    let mut position = P::initial();
    let mut record = GameRecord::new();

    for _ in 0..config.max_moves {
        if position.legal_moves().is_empty() {
            // The side that delivered this position wins.
            record.winner = Winner::from_side(1 - position.side_to_move());
            break;
        }
        match position.repetition() {
            // A plain repetition is ruled in favor of the first player; one
            // reached while giving check loses for the side to move.
            Repetition::Plain => {
                record.winner = Winner::Black;
                break;
            }
            Repetition::Check => {
                record.winner = Winner::from_side(1 - position.side_to_move());
                break;
            }
            Repetition::None => {}
        }

        let (best_move, summary, is_target) =
            match position.solve_checkmate(config.checkmate_depth) {
                Some(mv) => {
                    debug!("ply {}: forced win found", record.ply);
                    let summary = SearchSummary::solved(position.notation(&mv));
                    (mv, summary, true)
                }
                None => {
                    if config.playout_cap_oscillation {
                        if rng.gen::<f64>() < config.oscillation_frac {
                            search.config.simulations = config.full_simulations;
                            search.config.forced_playouts = true;
                            search.config.reuse_tree = false;
                            search.config.target_pruning = true;
                            search.config.immediate = false;
                        } else {
                            search.config.simulations = config.fast_simulations;
                            search.config.forced_playouts = true;
                            search.config.reuse_tree = true;
                            search.config.target_pruning = false;
                            search.config.immediate = true;
                        }
                    }
                    search.run(&position, evaluator, rng)?;
                    let mv = search.best_move()?;
                    let summary = search.dump(&position);
                    let is_target = search.config.simulations == config.full_simulations;
                    (mv, summary, is_target)
                }
            };

        let notation = position.notation(&best_move);
        position.apply(&best_move);
        // Keep the tree root in lockstep with the position: promote the
        // played child (clearing if it was never explored). A following
        // non-reuse search clears the tree itself.
        search.advance(&best_move);

        record.moves.push(notation);
        record.search_results.push(summary);
        if is_target {
            record.learning_target_plies.push(record.ply);
        }
        record.ply += 1;
    }

    record.timestamp = chrono::Utc::now().timestamp();
    Ok(record)
}
