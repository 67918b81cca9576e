//! Shared fixtures: tiny deterministic games and a fixed evaluator.

#![allow(dead_code)]

use zeroloop::evaluator::{Evaluator, Losses};
use zeroloop::record::{GameRecord, SearchSummary, Winner};
use zeroloop::reservoir::SampleBatch;
use zeroloop::{GamePosition, Repetition};

/// Uniform policy, zero value, learns nothing. Good for tests that need the
/// search to behave but not the evaluator.
pub struct UniformEval {
    pub policy_size: usize,
}

impl Evaluator for UniformEval {
    fn predict(&mut self, inputs: &[Vec<f32>]) -> (Vec<Vec<f32>>, Vec<f32>) {
        let p = 1.0 / self.policy_size as f32;
        (
            vec![vec![p; self.policy_size]; inputs.len()],
            vec![0.0; inputs.len()],
        )
    }

    fn train_step(&mut self, _batch: &SampleBatch, _lr: f32) -> Losses {
        Losses {
            total: 0.0,
            policy: 0.0,
            value: 0.0,
        }
    }

    fn save_weights(&self) -> Vec<u8> {
        Vec::new()
    }

    fn load_weights(&mut self, _blob: &[u8]) -> zeroloop::error::Result<()> {
        Ok(())
    }
}

/// One legal move per ply until `max` plies are reached; then no moves.
#[derive(Clone)]
pub struct Chain {
    pub depth: u32,
    pub max: u32,
}

impl Chain {
    pub fn of_length(max: u32) -> Chain {
        Chain { depth: 0, max }
    }
}

impl GamePosition for Chain {
    type Move = u32;
    const INPUT_SIZE: usize = 1;
    const POLICY_SIZE: usize = 1;

    fn initial() -> Self {
        Chain::of_length(4)
    }
    fn legal_moves(&self) -> Vec<u32> {
        if self.depth < self.max {
            vec![0]
        } else {
            Vec::new()
        }
    }
    fn apply(&mut self, _mv: &u32) {
        self.depth += 1;
    }
    fn side_to_move(&self) -> u8 {
        (self.depth % 2) as u8
    }
    fn repetition(&self) -> Repetition {
        Repetition::None
    }
    fn notation(&self, _mv: &u32) -> String {
        "step".into()
    }
    fn parse_move(&self, s: &str) -> Option<u32> {
        (s == "step").then_some(0)
    }
    fn policy_index(&self, _mv: &u32) -> usize {
        0
    }
    fn encode(&self) -> Vec<f32> {
        vec![self.depth as f32]
    }
}

/// Two symmetric opening moves, one forced reply each, then the game ends.
/// The two root children stay perfectly interchangeable, which is what a
/// tie-break test needs.
#[derive(Clone)]
pub struct TwoMove {
    pub plies: u8,
}

impl GamePosition for TwoMove {
    type Move = u8;
    const INPUT_SIZE: usize = 1;
    const POLICY_SIZE: usize = 3;

    fn initial() -> Self {
        TwoMove { plies: 0 }
    }
    fn legal_moves(&self) -> Vec<u8> {
        match self.plies {
            0 => vec![0, 1],
            1 => vec![2],
            _ => Vec::new(),
        }
    }
    fn apply(&mut self, _mv: &u8) {
        self.plies += 1;
    }
    fn side_to_move(&self) -> u8 {
        self.plies % 2
    }
    fn repetition(&self) -> Repetition {
        Repetition::None
    }
    fn notation(&self, mv: &u8) -> String {
        ["a", "b", "c"][*mv as usize].into()
    }
    fn parse_move(&self, s: &str) -> Option<u8> {
        match s {
            "a" => Some(0),
            "b" => Some(1),
            "c" => Some(2),
            _ => None,
        }
    }
    fn policy_index(&self, mv: &u8) -> usize {
        *mv as usize
    }
    fn encode(&self) -> Vec<f32> {
        vec![self.plies as f32]
    }
}

/// One legal move per ply; every position from ply 1 on reports a plain
/// repetition.
#[derive(Clone)]
pub struct PlainRepeat {
    pub plies: u8,
}

impl GamePosition for PlainRepeat {
    type Move = u8;
    const INPUT_SIZE: usize = 1;
    const POLICY_SIZE: usize = 1;

    fn initial() -> Self {
        PlainRepeat { plies: 0 }
    }
    fn legal_moves(&self) -> Vec<u8> {
        vec![0]
    }
    fn apply(&mut self, _mv: &u8) {
        self.plies += 1;
    }
    fn side_to_move(&self) -> u8 {
        self.plies % 2
    }
    fn repetition(&self) -> Repetition {
        if self.plies >= 1 {
            Repetition::Plain
        } else {
            Repetition::None
        }
    }
    fn notation(&self, _mv: &u8) -> String {
        "step".into()
    }
    fn parse_move(&self, s: &str) -> Option<u8> {
        (s == "step").then_some(0)
    }
    fn policy_index(&self, _mv: &u8) -> usize {
        0
    }
    fn encode(&self) -> Vec<f32> {
        vec![self.plies as f32]
    }
}

/// Like [`PlainRepeat`], but the repetition arrives at ply 2 with the side
/// to move in check.
#[derive(Clone)]
pub struct CheckRepeat {
    pub plies: u8,
}

impl GamePosition for CheckRepeat {
    type Move = u8;
    const INPUT_SIZE: usize = 1;
    const POLICY_SIZE: usize = 1;

    fn initial() -> Self {
        CheckRepeat { plies: 0 }
    }
    fn legal_moves(&self) -> Vec<u8> {
        vec![0]
    }
    fn apply(&mut self, _mv: &u8) {
        self.plies += 1;
    }
    fn side_to_move(&self) -> u8 {
        self.plies % 2
    }
    fn repetition(&self) -> Repetition {
        if self.plies >= 2 {
            Repetition::Check
        } else {
            Repetition::None
        }
    }
    fn notation(&self, _mv: &u8) -> String {
        "step".into()
    }
    fn parse_move(&self, s: &str) -> Option<u8> {
        (s == "step").then_some(0)
    }
    fn policy_index(&self, _mv: &u8) -> usize {
        0
    }
    fn encode(&self) -> Vec<f32> {
        vec![self.plies as f32]
    }
}

/// A game that is already over at the starting position.
#[derive(Clone)]
pub struct Blocked;

impl GamePosition for Blocked {
    type Move = u8;
    const INPUT_SIZE: usize = 1;
    const POLICY_SIZE: usize = 1;

    fn initial() -> Self {
        Blocked
    }
    fn legal_moves(&self) -> Vec<u8> {
        Vec::new()
    }
    fn apply(&mut self, _mv: &u8) {}
    fn side_to_move(&self) -> u8 {
        0
    }
    fn repetition(&self) -> Repetition {
        Repetition::None
    }
    fn notation(&self, _mv: &u8) -> String {
        String::new()
    }
    fn parse_move(&self, _s: &str) -> Option<u8> {
        None
    }
    fn policy_index(&self, _mv: &u8) -> usize {
        0
    }
    fn encode(&self) -> Vec<f32> {
        vec![0.0]
    }
}

/// A hand-built tic-tac-toe record: each listed ply is a learning target
/// whose summary puts all mass on the move actually played.
pub fn ttt_record(moves: &[&str], targets: &[u32], winner: Winner) -> GameRecord {
    let mut record = GameRecord::new();
    for mv in moves {
        record.moves.push((*mv).into());
        record.search_results.push(SearchSummary {
            total_visits: 1,
            root_value: 0.5,
            visits: vec![((*mv).into(), 1)],
        });
        record.ply += 1;
    }
    record.learning_target_plies = targets.to_vec();
    record.winner = winner;
    record.timestamp = 1_700_000_000;
    record
}
