//! Tic-tac-toe under a "no draws" house rule.
//!
//! The engine-wide termination convention is that a position with no legal
//! moves is lost for the side to move. To fit it, this variant rules that
//! completing a line ends the game (the opponent has no legal replies), and
//! a full board with no line is likewise a win for the player who filled the
//! last cell. Every game therefore produces a decisive result, which keeps
//! the value targets simple and the forced-win solver meaningful.

use std::fmt;

use crate::{GamePosition, Repetition};

/// A move: the cell index, `0..9`, row-major from the top-left.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TttMove(pub usize);

impl fmt::Display for TttMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let col = (b'a' + (self.0 % 3) as u8) as char;
        let row = 1 + self.0 / 3;
        write!(f, "{col}{row}")
    }
}

/// Cell contents: 0 empty, 1 for side 0, 2 for side 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TttPosition {
    cells: [u8; 9],
    to_move: u8,
}

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

impl TttPosition {
    fn line_owner(&self) -> Option<u8> {
        for line in &LINES {
            let first = self.cells[line[0]];
            if first != 0 && line.iter().all(|&i| self.cells[i] == first) {
                return Some(first - 1);
            }
        }
        None
    }

    /// Forced win for the side to move within `depth` plies, if any.
    fn forced_win(&self, depth: u32) -> Option<TttMove> {
        if depth == 0 {
            return None;
        }
        for mv in self.legal_moves() {
            let mut child = self.clone();
            child.apply(&mv);
            if child.legal_moves().is_empty() {
                return Some(mv);
            }
            if depth >= 3 && child.opponent_is_lost(depth - 1) {
                return Some(mv);
            }
        }
        None
    }

    /// True when every reply still runs into a forced win.
    fn opponent_is_lost(&self, depth: u32) -> bool {
        let replies = self.legal_moves();
        !replies.is_empty()
            && replies.iter().all(|reply| {
                let mut child = self.clone();
                child.apply(reply);
                child.forced_win(depth - 1).is_some()
            })
    }
}

impl fmt::Display for TttPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            for col in 0..3 {
                let symbol = match self.cells[row * 3 + col] {
                    1 => "X",
                    2 => "O",
                    _ => ".",
                };
                write!(f, "{symbol} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl GamePosition for TttPosition {
    type Move = TttMove;

    // Own cells, opponent cells, side-to-move plane.
    const INPUT_SIZE: usize = 19;
    const POLICY_SIZE: usize = 9;

    fn initial() -> Self {
        TttPosition {
            cells: [0; 9],
            to_move: 0,
        }
    }

    fn legal_moves(&self) -> Vec<TttMove> {
        if self.line_owner().is_some() {
            return Vec::new();
        }
        (0..9)
            .filter(|&i| self.cells[i] == 0)
            .map(TttMove)
            .collect()
    }

    fn apply(&mut self, mv: &TttMove) {
        debug_assert_eq!(self.cells[mv.0], 0, "move into occupied cell");
        self.cells[mv.0] = self.to_move + 1;
        self.to_move = 1 - self.to_move;
    }

    fn side_to_move(&self) -> u8 {
        self.to_move
    }

    fn repetition(&self) -> Repetition {
        // Stones only ever get added; positions cannot repeat.
        Repetition::None
    }

    fn notation(&self, mv: &TttMove) -> String {
        mv.to_string()
    }

    fn parse_move(&self, s: &str) -> Option<TttMove> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let col = (bytes[0] as char).to_ascii_lowercase() as usize;
        let row = (bytes[1] as char).to_digit(10)? as usize;
        if !('a' as usize..='c' as usize).contains(&col) || !(1..=3).contains(&row) {
            return None;
        }
        Some(TttMove((row - 1) * 3 + (col - 'a' as usize)))
    }

    fn policy_index(&self, mv: &TttMove) -> usize {
        mv.0
    }

    fn encode(&self) -> Vec<f32> {
        let own = self.to_move + 1;
        let mut planes = Vec::with_capacity(Self::INPUT_SIZE);
        planes.extend(self.cells.iter().map(|&c| (c == own) as u8 as f32));
        planes.extend(self.cells.iter().map(|&c| (c != 0 && c != own) as u8 as f32));
        planes.push(self.to_move as f32);
        planes
    }

    fn solve_checkmate(&self, depth: u32) -> Option<TttMove> {
        self.forced_win(depth)
    }
}
