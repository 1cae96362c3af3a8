//! Per-worker move-ordering heuristics: the butterfly history table,
//! the killer table, and the counter-move table. None of these are
//! shared between workers; they are cleared on `ucinewgame` and live
//! across searches within a game.

use chess::{ChessMove, Color};

use crate::position::Position;
use crate::see;
use crate::util::MAX_PLY;

pub const MAX_HISTORY_SCORE: i32 = 65_536;

/// `[side][from][to]` quiet-move success counts. Grows by `depth` on a
/// beta cutoff; once any cell passes `MAX_HISTORY_SCORE` the whole
/// table is halved so old results decay.
pub struct HistoryTable {
    table: Box<[[[i32; 64]; 64]; 2]>,
}

impl HistoryTable {
    pub fn new() -> Self {
        Self {
            table: Box::new([[[0; 64]; 64]; 2]),
        }
    }

    pub fn clear(&mut self) {
        for side in self.table.iter_mut() {
            for from in side.iter_mut() {
                from.fill(0);
            }
        }
    }

    pub fn get(&self, side: Color, mv: ChessMove) -> i32 {
        self.table[side.to_index()][mv.get_source().to_index()][mv.get_dest().to_index()]
    }

    pub fn update(&mut self, side: Color, mv: ChessMove, depth: i32) {
        let cell = &mut self.table[side.to_index()][mv.get_source().to_index()]
            [mv.get_dest().to_index()];
        *cell += depth;
        if *cell > MAX_HISTORY_SCORE {
            for side in self.table.iter_mut() {
                for from in side.iter_mut() {
                    for score in from.iter_mut() {
                        *score /= 2;
                    }
                }
            }
        }
    }
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Two killer slots per ply; slot 0 is the most recent. Winning
/// captures are never recorded: they order well on their own.
pub struct KillerTable {
    table: Box<[[Option<ChessMove>; 2]; MAX_PLY]>,
}

impl KillerTable {
    pub fn new() -> Self {
        Self {
            table: Box::new([[None; 2]; MAX_PLY]),
        }
    }

    pub fn clear(&mut self) {
        self.table.fill([None; 2]);
    }

    pub fn get(&self, sply: usize) -> [Option<ChessMove>; 2] {
        self.table[sply]
    }

    pub fn add(&mut self, pos: &Position, mv: ChessMove) {
        if pos.is_capture(mv) && see::see_ge(pos.board(), mv, 0) {
            return;
        }
        let slot = &mut self.table[pos.sply()];
        if slot[0] == Some(mv) {
            return;
        }
        slot[1] = slot[0];
        slot[0] = Some(mv);
    }

    pub fn contains(&self, sply: usize, mv: ChessMove) -> bool {
        self.table[sply].contains(&Some(mv))
    }
}

impl Default for KillerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `[side][from][to]` of the opponent's last move, mapping to the quiet
/// move that most recently refuted it.
pub struct CounterMoveTable {
    table: Box<[[[Option<ChessMove>; 64]; 64]; 2]>,
}

impl CounterMoveTable {
    pub fn new() -> Self {
        Self {
            table: Box::new([[[None; 64]; 64]; 2]),
        }
    }

    pub fn clear(&mut self) {
        for side in self.table.iter_mut() {
            for from in side.iter_mut() {
                from.fill(None);
            }
        }
    }

    pub fn get(&self, side: Color, last_move: ChessMove) -> Option<ChessMove> {
        self.table[side.to_index()][last_move.get_source().to_index()]
            [last_move.get_dest().to_index()]
    }

    pub fn add(&mut self, side: Color, last_move: ChessMove, refutation: ChessMove) {
        self.table[side.to_index()][last_move.get_source().to_index()]
            [last_move.get_dest().to_index()] = Some(refutation);
    }
}

impl Default for CounterMoveTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::{Board, Square};
    use std::str::FromStr;

    fn quiet() -> ChessMove {
        ChessMove::new(Square::G1, Square::F3, None)
    }

    #[test]
    fn history_grows_by_depth_and_halves_past_the_cap() {
        let mut history = HistoryTable::new();
        let mv = quiet();
        let other = ChessMove::new(Square::B1, Square::C3, None);

        history.update(Color::White, mv, 7);
        assert_eq!(history.get(Color::White, mv), 7);
        assert_eq!(history.get(Color::Black, mv), 0);

        // Drive one cell past the cap; every cell must be halved and
        // none may remain above it.
        history.update(Color::White, other, 12);
        let mut remaining = MAX_HISTORY_SCORE;
        while remaining > 0 {
            history.update(Color::White, mv, 4000);
            remaining -= 4000;
        }
        history.update(Color::White, mv, 4000);
        assert!(history.get(Color::White, mv) <= MAX_HISTORY_SCORE);
        assert!(history.get(Color::White, other) <= 6);
        assert!(history.get(Color::White, other) > 0);
    }

    #[test]
    fn killers_keep_two_most_recent_without_duplicates() {
        let pos = Position::startpos();
        let mut killers = KillerTable::new();
        let a = ChessMove::new(Square::G1, Square::F3, None);
        let b = ChessMove::new(Square::B1, Square::C3, None);

        killers.add(&pos, a);
        killers.add(&pos, a);
        assert_eq!(killers.get(0), [Some(a), None]);

        killers.add(&pos, b);
        assert_eq!(killers.get(0), [Some(b), Some(a)]);
        assert!(killers.contains(0, a));
        assert!(!killers.contains(1, a));
    }

    #[test]
    fn winning_captures_are_not_killers() {
        let pos = Position::new(
            Board::from_str("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").unwrap(),
            Vec::new(),
            0,
        );
        let mut killers = KillerTable::new();
        killers.add(&pos, ChessMove::new(Square::D2, Square::D5, None));
        assert_eq!(killers.get(0), [None, None]);
    }

    #[test]
    fn counter_move_is_keyed_on_the_refuted_move() {
        let mut counters = CounterMoveTable::new();
        let their_move = ChessMove::new(Square::E7, Square::E5, None);
        let refutation = quiet();
        counters.add(Color::White, their_move, refutation);
        assert_eq!(counters.get(Color::White, their_move), Some(refutation));
        assert_eq!(counters.get(Color::Black, their_move), None);
    }
}
