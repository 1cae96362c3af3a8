//! Phased, lazy move selection.
//!
//! Moves are produced on demand: the transposition-table move first,
//! then winning and equal captures by SEE (MVV-LVA breaking ties),
//! the two killers, the counter move, quiets by history score, and
//! finally the losing captures. Each phase generates only the moves it
//! needs, and every pseudo-legal move is yielded at most once.

use arrayvec::ArrayVec;
use chess::{ChessMove, MoveGen, Piece};

use crate::position::Position;
use crate::see;
use crate::threadlocal::ThreadData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    TTMove,
    GenerateCaptures,
    GoodCaptures,
    Killers,
    Counter,
    GenerateQuiets,
    Quiets,
    BadCaptures,
    GenerateEvasions,
    Evasions,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Full move set, all phases.
    Normal,
    /// Captures only (evasions when in check); quiescence and ProbCut.
    Tactical { in_check: bool },
}

#[derive(Debug, Clone, Copy)]
struct MoveEntry {
    mv: ChessMove,
    score: i32,
}

/// Quiet evasions sort below every capture in the evasion phase.
const EVASION_QUIET_OFFSET: i32 = -10_000_000;

pub struct MovePicker {
    pub stage: Stage,
    mode: Mode,
    tt_move: Option<ChessMove>,
    killers: [Option<ChessMove>; 2],
    killer_index: usize,
    counter: Option<ChessMove>,
    captures: ArrayVec<MoveEntry, 128>,
    quiets: ArrayVec<MoveEntry, 192>,
    capture_index: usize,
    quiet_index: usize,
}

impl MovePicker {
    pub fn new(pos: &Position, t: &ThreadData, tt_move: Option<ChessMove>) -> Self {
        let killers = t.killers.get(pos.sply());
        let counter = pos
            .last_move()
            .and_then(|last| t.counters.get(pos.side_to_move(), last));
        Self {
            stage: Stage::TTMove,
            mode: Mode::Normal,
            tt_move,
            killers,
            killer_index: 0,
            counter,
            captures: ArrayVec::new(),
            quiets: ArrayVec::new(),
            capture_index: 0,
            quiet_index: 0,
        }
    }

    /// Selector for quiescence and ProbCut nodes: the TT move, then
    /// captures; all evasions instead when in check.
    pub fn tactical(pos: &Position, tt_move: Option<ChessMove>) -> Self {
        Self {
            stage: Stage::TTMove,
            mode: Mode::Tactical {
                in_check: pos.in_check(),
            },
            tt_move,
            killers: [None; 2],
            killer_index: 0,
            counter: None,
            captures: ArrayVec::new(),
            quiets: ArrayVec::new(),
            capture_index: 0,
            quiet_index: 0,
        }
    }

    fn capture_score(pos: &Position, mv: ChessMove) -> i32 {
        let victim = if pos.is_en_passant(mv) {
            Piece::Pawn
        } else {
            pos.piece_on(mv.get_dest()).unwrap_or(Piece::Pawn)
        };
        let attacker = pos
            .piece_on(mv.get_source())
            .expect("capture has a moving piece");
        let mvv_lva = victim.to_index() as i32 * 8 + (7 - attacker.to_index() as i32);
        see::see(pos.board(), mv) * 128 + mvv_lva
    }

    fn generate_captures(&mut self, pos: &Position) {
        let mut gen = MoveGen::new_legal(pos.board());
        gen.set_iterator_mask(pos.capture_targets());
        for mv in gen {
            if pos.is_capture(mv) {
                self.captures.push(MoveEntry {
                    mv,
                    score: Self::capture_score(pos, mv),
                });
            }
        }
        self.captures.sort_by_key(|entry| std::cmp::Reverse(entry.score));
    }

    fn generate_quiets(&mut self, pos: &Position, t: &ThreadData) {
        let side = pos.side_to_move();
        let mut gen = MoveGen::new_legal(pos.board());
        gen.set_iterator_mask(pos.quiet_targets());
        for mv in gen {
            if !pos.is_capture(mv) {
                self.quiets.push(MoveEntry {
                    mv,
                    score: t.history.get(side, mv),
                });
            }
        }
        self.quiets.sort_by_key(|entry| std::cmp::Reverse(entry.score));
    }

    fn generate_evasions(&mut self, pos: &Position, t: &ThreadData) {
        let side = pos.side_to_move();
        for mv in MoveGen::new_legal(pos.board()) {
            let score = if pos.is_capture(mv) {
                Self::capture_score(pos, mv)
            } else {
                EVASION_QUIET_OFFSET + t.history.get(side, mv)
            };
            self.captures.push(MoveEntry { mv, score });
        }
        self.captures.sort_by_key(|entry| std::cmp::Reverse(entry.score));
    }

    fn already_emitted_quiet(&self, mv: ChessMove) -> bool {
        Some(mv) == self.tt_move
            || self.killers.contains(&Some(mv))
            || Some(mv) == self.counter
    }

    /// The next move to try, or `None` when every phase is exhausted.
    pub fn next(&mut self, pos: &Position, t: &ThreadData) -> Option<ChessMove> {
        loop {
            match self.stage {
                Stage::TTMove => {
                    self.stage = match self.mode {
                        Mode::Normal => Stage::GenerateCaptures,
                        Mode::Tactical { in_check: false } => Stage::GenerateCaptures,
                        Mode::Tactical { in_check: true } => Stage::GenerateEvasions,
                    };
                    if let Some(tt_move) = self.tt_move {
                        if pos.board().legal(tt_move) {
                            return Some(tt_move);
                        }
                        self.tt_move = None;
                    }
                }
                Stage::GenerateCaptures => {
                    self.generate_captures(pos);
                    self.stage = Stage::GoodCaptures;
                }
                Stage::GoodCaptures => {
                    while self.capture_index < self.captures.len()
                        && self.captures[self.capture_index].score >= 0
                    {
                        let entry = self.captures[self.capture_index];
                        self.capture_index += 1;
                        if Some(entry.mv) != self.tt_move {
                            return Some(entry.mv);
                        }
                    }
                    self.stage = match self.mode {
                        Mode::Normal => Stage::Killers,
                        Mode::Tactical { .. } => Stage::BadCaptures,
                    };
                }
                Stage::Killers => {
                    while self.killer_index < 2 {
                        let killer = self.killers[self.killer_index];
                        self.killer_index += 1;
                        if let Some(mv) = killer {
                            if Some(mv) != self.tt_move
                                && !pos.is_capture(mv)
                                && pos.board().legal(mv)
                            {
                                return Some(mv);
                            }
                        }
                    }
                    self.stage = Stage::Counter;
                }
                Stage::Counter => {
                    self.stage = Stage::GenerateQuiets;
                    if let Some(mv) = self.counter {
                        if Some(mv) != self.tt_move
                            && !self.killers.contains(&Some(mv))
                            && !pos.is_capture(mv)
                            && pos.board().legal(mv)
                        {
                            return Some(mv);
                        }
                        self.counter = None;
                    }
                }
                Stage::GenerateQuiets => {
                    self.generate_quiets(pos, t);
                    self.stage = Stage::Quiets;
                }
                Stage::Quiets => {
                    while self.quiet_index < self.quiets.len() {
                        let entry = self.quiets[self.quiet_index];
                        self.quiet_index += 1;
                        if !self.already_emitted_quiet(entry.mv) {
                            return Some(entry.mv);
                        }
                    }
                    self.stage = Stage::BadCaptures;
                }
                Stage::BadCaptures => {
                    while self.capture_index < self.captures.len() {
                        let entry = self.captures[self.capture_index];
                        self.capture_index += 1;
                        if Some(entry.mv) != self.tt_move {
                            return Some(entry.mv);
                        }
                    }
                    self.stage = Stage::Done;
                }
                Stage::GenerateEvasions => {
                    self.generate_evasions(pos, t);
                    self.stage = Stage::Evasions;
                }
                Stage::Evasions => {
                    while self.capture_index < self.captures.len() {
                        let entry = self.captures[self.capture_index];
                        self.capture_index += 1;
                        if Some(entry.mv) != self.tt_move {
                            return Some(entry.mv);
                        }
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => return None,
            }
        }
    }
}
