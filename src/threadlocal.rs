use chess::ChessMove;

use crate::historytable::{CounterMoveTable, HistoryTable, KillerTable};
use crate::pv::PVariation;
use crate::util::INFINITE_SCORE;

/// One root move together with the size of the subtree it produced in
/// the last iteration; larger subtrees are searched earlier next time.
#[derive(Clone, Copy, Debug)]
pub struct RootMove {
    pub mv: ChessMove,
    pub subtree_nodes: u64,
}

/// Everything a single search worker owns. Heuristic tables persist
/// across searches within a game and are only cleared on `ucinewgame`;
/// the rest is reset when a search starts.
pub struct ThreadData {
    pub id: usize,

    pub killers: KillerTable,
    pub history: HistoryTable,
    pub counters: CounterMoveTable,

    pub root_moves: Vec<RootMove>,
    pub root_pv: PVariation,
    pub root_score: i32,

    pub depth: i32,
    pub seldepth: usize,
    pub nodes: u64,
    flushed_nodes: u64,

    pub currmove: Option<ChessMove>,
    pub currmovenumber: usize,
    pub best_move: Option<ChessMove>,
    pub ponder_move: Option<ChessMove>,

    /// Set while this worker widens an aspiration window after a root
    /// fail; a soft stop is deferred until the re-search resolves.
    pub resolving_root_fail: bool,

    /// A command line received mid-search, to be handled by the driver
    /// once the search has unwound.
    pub pending_input: Option<String>,
}

impl ThreadData {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            killers: KillerTable::new(),
            history: HistoryTable::new(),
            counters: CounterMoveTable::new(),
            root_moves: Vec::new(),
            root_pv: PVariation::default(),
            root_score: -INFINITE_SCORE,
            depth: 0,
            seldepth: 0,
            nodes: 0,
            flushed_nodes: 0,
            currmove: None,
            currmovenumber: 0,
            best_move: None,
            ponder_move: None,
            resolving_root_fail: false,
            pending_input: None,
        }
    }

    /// Reset per-search state; heuristic tables are left alone.
    pub fn prepare_for_search(&mut self, root_moves: &[ChessMove]) {
        self.root_moves = root_moves
            .iter()
            .map(|&mv| RootMove {
                mv,
                subtree_nodes: 0,
            })
            .collect();
        self.root_pv.clear();
        self.root_score = -INFINITE_SCORE;
        self.depth = 0;
        self.seldepth = 0;
        self.nodes = 0;
        self.flushed_nodes = 0;
        self.currmove = None;
        self.currmovenumber = 0;
        self.best_move = None;
        self.ponder_move = None;
        self.resolving_root_fail = false;
        self.pending_input = None;
    }

    /// Clear the heuristic tables; called on `ucinewgame`.
    pub fn new_game(&mut self) {
        self.killers.clear();
        self.history.clear();
        self.counters.clear();
    }

    /// Nodes searched since the last flush to the shared counter.
    pub fn take_unflushed_nodes(&mut self) -> u64 {
        let delta = self.nodes - self.flushed_nodes;
        self.flushed_nodes = self.nodes;
        delta
    }

    /// Move the best root move to the front and order the rest by the
    /// work their subtrees took, so the next iteration tries the most
    /// promising alternatives first.
    pub fn reorder_root_moves(&mut self) {
        if let Some(best) = self.best_move {
            if let Some(index) = self.root_moves.iter().position(|rm| rm.mv == best) {
                self.root_moves[..=index].rotate_right(1);
            }
        }
        if self.root_moves.len() > 1 {
            self.root_moves[1..].sort_by_key(|rm| std::cmp::Reverse(rm.subtree_nodes));
        }
    }
}
