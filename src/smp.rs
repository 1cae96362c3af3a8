//! Shared-memory parallel search coordination.
//!
//! `start_search` runs worker 0 on the calling thread (which is the
//! only one allowed to poll the driver's input channel) and spawns the
//! remaining workers. Everything the workers share lives in
//! [`GameState`]: the transposition table, the stop/abort flags, the
//! completed-depth counter, and a short-mutex best-so-far slot. All
//! other search state is worker-local.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;

use chess::{ChessMove, MoveGen};

use crate::position::Position;
use crate::pv::PVariation;
use crate::search;
use crate::tablebases::TbProber;
use crate::threadlocal::ThreadData;
use crate::timemgmt::TimeManager;
use crate::transpositiontable::TranspositionTable;
use crate::util::{mated_in, INFINITE_SCORE, MAX_SEARCH_DEPTH};

const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Maximum iteration depth.
    pub depth: i32,
    pub time: TimeManager,
}

impl SearchLimits {
    pub fn infinite() -> Self {
        Self {
            depth: MAX_SEARCH_DEPTH,
            time: TimeManager::infinite(),
        }
    }

    pub fn fixed_depth(depth: i32) -> Self {
        Self {
            depth: depth.min(MAX_SEARCH_DEPTH),
            time: TimeManager::infinite(),
        }
    }

    pub fn timed(time: TimeManager) -> Self {
        Self {
            depth: MAX_SEARCH_DEPTH,
            time,
        }
    }
}

/// One completed iteration, handed to the driver for formatting.
pub struct IterationReport<'a> {
    pub depth: i32,
    pub seldepth: usize,
    pub score: i32,
    pub pv: &'a PVariation,
    pub elapsed_ms: u64,
    pub nodes: u64,
    pub hashfull: usize,
}

/// Where search progress goes. The UCI driver prints `info` lines;
/// tests and bench use [`SilentReporter`].
pub trait Reporter: Sync {
    fn iteration(&self, report: &IterationReport);

    fn currmove(&self, _mv: ChessMove, _number: usize, _depth: i32) {}
}

pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn iteration(&self, _report: &IterationReport) {}
}

#[derive(Default)]
struct BestLine {
    depth: i32,
    score: i32,
    mv: Option<ChessMove>,
    ponder: Option<ChessMove>,
}

/// State shared by every worker of one search.
pub struct GameState<'a> {
    pub pos: Position,
    pub root_moves: Vec<ChessMove>,
    pub limits: SearchLimits,
    pub n_workers: usize,

    pub probe_wdl: bool,
    pub exit_on_mate: bool,
    pub use_nullmove: bool,

    pondering: AtomicBool,
    stop: AtomicBool,
    abort: AtomicBool,
    completed_depth: AtomicI32,
    seldepth: AtomicUsize,
    nodes: AtomicU64,
    best: Mutex<BestLine>,
    depth_claims: Mutex<[u8; MAX_SEARCH_DEPTH as usize + 2]>,

    pub tt: &'a TranspositionTable,
    pub tb: &'a dyn TbProber,
    pub reporter: &'a dyn Reporter,
}

impl<'a> GameState<'a> {
    pub fn new(
        pos: Position,
        limits: SearchLimits,
        n_workers: usize,
        tt: &'a TranspositionTable,
        tb: &'a dyn TbProber,
        reporter: &'a dyn Reporter,
    ) -> Self {
        let root_moves = MoveGen::new_legal(pos.board()).collect();
        Self {
            pos,
            root_moves,
            limits,
            n_workers: n_workers.max(1),
            probe_wdl: false,
            exit_on_mate: true,
            use_nullmove: true,
            pondering: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            completed_depth: AtomicI32::new(0),
            seldepth: AtomicUsize::new(0),
            nodes: AtomicU64::new(0),
            best: Mutex::new(BestLine::default()),
            depth_claims: Mutex::new([0; MAX_SEARCH_DEPTH as usize + 2]),
            tt,
            tb,
            reporter,
        }
    }

    /// Apply a `searchmoves` restriction to the root move set.
    pub fn restrict_root_moves(&mut self, allowed: &[ChessMove]) {
        self.root_moves.retain(|mv| allowed.contains(mv));
    }

    pub fn set_pondering(&self, value: bool) {
        self.pondering.store(value, Ordering::SeqCst);
    }

    pub fn pondering(&self) -> bool {
        self.pondering.load(Ordering::SeqCst)
    }

    /// Consulted at every checkup. The second flag distinguishes a
    /// hard abort from a soft stop that lets an aspiration re-search
    /// finish first.
    pub fn should_stop(&self) -> (bool, bool) {
        (
            self.stop.load(Ordering::Relaxed),
            self.abort.load(Ordering::Relaxed),
        )
    }

    pub fn stop_all(&self, abort: bool) {
        if abort {
            self.abort.store(true, Ordering::SeqCst);
        }
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn completed_depth(&self) -> i32 {
        self.completed_depth.load(Ordering::Relaxed)
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    pub fn add_nodes(&self, delta: u64) {
        self.nodes.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn seldepth(&self) -> usize {
        self.seldepth.load(Ordering::Relaxed)
    }

    pub fn best_move(&self) -> Option<ChessMove> {
        self.best.lock().unwrap().mv
    }

    pub fn ponder_move(&self) -> Option<ChessMove> {
        self.best.lock().unwrap().ponder
    }

    pub fn best_score(&self) -> i32 {
        self.best.lock().unwrap().score
    }

    /// Publish a worker's new root best line. Taken whenever a root
    /// move raises alpha, so a stopped search always has the strongest
    /// line seen so far.
    pub fn update_best(&self, t: &ThreadData, score: i32) {
        let mut best = self.best.lock().unwrap();
        if best.mv.is_none()
            || t.depth > best.depth
            || (t.depth == best.depth && score > best.score)
        {
            best.depth = t.depth;
            best.score = score;
            best.mv = t.root_pv.first().or(t.best_move);
            best.ponder = t.root_pv.second();
        }
    }

    pub fn report_currmove(&self, t: &ThreadData) {
        if t.id == 0 && t.depth > self.completed_depth() {
            if let Some(mv) = t.currmove {
                self.reporter.currmove(mv, t.currmovenumber, t.depth);
            }
        }
    }

    /// Record a finished iteration. The first worker through a depth
    /// reports it; the returned value is the depth this worker should
    /// search next, steered away from depths that already have half
    /// the pool working on them.
    pub fn complete_iteration(&self, t: &mut ThreadData, score: i32) -> i32 {
        let mut claims = self.depth_claims.lock().unwrap();
        self.seldepth.fetch_max(t.seldepth, Ordering::Relaxed);

        if t.depth > self.completed_depth.load(Ordering::Relaxed) {
            self.completed_depth.store(t.depth, Ordering::Relaxed);
            self.reporter.iteration(&IterationReport {
                depth: t.depth,
                seldepth: self.seldepth(),
                score,
                pv: &t.root_pv,
                elapsed_ms: self.limits.time.elapsed_ms(),
                nodes: self.nodes(),
                hashfull: self.tt.hashfull(),
            });
        }

        let threshold = (self.n_workers / 2).max(1) as u8;
        let mut next = (self.completed_depth.load(Ordering::Relaxed) + 1).max(t.depth + 1);
        while (next as usize) < claims.len() && claims[next as usize] >= threshold {
            next += 1;
        }
        if (next as usize) < claims.len() {
            claims[next as usize] += 1;
        }
        next
    }
}

/// The outcome handed back to the driver when every worker has joined.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub best_move: Option<ChessMove>,
    pub ponder_move: Option<ChessMove>,
    pub score: i32,
    pub depth: i32,
    pub nodes: u64,
    /// Input that arrived mid-search and still needs handling.
    pub pending_input: Option<String>,
}

/// Run the search to completion on `state.n_workers` threads and block
/// until they have all joined. Worker 0 runs on the calling thread and
/// is the only one that sees `stdin`.
pub fn start_search(
    state: &GameState,
    threads: &mut [ThreadData],
    stdin: Option<&mpsc::Receiver<String>>,
) -> SearchReport {
    assert!(!threads.is_empty(), "search needs at least one worker");

    if state.root_moves.is_empty() {
        // Checkmated or stalemated at the root; there is nothing to
        // search and no move to return.
        let score = if state.pos.in_check() { mated_in(0) } else { 0 };
        return SearchReport {
            best_move: None,
            ponder_move: None,
            score,
            depth: 0,
            nodes: 0,
            pending_input: None,
        };
    }

    state.tt.increase_age();
    for t in threads.iter_mut() {
        t.prepare_for_search(&state.root_moves);
    }

    let n_workers = state.n_workers.min(threads.len());
    let (worker_zero, helpers) = threads.split_first_mut().unwrap();
    thread::scope(|scope| {
        for t in helpers[..n_workers - 1].iter_mut() {
            thread::Builder::new()
                .name(format!("cinnabar-worker-{}", t.id))
                .stack_size(WORKER_STACK_SIZE)
                .spawn_scoped(scope, move || {
                    let mut pos = state.pos.clone();
                    search::find_best_move(&mut pos, t, state, None);
                })
                .expect("failed to spawn search worker");
        }
        let mut pos = state.pos.clone();
        search::find_best_move(&mut pos, &mut *worker_zero, state, stdin);
        // A finished worker 0 means the search is over for everyone.
        state.stop_all(true);
    });

    let best = state.best.lock().unwrap();
    SearchReport {
        // A stopped search must still produce a legal move; fall back
        // to the first root move if no iteration ever finished.
        best_move: best.mv.or_else(|| state.root_moves.first().copied()),
        ponder_move: best.ponder,
        score: if best.mv.is_some() { best.score } else { -INFINITE_SCORE },
        depth: state.completed_depth(),
        nodes: state.nodes(),
        pending_input: worker_zero.pending_input.take(),
    }
}
