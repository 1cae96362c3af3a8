//! End-to-end search scenarios: fixed depth, one worker, fresh table
//! unless a test says otherwise.

use std::str::FromStr;
use std::time::Instant;

use chess::{Board, BoardStatus, ChessMove, MoveGen, Square};

use cinnabar::position::Position;
use cinnabar::smp::{self, GameState, SearchLimits, SearchReport, SilentReporter};
use cinnabar::tablebases::NoTablebases;
use cinnabar::threadlocal::ThreadData;
use cinnabar::timemgmt::TimeManager;
use cinnabar::transpositiontable::TranspositionTable;
use cinnabar::util::{CHECKMATE, KNOWN_WIN};

struct Outcome {
    report: SearchReport,
    pv: Vec<ChessMove>,
}

fn run_search(pos: Position, limits: SearchLimits, workers: usize, nullmove: bool) -> Outcome {
    let tt = TranspositionTable::new(8);
    let mut state = GameState::new(pos, limits, workers, &tt, &NoTablebases, &SilentReporter);
    state.use_nullmove = nullmove;
    let mut threads: Vec<ThreadData> = (0..workers).map(ThreadData::new).collect();
    let report = smp::start_search(&state, &mut threads, None);
    let pv = threads[0].root_pv.moves().to_vec();
    Outcome { report, pv }
}

fn search_fen(fen: &str, depth: i32) -> Outcome {
    let pos = Position::new(Board::from_str(fen).unwrap(), Vec::new(), 0);
    run_search(pos, SearchLimits::fixed_depth(depth), 1, true)
}

#[test]
fn startpos_prefers_a_sound_opening_move() {
    let outcome = search_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 8);
    let score = outcome.report.score;
    assert!((-50..=50).contains(&score), "startpos score {score} out of range");

    let sensible = ["e2e4", "d2d4", "c2c4", "g1f3"];
    let best = outcome.report.best_move.expect("a best move").to_string();
    assert!(sensible.contains(&best.as_str()), "unexpected opening move {best}");
}

#[test]
fn mate_is_found_and_the_pv_delivers_it() {
    let outcome = search_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 8);
    assert!(
        outcome.report.score >= CHECKMATE - 4,
        "expected a short mate, got {}",
        outcome.report.score
    );

    // Replaying the PV from the root must be legal throughout and end
    // in checkmate.
    let mut board = Board::from_str("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1").unwrap();
    assert!(!outcome.pv.is_empty());
    for mv in &outcome.pv {
        assert!(board.legal(*mv), "illegal pv move {mv}");
        board = board.make_move_new(*mv);
    }
    assert_eq!(board.status(), BoardStatus::Checkmate);
}

#[test]
fn stalemate_has_no_moves_and_scores_zero() {
    let board = Board::from_str("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
    assert_eq!(MoveGen::new_legal(&board).len(), 0);

    let outcome = search_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", 3);
    assert_eq!(outcome.report.score, 0);
    assert!(outcome.report.best_move.is_none());
}

#[test]
fn returning_to_a_position_from_the_game_history_is_a_draw() {
    // The root position already occurred once; shuffling back to it
    // must score exactly zero despite the extra rook.
    let board = Board::from_str("4k3/8/8/8/8/8/4R3/4K3 w - - 0 1").unwrap();
    let mut pos = Position::new(board, vec![board.get_hash()], 8);
    for mv in [
        ChessMove::new(Square::E2, Square::E3, None),
        ChessMove::new(Square::E8, Square::D8, None),
        ChessMove::new(Square::E3, Square::E2, None),
        ChessMove::new(Square::D8, Square::E8, None),
    ] {
        pos.make_move(mv);
    }
    assert!(pos.is_repetition());
}

#[test]
fn zugzwang_mate_survives_null_move_pruning() {
    let fen = "6k1/6p1/6K1/8/8/8/8/5Q2 w - - 0 1";
    let pos = Position::new(Board::from_str(fen).unwrap(), Vec::new(), 0);
    let with_null = run_search(pos.clone(), SearchLimits::fixed_depth(6), 1, true);
    let without_null = run_search(pos, SearchLimits::fixed_depth(6), 1, false);

    assert!(
        with_null.report.score >= CHECKMATE - 6,
        "null-move search lost the mate: {}",
        with_null.report.score
    );
    assert_eq!(with_null.report.score, without_null.report.score);
}

#[test]
fn quiet_moves_at_the_fifty_move_boundary_draw() {
    let board = Board::from_str("4k3/8/8/8/8/8/4R3/4K3 w - - 99 80").unwrap();
    let pos = Position::new(board, Vec::new(), 99);
    let outcome = run_search(pos, SearchLimits::fixed_depth(4), 1, true);
    // Every root move is quiet, so every line crosses halfmove 100.
    assert_eq!(outcome.report.score, 0);
}

#[test]
fn single_worker_searches_are_deterministic() {
    let fen = "r2qkbnr/ppp2ppp/2np4/4p3/2B1P1b1/5N2/PPPP1PPP/RNBQ1RK1 w kq - 2 5";
    let first = search_fen(fen, 5);
    let second = search_fen(fen, 5);
    assert_eq!(first.report.score, second.report.score);
    assert_eq!(first.report.best_move, second.report.best_move);
    assert_eq!(first.pv, second.pv);
}

#[test]
fn exit_on_mate_reports_before_the_depth_limit() {
    let outcome = search_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 50);
    assert!(outcome.report.score.abs() > KNOWN_WIN);
    assert!(outcome.report.depth < 50, "searched past a proven mate");
}

#[test]
fn multiple_workers_agree_on_a_legal_move() {
    let fen = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4";
    let pos = Position::new(Board::from_str(fen).unwrap(), Vec::new(), 0);
    let outcome = run_search(pos, SearchLimits::fixed_depth(6), 2, true);

    let board = Board::from_str(fen).unwrap();
    let best = outcome.report.best_move.expect("a best move");
    assert!(board.legal(best));
    assert!(outcome.report.score.abs() < KNOWN_WIN);
}

#[test]
fn timed_searches_stop_and_still_produce_a_legal_move() {
    let fen = "r2qkbnr/ppp2ppp/2np4/4p3/2B1P1b1/5N2/PPPP1PPP/RNBQ1RK1 w kq - 2 5";
    let pos = Position::new(Board::from_str(fen).unwrap(), Vec::new(), 0);
    let start = Instant::now();
    let outcome = run_search(
        pos,
        SearchLimits::timed(TimeManager::fixed_time(100)),
        1,
        true,
    );
    assert!(
        start.elapsed().as_millis() < 5_000,
        "hard budget was not honoured"
    );
    let board = Board::from_str(fen).unwrap();
    assert!(board.legal(outcome.report.best_move.expect("a best move")));
}

#[test]
fn searchmoves_restricts_the_root() {
    let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    let pos = Position::new(Board::from_str(fen).unwrap(), Vec::new(), 0);
    let tt = TranspositionTable::new(4);
    let mut state = GameState::new(
        pos,
        SearchLimits::fixed_depth(5),
        1,
        &tt,
        &NoTablebases,
        &SilentReporter,
    );
    let only = ChessMove::new(Square::A2, Square::A3, None);
    state.restrict_root_moves(&[only]);
    let mut threads = vec![ThreadData::new(0)];
    let report = smp::start_search(&state, &mut threads, None);
    assert_eq!(report.best_move, Some(only));
}
