//! Fixed-position benchmark, single worker, deterministic node counts.

use std::str::FromStr;
use std::time::Instant;

use chess::Board;

use crate::position::Position;
use crate::smp::{self, GameState, SearchLimits, SilentReporter};
use crate::tablebases::NoTablebases;
use crate::threadlocal::ThreadData;
use crate::transpositiontable::TranspositionTable;

const BENCH_POSITIONS: &[&str] = &[
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1",
    "8/8/1k6/8/8/8/6K1/3R4 w - - 0 1",
];

pub fn run(depth: i32, hash: usize) -> anyhow::Result<()> {
    let tt = TranspositionTable::new(hash);
    let mut threads = vec![ThreadData::new(0)];
    let mut total_nodes = 0u64;
    let start = Instant::now();

    for (index, fen) in BENCH_POSITIONS.iter().enumerate() {
        let board = Board::from_str(fen).map_err(|err| anyhow::anyhow!(err.to_string()))?;
        let pos = Position::new(board, Vec::new(), 0);
        let state = GameState::new(
            pos,
            SearchLimits::fixed_depth(depth),
            1,
            &tt,
            &NoTablebases,
            &SilentReporter,
        );
        threads[0].new_game();
        tt.clear();
        let report = smp::start_search(&state, &mut threads, None);
        total_nodes += report.nodes;
        println!(
            "position {:>2}: best {:>6} nodes {:>10}",
            index + 1,
            report
                .best_move
                .map_or_else(|| "none".into(), |mv| mv.to_string()),
            report.nodes,
        );
    }

    let elapsed = start.elapsed();
    let nps = total_nodes * 1000 / (elapsed.as_millis() as u64).max(1);
    println!("{total_nodes} nodes {nps} nps");
    Ok(())
}
