//! Cinnabar, a UCI chess engine.
//!
//! The crate implements the search side of the engine: an iterative-
//! deepening alpha-beta search with a shared lock-free transposition
//! table, a phased move selector fed by per-worker history, killer and
//! counter-move tables, quiescence search, and a set of pruning and
//! reduction heuristics. Board law comes from the `chess` crate; the
//! static evaluation is a self-contained tapered material-and-PST
//! function.

pub mod bench;
pub mod cli;
pub mod errors;
pub mod evaluation;
pub mod historytable;
pub mod movepicker;
pub mod position;
pub mod pv;
pub mod search;
pub mod see;
pub mod smp;
pub mod tablebases;
pub mod threadlocal;
pub mod timemgmt;
pub mod transpositiontable;
pub mod uci;
pub mod util;

/// The name of the engine.
pub static NAME: &str = "Cinnabar";
/// The version of the engine.
pub static VERSION: &str = env!("CARGO_PKG_VERSION");
