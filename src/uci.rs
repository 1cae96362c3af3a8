//! The UCI driver: owns the engine state between searches, parses
//! commands, and formats `info`/`bestmove` output from the reporter
//! callbacks. While a search runs, the driving thread is search worker
//! 0; commands that arrive mid-search unwind it and are handled here
//! afterwards.

use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;

use chess::{Board, ChessMove, File, Piece, Rank, Square};

use crate::errors::UciError;
use crate::position::Position;
use crate::smp::{self, GameState, IterationReport, Reporter, SearchLimits};
use crate::tablebases::NoTablebases;
use crate::threadlocal::ThreadData;
use crate::timemgmt::TimeManager;
use crate::transpositiontable::{TranspositionTable, DEFAULT_HASH_MB, MAX_HASH_MB, MIN_HASH_MB};
use crate::util::{is_mate_score, CHECKMATE, MAX_SEARCH_DEPTH};
use crate::{NAME, VERSION};

const MAX_THREADS: usize = 64;

struct EngineOptions {
    threads: usize,
    ponder_allowed: bool,
    use_nullmove: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            ponder_allowed: false,
            use_nullmove: true,
        }
    }
}

struct Engine {
    tt: TranspositionTable,
    threads: Vec<ThreadData>,
    options: EngineOptions,
    pos: Position,
    tb: NoTablebases,
}

impl Engine {
    fn new() -> Self {
        Self {
            tt: TranspositionTable::new(DEFAULT_HASH_MB),
            threads: vec![ThreadData::new(0)],
            options: EngineOptions::default(),
            pos: Position::startpos(),
            tb: NoTablebases,
        }
    }

    fn new_game(&mut self) {
        self.tt.clear();
        for t in &mut self.threads {
            t.new_game();
        }
    }

    fn set_option(&mut self, line: &str) -> Result<(), UciError> {
        let mut parts = line.split_ascii_whitespace();
        // setoption name <id> [value <x>]
        parts.next();
        if parts.next() != Some("name") {
            return Err(UciError::MissingToken("setoption"));
        }
        let name = parts.next().ok_or(UciError::MissingToken("name"))?;
        let value = match parts.next() {
            Some("value") => parts.next(),
            _ => None,
        };
        match name {
            "Hash" => {
                let mb: usize = value
                    .ok_or(UciError::MissingToken("value"))?
                    .parse()
                    .map_err(|_| UciError::ParseOption("Hash wants a number".into()))?;
                let actual = self.tt.resize(mb);
                if actual != mb {
                    println!("info string hash set to {actual} MB");
                }
            }
            "Threads" => {
                let n: usize = value
                    .ok_or(UciError::MissingToken("value"))?
                    .parse()
                    .map_err(|_| UciError::ParseOption("Threads wants a number".into()))?;
                let n = n.clamp(1, MAX_THREADS);
                self.options.threads = n;
                self.threads = (0..n).map(ThreadData::new).collect();
            }
            "Ponder" => {
                self.options.ponder_allowed = value == Some("true");
            }
            "UseNullMove" => {
                self.options.use_nullmove = value != Some("false");
            }
            other => {
                return Err(UciError::ParseOption(format!("unknown option {other:?}")));
            }
        }
        Ok(())
    }

    fn set_position(&mut self, line: &str) -> Result<(), UciError> {
        let mut parts = line.split_ascii_whitespace();
        parts.next();
        let mut board;
        let mut fifty: u16 = 0;
        match parts.next() {
            Some("startpos") => {
                board = Board::default();
                match parts.next() {
                    None | Some("moves") => {}
                    Some(other) => {
                        return Err(UciError::InvalidPosition(format!(
                            "unexpected token {other:?} after startpos"
                        )))
                    }
                }
            }
            Some("fen") => {
                let mut fields = Vec::new();
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                    fields.push(part);
                }
                let fen = fields.join(" ");
                board = Board::from_str(&fen)
                    .map_err(|err| UciError::InvalidPosition(err.to_string()))?;
                // `chess` drops the halfmove clock; recover it from the
                // raw FEN so fifty-move accounting stays correct.
                fifty = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);
            }
            _ => return Err(UciError::MissingToken("position")),
        }

        let mut prior_keys = Vec::new();
        for token in parts {
            let mv = parse_uci_move(&board, token)?;
            let resets_clock = board.piece_on(mv.get_source()) == Some(Piece::Pawn)
                || board.piece_on(mv.get_dest()).is_some();
            prior_keys.push(board.get_hash());
            board = board.make_move_new(mv);
            fifty = if resets_clock { 0 } else { fifty + 1 };
        }

        self.pos = Position::new(board, prior_keys, fifty);
        Ok(())
    }

    /// Run a `go` command to completion. Returns any input that
    /// arrived mid-search and still has to be processed.
    fn go(&mut self, line: &str, rx: &mpsc::Receiver<String>) -> Result<Option<String>, UciError> {
        let parsed = parse_go(line, &self.pos)?;

        let Engine {
            tt,
            threads,
            options,
            pos,
            tb,
        } = self;
        let mut state = GameState::new(
            pos.clone(),
            parsed.limits,
            options.threads,
            &*tt,
            &*tb,
            &UciReporter,
        );
        state.use_nullmove = options.use_nullmove;
        if let Some(allowed) = &parsed.searchmoves {
            state.restrict_root_moves(allowed);
        }
        state.set_pondering(parsed.ponder && options.ponder_allowed);

        let report = smp::start_search(&state, threads, Some(rx));

        match report.best_move {
            Some(best) => match report.ponder_move {
                Some(ponder) => println!("bestmove {best} ponder {ponder}"),
                None => println!("bestmove {best}"),
            },
            None => println!("bestmove 0000"),
        }
        let _ = io::stdout().flush();
        Ok(report.pending_input)
    }
}

struct ParsedGo {
    limits: SearchLimits,
    ponder: bool,
    searchmoves: Option<Vec<ChessMove>>,
}

fn parse_go(line: &str, pos: &Position) -> Result<ParsedGo, UciError> {
    let mut depth: Option<i32> = None;
    let mut movetime: Option<u64> = None;
    let mut wtime: Option<u64> = None;
    let mut btime: Option<u64> = None;
    let mut winc: u64 = 0;
    let mut binc: u64 = 0;
    let mut moves_to_go: Option<u64> = None;
    let mut infinite = false;
    let mut ponder = false;
    let mut searchmoves = None;

    fn number<'s>(
        name: &'static str,
        parts: &mut impl Iterator<Item = &'s str>,
    ) -> Result<u64, UciError> {
        parts
            .next()
            .ok_or(UciError::MissingToken(name))?
            .parse()
            .map_err(UciError::from)
    }

    let mut parts = line.split_ascii_whitespace().peekable();
    parts.next();
    while let Some(token) = parts.next() {
        match token {
            "depth" => depth = Some(number("depth", &mut parts)? as i32),
            "movetime" => movetime = Some(number("movetime", &mut parts)?),
            "wtime" => wtime = Some(number("wtime", &mut parts)?),
            "btime" => btime = Some(number("btime", &mut parts)?),
            "winc" => winc = number("winc", &mut parts)?,
            "binc" => binc = number("binc", &mut parts)?,
            "movestogo" => moves_to_go = Some(number("movestogo", &mut parts)?),
            "infinite" => infinite = true,
            "ponder" => ponder = true,
            "nodes" | "mate" => {
                // Accepted but unsupported; consume the argument.
                let _ = parts.next();
            }
            "searchmoves" => {
                let mut allowed = Vec::new();
                while let Some(&candidate) = parts.peek() {
                    match parse_uci_move(pos.board(), candidate) {
                        Ok(mv) => {
                            allowed.push(mv);
                            parts.next();
                        }
                        Err(_) => break,
                    }
                }
                searchmoves = Some(allowed);
            }
            other => return Err(UciError::ParseGo(format!("unknown token {other:?}"))),
        }
    }

    let (clock, increment) = match pos.side_to_move() {
        chess::Color::White => (wtime, winc),
        chess::Color::Black => (btime, binc),
    };

    let time = if infinite {
        TimeManager::infinite()
    } else if let Some(ms) = movetime {
        TimeManager::fixed_time(ms)
    } else if let Some(clock) = clock {
        match moves_to_go {
            Some(mtg) => TimeManager::tournament(clock, increment, mtg),
            None if increment > 0 => TimeManager::fischer(clock, increment),
            None => TimeManager::sudden_death(clock),
        }
    } else {
        TimeManager::infinite()
    };

    Ok(ParsedGo {
        limits: SearchLimits {
            depth: depth.unwrap_or(MAX_SEARCH_DEPTH).clamp(1, MAX_SEARCH_DEPTH),
            time,
        },
        ponder,
        searchmoves,
    })
}

pub fn parse_uci_move(board: &Board, text: &str) -> Result<ChessMove, UciError> {
    let bytes = text.as_bytes();
    if !(4..=5).contains(&bytes.len()) {
        return Err(UciError::InvalidMove(text.into()));
    }
    let square = |file: u8, rank: u8| -> Result<Square, UciError> {
        let file = file.wrapping_sub(b'a') as usize;
        let rank = rank.wrapping_sub(b'1') as usize;
        if file > 7 || rank > 7 {
            return Err(UciError::InvalidMove(text.into()));
        }
        Ok(Square::make_square(
            Rank::from_index(rank),
            File::from_index(file),
        ))
    };
    let from = square(bytes[0], bytes[1])?;
    let to = square(bytes[2], bytes[3])?;
    let promotion = match bytes.get(4) {
        None => None,
        Some(b'n') => Some(Piece::Knight),
        Some(b'b') => Some(Piece::Bishop),
        Some(b'r') => Some(Piece::Rook),
        Some(b'q') => Some(Piece::Queen),
        Some(_) => return Err(UciError::InvalidMove(text.into())),
    };
    let mv = ChessMove::new(from, to, promotion);
    if board.legal(mv) {
        Ok(mv)
    } else {
        Err(UciError::IllegalMove(text.into()))
    }
}

/// `score cp N` or, for mate scores, `score mate N` in moves.
fn format_score(score: i32) -> String {
    if is_mate_score(score) {
        let plies = CHECKMATE - score.abs();
        let moves = (plies + 1) / 2;
        if score > 0 {
            format!("mate {moves}")
        } else {
            format!("mate -{moves}")
        }
    } else {
        format!("cp {score}")
    }
}

struct UciReporter;

impl Reporter for UciReporter {
    fn iteration(&self, r: &IterationReport) {
        let nps = r.nodes * 1000 / r.elapsed_ms.max(1);
        println!(
            "info depth {} seldepth {} score {} nodes {} nps {} hashfull {} time {} pv {}",
            r.depth,
            r.seldepth,
            format_score(r.score),
            r.nodes,
            nps,
            r.hashfull,
            r.elapsed_ms,
            r.pv,
        );
        let _ = io::stdout().flush();
    }

    fn currmove(&self, mv: ChessMove, number: usize, depth: i32) {
        println!("info depth {depth} currmove {mv} currmovenumber {number}");
        let _ = io::stdout().flush();
    }
}

pub fn main_loop() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("cinnabar-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    let mut engine = Engine::new();
    let mut pending: Option<String> = None;

    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => match rx.recv() {
                Ok(line) => line,
                Err(_) => break,
            },
        };
        let cmd = line.trim();
        let first = cmd.split_ascii_whitespace().next().unwrap_or("");

        let outcome: Result<(), UciError> = match first {
            "" => Ok(()),
            "uci" => {
                println!("id name {NAME} {VERSION}");
                println!("id author the {NAME} developers");
                println!(
                    "option name Hash type spin default {DEFAULT_HASH_MB} \
                     min {MIN_HASH_MB} max {MAX_HASH_MB}"
                );
                println!("option name Threads type spin default 1 min 1 max {MAX_THREADS}");
                println!("option name Ponder type check default false");
                println!("option name UseNullMove type check default true");
                println!("uciok");
                Ok(())
            }
            "isready" => {
                println!("readyok");
                Ok(())
            }
            "ucinewgame" => {
                engine.new_game();
                Ok(())
            }
            "setoption" => engine.set_option(cmd),
            "position" => engine.set_position(cmd),
            "go" => match engine.go(cmd, &rx) {
                Ok(followup) => {
                    pending = followup;
                    Ok(())
                }
                Err(err) => Err(err),
            },
            // No search is running when these reach the main loop.
            "stop" | "ponderhit" => Ok(()),
            "quit" => break,
            other => Err(UciError::UnknownCommand(other.into())),
        };
        if let Err(err) = outcome {
            println!("info string error: {err}");
        }
        let _ = io::stdout().flush();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::mate_in;

    #[test]
    fn score_formatting() {
        assert_eq!(format_score(123), "cp 123");
        assert_eq!(format_score(mate_in(1)), "mate 1");
        assert_eq!(format_score(mate_in(4)), "mate 2");
        assert_eq!(format_score(-mate_in(3)), "mate -2");
    }

    #[test]
    fn uci_moves_parse_and_validate() {
        let board = Board::default();
        let mv = parse_uci_move(&board, "e2e4").unwrap();
        assert_eq!(mv, ChessMove::new(Square::E2, Square::E4, None));
        assert!(parse_uci_move(&board, "e2e5").is_err());
        assert!(parse_uci_move(&board, "zz11").is_err());
        assert!(parse_uci_move(&board, "e2").is_err());
    }

    #[test]
    fn position_command_builds_repetition_history() {
        let mut engine = Engine::new();
        engine
            .set_position("position startpos moves g1f3 g8f6 f3g1 f6g8")
            .unwrap();
        // Same position as the start position, reached once before.
        assert!(engine.pos.is_repetition());
        assert_eq!(engine.pos.fifty(), 4);
    }

    #[test]
    fn fen_positions_keep_their_halfmove_clock() {
        let mut engine = Engine::new();
        engine
            .set_position("position fen 4k3/8/8/8/8/8/4R3/4K3 w - - 99 70")
            .unwrap();
        assert_eq!(engine.pos.fifty(), 99);
    }

    #[test]
    fn go_parsing_picks_the_right_clock() {
        let pos = Position::startpos();
        let parsed = parse_go("go wtime 60000 btime 1000 winc 1000 binc 0", &pos).unwrap();
        assert_eq!(parsed.limits.depth, MAX_SEARCH_DEPTH);
        assert!(!parsed.ponder);
        let parsed = parse_go("go depth 9", &pos).unwrap();
        assert_eq!(parsed.limits.depth, 9);
    }
}
