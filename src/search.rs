//! The alpha-beta search: quiescence, the main recursive search with
//! its pruning battery, the root search, and the iterative-deepening
//! driver each worker runs.
//!
//! All recursive functions return `Result<i32, Unwind>`: a stop, a
//! timeout, or pending driver input unwinds every frame back to
//! [`find_best_move`], which restores the root position and either
//! breaks off or finishes an aspiration re-search.

use std::sync::mpsc;
use std::time::Duration;

use crate::evaluation::evaluate;
use crate::movepicker::{MovePicker, Stage};
use crate::position::Position;
use crate::pv::PVariation;
use crate::see;
use crate::smp::GameState;
use crate::tablebases::Wdl;
use crate::threadlocal::ThreadData;
use crate::transpositiontable::{Bound, QUIESCENCE_DEPTH};
use crate::util::{
    Unwind, CHECKMATE, FORCED_MATE, INFINITE_SCORE, KNOWN_WIN, MAX_PLY, TABLEBASE_WIN,
};

/// Poll the clock and the input channel every this many nodes.
const CHECKUP_NODES: u64 = 1024;

const NULLMOVE_DEPTH: i32 = 3;
const NULLMOVE_BASE_REDUCTION: i32 = 2;
const NULLMOVE_DIVISOR: i32 = 6;

const FUTILITY_DEPTH: i32 = 3;
const FUTILITY_MARGIN: [i32; 4] = [0, 300, 500, 900];

const RAZORING_DEPTH: i32 = 3;
const RAZORING_MARGIN: [i32; 4] = [0, 100, 200, 400];

/// Widening schedule after a root fail; the final entry must stay
/// infinite so the window can always resolve.
const ASPIRATION_WINDOW: [i32; 6] = [25, 50, 100, 200, 400, INFINITE_SCORE];

const LMP_DEPTH: i32 = 6;
const LMP_COUNTS: [usize; 6] = [0, 5, 10, 20, 35, 55];

const PROBCUT_DEPTH: i32 = 5;
const PROBCUT_MARGIN: i32 = 210;

const SEE_PRUNE_DEPTH: i32 = 5;
const SEE_PRUNE_MARGIN: [i32; 5] = [0, -100, -200, -300, -400];

/// Per-worker search context: the shared state plus, for worker 0
/// only, the driver's input channel.
struct Ctx<'a, 'tt> {
    state: &'a GameState<'tt>,
    stdin: Option<&'a mpsc::Receiver<String>>,
}

fn checkup(t: &mut ThreadData, ctx: &Ctx) -> Result<(), Unwind> {
    let (stop, abort) = ctx.state.should_stop();
    if stop && (abort || !t.resolving_root_fail) {
        return Err(Unwind::Stopped);
    }
    if t.nodes % CHECKUP_NODES != 0 {
        return Ok(());
    }
    ctx.state.add_nodes(t.take_unflushed_nodes());
    if !ctx.state.pondering() && !ctx.state.limits.time.check_time() {
        ctx.state.stop_all(false);
        return Err(Unwind::TimeUp);
    }
    if t.id == 0 {
        poll_input(t, ctx)?;
    }
    Ok(())
}

/// Handle input that arrived mid-search. Anything that is not
/// answerable on the spot stops the search and is re-queued for the
/// driver.
fn poll_input(t: &mut ThreadData, ctx: &Ctx) -> Result<(), Unwind> {
    let Some(rx) = ctx.stdin else {
        return Ok(());
    };
    while let Ok(line) = rx.try_recv() {
        match line.trim() {
            "" => {}
            "isready" => println!("readyok"),
            "ponderhit" => ctx.state.set_pondering(false),
            "stop" => {
                ctx.state.set_pondering(false);
                ctx.state.stop_all(true);
                return Err(Unwind::Command);
            }
            _ => {
                t.pending_input = Some(line);
                ctx.state.set_pondering(false);
                ctx.state.stop_all(true);
                return Err(Unwind::Command);
            }
        }
    }
    Ok(())
}

/// Capture search at the horizon. Stands pat on the static eval when
/// not in check, tries every evasion otherwise.
fn quiescence(
    pos: &mut Position,
    t: &mut ThreadData,
    ctx: &Ctx,
    depth: i32,
    mut alpha: i32,
    beta: i32,
    pv: &mut PVariation,
) -> Result<i32, Unwind> {
    pv.clear();
    if depth < 0 {
        t.nodes += 1;
    }
    checkup(t, ctx)?;

    if pos.is_draw() {
        return Ok(0);
    }

    let static_score = evaluate(pos);
    let sply = pos.sply();
    if sply >= MAX_PLY {
        return Ok(static_score);
    }

    // The "do nothing" option: refusing a bad capture sequence keeps
    // the score anchored to the static evaluation. In check there is
    // no such option.
    let in_check = pos.in_check();
    let mut best_score = -INFINITE_SCORE;
    if !in_check {
        best_score = static_score;
        if static_score >= beta {
            return Ok(static_score);
        }
        if static_score > alpha {
            alpha = static_score;
        }
    }

    let probe = ctx
        .state
        .tt
        .probe(pos.key(), QUIESCENCE_DEPTH, sply, alpha, beta);
    if let Some(score) = probe.score {
        return Ok(score);
    }

    let original_alpha = alpha;
    let mut picker = MovePicker::tactical(pos, probe.mv);
    let mut best_move = None;
    let mut found_move = false;
    let mut child_pv = PVariation::default();
    while let Some(mv) = picker.next(pos, t) {
        // Captures that lose material are not going to stabilise the
        // position in our favour.
        if !in_check && picker.stage == Stage::BadCaptures && pos.is_capture(mv) {
            continue;
        }

        pos.make_move(mv);
        found_move = true;
        let score = -quiescence(pos, t, ctx, depth - 1, -beta, -alpha, &mut child_pv)?;
        pos.unmake_move();

        if score > best_score {
            best_score = score;
            best_move = Some(mv);
            if score > alpha {
                if score >= beta {
                    break;
                }
                alpha = score;
                pv.load_from(mv, &child_pv);
            }
        }
    }

    // When in check every move was generated, so no legal move means
    // checkmate.
    if in_check && !found_move {
        return Ok(-CHECKMATE + sply as i32);
    }

    let bound = if best_score >= beta {
        Bound::Lower
    } else if alpha > original_alpha {
        Bound::Exact
    } else {
        Bound::Upper
    };
    ctx.state
        .tt
        .store(pos.key(), best_move, QUIESCENCE_DEPTH, best_score, bound, sply);

    Ok(best_score)
}

/// The main recursive search; fail-soft.
#[allow(clippy::too_many_arguments)]
fn search(
    pos: &mut Position,
    t: &mut ThreadData,
    ctx: &Ctx,
    depth: i32,
    mut alpha: i32,
    beta: i32,
    try_null: bool,
    pv: &mut PVariation,
) -> Result<i32, Unwind> {
    pv.clear();
    let pv_node = beta - alpha > 1;
    t.nodes += 1;
    let in_check = pos.in_check();

    if depth <= 0 {
        return quiescence(pos, t, ctx, 0, alpha, beta, pv);
    }

    checkup(t, ctx)?;

    let sply = pos.sply();
    if sply > t.seldepth {
        t.seldepth = sply;
    }

    // A position counts as drawn at its first repetition: settling
    // early avoids drifting into a draw hidden past the horizon.
    if pos.is_draw() {
        return Ok(0);
    }
    if sply >= MAX_PLY {
        return Ok(evaluate(pos));
    }

    let probe = ctx.state.tt.probe(pos.key(), depth, sply, alpha, beta);
    if let Some(score) = probe.score {
        return Ok(score);
    }
    let tt_move = probe.mv;

    if ctx.state.probe_wdl && pos.piece_count() <= ctx.state.tb.max_pieces() {
        if let Some(wdl) = ctx.state.tb.probe_wdl(pos) {
            return Ok(match wdl {
                Wdl::Win => TABLEBASE_WIN - sply as i32,
                Wdl::Loss => -TABLEBASE_WIN + sply as i32,
                Wdl::Draw => 0,
            });
        }
    }

    let static_score = evaluate(pos);

    // Reverse futility: standing this far above beta at low depth, a
    // quiet defence will not bring the score back down.
    if depth <= FUTILITY_DEPTH
        && !in_check
        && !pv_node
        && pos.has_non_pawn()
        && static_score - FUTILITY_MARGIN[depth as usize] >= beta
    {
        return Ok(static_score);
    }

    // Razoring: far below alpha with no TT move, drop to quiescence
    // instead of a full search.
    if !in_check
        && !pv_node
        && tt_move.is_none()
        && depth <= RAZORING_DEPTH
        && static_score + RAZORING_MARGIN[depth as usize] <= alpha
    {
        if depth == 1 {
            return quiescence(pos, t, ctx, 0, alpha, beta, pv);
        }
        let threshold = alpha - RAZORING_MARGIN[depth as usize];
        let mut scratch = PVariation::default();
        let score = quiescence(pos, t, ctx, 0, threshold, threshold + 1, &mut scratch)?;
        if score <= threshold {
            return Ok(score);
        }
    }

    // Null move: if passing still beats beta, a real move will too.
    // Unsound in zugzwang, hence the non-pawn material condition.
    if try_null
        && ctx.state.use_nullmove
        && !in_check
        && depth > NULLMOVE_DEPTH
        && pos.has_non_pawn()
    {
        let reduction = NULLMOVE_BASE_REDUCTION + depth / NULLMOVE_DIVISOR;
        if pos.make_null_move() {
            let mut scratch = PVariation::default();
            let score = -search(
                pos,
                t,
                ctx,
                depth - reduction - 1,
                -beta,
                -beta + 1,
                false,
                &mut scratch,
            )?;
            pos.unmake_null_move();
            if score >= beta {
                // A mate score obtained through a null move is not a
                // proven mate.
                return Ok(if score < FORCED_MATE { score } else { beta });
            }
        }
    }

    // ProbCut: a good capture confirmed by a reduced search to be well
    // above beta lets us skip the full search.
    if !pv_node && !in_check && depth >= PROBCUT_DEPTH && pos.has_non_pawn() {
        let threshold = beta + PROBCUT_MARGIN;
        let mut picker = MovePicker::tactical(pos, tt_move);
        let mut scratch = PVariation::default();
        while let Some(mv) = picker.next(pos, t) {
            if !pos.is_capture(mv) {
                continue;
            }
            if !see::see_ge(pos.board(), mv, threshold - static_score) {
                continue;
            }
            pos.make_move(mv);
            let score = -search(
                pos,
                t,
                ctx,
                depth - PROBCUT_DEPTH + 1,
                -threshold,
                -threshold + 1,
                true,
                &mut scratch,
            )?;
            pos.unmake_move();
            if score >= threshold {
                return Ok(score);
            }
        }
    }

    // Futility: this node is probably lost; only tactics get searched.
    let futility_pruning =
        depth <= FUTILITY_DEPTH && static_score + FUTILITY_MARGIN[depth as usize] <= alpha;

    let side = pos.side_to_move();
    let last_move = pos.last_move();
    let mut picker = MovePicker::new(pos, t, tt_move);
    let mut best_score = -INFINITE_SCORE;
    let mut best_move = None;
    let mut bound = Bound::Upper;
    let mut movenumber = 0usize;
    let mut found_move = false;
    let mut child_pv = PVariation::default();

    while let Some(mv) = picker.next(pos, t) {
        let quiet = !pos.is_tactical(mv);
        let pawn_push = pos.is_pawn_push(mv);
        let killer = t.killers.contains(sply, mv);
        let hist = t.history.get(side, mv);

        pos.make_move(mv);
        let gives_check = pos.in_check();
        let tactical = !quiet || in_check || gives_check;
        movenumber += 1;
        found_move = true;

        // Futility pruning; always search at least one move.
        if futility_pruning && movenumber > 1 && !tactical {
            pos.unmake_move();
            continue;
        }

        // Late move pruning: moves sorted this late with no history to
        // their name rarely rescue the node.
        if !pv_node
            && depth < LMP_DEPTH
            && movenumber > LMP_COUNTS[depth as usize]
            && movenumber > 1
            && !tactical
            && !pawn_push
            && !killer
            && alpha.abs() < KNOWN_WIN
            && hist == 0
        {
            pos.unmake_move();
            continue;
        }

        // Prune moves that lose material outright; always search at
        // least one move so the node keeps a real score.
        if !pv_node
            && movenumber > 1
            && Some(mv) != tt_move
            && !in_check
            && !gives_check
            && depth < SEE_PRUNE_DEPTH
            && !see::see_ge(pos.parent_board(), mv, SEE_PRUNE_MARGIN[depth as usize])
        {
            pos.unmake_move();
            continue;
        }

        let new_depth = depth + i32::from(gives_check);

        let mut reduction = i32::from(movenumber > 3 && depth > 3 && !tactical);
        if reduction > 0 && movenumber > 6 {
            reduction += 1;
        }

        let score = if best_score == -INFINITE_SCORE {
            // Full window until something establishes a best line.
            -search(pos, t, ctx, new_depth - 1, -beta, -alpha, true, &mut child_pv)?
        } else {
            let mut score = -search(
                pos,
                t,
                ctx,
                new_depth - reduction - 1,
                -alpha - 1,
                -alpha,
                true,
                &mut child_pv,
            )?;
            if score > alpha && reduction > 0 {
                score = -search(
                    pos,
                    t,
                    ctx,
                    new_depth - 1,
                    -alpha - 1,
                    -alpha,
                    true,
                    &mut child_pv,
                )?;
            }
            if pv_node && score > alpha {
                score =
                    -search(pos, t, ctx, new_depth - 1, -beta, -alpha, true, &mut child_pv)?;
            }
            score
        };
        pos.unmake_move();

        if score > best_score {
            best_score = score;
            best_move = Some(mv);
            if score > alpha {
                if score >= beta {
                    t.killers.add(pos, mv);
                    if quiet {
                        if let Some(last) = last_move {
                            t.counters.add(side, last, mv);
                        }
                        t.history.update(side, mv, depth);
                    }
                    bound = Bound::Lower;
                    break;
                }
                bound = Bound::Exact;
                alpha = score;
                pv.load_from(mv, &child_pv);
            }
        }
    }

    if !found_move {
        bound = Bound::Exact;
        best_score = if in_check { -CHECKMATE + sply as i32 } else { 0 };
    }

    ctx.state
        .tt
        .store(pos.key(), best_move, depth, best_score, bound, sply);

    Ok(best_score)
}

/// Search the root move set. The root differs from interior nodes: the
/// move list is fixed, every move gets a full window, and improvements
/// publish the best-so-far line for the driver.
fn search_root(
    pos: &mut Position,
    t: &mut ThreadData,
    ctx: &Ctx,
    depth: i32,
    mut alpha: i32,
    beta: i32,
) -> Result<i32, Unwind> {
    checkup(t, ctx)?;
    t.root_pv.clear();

    let probe = ctx.state.tt.probe(pos.key(), depth, 0, alpha, beta);
    let tt_move = probe.mv;
    if let Some(ttm) = tt_move {
        if let Some(index) = t.root_moves.iter().position(|rm| rm.mv == ttm) {
            t.root_moves[..=index].rotate_right(1);
        }
    }

    let side = pos.side_to_move();
    let mut best_score = -INFINITE_SCORE;
    let mut best_move = tt_move;
    let mut bound = Bound::Upper;
    let mut child_pv = PVariation::default();

    for index in 0..t.root_moves.len() {
        let mv = t.root_moves[index].mv;
        t.currmovenumber = index + 1;
        t.currmove = Some(mv);
        ctx.state.report_currmove(t);

        let nodes_before = t.nodes;
        pos.make_move(mv);
        let new_depth = depth + i32::from(pos.in_check());
        let score = -search(pos, t, ctx, new_depth - 1, -beta, -alpha, true, &mut child_pv)?;
        pos.unmake_move();
        let subtree = t.nodes - nodes_before;
        t.root_moves[index].subtree_nodes += subtree;

        if score > best_score {
            best_score = score;
            best_move = Some(mv);

            if score > alpha {
                // Failing high at the root triggers a wider re-search,
                // so there is nothing useful left to do here.
                if score >= beta {
                    t.killers.add(pos, mv);
                    bound = Bound::Lower;
                    break;
                }

                bound = Bound::Exact;
                alpha = score;
                t.root_pv.load_from(mv, &child_pv);
                if !pos.is_tactical(mv) {
                    t.history.update(side, mv, depth);
                }

                // Only scores inside the window can be trusted, so the
                // best and ponder moves are published here and nowhere
                // else.
                t.best_move = Some(mv);
                t.ponder_move = t.root_pv.second();
                ctx.state.update_best(t, score);
            }
        }
    }

    ctx.state.tt.store(pos.key(), best_move, depth, best_score, bound, 0);

    Ok(best_score)
}

/// One worker's iterative-deepening loop: staggered start depths, an
/// aspiration window from depth 6 on, widening re-searches on root
/// fails, and the coordinator's per-depth voting in between.
pub fn find_best_move(
    pos: &mut Position,
    t: &mut ThreadData,
    state: &GameState,
    stdin: Option<&mpsc::Receiver<String>>,
) {
    let ctx = Ctx { state, stdin };

    // Odd workers start one ply deeper to spread the pool over the
    // shared table.
    let mut depth = 1 + (t.id % 2) as i32;
    let mut alpha = -INFINITE_SCORE;
    let mut beta = INFINITE_SCORE;
    let mut awindex = 0;
    let mut bwindex = 0;

    loop {
        t.depth = depth;
        t.seldepth = 0;
        alpha = alpha.max(-INFINITE_SCORE);
        beta = beta.min(INFINITE_SCORE);

        let score = match search_root(pos, t, &ctx, depth, alpha, beta) {
            Ok(score) => score,
            Err(_) => {
                pos.rewind_to_root();
                break;
            }
        };
        debug_assert_eq!(pos.sply(), 0);

        // Re-search the failing side with the next wider window; the
        // stop protocol lets this resolve unless the stop is an abort.
        if score <= alpha {
            awindex = (awindex + 1).min(ASPIRATION_WINDOW.len() - 1);
            alpha = score - ASPIRATION_WINDOW[awindex];
            t.resolving_root_fail = true;
            continue;
        }
        if score >= beta {
            bwindex = (bwindex + 1).min(ASPIRATION_WINDOW.len() - 1);
            beta = score + ASPIRATION_WINDOW[bwindex];
            t.resolving_root_fail = true;
            continue;
        }
        t.resolving_root_fail = false;
        t.root_score = score;

        state.add_nodes(t.take_unflushed_nodes());
        depth = state.complete_iteration(t, score);
        t.reorder_root_moves();

        // A mate is a mate; unless we are pondering there is nothing
        // left to find.
        if state.exit_on_mate && !state.pondering() && score.abs() > KNOWN_WIN {
            state.stop_all(true);
            break;
        }

        awindex = 0;
        bwindex = 0;
        if depth > 5 {
            alpha = score - ASPIRATION_WINDOW[0];
            beta = score + ASPIRATION_WINDOW[0];
        } else {
            alpha = -INFINITE_SCORE;
            beta = INFINITE_SCORE;
        }

        if !state.pondering() && !state.limits.time.new_iteration() {
            state.stop_all(false);
            break;
        }
        if depth > state.limits.depth {
            state.stop_all(true);
            break;
        }
    }

    state.add_nodes(t.take_unflushed_nodes());

    // If the iteration limit was exhausted while pondering, hold the
    // result back until the driver hears ponderhit or stop.
    if t.id == 0 {
        ponder_stall(t, &ctx);
    }
}

fn ponder_stall(t: &mut ThreadData, ctx: &Ctx) {
    let Some(rx) = ctx.stdin else {
        return;
    };
    while ctx.state.pondering() {
        match rx.recv_timeout(Duration::from_millis(10)) {
            Ok(line) => match line.trim() {
                "" => {}
                "isready" => println!("readyok"),
                "ponderhit" | "stop" => {
                    ctx.state.set_pondering(false);
                    ctx.state.stop_all(true);
                }
                _ => {
                    t.pending_input = Some(line);
                    ctx.state.set_pondering(false);
                    ctx.state.stop_all(true);
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smp::{SearchLimits, SilentReporter};
    use crate::tablebases::NoTablebases;
    use crate::transpositiontable::TranspositionTable;
    use crate::util::mate_in;
    use chess::Board;
    use std::str::FromStr;

    fn fixed_depth_search(fen: &str, depth: i32) -> (i32, PVariation) {
        let pos = Position::new(Board::from_str(fen).unwrap(), Vec::new(), 0);
        let tt = TranspositionTable::new(2);
        let state = GameState::new(
            pos,
            SearchLimits::fixed_depth(depth),
            1,
            &tt,
            &NoTablebases,
            &SilentReporter,
        );
        let mut t = ThreadData::new(0);
        t.prepare_for_search(&state.root_moves);
        let mut pos = state.pos.clone();
        let ctx = Ctx {
            state: &state,
            stdin: None,
        };
        let score = search_root(&mut pos, &mut t, &ctx, depth, -INFINITE_SCORE, INFINITE_SCORE)
            .expect("nothing stops a depth-limited test search");
        (score, t.root_pv.clone())
    }

    #[test]
    fn finds_mate_in_one() {
        let (score, pv) = fixed_depth_search("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 3);
        assert_eq!(score, mate_in(1));
        assert_eq!(pv.to_string(), "a1a8");
    }

    #[test]
    fn recognises_being_mated() {
        // Back-rank mate already on the board; no legal moves, in check.
        let pos = Position::new(
            Board::from_str("R5k1/5ppp/8/8/8/8/5PPP/6K1 b - - 0 1").unwrap(),
            Vec::new(),
            0,
        );
        let tt = TranspositionTable::new(1);
        let state = GameState::new(
            pos.clone(),
            SearchLimits::fixed_depth(2),
            1,
            &tt,
            &NoTablebases,
            &SilentReporter,
        );
        assert!(state.root_moves.is_empty());
        let mut t = ThreadData::new(0);
        t.prepare_for_search(&[]);
        let ctx = Ctx {
            state: &state,
            stdin: None,
        };
        let mut pos = pos;
        let mut scratch = PVariation::default();
        let score = search(
            &mut pos,
            &mut t,
            &ctx,
            1,
            -INFINITE_SCORE,
            INFINITE_SCORE,
            true,
            &mut scratch,
        )
        .unwrap();
        assert_eq!(score, -CHECKMATE);
    }

    #[test]
    fn fifty_move_rule_zeroes_quiet_lines() {
        let pos = Position::new(
            Board::from_str("4k3/8/8/8/8/8/4R3/4K3 w - - 0 1").unwrap(),
            Vec::new(),
            99,
        );
        let tt = TranspositionTable::new(1);
        let state = GameState::new(
            pos,
            SearchLimits::fixed_depth(3),
            1,
            &tt,
            &NoTablebases,
            &SilentReporter,
        );
        let mut t = ThreadData::new(0);
        t.prepare_for_search(&state.root_moves);
        let mut pos = state.pos.clone();
        let ctx = Ctx {
            state: &state,
            stdin: None,
        };
        // Any quiet move hits the hundredth halfmove immediately.
        pos.make_move(chess::ChessMove::new(chess::Square::E2, chess::Square::E3, None));
        let mut scratch = PVariation::default();
        let score = search(
            &mut pos,
            &mut t,
            &ctx,
            2,
            -INFINITE_SCORE,
            INFINITE_SCORE,
            true,
            &mut scratch,
        )
        .unwrap();
        assert_eq!(score, 0);
    }

    #[test]
    fn stalemate_scores_zero_from_the_search() {
        let pos = Position::new(
            Board::from_str("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap(),
            Vec::new(),
            0,
        );
        let tt = TranspositionTable::new(1);
        let state = GameState::new(
            pos.clone(),
            SearchLimits::fixed_depth(2),
            1,
            &tt,
            &NoTablebases,
            &SilentReporter,
        );
        assert!(state.root_moves.is_empty());
        let mut t = ThreadData::new(0);
        t.prepare_for_search(&[]);
        let ctx = Ctx {
            state: &state,
            stdin: None,
        };
        let mut pos = pos;
        let mut scratch = PVariation::default();
        let score = search(
            &mut pos,
            &mut t,
            &ctx,
            1,
            -INFINITE_SCORE,
            INFINITE_SCORE,
            true,
            &mut scratch,
        )
        .unwrap();
        assert_eq!(score, 0);
    }
}
