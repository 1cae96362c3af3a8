//! Per-move time budgeting.
//!
//! From the clock state the controller derives an ideal budget (stop
//! starting new iterations once it is half spent) and a hard budget
//! (abort the search outright). Pondering suspends both; the driver
//! re-enables them on `ponderhit`.

use std::time::{Duration, Instant};

/// How the search is limited, mirroring the classical time controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    /// Search until told to stop.
    Infinite,
    /// Exactly the given time per move.
    FixedTime,
    /// All remaining time, no increment.
    SuddenDeath,
    /// Remaining time plus an increment per move.
    Fischer,
    /// A number of moves must be played within the remaining time.
    Tournament,
}

const MOVE_OVERHEAD_MS: u64 = 10;

/// Fraction of the remaining clock allotted to one move.
const CLOCK_DIVISOR: u64 = 30;

#[derive(Debug, Clone)]
pub struct TimeManager {
    start: Instant,
    mode: TimeMode,
    ideal: Duration,
    hard: Duration,
}

impl TimeManager {
    pub fn infinite() -> Self {
        Self {
            start: Instant::now(),
            mode: TimeMode::Infinite,
            ideal: Duration::ZERO,
            hard: Duration::ZERO,
        }
    }

    pub fn fixed_time(movetime_ms: u64) -> Self {
        let budget = movetime_ms.saturating_sub(MOVE_OVERHEAD_MS).max(1);
        Self {
            start: Instant::now(),
            mode: TimeMode::FixedTime,
            ideal: Duration::from_millis(budget),
            hard: Duration::from_millis(budget),
        }
    }

    pub fn sudden_death(clock_ms: u64) -> Self {
        Self::from_clock(TimeMode::SuddenDeath, clock_ms, 0, None)
    }

    pub fn fischer(clock_ms: u64, increment_ms: u64) -> Self {
        Self::from_clock(TimeMode::Fischer, clock_ms, increment_ms, None)
    }

    pub fn tournament(clock_ms: u64, increment_ms: u64, moves_to_go: u64) -> Self {
        Self::from_clock(TimeMode::Tournament, clock_ms, increment_ms, Some(moves_to_go))
    }

    fn from_clock(
        mode: TimeMode,
        clock_ms: u64,
        increment_ms: u64,
        moves_to_go: Option<u64>,
    ) -> Self {
        let max_spend = clock_ms.saturating_sub(MOVE_OVERHEAD_MS);
        let ideal = match moves_to_go {
            Some(mtg) => clock_ms / mtg.clamp(2, CLOCK_DIVISOR),
            None => clock_ms / CLOCK_DIVISOR + increment_ms * 3 / 4,
        };
        let ideal = ideal.min(max_spend).max(1);
        let hard = (ideal * 5 / 2).min(max_spend).max(1);
        Self {
            start: Instant::now(),
            mode,
            ideal: Duration::from_millis(ideal),
            hard: Duration::from_millis(hard),
        }
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Is there enough budget left to make starting another iteration
    /// worthwhile? A new depth typically costs more than everything
    /// searched so far, so past half the ideal budget the answer is no.
    pub fn new_iteration(&self) -> bool {
        match self.mode {
            TimeMode::Infinite | TimeMode::FixedTime => true,
            _ => self.elapsed() * 2 < self.ideal,
        }
    }

    /// Still within the hard budget? `false` demands an immediate stop.
    pub fn check_time(&self) -> bool {
        match self.mode {
            TimeMode::Infinite => true,
            _ => self.elapsed() < self.hard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_never_stops() {
        let tm = TimeManager::infinite();
        assert!(tm.check_time());
        assert!(tm.new_iteration());
    }

    #[test]
    fn fixed_time_always_starts_iterations_within_budget() {
        let tm = TimeManager::fixed_time(5_000);
        assert!(tm.new_iteration());
        assert!(tm.check_time());
    }

    #[test]
    fn fixed_time_expires() {
        let tm = TimeManager::fixed_time(MOVE_OVERHEAD_MS + 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!tm.check_time());
    }

    #[test]
    fn budgets_scale_with_the_clock() {
        let short = TimeManager::sudden_death(3_000);
        let long = TimeManager::sudden_death(300_000);
        assert!(long.ideal > short.ideal);
        assert!(long.hard > long.ideal);

        let fischer = TimeManager::fischer(3_000, 2_000);
        assert!(fischer.ideal > short.ideal);
    }

    #[test]
    fn tournament_divides_among_remaining_moves() {
        let few_moves = TimeManager::tournament(60_000, 0, 2);
        let many_moves = TimeManager::tournament(60_000, 0, 40);
        assert!(few_moves.ideal > many_moves.ideal);
    }

    #[test]
    fn hard_budget_never_exceeds_the_clock() {
        let tm = TimeManager::sudden_death(50);
        assert!(tm.hard <= Duration::from_millis(50));
    }
}
