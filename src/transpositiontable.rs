//! Shared transposition table.
//!
//! Entries are stored as two 64-bit words: a payload word and a check
//! word holding `key ^ payload`. Buckets of four entries are read and
//! written without locks; a torn read produces a check word that no
//! longer matches the probing key and is treated as a miss. Losing an
//! entry that way is safe, corruption is not possible.

use std::mem::size_of;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use chess::ChessMove;

use crate::util::{compress_move, decompress_move, TABLEBASE_WIN};

pub const MIN_HASH_MB: usize = 1;
pub const MAX_HASH_MB: usize = 65_536;
pub const DEFAULT_HASH_MB: usize = 32;

/// Depth recorded for entries written by the quiescence search.
pub const QUIESCENCE_DEPTH: i32 = -1;

const BUCKET_SIZE: usize = 4;
const MAX_AGE: u8 = 64; // the age field is six bits wide

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    None = 0,
    Upper = 1,
    Lower = 2,
    Exact = 3,
}

impl Bound {
    fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            1 => Self::Upper,
            2 => Self::Lower,
            3 => Self::Exact,
            _ => Self::None,
        }
    }
}

/// Decoded form of a stored entry.
#[derive(Debug, Clone, Copy)]
struct Entry {
    mv: u16,
    score: i16,
    depth: i8,
    bound: Bound,
    age: u8,
}

impl Entry {
    // Payload layout: move 16 | score 16 | depth 8 | bound 2, age 6.
    fn encode(self) -> u64 {
        u64::from(self.mv)
            | u64::from(self.score as u16) << 16
            | u64::from(self.depth as u8) << 32
            | u64::from(self.bound as u8) << 40
            | u64::from(self.age) << 42
    }

    fn decode(bits: u64) -> Self {
        Self {
            mv: bits as u16,
            score: (bits >> 16) as u16 as i16,
            depth: (bits >> 32) as u8 as i8,
            bound: Bound::from_bits(bits >> 40),
            age: (bits >> 42 & 0x3f) as u8,
        }
    }
}

#[derive(Default)]
struct Slot {
    data: AtomicU64,
    check: AtomicU64,
}

impl Slot {
    /// Read the slot, validating against the probing key. Returns the
    /// payload only if the pair of words belongs together.
    fn load(&self, key: u64) -> Option<Entry> {
        let data = self.data.load(Ordering::Relaxed);
        let check = self.check.load(Ordering::Relaxed);
        if data != 0 && check ^ data == key {
            Some(Entry::decode(data))
        } else {
            None
        }
    }

    fn raw(&self) -> (u64, u64) {
        (
            self.data.load(Ordering::Relaxed),
            self.check.load(Ordering::Relaxed),
        )
    }

    fn store(&self, key: u64, entry: Entry) {
        let data = entry.encode();
        self.data.store(data, Ordering::Relaxed);
        self.check.store(key ^ data, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.data.store(0, Ordering::Relaxed);
        self.check.store(0, Ordering::Relaxed);
    }
}

#[repr(align(64))]
#[derive(Default)]
struct Bucket {
    slots: [Slot; BUCKET_SIZE],
}

/// Result of a probe: a score when the stored bound justifies an
/// immediate return against the caller's window, and the stored move
/// (usable for ordering) either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct Probe {
    pub score: Option<i32>,
    pub mv: Option<ChessMove>,
}

pub struct TranspositionTable {
    buckets: Vec<Bucket>,
    age: AtomicU8,
}

impl TranspositionTable {
    pub fn new(megabytes: usize) -> Self {
        let mut tt = Self {
            buckets: Vec::new(),
            age: AtomicU8::new(0),
        };
        tt.resize(megabytes);
        tt
    }

    /// Resize to `megabytes`, falling back to the smallest supported
    /// size if the allocation fails. Returns the size actually used so
    /// the caller can report a fallback.
    pub fn resize(&mut self, megabytes: usize) -> usize {
        let target = megabytes.clamp(MIN_HASH_MB, MAX_HASH_MB);
        self.buckets = Vec::new();
        let mut actual = target;
        let mut len = target * 1024 * 1024 / size_of::<Bucket>();
        let mut buckets = Vec::new();
        if buckets.try_reserve_exact(len).is_err() {
            actual = MIN_HASH_MB;
            len = MIN_HASH_MB * 1024 * 1024 / size_of::<Bucket>();
            buckets = Vec::new();
            buckets.try_reserve_exact(len).expect("cannot allocate minimum hash size");
        }
        buckets.resize_with(len, Bucket::default);
        self.buckets = buckets;
        self.age.store(0, Ordering::Relaxed);
        actual
    }

    pub fn size_mb(&self) -> usize {
        self.buckets.len() * size_of::<Bucket>() / (1024 * 1024)
    }

    pub fn clear(&self) {
        for bucket in &self.buckets {
            for slot in &bucket.slots {
                slot.clear();
            }
        }
        self.age.store(0, Ordering::Relaxed);
    }

    /// Advance the generation; stale entries become preferred victims.
    pub fn increase_age(&self) {
        let next = (self.age.load(Ordering::Relaxed) + 1) % MAX_AGE;
        self.age.store(next, Ordering::Relaxed);
    }

    fn bucket(&self, key: u64) -> &Bucket {
        // Fixed-point multiplication maps the key uniformly onto the
        // table without a modulo.
        let index = ((u128::from(key) * self.buckets.len() as u128) >> 64) as usize;
        &self.buckets[index]
    }

    /// Probe for `key`. A stored entry produces a cutoff score only if
    /// its depth covers the request and its bound justifies a return
    /// against the `(alpha, beta)` window: EXACT always, LOWER only
    /// when the score fails high, UPPER only when it fails low.
    pub fn probe(&self, key: u64, depth: i32, sply: usize, alpha: i32, beta: i32) -> Probe {
        let bucket = self.bucket(key);
        for slot in &bucket.slots {
            let Some(entry) = slot.load(key) else {
                continue;
            };
            let mv = decompress_move(entry.mv);
            if i32::from(entry.depth) < depth {
                return Probe { score: None, mv };
            }
            let score = score_from_tt(i32::from(entry.score), sply);
            let cutoff = match entry.bound {
                Bound::Exact => true,
                Bound::Lower => score >= beta,
                Bound::Upper => score <= alpha,
                Bound::None => false,
            };
            return Probe {
                score: cutoff.then_some(score),
                mv,
            };
        }
        Probe::default()
    }

    pub fn store(
        &self,
        key: u64,
        mv: Option<ChessMove>,
        depth: i32,
        score: i32,
        bound: Bound,
        sply: usize,
    ) {
        let age = self.age.load(Ordering::Relaxed);
        let bucket = self.bucket(key);

        // Pick a slot: same key first, then an empty one, then the
        // stalest/shallowest entry that the policy allows us to evict.
        let mut victim: Option<&Slot> = None;
        let mut victim_rank = i32::MAX;
        let mut chosen: Option<(&Slot, Option<Entry>)> = None;
        for slot in &bucket.slots {
            let (data, check) = slot.raw();
            if data == 0 && check == 0 {
                if chosen.is_none() {
                    chosen = Some((slot, None));
                }
                continue;
            }
            if check ^ data == key {
                chosen = Some((slot, Some(Entry::decode(data))));
                break;
            }
            let entry = Entry::decode(data);
            let relative_age = i32::from((MAX_AGE + age - entry.age) % MAX_AGE);
            if relative_age > 0 || i32::from(entry.depth) < depth {
                let rank = i32::from(entry.depth) - relative_age * 4;
                if rank < victim_rank {
                    victim_rank = rank;
                    victim = Some(slot);
                }
            }
        }
        let (slot, previous) = match chosen {
            Some(found) => found,
            None => match victim {
                Some(slot) => (slot, None),
                None => return,
            },
        };

        // Keep the previous best move when the new result has none.
        let mv = mv
            .map(compress_move)
            .or_else(|| previous.map(|entry| entry.mv).filter(|&m| m != 0))
            .unwrap_or(0);

        slot.store(
            key,
            Entry {
                mv,
                score: score_to_tt(score, sply) as i16,
                depth: depth as i8,
                bound,
                age,
            },
        );
    }

    /// Approximate per-mille occupancy of the current generation,
    /// sampled from the front of the table.
    pub fn hashfull(&self) -> usize {
        let age = self.age.load(Ordering::Relaxed);
        let sample = self.buckets.len().min(1000);
        let mut used = 0;
        for bucket in &self.buckets[..sample] {
            for slot in &bucket.slots {
                let (data, _) = slot.raw();
                if data != 0 && Entry::decode(data).age == age {
                    used += 1;
                }
            }
        }
        used * 1000 / (sample * BUCKET_SIZE).max(1)
    }
}

/// Mate and tablebase scores are stored relative to the probing node,
/// not the root, so they stay correct when the entry is reached along
/// a different path.
fn score_to_tt(score: i32, sply: usize) -> i32 {
    if score >= TABLEBASE_WIN {
        score + sply as i32
    } else if score <= -TABLEBASE_WIN {
        score - sply as i32
    } else {
        score
    }
}

fn score_from_tt(score: i32, sply: usize) -> i32 {
    if score >= TABLEBASE_WIN {
        score - sply as i32
    } else if score <= -TABLEBASE_WIN {
        score + sply as i32
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{mate_in, INFINITE_SCORE};
    use chess::Square;
    use std::sync::atomic::Ordering;

    fn any_move() -> ChessMove {
        ChessMove::new(Square::E2, Square::E4, None)
    }

    #[test]
    fn store_then_probe_roundtrip() {
        let tt = TranspositionTable::new(1);
        let key = 0x1234_5678_9abc_def0;
        tt.store(key, Some(any_move()), 6, 42, Bound::Exact, 0);

        let probe = tt.probe(key, 6, 0, -INFINITE_SCORE, INFINITE_SCORE);
        assert_eq!(probe.score, Some(42));
        assert_eq!(probe.mv, Some(any_move()));
    }

    #[test]
    fn shallow_entry_still_provides_the_move() {
        let tt = TranspositionTable::new(1);
        let key = 99;
        tt.store(key, Some(any_move()), 3, 42, Bound::Exact, 0);

        let probe = tt.probe(key, 8, 0, -INFINITE_SCORE, INFINITE_SCORE);
        assert_eq!(probe.score, None);
        assert_eq!(probe.mv, Some(any_move()));
    }

    #[test]
    fn bounds_gate_the_cutoff() {
        let tt = TranspositionTable::new(1);
        tt.store(1, None, 5, 80, Bound::Lower, 0);
        assert_eq!(tt.probe(1, 5, 0, 0, 50).score, Some(80));
        assert_eq!(tt.probe(1, 5, 0, 0, 100).score, None);

        tt.store(2, None, 5, -80, Bound::Upper, 0);
        assert_eq!(tt.probe(2, 5, 0, -100, 0).score, Some(-80));
        assert_eq!(tt.probe(2, 5, 0, -90, 0).score, None);
    }

    #[test]
    fn mate_scores_are_ply_adjusted() {
        let tt = TranspositionTable::new(1);
        // A mate found 5 plies into the search, stored from a node at
        // search ply 3.
        tt.store(7, None, 4, mate_in(5), Bound::Exact, 3);
        // Probed from a node at ply 1, the mate is 2 plies closer than
        // it was from ply 3.
        let probe = tt.probe(7, 4, 1, -INFINITE_SCORE, INFINITE_SCORE);
        assert_eq!(probe.score, Some(mate_in(3)));
    }

    #[test]
    fn torn_entries_read_as_misses() {
        let tt = TranspositionTable::new(1);
        let key = 0xfeed_f00d_dead_beef;
        tt.store(key, Some(any_move()), 9, 10, Bound::Exact, 0);
        assert!(tt.probe(key, 1, 0, -1, 1).mv.is_some());

        // Simulate a torn write by flipping a bit of the payload word
        // without updating the check word.
        let bucket = tt.bucket(key);
        for slot in &bucket.slots {
            let (data, _) = slot.raw();
            if data != 0 {
                slot.data.store(data ^ 0x10000, Ordering::Relaxed);
            }
        }
        let probe = tt.probe(key, 1, 0, -1, 1);
        assert!(probe.score.is_none() && probe.mv.is_none());
    }

    #[test]
    fn same_key_store_keeps_the_previous_move() {
        let tt = TranspositionTable::new(1);
        let key = 0xaaaa_bbbb_cccc_dddd;
        tt.store(key, Some(any_move()), 10, 5, Bound::Exact, 0);
        tt.store(key, None, 2, 7, Bound::Lower, 0);
        let probe = tt.probe(key, 2, 0, 0, 5);
        assert_eq!(probe.score, Some(7));
        // The move survives the overwrite: same key, no new move.
        assert_eq!(probe.mv, Some(any_move()));
    }

    #[test]
    fn stale_entries_are_evicted_before_fresh_deep_ones() {
        // The bucket index only depends on the key's high bits, so
        // keys differing in the low bits collide.
        let tt = TranspositionTable::new(1);
        let base = 0x1111_2222_3333_4444u64;
        for i in 0..4 {
            tt.store(base ^ i, None, 12, 10, Bound::Exact, 0);
        }
        tt.increase_age();

        // The bucket is full of deep entries, but they are a
        // generation old: the new shallow entry must land.
        tt.store(base ^ 4, Some(any_move()), 1, 3, Bound::Exact, 0);
        let probe = tt.probe(base ^ 4, 1, 0, -INFINITE_SCORE, INFINITE_SCORE);
        assert_eq!(probe.score, Some(3));
    }

    #[test]
    fn fresh_deep_entries_are_not_evicted_for_shallow_ones() {
        let tt = TranspositionTable::new(1);
        let base = 0x5555_6666_7777_8888u64;
        for i in 0..4 {
            tt.store(base ^ i, None, 12, 10, Bound::Exact, 0);
        }

        // Same generation, all deeper than the newcomer: no victim.
        tt.store(base ^ 4, Some(any_move()), 1, 3, Bound::Exact, 0);
        let probe = tt.probe(base ^ 4, 1, 0, -INFINITE_SCORE, INFINITE_SCORE);
        assert!(probe.score.is_none() && probe.mv.is_none());

        // All four original entries are intact.
        for i in 0..4 {
            let probe = tt.probe(base ^ i, 12, 0, -INFINITE_SCORE, INFINITE_SCORE);
            assert_eq!(probe.score, Some(10));
        }
    }
}
