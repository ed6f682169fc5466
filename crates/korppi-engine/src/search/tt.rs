//! Lock-free transposition table with XOR verification.
//!
//! Each bucket is two `u64` words: the packed entry and a verifier
//! `hash ^ packed`. A probe only hits when the XOR undoes to the probed
//! hash, so a torn write from a concurrent writer decodes as a natural
//! miss -- no locking, plain `Relaxed` atomics. Single slot per bucket,
//! index `hash % capacity`.

use std::sync::atomic::{AtomicU64, Ordering};

use korppi_core::Move;

use crate::search::EngineError;

/// Default capacity in entries (16 bytes each).
pub(crate) const DEFAULT_TT_ENTRIES: usize = 1 << 20;

/// Entry classification: bound type combined with the node class that
/// produced it. Principal-variation exact entries outrank everything at
/// the same depth and are never overwritten by guarded stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryKind(u8);

impl EntryKind {
    const EXACT_BITS: u8 = 1;
    const CUT_BITS: u8 = 2;
    const NW_BIT: u8 = 4;

    /// Exact score from a principal-variation node.
    pub(crate) const PV_EXACT: EntryKind = EntryKind(Self::EXACT_BITS);
    /// Beta cutoff (lower bound) from a principal-variation node.
    pub(crate) const PV_CUT: EntryKind = EntryKind(Self::CUT_BITS);
    /// Exact score from a null-window node.
    pub(crate) const NW_EXACT: EntryKind = EntryKind(Self::NW_BIT | Self::EXACT_BITS);
    /// Beta cutoff from a null-window node.
    pub(crate) const NW_CUT: EntryKind = EntryKind(Self::NW_BIT | Self::CUT_BITS);

    #[inline]
    pub(crate) fn is_exact(self) -> bool {
        self.0 & 0b11 == Self::EXACT_BITS
    }

    #[inline]
    pub(crate) fn is_cut(self) -> bool {
        self.0 & 0b11 == Self::CUT_BITS
    }

    const fn from_bits(bits: u8) -> EntryKind {
        EntryKind(bits & 0b111)
    }
}

/// One decoded table entry, 8 bytes packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TtEntry {
    pub(crate) hash_move: Move,
    pub(crate) score: i16,
    pub(crate) age: u16,
    pub(crate) depth: u8,
    pub(crate) kind: EntryKind,
}

impl TtEntry {
    pub(crate) fn new(hash_move: Move, score: i32, age: u16, depth: i32, kind: EntryKind) -> TtEntry {
        TtEntry {
            hash_move,
            score: score.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            age,
            depth: depth.clamp(0, u8::MAX as i32) as u8,
            kind,
        }
    }

    fn pack(self) -> u64 {
        (self.hash_move.raw() as u64)
            | ((self.score as u16 as u64) << 16)
            | ((self.age as u64) << 32)
            | ((self.depth as u64) << 48)
            | ((self.kind.0 as u64) << 56)
    }

    fn unpack(bits: u64) -> TtEntry {
        TtEntry {
            hash_move: Move::from_raw(bits as u16),
            score: (bits >> 16) as u16 as i16,
            age: (bits >> 32) as u16,
            depth: (bits >> 48) as u8,
            kind: EntryKind::from_bits((bits >> 56) as u8),
        }
    }

    /// Replacement priority: a newer age wins unless the incumbent holds
    /// the same position at greater combined depth; between entries of
    /// equal age, greater `(depth + age) * 2` wins with exactness as the
    /// tiebreaker.
    fn outranks(self, new_hash: u64, old: TtEntry, old_hash: u64) -> bool {
        if self.age > old.age {
            let same_position = new_hash == old_hash;
            let old_holds = (old.depth as u32 + old.age as u32) > (self.depth as u32 + self.age as u32);
            !(same_position && old_holds)
        } else {
            let weight = |e: TtEntry| {
                (e.depth as u32 + e.age as u32) * 2 + u32::from(e.kind.is_exact())
            };
            weight(self) >= weight(old)
        }
    }
}

struct Bucket {
    verifier: AtomicU64,
    data: AtomicU64,
}

impl Bucket {
    const fn empty() -> Bucket {
        Bucket {
            verifier: AtomicU64::new(0),
            data: AtomicU64::new(0),
        }
    }
}

/// The shared memo of searched subtrees, keyed by zobrist hash.
pub(crate) struct TranspositionTable {
    buckets: Box<[Bucket]>,
}

impl TranspositionTable {
    /// Allocate a table with `capacity` buckets. Fails instead of
    /// aborting when the allocation cannot be satisfied.
    pub(crate) fn new(capacity: usize) -> Result<TranspositionTable, EngineError> {
        let capacity = capacity.max(1);
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(capacity)
            .map_err(|_| EngineError::TableAllocation { entries: capacity })?;
        buckets.resize_with(capacity, Bucket::empty);
        Ok(TranspositionTable {
            buckets: buckets.into_boxed_slice(),
        })
    }

    fn index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Store `entry`, keeping the incumbent when it outranks the
    /// newcomer. Lock-free: concurrent writers may interleave, readers
    /// reject the resulting torn buckets via the verifier.
    pub(crate) fn put(&self, hash: u64, entry: TtEntry) {
        let bucket = &self.buckets[self.index(hash)];
        let old_data = bucket.data.load(Ordering::Relaxed);

        if old_data != 0 {
            let old_verifier = bucket.verifier.load(Ordering::Relaxed);
            let old = TtEntry::unpack(old_data);
            if !entry.outranks(hash, old, old_verifier ^ old_data) {
                return;
            }
        }

        let packed = entry.pack();
        bucket.verifier.store(hash ^ packed, Ordering::Relaxed);
        bucket.data.store(packed, Ordering::Relaxed);
    }

    /// Look up `hash`. A verifier mismatch -- collision, torn write or
    /// empty bucket -- is a miss, never an error.
    pub(crate) fn probe(&self, hash: u64) -> Option<TtEntry> {
        let bucket = &self.buckets[self.index(hash)];
        let data = bucket.data.load(Ordering::Relaxed);
        if data == 0 {
            return None;
        }
        let verifier = bucket.verifier.load(Ordering::Relaxed);
        if verifier ^ data != hash {
            return None;
        }
        Some(TtEntry::unpack(data))
    }

    /// Drop every entry. Must not be called while a search is running.
    pub(crate) fn clear(&self) {
        for bucket in self.buckets.iter() {
            bucket.verifier.store(0, Ordering::Relaxed);
            bucket.data.store(0, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.buckets.len()
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use korppi_core::Square;

    fn mv(from: Square, to: Square) -> Move {
        Move::quiet(from, to)
    }

    #[test]
    fn bucket_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<Bucket>(), 16);
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let entry = TtEntry::new(mv(Square::E2, Square::E4), -123, 42, 77, EntryKind::NW_CUT);
        assert_eq!(TtEntry::unpack(entry.pack()), entry);
    }

    #[test]
    fn store_and_probe() {
        let tt = TranspositionTable::new(1024).unwrap();
        let hash = 0xDEAD_BEEF_0BAD_F00D;
        let entry = TtEntry::new(mv(Square::G1, Square::F3), 35, 3, 18, EntryKind::PV_EXACT);
        tt.put(hash, entry);

        let hit = tt.probe(hash).expect("stored entry should probe");
        assert_eq!(hit, entry);
    }

    #[test]
    fn probe_miss_on_unknown_hash() {
        let tt = TranspositionTable::new(1024).unwrap();
        assert!(tt.probe(0x1234_5678).is_none());
    }

    #[test]
    fn colliding_hash_is_a_miss() {
        let tt = TranspositionTable::new(8).unwrap();
        let hash = 0x42;
        tt.put(hash, TtEntry::new(mv(Square::E2, Square::E4), 1, 1, 6, EntryKind::PV_EXACT));
        // Same bucket, different position.
        assert!(tt.probe(hash + 8).is_none());
    }

    #[test]
    fn corrupted_bucket_fails_verification() {
        let tt = TranspositionTable::new(64).unwrap();
        let hash = 0xABCD_EF01_2345_6789;
        tt.put(hash, TtEntry::new(mv(Square::E2, Square::E4), 9, 1, 12, EntryKind::PV_EXACT));

        let bucket = &tt.buckets[tt.index(hash)];
        let data = bucket.data.load(Ordering::Relaxed);
        bucket.data.store(data ^ 0xFF00, Ordering::Relaxed);

        assert!(tt.probe(hash).is_none(), "torn write must read as a miss");
    }

    #[test]
    fn deeper_entry_survives_shallower_write() {
        let tt = TranspositionTable::new(64).unwrap();
        let hash = 0x1111_2222_3333_4444;
        let deep = TtEntry::new(mv(Square::E2, Square::E4), 50, 4, 60, EntryKind::PV_CUT);
        let shallow = TtEntry::new(mv(Square::D2, Square::D4), 10, 4, 6, EntryKind::PV_CUT);

        tt.put(hash, deep);
        tt.put(hash, shallow);
        assert_eq!(tt.probe(hash).unwrap().hash_move, mv(Square::E2, Square::E4));
    }

    #[test]
    fn newer_age_replaces_other_position() {
        let tt = TranspositionTable::new(1).unwrap();
        let old = TtEntry::new(mv(Square::E2, Square::E4), 50, 4, 200, EntryKind::PV_EXACT);
        let new = TtEntry::new(mv(Square::D2, Square::D4), 10, 30, 6, EntryKind::NW_CUT);

        tt.put(0xAAAA, old);
        tt.put(0xBBBB, new);
        assert!(tt.probe(0xAAAA).is_none());
        assert_eq!(tt.probe(0xBBBB).unwrap().hash_move, mv(Square::D2, Square::D4));
    }

    #[test]
    fn newer_age_keeps_same_position_at_greater_depth() {
        let tt = TranspositionTable::new(1).unwrap();
        let hash = 0xCCCC;
        let old = TtEntry::new(mv(Square::E2, Square::E4), 50, 10, 200, EntryKind::PV_EXACT);
        let new = TtEntry::new(mv(Square::D2, Square::D4), 10, 11, 6, EntryKind::NW_CUT);

        tt.put(hash, old);
        tt.put(hash, new);
        assert_eq!(tt.probe(hash).unwrap().hash_move, mv(Square::E2, Square::E4));
    }

    #[test]
    fn exactness_breaks_priority_ties() {
        let a = TtEntry::new(mv(Square::E2, Square::E4), 0, 5, 12, EntryKind::PV_EXACT);
        let b = TtEntry::new(mv(Square::D2, Square::D4), 0, 5, 12, EntryKind::NW_CUT);
        assert!(a.outranks(1, b, 2));
        assert!(!b.outranks(2, a, 1));
    }

    #[test]
    fn clear_empties_the_table() {
        let tt = TranspositionTable::new(64).unwrap();
        let hash = 0x9999;
        tt.put(hash, TtEntry::new(mv(Square::E2, Square::E4), 1, 1, 6, EntryKind::PV_EXACT));
        tt.clear();
        assert!(tt.probe(hash).is_none());
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let tt = TranspositionTable::new(0).unwrap();
        assert_eq!(tt.capacity(), 1);
    }

    #[test]
    fn concurrent_hammering_never_returns_garbage() {
        use std::sync::Arc;
        use std::thread;

        let tt = Arc::new(TranspositionTable::new(16).unwrap());
        thread::scope(|scope| {
            for t in 0..4u64 {
                let tt = Arc::clone(&tt);
                scope.spawn(move || {
                    for i in 0..20_000u64 {
                        let hash = (t << 60) | (i % 64);
                        let entry = TtEntry::new(
                            mv(Square::E2, Square::E4),
                            (i % 1000) as i32,
                            (i % 100) as u16,
                            (i % 120) as i32,
                            EntryKind::NW_CUT,
                        );
                        tt.put(hash, entry);
                        if let Some(found) = tt.probe(hash) {
                            // A hit must decode to a self-consistent entry.
                            assert!(found.depth <= 120);
                        }
                    }
                });
            }
        });
    }
}
