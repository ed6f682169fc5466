//! Per-search heuristic tables: killer moves, counter moves, relative
//! history and the SEE cache. All of them live for one `search()` call.

use korppi_core::{Color, Move, Piece, Square};

use crate::score::MAX_PLY;

/// Two quiet refutation moves per ply.
pub(crate) struct KillerTable {
    slots: [[Move; 2]; MAX_PLY as usize],
}

impl KillerTable {
    pub(crate) fn new() -> KillerTable {
        KillerTable {
            slots: [[Move::NULL; 2]; MAX_PLY as usize],
        }
    }

    /// Record a beta-cutoff quiet move, shifting the previous primary
    /// killer into the secondary slot.
    pub(crate) fn store(&mut self, ply: i32, mv: Move) {
        let Some(row) = self.slots.get_mut(ply as usize) else {
            return;
        };
        if row[0] != mv {
            row[1] = row[0];
            row[0] = mv;
        }
    }

    /// The killer in `slot` (0 or 1) at `ply`; null when none.
    pub(crate) fn get(&self, ply: i32, slot: usize) -> Move {
        if ply < 0 {
            return Move::NULL;
        }
        self.slots
            .get(ply as usize)
            .map_or(Move::NULL, |row| row[slot])
    }
}

/// The reply that refuted the last move, indexed by the moved piece and
/// the square it landed on.
pub(crate) struct CounterMoveTable {
    table: [[Move; 64]; Piece::COUNT],
}

impl CounterMoveTable {
    pub(crate) fn new() -> CounterMoveTable {
        CounterMoveTable {
            table: [[Move::NULL; 64]; Piece::COUNT],
        }
    }

    pub(crate) fn get(&self, piece: Piece, landed_on: Square) -> Move {
        self.table[piece.index()][landed_on.index()]
    }

    pub(crate) fn put(&mut self, piece: Piece, landed_on: Square, reply: Move) {
        self.table[piece.index()][landed_on.index()] = reply;
    }
}

/// Signed per-(side, from, to) score: quiet moves that cut off are
/// rewarded, every other searched move pays a small toll. The table is
/// unbounded; the move orderer clamps on read.
pub(crate) struct RelativeHistory {
    table: Box<[[[i32; 64]; 64]; 2]>,
}

impl RelativeHistory {
    pub(crate) fn new() -> RelativeHistory {
        RelativeHistory {
            table: Box::new([[[0; 64]; 64]; 2]),
        }
    }

    pub(crate) fn get(&self, side: Color, mv: Move) -> i32 {
        self.table[side.index()][mv.origin().index()][mv.destination().index()]
    }

    /// Toll paid by every searched move: `depth_plies`.
    pub(crate) fn penalize(&mut self, side: Color, mv: Move, depth_plies: i32) {
        self.table[side.index()][mv.origin().index()][mv.destination().index()] -= depth_plies;
    }

    /// Reward for the cutoff or best move: `depth_plies` squared.
    pub(crate) fn reward(&mut self, side: Color, mv: Move, depth_plies: i32) {
        self.table[side.index()][mv.origin().index()][mv.destination().index()] +=
            depth_plies * depth_plies;
    }
}

const SEE_CACHE_SLOTS: usize = 512;

/// Direct-mapped cache of SEE values, scoped to one root iteration.
/// Move ordering fills it; the pruning policy reads it back without
/// re-running the exchange evaluation.
pub(crate) struct SeeCache {
    slots: [(Move, i32); SEE_CACHE_SLOTS],
}

impl SeeCache {
    pub(crate) fn new() -> SeeCache {
        SeeCache {
            slots: [(Move::NULL, 0); SEE_CACHE_SLOTS],
        }
    }

    fn index(mv: Move) -> usize {
        mv.raw() as usize % SEE_CACHE_SLOTS
    }

    pub(crate) fn put(&mut self, mv: Move, value: i32) {
        self.slots[SeeCache::index(mv)] = (mv, value);
    }

    pub(crate) fn probe(&self, mv: Move) -> Option<i32> {
        let (stored, value) = self.slots[SeeCache::index(mv)];
        (stored == mv && mv.exists()).then_some(value)
    }

    pub(crate) fn clear(&mut self) {
        self.slots = [(Move::NULL, 0); SEE_CACHE_SLOTS];
    }
}
