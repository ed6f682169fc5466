//! Scoring utilities: depth units, score sentinels, mate arithmetic,
//! sentry-pawn masks and the time-allocation lookup.

use korppi_core::{Bitboard, Color, Square};

/// Depth is counted in sixths of a ply so extensions and reductions can
/// be fractional while all arithmetic stays integral.
pub const ONE_PLY: i32 = 6;
/// Half a ply in sixth-ply units.
pub const HALF_PLY: i32 = 3;

/// Recursion ceiling in plies.
pub const MAX_PLY: i32 = 256;

/// Hard lower/upper sentinels; no position ever evaluates beyond these.
pub const MIN_SCORE: i32 = -32_000;
pub const MAX_SCORE: i32 = 32_000;

/// Base mate score. A mate found at ply `p` scores `MATE_SCORE - p` for
/// the mating side, so shorter mates dominate.
pub const MATE_SCORE: i32 = 21_000;

/// Is `score` a forced-mate score (for either side)?
#[inline]
pub const fn is_mate_score(score: i32) -> bool {
    score.abs() > MATE_SCORE - 1000
}

/// Distance to mate in plies encoded in a mate score.
#[inline]
pub const fn mate_distance_plies(score: i32) -> i32 {
    MATE_SCORE - score.abs()
}

const fn sentry_table(forward: i8) -> [Bitboard; 64] {
    let mut table = [Bitboard::EMPTY; 64];
    let mut sq = 0usize;
    while sq < 64 {
        let rank = (sq / 8) as i8;
        let file = (sq % 8) as i8;
        let mut bits = 0u64;
        let mut r = rank + forward;
        while r >= 0 && r < 8 {
            let mut f = file - 1;
            while f <= file + 1 {
                if f >= 0 && f < 8 {
                    bits |= 1u64 << (r as usize * 8 + f as usize);
                }
                f += 1;
            }
            r += forward;
        }
        table[sq] = Bitboard::new(bits);
        sq += 1;
    }
    table
}

/// Squares from which an enemy pawn could still stop a pawn on the
/// indexed square from promoting: the three files around it, all ranks
/// strictly ahead. An empty intersection with the enemy pawns makes the
/// pawn passed.
static SENTRY_MASKS: [[Bitboard; 64]; 2] = [sentry_table(1), sentry_table(-1)];

/// Sentry mask for a pawn of `color` standing on `sq`.
#[inline]
pub fn sentry_mask(color: Color, sq: Square) -> Bitboard {
    SENTRY_MASKS[color.index()][sq.index()]
}

/// Time-allocation factor by number of root legal moves: positions with
/// few moves get a smaller slice of the budget.
pub const TIME_FACTOR: [f64; 40] = [
    0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, //
    0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, //
    0.42, 0.44, 0.46, 0.48, 0.5, 0.52, 0.54, 0.56, 0.58, 0.6, //
    0.64, 0.68, 0.72, 0.76, 0.8, 0.84, 0.88, 0.92, 0.96, 1.0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_score_classification() {
        assert!(is_mate_score(MATE_SCORE));
        assert!(is_mate_score(MATE_SCORE - 12));
        assert!(is_mate_score(-(MATE_SCORE - 12)));
        assert!(!is_mate_score(0));
        assert!(!is_mate_score(MATE_SCORE - 1000));
    }

    #[test]
    fn mate_distance_roundtrip() {
        let score = MATE_SCORE - 5;
        assert_eq!(mate_distance_plies(score), 5);
        assert_eq!(mate_distance_plies(-score), 5);
    }

    #[test]
    fn sentry_mask_white_a2() {
        // Files a and b, ranks 3..8.
        let mask = sentry_mask(Color::White, Square::A2);
        assert_eq!(mask.count(), 12);
        assert!(mask.contains(Square::A3));
        assert!(mask.contains(Square::B8));
        assert!(!mask.contains(Square::C3));
        assert!(!mask.contains(Square::A2));
    }

    #[test]
    fn sentry_mask_empty_near_promotion() {
        assert!(sentry_mask(Color::White, Square::E8).is_empty());
        assert!(sentry_mask(Color::Black, Square::E1).is_empty());
    }

    #[test]
    fn sentry_mask_black_mirrors_white() {
        let white = sentry_mask(Color::White, Square::C3);
        let black = sentry_mask(Color::Black, Square::C6);
        assert_eq!(white.count(), black.count());
        assert!(black.contains(Square::C5));
        assert!(black.contains(Square::B1));
    }

    #[test]
    fn time_factor_ramps_up() {
        assert_eq!(TIME_FACTOR[0], 0.4);
        assert_eq!(TIME_FACTOR[39], 1.0);
        for pair in TIME_FACTOR.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}
