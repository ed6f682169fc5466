//! Move ordering. Three specialised scorers share one scoring core:
//! the root (seeded by the previous iteration's variations), interior
//! nodes (seeded by the transposition table) and quiescence (exchange
//! scores only, with a filter).

use korppi_core::{Board, Move, MoveList, PieceKind};

use crate::eval::{mvv_lva, psqt, see};
use crate::score::sentry_mask;
use crate::score::ONE_PLY;
use crate::search::scout::SearchContext;

/// Every capture or promotion starts above the quiet baseline.
const CAPTURE_BONUS: i32 = 100;
/// Ordering bonus for a passed-pawn push.
const PASSED_PAWN_BONUS: i32 = 100;
/// Score pinned to the front of the list: the hash move, or at the
/// root a move from the previous iteration's variations.
const HASH_MOVE_SCORE: i32 = 30_000;

/// Stable descending sort; ties keep generation order.
fn into_sorted_list(scored: &mut [(i32, Move)]) -> MoveList {
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    let mut list = MoveList::new();
    for &(_, mv) in scored.iter() {
        list.push(mv);
    }
    list
}

/// The shared scoring core for full-width nodes.
fn score_move(ctx: &mut SearchContext<'_, '_>, board: &Board, mv: Move, ply: i32) -> i32 {
    let us = board.side_to_move();
    let mut score = 0;

    if !mv.is_quiet() {
        // Tactical moves rank by their exchange outcome. The value is
        // cached for the pruning policy to reuse.
        let exchange = see(board, mv);
        ctx.see_cache.put(mv, exchange);
        score += exchange + CAPTURE_BONUS;
    } else {
        let mut is_killer = true;
        if ctx.killers.get(ply, 0) == mv {
            score += 80;
        } else if ctx.killers.get(ply, 1) == mv {
            score += 70;
        } else if ctx.killers.get(ply - 2, 0) == mv {
            score += 60;
        } else if ctx.killers.get(ply - 2, 1) == mv {
            score += 50;
        } else {
            is_killer = false;
        }

        if !is_killer {
            let plies = (ctx.current_max_depth / ONE_PLY).max(1);
            score += (ctx.history.get(us, mv) / (plies * plies)).clamp(-99, 49);
        }

        let last = ctx.last_moves[ply as usize];
        if last.exists() {
            if let Some(piece) = board.piece_at(last.destination()) {
                if ctx.counters.get(piece, last.destination()) == mv {
                    score += 40;
                }
            }
        }

        if board.piece_on(mv.origin()) == Some(PieceKind::Pawn) {
            let enemy_pawns = board.pieces(PieceKind::Pawn) & board.side(!us);
            if (sentry_mask(us, mv.destination()) & enemy_pawns).is_empty() {
                score += PASSED_PAWN_BONUS;
            }
        }
    }

    if let Some(kind) = board.piece_on(mv.origin()) {
        score += psqt::midgame(kind, us, mv.destination()) - psqt::midgame(kind, us, mv.origin());
    }

    score
}

/// Interior-node ordering: the hash move first, everything else by the
/// scoring core.
pub(crate) fn order_moves(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    moves: &MoveList,
    ply: i32,
) -> MoveList {
    let hash_move = ctx
        .tt
        .probe(board.hash())
        .map_or(Move::NULL, |entry| entry.hash_move);

    let mut scored = [(0i32, Move::NULL); korppi_core::MAX_MOVES];
    for (slot, &mv) in scored.iter_mut().zip(moves.iter()) {
        let score = if mv == hash_move {
            HASH_MOVE_SCORE
        } else {
            score_move(ctx, board, mv, ply)
        };
        *slot = (score, mv);
    }
    into_sorted_list(&mut scored[..moves.len()])
}

/// Root ordering: first moves of the previous iteration's variations
/// keep the front of the list in rank order, for PV stability.
pub(crate) fn order_moves_root(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    moves: &MoveList,
) -> MoveList {
    let previous_best: Vec<Move> = ctx
        .variations
        .iter()
        .filter_map(|variation| variation.moves.first().copied())
        .collect();

    let mut scored = [(0i32, Move::NULL); korppi_core::MAX_MOVES];
    for (slot, &mv) in scored.iter_mut().zip(moves.iter()) {
        let score = match previous_best.iter().position(|&best| best == mv) {
            Some(rank) => HASH_MOVE_SCORE - rank as i32,
            None => score_move(ctx, board, mv, 0),
        };
        *slot = (score, mv);
    }
    into_sorted_list(&mut scored[..moves.len()])
}

/// Quiescence ordering outside check: captures by exchange value,
/// losing exchanges dropped.
pub(crate) fn order_quiescence_captures(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    moves: &MoveList,
) -> MoveList {
    let mut scored = [(0i32, Move::NULL); korppi_core::MAX_MOVES];
    let mut kept = 0;
    for &mv in moves.iter() {
        let exchange = see(board, mv);
        ctx.see_cache.put(mv, exchange);
        if exchange >= 0 {
            scored[kept] = (exchange + CAPTURE_BONUS, mv);
            kept += 1;
        }
    }
    into_sorted_list(&mut scored[..kept])
}

/// Quiescence ordering in check: every evasion stays, fast
/// victim-attacker ordering.
pub(crate) fn order_quiescence_evasions(board: &Board, moves: &MoveList) -> MoveList {
    let mut scored = [(0i32, Move::NULL); korppi_core::MAX_MOVES];
    for (slot, &mv) in scored.iter_mut().zip(moves.iter()) {
        *slot = (mvv_lva(board, mv) + CAPTURE_BONUS, mv);
    }
    into_sorted_list(&mut scored[..moves.len()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use korppi_core::{generate_legal_captures, generate_legal_moves, Square};

    use crate::search::control::SearchControl;
    use crate::search::tt::{EntryKind, TranspositionTable, TtEntry};
    use crate::search::Variation;

    fn with_context<R>(f: impl FnOnce(&mut SearchContext<'_, '_>) -> R) -> R {
        let tt = TranspositionTable::new(1024).unwrap();
        let control = SearchControl::new(Arc::new(AtomicBool::new(true)), None);
        let mut ctx = SearchContext::new(&tt, &control, 1, 0);
        ctx.current_max_depth = 6 * ONE_PLY;
        f(&mut ctx)
    }

    #[test]
    fn hash_move_comes_first() {
        with_context(|ctx| {
            let board = Board::starting_position();
            let hash_move = Move::quiet(Square::A2, Square::A3);
            ctx.tt.put(
                board.hash(),
                TtEntry::new(hash_move, 0, 0, 6, EntryKind::PV_EXACT),
            );

            let moves = generate_legal_moves(&board);
            let ordered = order_moves(ctx, &board, &moves, 0);
            assert_eq!(ordered[0], hash_move);
        });
    }

    #[test]
    fn killer_ranks_above_plain_quiet() {
        with_context(|ctx| {
            let board = Board::starting_position();
            // A quiet move with a poor square delta, lifted by killer status.
            let killer = Move::quiet(Square::B1, Square::A3);
            ctx.killers.store(4, killer);

            let moves = generate_legal_moves(&board);
            let ordered = order_moves(ctx, &board, &moves, 4);
            let killer_pos = ordered.iter().position(|&m| m == killer).unwrap();
            let rim_pawn_pos = ordered
                .iter()
                .position(|&m| m == Move::quiet(Square::A2, Square::A3))
                .unwrap();
            assert!(killer_pos < rim_pawn_pos);
        });
    }

    #[test]
    fn winning_capture_precedes_quiet_moves() {
        with_context(|ctx| {
            // White can win a hanging queen.
            let board: Board = "4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1".parse().unwrap();
            let moves = generate_legal_moves(&board);
            let ordered = order_moves(ctx, &board, &moves, 0);
            assert!(ordered[0].is_capture());
            assert_eq!(ordered[0].destination(), Square::D5);
            // The SEE value was cached for the policy layer.
            assert_eq!(ctx.see_cache.probe(ordered[0]), Some(900));
        });
    }

    #[test]
    fn root_ordering_pins_previous_variations() {
        with_context(|ctx| {
            let board = Board::starting_position();
            let first = Move::quiet(Square::A2, Square::A3);
            let second = Move::quiet(Square::H2, Square::H3);
            ctx.variations = vec![
                Variation { moves: vec![first], score: 50 },
                Variation { moves: vec![second], score: 30 },
            ];

            let moves = generate_legal_moves(&board);
            let ordered = order_moves_root(ctx, &board, &moves);
            assert_eq!(ordered[0], first);
            assert_eq!(ordered[1], second);
        });
    }

    #[test]
    fn quiescence_drops_losing_captures() {
        with_context(|ctx| {
            // QxP is defended: SEE is deeply negative and must be cut.
            let board: Board = "4k3/8/3p4/2p5/8/4Q3/8/4K3 w - - 0 1".parse().unwrap();
            let captures = generate_legal_captures(&board);
            assert!(!captures.is_empty());
            let ordered = order_quiescence_captures(ctx, &board, &captures);
            assert!(ordered.is_empty());
        });
    }

    #[test]
    fn evasion_ordering_keeps_every_move() {
        let board: Board = "4k3/8/8/8/8/8/4r3/4K3 w - - 0 1".parse().unwrap();
        assert!(board.in_check());
        let moves = generate_legal_moves(&board);
        let ordered = order_quiescence_evasions(&board, &moves);
        assert_eq!(ordered.len(), moves.len());
        // The capture of the checking rook leads.
        assert!(ordered[0].is_capture());
    }
}
