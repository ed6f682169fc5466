//! The root of one iteration: multi-PV principal-variation search
//! wrapped in an aspiration window.

use korppi_core::{generate_legal_moves, Board, Move};

use crate::score::{is_mate_score, mate_distance_plies, MAX_PLY, MAX_SCORE, MIN_SCORE, ONE_PLY};
use crate::search::ordering;
use crate::search::policy::{self, MoveClass};
use crate::search::scout::{nw_search, pv_search, SearchContext, NULL_MOVE_COOLDOWN};
use crate::search::tt::EntryKind;
use crate::search::Variation;

/// Initial aspiration half-width in centipawns.
const ASPIRATION_WINDOW: i32 = 15;
/// Multiplier applied to the failing side's half-width per re-search.
const ASPIRATION_STEP: i32 = 4;
/// Widenings per side before the window opens completely.
const ASPIRATION_MAX_WIDENINGS: i32 = 3;

/// One full iteration at `depth`: aspiration windows around the
/// previous scores, re-searching wider on fail-low or fail-high.
/// Returns the best variation's score.
pub(crate) fn aspiration_root(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    depth: i32,
    expected_score: i32,
) -> i32 {
    let mut alpha_width = ASPIRATION_WINDOW;
    let mut beta_width = ASPIRATION_WINDOW;
    let mut alpha_widenings = 1;
    let mut beta_widenings = 1;

    // Multi-PV anchors the lower bound on the previous worst variation
    // so every requested line fits in the window.
    let mut upper_anchor = expected_score;
    let mut lower_anchor = expected_score;
    if let (Some(best), Some(worst)) = (ctx.variations.first(), ctx.variations.last()) {
        upper_anchor = best.score;
        lower_anchor = worst.score;
    }

    let mut alpha = lower_anchor - alpha_width;
    let mut beta = upper_anchor + beta_width;

    let mut score = pv_search_root(ctx, board, depth, alpha, beta);

    while score <= alpha || score >= beta {
        if score <= alpha {
            if alpha_widenings >= ASPIRATION_MAX_WIDENINGS {
                alpha = MIN_SCORE;
            } else {
                alpha_width *= ASPIRATION_STEP;
                alpha = lower_anchor - alpha_width;
            }
            alpha_widenings += 1;
        } else {
            if beta_widenings >= ASPIRATION_MAX_WIDENINGS {
                beta = MAX_SCORE;
            } else {
                beta_width *= ASPIRATION_STEP;
                beta = upper_anchor + beta_width;
            }
            beta_widenings += 1;
        }

        score = pv_search_root(ctx, board, depth, alpha, beta);
    }

    ctx.variations.first().map_or(score, |best| best.score)
}

/// Root mate-distance bookkeeping for one candidate move: a move known
/// to start a mate line may search as deep as it needs; other moves
/// must not chase mates longer than the ones already proven.
fn root_mate_distance(
    ctx: &SearchContext<'_, '_>,
    mv: Move,
    worst_variation_score: i32,
    collected: usize,
) -> i32 {
    for variation in &ctx.variations {
        if variation.moves.first() == Some(&mv) && is_mate_score(variation.score) {
            return mate_distance_plies(variation.score);
        }
    }

    if let Some(best) = ctx.variations.first() {
        if best.score < 0 && is_mate_score(best.score) {
            return mate_distance_plies(best.score);
        }
        if worst_variation_score > 0
            && collected >= ctx.num_variations
            && is_mate_score(worst_variation_score)
        {
            return mate_distance_plies(worst_variation_score);
        }
    }

    MAX_PLY
}

/// Principal-variation search at the root, keeping the best
/// `num_variations` lines. Once that many are collected, alpha rises to
/// the worst kept score. On completion the iteration's variations
/// replace the previous ones only if they beat the original alpha;
/// a fail-low keeps the previous iteration's answer.
pub(crate) fn pv_search_root(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    depth: i32,
    mut alpha: i32,
    beta: i32,
) -> i32 {
    ctx.nodes += 1;
    ctx.pv.clear_all();
    ctx.see_cache.clear();

    let moves = generate_legal_moves(board);
    if moves.is_empty() {
        // Mate or stalemate at the root: nothing to search, nothing to
        // report. The referee above the engine classifies the result.
        ctx.variations.clear();
        return 0;
    }

    let original_alpha = alpha;
    let mut pv_slots = ctx.num_variations as i32;
    let mut best_score = MIN_SCORE;
    let mut worst_variation_score = MIN_SCORE;
    let mut best_move = Move::NULL;
    let mut new_variations: Vec<Variation> = Vec::with_capacity(ctx.num_variations + 1);

    let was_check_evasion = board.in_check();
    let us = board.side_to_move();
    let ordered = ordering::order_moves_root(ctx, board, &moves);

    let mut move_number = 1;
    for &mv in ordered.iter() {
        ctx.mate_distance = root_mate_distance(ctx, mv, worst_variation_score, new_variations.len());

        let child = board.make_move(mv);
        let class = MoveClass::classify(
            &child,
            mv,
            ctx.see_cache.probe(mv).unwrap_or(MIN_SCORE),
        );
        let extension = policy::extension(&class, was_check_evasion);
        let nw_reduction = policy::reduction(
            &class,
            depth,
            0,
            move_number,
            was_check_evasion,
            ctx.history.get(us, mv),
            ctx.current_max_depth,
            ctx.mate_distance,
        ) * 2
            / 3;
        let nw_delta = -ONE_PLY - nw_reduction + extension;

        ctx.last_moves[1] = mv;
        ctx.path.push(board.hash());

        let mut score;
        if pv_slots > 0 {
            score = -pv_search(
                ctx,
                &child,
                depth - ONE_PLY + extension,
                1,
                -beta,
                -alpha,
                NULL_MOVE_COOLDOWN - 1,
            );
        } else {
            score = -nw_search(
                ctx,
                &child,
                depth + nw_delta,
                1,
                -alpha - 1,
                -alpha,
                NULL_MOVE_COOLDOWN - 1,
            );
            if score > worst_variation_score {
                score = -pv_search(
                    ctx,
                    &child,
                    depth - ONE_PLY + extension,
                    1,
                    -beta,
                    -alpha,
                    NULL_MOVE_COOLDOWN - 1,
                );
            }
        }

        ctx.path.pop();

        if !ctx.control.is_running() {
            // Keep a fully collected multi-PV set; discard a partial one.
            if new_variations.len() < ctx.num_variations {
                return 0;
            }
            break;
        }

        ctx.history.penalize(us, mv, depth / ONE_PLY);

        if score >= beta {
            ctx.tt_store(board.hash(), depth, score, EntryKind::PV_CUT, mv);
            ctx.record_cutoff(board, mv, 0, depth);
            return score;
        }

        if score > best_score {
            best_score = score;
            best_move = mv;
        }

        if score > worst_variation_score {
            let mut line = vec![mv];
            line.extend_from_slice(ctx.pv.line(1));
            insert_variation(
                &mut new_variations,
                Variation { moves: line, score },
                ctx.num_variations,
            );

            if new_variations.len() >= ctx.num_variations || new_variations.len() >= moves.len() {
                worst_variation_score = new_variations
                    .last()
                    .map_or(worst_variation_score, |variation| variation.score);
                if worst_variation_score > original_alpha {
                    alpha = worst_variation_score;
                }
            }
        }

        pv_slots -= 1;
        move_number += 1;
    }

    ctx.tt_store(board.hash(), depth, best_score, EntryKind::PV_EXACT, best_move);
    if best_move.exists() {
        ctx.history.reward(us, best_move, depth / ONE_PLY);
    }

    if worst_variation_score > original_alpha {
        ctx.variations = new_variations;
    }

    worst_variation_score
}

/// Sorted insertion, descending by score, truncated to `limit`.
fn insert_variation(variations: &mut Vec<Variation>, variation: Variation, limit: usize) {
    let position = variations
        .iter()
        .position(|held| held.score < variation.score)
        .unwrap_or(variations.len());

    if variations.len() >= limit {
        if position < variations.len() {
            variations.insert(position, variation);
            variations.pop();
        }
    } else {
        variations.insert(position, variation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variation(score: i32) -> Variation {
        Variation {
            moves: vec![Move::quiet(korppi_core::Square::E2, korppi_core::Square::E4)],
            score,
        }
    }

    #[test]
    fn insert_keeps_descending_order() {
        let mut list = Vec::new();
        insert_variation(&mut list, variation(10), 3);
        insert_variation(&mut list, variation(30), 3);
        insert_variation(&mut list, variation(20), 3);
        let scores: Vec<i32> = list.iter().map(|v| v.score).collect();
        assert_eq!(scores, vec![30, 20, 10]);
    }

    #[test]
    fn insert_truncates_at_limit() {
        let mut list = Vec::new();
        for score in [10, 30, 20, 40] {
            insert_variation(&mut list, variation(score), 3);
        }
        let scores: Vec<i32> = list.iter().map(|v| v.score).collect();
        assert_eq!(scores, vec![40, 30, 20]);
    }

    #[test]
    fn insert_below_full_list_is_dropped() {
        let mut list = Vec::new();
        for score in [30, 20, 10] {
            insert_variation(&mut list, variation(score), 3);
        }
        insert_variation(&mut list, variation(5), 3);
        let scores: Vec<i32> = list.iter().map(|v| v.score).collect();
        assert_eq!(scores, vec![30, 20, 10]);
    }

    #[test]
    fn equal_scores_keep_arrival_order_behind() {
        let mut list = Vec::new();
        let mut first = variation(20);
        first.moves = vec![Move::quiet(korppi_core::Square::A2, korppi_core::Square::A3)];
        insert_variation(&mut list, first.clone(), 3);
        insert_variation(&mut list, variation(20), 3);
        assert_eq!(list[0].moves, first.moves);
    }
}
