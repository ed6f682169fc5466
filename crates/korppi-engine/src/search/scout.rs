//! The recursive searcher: principal-variation search, null-window
//! scout search and quiescence, sharing one context.

use korppi_core::{
    generate_legal_captures, generate_legal_moves, Board, Move, PieceKind,
};

use crate::eval::evaluate;
use crate::score::{MATE_SCORE, MAX_PLY, MIN_SCORE, ONE_PLY};
use crate::search::control::{SearchControl, NODES_PER_CHECKUP};
use crate::search::heuristics::{CounterMoveTable, KillerTable, RelativeHistory, SeeCache};
use crate::search::ordering;
use crate::search::policy::{self, MoveClass};
use crate::search::tt::{EntryKind, TranspositionTable, TtEntry};
use crate::search::Variation;

/// Plies after a null move before the next one is allowed.
pub(crate) const NULL_MOVE_COOLDOWN: i32 = 2;

/// Rows tracked by the PV table; variations longer than this are
/// truncated, not lost.
const PV_ROWS: usize = 64;

/// Triangular table of principal-variation continuations: row `ply`
/// holds the best line found from that ply.
pub(crate) struct PvTable {
    rows: [[Move; PV_ROWS]; PV_ROWS],
    lens: [usize; PV_ROWS],
}

impl PvTable {
    pub(crate) fn new() -> PvTable {
        PvTable {
            rows: [[Move::NULL; PV_ROWS]; PV_ROWS],
            lens: [0; PV_ROWS],
        }
    }

    pub(crate) fn clear_all(&mut self) {
        self.lens = [0; PV_ROWS];
    }

    pub(crate) fn clear(&mut self, ply: i32) {
        if let Some(len) = self.lens.get_mut(ply as usize) {
            *len = 0;
        }
    }

    /// Row `ply` becomes `[mv] ++ row[ply + 1]`.
    pub(crate) fn set_line(&mut self, ply: i32, mv: Move) {
        let ply = ply as usize;
        if ply >= PV_ROWS {
            return;
        }
        self.rows[ply][0] = mv;
        let mut len = 1;
        if ply + 1 < PV_ROWS {
            let child_len = self.lens[ply + 1].min(PV_ROWS - 1);
            let (head, tail) = self.rows.split_at_mut(ply + 1);
            head[ply][1..1 + child_len].copy_from_slice(&tail[0][..child_len]);
            len += child_len;
        }
        self.lens[ply] = len;
    }

    pub(crate) fn line(&self, ply: i32) -> &[Move] {
        let ply = ply as usize;
        if ply >= PV_ROWS {
            return &[];
        }
        &self.rows[ply][..self.lens[ply]]
    }
}

/// Everything one search invocation threads through its recursion.
pub(crate) struct SearchContext<'a, 'b> {
    pub(crate) tt: &'a TranspositionTable,
    pub(crate) control: &'b SearchControl,
    pub(crate) checkup_callback: Option<Box<dyn FnMut() + Send>>,
    pub(crate) nodes: u64,
    /// Horizon of the current iteration, in sixth-ply units.
    pub(crate) current_max_depth: i32,
    /// Root ply counter, used as TT entry age.
    pub(crate) current_age: u16,
    /// Shortest mate distance seen for the current root move; frames
    /// deeper than this are provably irrelevant.
    pub(crate) mate_distance: i32,
    pub(crate) num_variations: usize,
    /// The previous completed iteration's multi-PV list.
    pub(crate) variations: Vec<Variation>,
    pub(crate) pv: PvTable,
    pub(crate) killers: KillerTable,
    pub(crate) counters: CounterMoveTable,
    pub(crate) history: RelativeHistory,
    pub(crate) see_cache: SeeCache,
    /// Zobrist hashes of the ancestors of the current node, for
    /// repetition detection along the search path.
    pub(crate) path: Vec<u64>,
    /// The move that led to each ply; index 0 is the root (null).
    pub(crate) last_moves: [Move; MAX_PLY as usize + 1],
}

impl<'a, 'b> SearchContext<'a, 'b> {
    pub(crate) fn new(
        tt: &'a TranspositionTable,
        control: &'b SearchControl,
        num_variations: usize,
        current_age: u16,
    ) -> SearchContext<'a, 'b> {
        SearchContext {
            tt,
            control,
            checkup_callback: None,
            nodes: 0,
            current_max_depth: 0,
            current_age,
            mate_distance: MAX_PLY,
            num_variations,
            variations: Vec::new(),
            pv: PvTable::new(),
            killers: KillerTable::new(),
            counters: CounterMoveTable::new(),
            history: RelativeHistory::new(),
            see_cache: SeeCache::new(),
            path: Vec::with_capacity(MAX_PLY as usize + 32),
            last_moves: [Move::NULL; MAX_PLY as usize + 1],
        }
    }

    /// Periodic supervision: deadline check and the external callback,
    /// once per [`NODES_PER_CHECKUP`] nodes.
    pub(crate) fn checkup(&mut self) {
        if self.nodes % NODES_PER_CHECKUP == 0 {
            self.control.checkup(self.current_max_depth);
            if let Some(callback) = self.checkup_callback.as_mut() {
                callback();
            }
        }
    }

    pub(crate) fn is_mate_line(&self) -> bool {
        self.mate_distance != MAX_PLY
    }

    /// Draw by fifty-move rule, repetition along the search path, or
    /// insufficient material.
    pub(crate) fn is_draw(&self, board: &Board) -> bool {
        if board.halfmove_clock() >= 100 {
            return true;
        }

        // Twofold repetition against an ancestor counts as a draw in
        // search; only positions since the last irreversible move can
        // repeat.
        let lookback = (board.halfmove_clock() as usize).min(self.path.len());
        let hash = board.hash();
        if self.path[self.path.len() - lookback..]
            .iter()
            .any(|&ancestor| ancestor == hash)
        {
            return true;
        }

        insufficient_material(board)
    }

    pub(crate) fn record_cutoff(&mut self, board: &Board, mv: Move, ply: i32, depth: i32) {
        if mv.is_quiet() {
            self.killers.store(ply, mv);
            let last = self.last_moves[ply as usize];
            if last.exists() {
                if let Some(piece) = board.piece_at(last.destination()) {
                    self.counters.put(piece, last.destination(), mv);
                }
            }
        }
        self.history
            .reward(board.side_to_move(), mv, depth / ONE_PLY);
    }

    /// The uniform guarded-store rule: write unless an entry of greater
    /// depth, or a principal-variation exact entry, already holds.
    fn tt_store_allowed(&self, hash: u64, depth: i32) -> bool {
        match self.tt.probe(hash) {
            None => true,
            Some(held) => depth > held.depth as i32 || held.kind != EntryKind::PV_EXACT,
        }
    }

    pub(crate) fn tt_store(
        &mut self,
        hash: u64,
        depth: i32,
        score: i32,
        kind: EntryKind,
        best_move: Move,
    ) {
        if self.tt_store_allowed(hash, depth) {
            self.tt
                .put(hash, TtEntry::new(best_move, score, self.current_age, depth, kind));
        }
    }
}

fn insufficient_material(board: &Board) -> bool {
    if board.pieces(PieceKind::Pawn).is_nonempty()
        || board.pieces(PieceKind::Rook).is_nonempty()
        || board.pieces(PieceKind::Queen).is_nonempty()
    {
        return false;
    }
    let minors = board.pieces(PieceKind::Knight) | board.pieces(PieceKind::Bishop);
    minors.count() <= 1
}

fn has_non_pawn_material(board: &Board) -> bool {
    let minors_and_majors = board.pieces(PieceKind::Knight)
        | board.pieces(PieceKind::Bishop)
        | board.pieces(PieceKind::Rook)
        | board.pieces(PieceKind::Queen);
    (minors_and_majors & board.side(board.side_to_move())).is_nonempty()
}

/// Principal-variation search: the first move gets the full window, the
/// rest are scouted with a null window and re-searched on promise.
pub(crate) fn pv_search(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    depth: i32,
    ply: i32,
    mut alpha: i32,
    beta: i32,
    null_cooldown: i32,
) -> i32 {
    ctx.checkup();
    if !ctx.control.is_running() {
        return 0;
    }

    if ctx.is_draw(board) {
        ctx.pv.clear(ply);
        return 0;
    }

    if ctx.mate_distance < ply {
        ctx.pv.clear(ply);
        return MIN_SCORE + 1;
    }

    if depth <= 0 || ply * ONE_PLY >= ctx.current_max_depth {
        return quiescence(ctx, board, ply + 1, alpha, beta);
    }

    ctx.nodes += 1;
    ctx.pv.clear(ply + 1);

    let moves = generate_legal_moves(board);
    if moves.is_empty() {
        ctx.pv.clear(ply);
        return if board.in_check() {
            -MATE_SCORE + ply
        } else {
            0
        };
    }

    let was_check_evasion = board.in_check();
    let us = board.side_to_move();
    let ordered = ordering::order_moves(ctx, board, &moves, ply);

    let mut search_pv = true;
    let mut best_score = MIN_SCORE;
    let mut best_move = Move::NULL;
    let mut move_number = 1;

    for &mv in ordered.iter() {
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
            ply,
            move_number,
            was_check_evasion,
            ctx.history.get(us, mv),
            ctx.current_max_depth,
            ctx.mate_distance,
        ) * 2
            / 3;
        let nw_delta = -ONE_PLY - nw_reduction + extension;

        ctx.last_moves[(ply + 1) as usize] = mv;
        ctx.path.push(board.hash());

        let mut score;
        if search_pv {
            score = -pv_search(
                ctx,
                &child,
                depth - ONE_PLY + extension,
                ply + 1,
                -beta,
                -alpha,
                null_cooldown - 1,
            );
        } else {
            score = -nw_search(
                ctx,
                &child,
                depth + nw_delta,
                ply + 1,
                -alpha - 1,
                -alpha,
                null_cooldown - 1,
            );
            if score > alpha {
                score = -pv_search(
                    ctx,
                    &child,
                    depth - ONE_PLY + extension,
                    ply + 1,
                    -beta,
                    -alpha,
                    null_cooldown - 1,
                );
            }
        }

        ctx.path.pop();

        if !ctx.control.is_running() {
            return 0;
        }

        ctx.history.penalize(us, mv, depth / ONE_PLY);

        if score >= beta {
            ctx.tt_store(board.hash(), depth, score, EntryKind::PV_CUT, mv);
            ctx.record_cutoff(board, mv, ply, depth);
            return score;
        }

        if score > best_score {
            best_score = score;
            best_move = mv;
        }

        if score > alpha {
            alpha = score;
            if ply < PV_ROWS as i32 - 1 {
                ctx.pv.set_line(ply, mv);
            }
        }

        search_pv = false;
        move_number += 1;
    }

    ctx.tt_store(board.hash(), depth, best_score, EntryKind::PV_EXACT, best_move);
    if best_move.exists() {
        ctx.history.reward(us, best_move, depth / ONE_PLY);
    }

    best_score
}

/// Null-window scout search with transposition cutoffs, null-move
/// pruning, forward pruning and late-move reductions.
pub(crate) fn nw_search(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    depth: i32,
    ply: i32,
    alpha: i32,
    beta: i32,
    null_cooldown: i32,
) -> i32 {
    ctx.checkup();
    if !ctx.control.is_running() {
        return 0;
    }

    if ctx.is_draw(board) {
        return 0;
    }

    if ctx.mate_distance < ply {
        return MIN_SCORE + 1;
    }

    if depth <= 0 || ply * ONE_PLY >= ctx.current_max_depth {
        return quiescence(ctx, board, ply + 1, alpha, beta);
    }

    ctx.nodes += 1;

    if let Some(held) = ctx.tt.probe(board.hash()) {
        if held.depth as i32 >= depth {
            if held.kind.is_exact() {
                return held.score as i32;
            }
            if held.kind.is_cut() && held.score as i32 >= beta {
                return held.score as i32;
            }
        }
    }

    let was_check_evasion = board.in_check();

    // A null move answers "is this position strong enough to stand a
    // free tempo?". Worthless in zugzwang, so it needs a non-pawn piece,
    // and never inside a mate line.
    if null_cooldown <= 0
        && !was_check_evasion
        && !ctx.is_mate_line()
        && has_non_pawn_material(board)
    {
        let reduction = if depth >= 8 * ONE_PLY {
            4 * ONE_PLY
        } else {
            3 * ONE_PLY
        };
        let null_child = board.make_null_move();
        ctx.last_moves[(ply + 1) as usize] = Move::NULL;
        ctx.path.push(board.hash());
        let null_score = -nw_search(
            ctx,
            &null_child,
            depth - reduction,
            ply + 1,
            -beta,
            -beta + 1,
            NULL_MOVE_COOLDOWN,
        );
        ctx.path.pop();

        if null_score >= beta {
            return null_score;
        }
    }

    let moves = generate_legal_moves(board);
    if moves.is_empty() {
        return if board.in_check() {
            -MATE_SCORE + ply
        } else {
            0
        };
    }

    let us = board.side_to_move();
    let ordered = ordering::order_moves(ctx, board, &moves, ply);

    let mut best_score = MIN_SCORE;
    let mut best_move = Move::NULL;
    let mut move_number = 1;

    for &mv in ordered.iter() {
        let child = board.make_move(mv);
        let class = MoveClass::classify(
            &child,
            mv,
            ctx.see_cache.probe(mv).unwrap_or(MIN_SCORE),
        );

        // Skipped moves do not advance the move counter: the threshold
        // compares against moves actually searched.
        if policy::should_skip(&class, depth, ply, move_number, was_check_evasion) {
            ctx.nodes += 1;
            continue;
        }

        let extension = policy::extension(&class, was_check_evasion);
        let reduction = policy::reduction(
            &class,
            depth,
            ply,
            move_number,
            was_check_evasion,
            ctx.history.get(us, mv),
            ctx.current_max_depth,
            ctx.mate_distance,
        );
        let nw_delta = -ONE_PLY - reduction + extension;

        ctx.last_moves[(ply + 1) as usize] = mv;
        ctx.path.push(board.hash());

        let mut score = -nw_search(
            ctx,
            &child,
            depth + nw_delta,
            ply + 1,
            -beta,
            -alpha,
            null_cooldown - 1,
        );

        // A reduced search that clears alpha must be confirmed at the
        // unreduced depth.
        if score > alpha && reduction > 0 {
            score = -nw_search(
                ctx,
                &child,
                depth - ONE_PLY + extension,
                ply + 1,
                -beta,
                -alpha,
                null_cooldown - 1,
            );
        }

        ctx.path.pop();

        if !ctx.control.is_running() {
            return 0;
        }

        ctx.history.penalize(us, mv, depth / ONE_PLY);

        if score >= beta {
            ctx.tt_store(board.hash(), depth, score, EntryKind::NW_CUT, mv);
            ctx.record_cutoff(board, mv, ply, depth);
            return score;
        }

        if score > best_score {
            best_score = score;
            best_move = mv;
        }

        move_number += 1;
    }

    // Forward pruning can skip every candidate; the collected best is
    // then meaningless and must not be memoized.
    if best_move.exists() {
        ctx.tt_store(board.hash(), depth, best_score, EntryKind::NW_EXACT, best_move);
    }

    best_score
}

/// Captures-only extension of the horizon; full legal search while in
/// check. Bounded by the exchange filter rather than a depth budget.
pub(crate) fn quiescence(
    ctx: &mut SearchContext<'_, '_>,
    board: &Board,
    ply: i32,
    mut alpha: i32,
    beta: i32,
) -> i32 {
    ctx.checkup();
    if !ctx.control.is_running() {
        return 0;
    }

    ctx.nodes += 1;

    let in_check = board.in_check();
    let mut stand_pat = MIN_SCORE;
    if !in_check {
        // The side to move is not obliged to capture; the static score
        // is the floor.
        stand_pat = evaluate(board);
    } else if ctx.is_draw(board) {
        // Perpetual-check lines must terminate here.
        return 0;
    }

    if stand_pat >= beta {
        return stand_pat;
    }
    if stand_pat > alpha {
        alpha = stand_pat;
    }
    let mut best_score = stand_pat;

    let ordered = if in_check {
        let moves = generate_legal_moves(board);
        if moves.is_empty() {
            return -MATE_SCORE + ply;
        }
        ordering::order_quiescence_evasions(board, &moves)
    } else {
        let captures = generate_legal_captures(board);
        ordering::order_quiescence_captures(ctx, board, &captures)
    };

    for &mv in ordered.iter() {
        let child = board.make_move(mv);
        ctx.path.push(board.hash());
        let score = -quiescence(ctx, &child, ply + 1, -beta, -alpha);
        ctx.path.pop();

        if !ctx.control.is_running() {
            return 0;
        }

        if score >= beta {
            return score;
        }
        if score > best_score {
            best_score = score;
        }
        if score > alpha {
            alpha = score;
        }
    }

    best_score
}
