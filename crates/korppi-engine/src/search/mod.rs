//! The engine: public surface and the iterative-deepening driver.

pub(crate) mod control;
pub(crate) mod heuristics;
pub(crate) mod ordering;
pub(crate) mod policy;
pub(crate) mod root;
pub(crate) mod scout;
pub(crate) mod tt;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use korppi_core::{generate_legal_moves, Board, Move};

use crate::score::{MAX_PLY, ONE_PLY, TIME_FACTOR};
use control::{SearchControl, StopHandle};
use scout::SearchContext;
use tt::{TranspositionTable, DEFAULT_TT_ENTRIES};

/// Errors surfaced by engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The transposition table allocation failed. The engine is
    /// unusable without one.
    #[error("failed to allocate a transposition table of {entries} entries")]
    TableAllocation {
        /// Requested capacity in entries.
        entries: usize,
    },
}

/// One line of play with its evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Variation {
    /// The moves of the line, best reply by best reply.
    pub moves: Vec<Move>,
    /// Evaluation in centipawns from the root side to move's view.
    pub score: i32,
}

/// Snapshot of a search: the multi-PV result plus bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct SearchDetails {
    /// Variations sorted by score, best first. At most the configured
    /// multi-PV count.
    pub variations: Vec<Variation>,
    /// Nodes visited.
    pub nodes: u64,
    /// Wall-clock time spent.
    pub time_taken: Duration,
    /// Completed search depth in plies.
    pub depth: i32,
}

impl SearchDetails {
    /// First move of the best variation; null when there is none.
    pub fn best_move(&self) -> Move {
        self.variations
            .first()
            .and_then(|variation| variation.moves.first())
            .copied()
            .unwrap_or(Move::NULL)
    }

    /// Score of the best variation; 0 when there is none.
    pub fn best_move_score(&self) -> i32 {
        self.variations.first().map_or(0, |variation| variation.score)
    }
}

/// Engine construction knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Number of principal variations to maintain (multi-PV).
    pub variations: usize,
    /// Transposition table capacity in 16-byte entries.
    pub tt_entries: usize,
    /// Depth ceiling in plies; `None` searches until time or stop.
    pub max_depth: Option<u32>,
}

impl Default for EngineOptions {
    fn default() -> EngineOptions {
        EngineOptions {
            variations: 1,
            tt_entries: DEFAULT_TT_ENTRIES,
            max_depth: None,
        }
    }
}

/// The search engine. Owns its board copy, the transposition table and
/// the result of the most recent search.
///
/// `search` blocks the calling thread; cancellation comes from a
/// [`StopHandle`] on another thread or from the checkup callback.
pub struct Engine {
    board: Board,
    tt: TranspositionTable,
    options: EngineOptions,
    running: Arc<AtomicBool>,
    variations: Vec<Variation>,
    nodes: u64,
    /// `current_max_depth` after the last search, sixth-ply units.
    reached_depth: i32,
    time_taken: Duration,
    checkup_callback: Option<Box<dyn FnMut() + Send>>,
    iteration_callback: Option<Box<dyn FnMut(&SearchDetails) + Send>>,
}

impl Engine {
    /// An engine with default options, bound to the starting position.
    pub fn new() -> Result<Engine, EngineError> {
        Engine::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Result<Engine, EngineError> {
        Ok(Engine {
            board: Board::starting_position(),
            tt: TranspositionTable::new(options.tt_entries)?,
            options,
            running: Arc::new(AtomicBool::new(false)),
            variations: Vec::new(),
            nodes: 0,
            reached_depth: 0,
            time_taken: Duration::ZERO,
            checkup_callback: None,
            iteration_callback: None,
        })
    }

    /// Bind a new position: stops any cancellation in flight and resets
    /// the memo and all search results.
    pub fn set_board(&mut self, board: Board) {
        self.stop();
        self.board = board;
        self.tt.clear();
        self.variations.clear();
        self.nodes = 0;
        self.reached_depth = 0;
        self.time_taken = Duration::ZERO;
    }

    /// The currently bound position.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Request cooperative cancellation. Since `search` blocks its
    /// calling thread, the request necessarily comes from a callback or
    /// from a [`StopHandle`] clone on another thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// A handle that cancels searches from other threads.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.running))
    }

    /// Cap iterative deepening at `plies`; `None` removes the cap.
    pub fn set_depth_limit(&mut self, plies: Option<u32>) {
        self.options.max_depth = plies;
    }

    /// Invoked every checkup interval (1024 nodes) during search.
    pub fn set_checkup_callback(&mut self, callback: impl FnMut() + Send + 'static) {
        self.checkup_callback = Some(Box::new(callback));
    }

    /// Invoked after every completed iteration with a result snapshot.
    pub fn set_iteration_callback(
        &mut self,
        callback: impl FnMut(&SearchDetails) + Send + 'static,
    ) {
        self.iteration_callback = Some(Box::new(callback));
    }

    /// Iterative-deepening search. Blocks until the deadline passes,
    /// the depth ceiling is reached, or a stop arrives.
    ///
    /// With `time_control` the budget of `time_ms` is split into a
    /// minimum and maximum thinking time and iterations between the two
    /// continue only while the result is still unstable. Without it,
    /// `time_ms` is a hard deadline; `0` means no deadline at all.
    pub fn search(&mut self, time_ms: u64, time_control: bool) -> SearchDetails {
        self.running.store(true, Ordering::Relaxed);
        let search_board = self.board;
        let start = Instant::now();

        let (min_time, max_time, deadline) = if time_control {
            let (min_ms, max_ms) = time_budget(&search_board, time_ms);
            debug!(min_ms, max_ms, "time budget");
            (
                Duration::from_millis(min_ms),
                Duration::from_millis(max_ms),
                Some(start + Duration::from_millis(max_ms)),
            )
        } else if time_ms > 0 {
            (
                Duration::ZERO,
                Duration::from_millis(time_ms),
                Some(start + Duration::from_millis(time_ms)),
            )
        } else {
            (Duration::ZERO, Duration::ZERO, None)
        };

        let control = SearchControl::new(Arc::clone(&self.running), deadline);
        let mut iteration_callback = self.iteration_callback.take();

        let mut ctx = SearchContext::new(
            &self.tt,
            &control,
            self.options.variations,
            search_board.ply(),
        );
        ctx.checkup_callback = self.checkup_callback.take();

        let mut pv_history: Vec<Variation> = Vec::new();
        let mut score = 0;
        let mut depth = ONE_PLY;
        let depth_ceiling = self
            .options
            .max_depth
            .map_or(MAX_PLY * ONE_PLY, |plies| {
                (plies as i32 * ONE_PLY + 1).min(MAX_PLY * ONE_PLY)
            });

        while control.is_running() && depth < depth_ceiling {
            ctx.current_max_depth = depth;
            score = root::aspiration_root(&mut ctx, &search_board, depth, score);

            let elapsed = start.elapsed();
            pv_history.push(ctx.variations.first().cloned().unwrap_or_default());

            if control.is_running() {
                debug!(
                    depth = depth / ONE_PLY,
                    score,
                    nodes = ctx.nodes,
                    "iteration complete"
                );
                if let Some(callback) = iteration_callback.as_deref_mut() {
                    callback(&SearchDetails {
                        variations: ctx.variations.clone(),
                        nodes: ctx.nodes,
                        time_taken: elapsed,
                        depth: depth / ONE_PLY,
                    });
                }
            }

            if time_control && !should_extend(&pv_history, min_time, max_time, elapsed) {
                break;
            }
            depth += ONE_PLY;
        }

        // When the loop ends with the search still live, the last
        // iteration ran to completion and counts as reached depth.
        if control.is_running() {
            ctx.current_max_depth += ONE_PLY;
        }
        self.running.store(false, Ordering::Relaxed);

        self.variations = std::mem::take(&mut ctx.variations);
        self.nodes = ctx.nodes;
        self.reached_depth = ctx.current_max_depth;
        self.time_taken = start.elapsed();
        self.checkup_callback = ctx.checkup_callback.take();
        drop(ctx);

        self.iteration_callback = iteration_callback;

        self.search_details()
    }

    /// The last completed search's results.
    pub fn search_details(&self) -> SearchDetails {
        SearchDetails {
            variations: self.variations.clone(),
            nodes: self.nodes,
            time_taken: self.time_taken,
            depth: (self.reached_depth / ONE_PLY - 1).max(0),
        }
    }

    /// First move of the best variation; null before any search.
    pub fn best_move(&self) -> Move {
        self.search_details().best_move()
    }

    /// Score of the best variation; 0 before any search.
    pub fn best_move_score(&self) -> i32 {
        self.search_details().best_move_score()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("board", &self.board)
            .field("tt", &self.tt)
            .field("options", &self.options)
            .field("variations", &self.variations.len())
            .finish()
    }
}

/// Split a total budget into minimum and maximum thinking time, scaled
/// by how many legal moves there are: nearly forced positions deserve
/// little of the clock.
fn time_budget(board: &Board, time_ms: u64) -> (u64, u64) {
    let legal = generate_legal_moves(board).len();
    let saturation = 1.0 - (-0.05 * legal as f64).exp();

    let min_raw = time_ms as f64 * 0.0333 * saturation;
    let max_raw = time_ms as f64 * 0.25 * saturation;

    let factor = TIME_FACTOR[legal.clamp(1, TIME_FACTOR.len()) - 1];

    // A small buffer covers the cost of winding the search down.
    let max_ms = ((max_raw * factor) as u64).saturating_sub(10);
    let min_ms = ((min_raw * factor) as u64).min(max_ms);
    (min_ms, max_ms)
}

/// The continuation oracle: between the minimum and maximum thinking
/// time, keep iterating only while the best move keeps changing or the
/// score is still swinging.
fn should_extend(
    history: &[Variation],
    min_time: Duration,
    max_time: Duration,
    elapsed: Duration,
) -> bool {
    if history.len() < 5 {
        return true;
    }
    if elapsed < min_time {
        return true;
    }
    if elapsed >= max_time {
        return false;
    }

    let latest = &history[history.len() - 1];
    let window = &history[history.len() - 5..];

    let variance = window
        .iter()
        .map(|v| f64::from(v.score - latest.score).powi(2))
        .sum::<f64>()
        / 5.0;
    let sigma = variance.sqrt();

    let changes = window[..4]
        .iter()
        .filter(|v| v.moves.first() != latest.moves.first())
        .count();

    let span = max_time.saturating_sub(min_time).as_millis() as f64;
    let progress = if span > 0.0 {
        (elapsed.saturating_sub(min_time).as_millis() as f64 / span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    changes >= 4
        || (changes >= 3 && sigma > 40.0 * progress)
        || (changes >= 2 && sigma > 60.0 * progress)
        || (changes >= 1 && sigma > 75.0 * progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use korppi_core::Square;

    fn entry(first: Move, score: i32) -> Variation {
        Variation {
            moves: vec![first],
            score,
        }
    }

    fn mv(from: Square, to: Square) -> Move {
        Move::quiet(from, to)
    }

    #[test]
    fn time_budget_scales_with_mobility() {
        let open = Board::starting_position();
        let cramped: Board = "7k/8/8/8/8/8/8/K7 w - - 0 1".parse().unwrap();
        let (open_min, open_max) = time_budget(&open, 60_000);
        let (cramped_min, cramped_max) = time_budget(&cramped, 60_000);
        assert!(open_max > cramped_max);
        assert!(open_min > cramped_min);
        assert!(open_min <= open_max);
    }

    #[test]
    fn time_budget_caps_below_a_quarter() {
        let board = Board::starting_position();
        let (_, max_ms) = time_budget(&board, 60_000);
        assert!(max_ms <= 15_000);
    }

    #[test]
    fn extend_during_first_iterations() {
        let history = vec![entry(mv(Square::E2, Square::E4), 10); 3];
        assert!(should_extend(
            &history,
            Duration::from_millis(100),
            Duration::from_millis(400),
            Duration::from_millis(350),
        ));
    }

    #[test]
    fn extend_until_min_time() {
        let history = vec![entry(mv(Square::E2, Square::E4), 10); 8];
        assert!(should_extend(
            &history,
            Duration::from_millis(500),
            Duration::from_millis(900),
            Duration::from_millis(100),
        ));
    }

    #[test]
    fn stop_at_max_time() {
        let mut history = Vec::new();
        for i in 0..8 {
            history.push(entry(mv(Square::E2, Square::E4), i * 100));
        }
        assert!(!should_extend(
            &history,
            Duration::from_millis(100),
            Duration::from_millis(400),
            Duration::from_millis(400),
        ));
    }

    #[test]
    fn stable_result_stops_between_bounds() {
        let history = vec![entry(mv(Square::E2, Square::E4), 25); 6];
        assert!(!should_extend(
            &history,
            Duration::from_millis(100),
            Duration::from_millis(1000),
            Duration::from_millis(500),
        ));
    }

    #[test]
    fn flapping_best_move_extends() {
        // Four best-move changes across the window: always extend, even
        // with a flat score.
        let history = vec![
            entry(mv(Square::D2, Square::D4), 10),
            entry(mv(Square::G1, Square::F3), 10),
            entry(mv(Square::B1, Square::C3), 10),
            entry(mv(Square::C2, Square::C4), 10),
            entry(mv(Square::E2, Square::E4), 10),
        ];
        assert!(should_extend(
            &history,
            Duration::from_millis(100),
            Duration::from_millis(1000),
            Duration::from_millis(500),
        ));
    }

    #[test]
    fn swinging_score_with_one_change_extends() {
        let latest = mv(Square::E2, Square::E4);
        let history = vec![
            entry(latest, -200),
            entry(mv(Square::D2, Square::D4), -150),
            entry(latest, 120),
            entry(latest, 40),
            entry(latest, 60),
        ];
        // One best-move change and a large sigma: keep going.
        assert!(should_extend(
            &history,
            Duration::from_millis(100),
            Duration::from_millis(1000),
            Duration::from_millis(200),
        ));
    }

    #[test]
    fn details_before_any_search_are_empty() {
        let engine = Engine::new().unwrap();
        let details = engine.search_details();
        assert!(details.variations.is_empty());
        assert!(!details.best_move().exists());
        assert_eq!(details.best_move_score(), 0);
        assert_eq!(details.depth, 0);
    }
}
