//! The UCI session loop: stdin on one thread, searches on a worker,
//! events multiplexed onto the main loop.

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, info, warn};

use korppi_core::{Board, Color};
use korppi_engine::score::{is_mate_score, mate_distance_plies};
use korppi_engine::{Engine, SearchDetails, StopHandle};

use crate::command::{parse, Command, GoParams};
use crate::error::UciError;

enum Event {
    Input(Result<Command, UciError>),
    SearchFinished(Box<Engine>),
    InputClosed,
}

/// One UCI session bound to stdin/stdout.
///
/// The engine lives on this thread while idle and moves onto a worker
/// for the duration of each search, so `stop` stays responsive.
pub struct UciSession {
    engine: Option<Box<Engine>>,
    stop_handle: StopHandle,
    board: Board,
}

impl UciSession {
    pub fn new() -> Result<UciSession, UciError> {
        let mut engine = Engine::new()?;
        engine.set_iteration_callback(print_info);
        let stop_handle = engine.stop_handle();
        Ok(UciSession {
            engine: Some(Box::new(engine)),
            stop_handle,
            board: Board::starting_position(),
        })
    }

    /// Run until `quit` or end of input.
    pub fn run(mut self) -> Result<(), UciError> {
        let (tx, rx) = mpsc::channel::<Event>();

        let input_tx = tx.clone();
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    let _ = input_tx.send(Event::InputClosed);
                    return;
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                debug!(command = trimmed, "uci input");
                if input_tx.send(Event::Input(parse(trimmed))).is_err() {
                    return;
                }
            }
            let _ = input_tx.send(Event::InputClosed);
        });

        for event in &rx {
            match event {
                Event::Input(Ok(command)) => match command {
                    Command::Uci => {
                        println!("id name korppi");
                        println!("id author korppi contributors");
                        println!("uciok");
                    }
                    Command::IsReady => println!("readyok"),
                    Command::NewGame => {
                        self.board = Board::starting_position();
                        if let Some(engine) = self.engine.as_mut() {
                            engine.set_board(self.board);
                        }
                    }
                    Command::Position(board) => {
                        self.board = board;
                        if let Some(engine) = self.engine.as_mut() {
                            engine.set_board(board);
                        }
                    }
                    Command::Go(params) => self.handle_go(params, &tx),
                    Command::Stop => self.stop_handle.stop(),
                    Command::Quit => {
                        self.stop_handle.stop();
                        if self.engine.is_none() {
                            // Let the worker unwind before tearing down.
                            for pending in &rx {
                                if let Event::SearchFinished(engine) = pending {
                                    self.engine = Some(engine);
                                    break;
                                }
                            }
                        }
                        break;
                    }
                    Command::Unknown(token) => debug!(%token, "ignoring unknown command"),
                },
                Event::Input(Err(error)) => warn!(%error, "bad uci command"),
                Event::SearchFinished(mut engine) => {
                    // A position may have arrived while the worker held
                    // the engine.
                    if engine.board() != &self.board {
                        engine.set_board(self.board);
                    }
                    self.engine = Some(engine);
                }
                Event::InputClosed => break,
            }
        }

        info!("uci session over");
        Ok(())
    }

    fn handle_go(&mut self, params: GoParams, tx: &mpsc::Sender<Event>) {
        let Some(mut engine) = self.engine.take() else {
            warn!("go received while already searching");
            return;
        };

        engine.set_depth_limit(params.depth);
        let (time_ms, time_control) = schedule(&params, engine.board().side_to_move());

        let done_tx = tx.clone();
        thread::spawn(move || {
            let details = engine.search(time_ms, time_control);
            if details.best_move().exists() {
                println!("bestmove {}", details.best_move());
            } else {
                println!("bestmove 0000");
            }
            let _ = done_tx.send(Event::SearchFinished(engine));
        });
    }
}

/// Translate `go` parameters into the engine's `(time_ms, time_control)`
/// pair: `movetime` is a hard deadline, a clock engages the engine's own
/// budgeting, everything else searches until stopped or depth-capped.
fn schedule(params: &GoParams, side: Color) -> (u64, bool) {
    if params.infinite {
        return (0, false);
    }
    if let Some(movetime) = params.movetime {
        return (movetime, false);
    }

    let (remaining, increment) = match side {
        Color::White => (params.wtime, params.winc),
        Color::Black => (params.btime, params.binc),
    };
    if let Some(remaining) = remaining {
        return (remaining + increment.unwrap_or(0), true);
    }

    (0, false)
}

fn print_info(details: &SearchDetails) {
    let score = details.best_move_score();
    let score_field = if is_mate_score(score) {
        let moves = (mate_distance_plies(score) + 1) / 2;
        format!("score mate {}", if score > 0 { moves } else { -moves })
    } else {
        format!("score cp {score}")
    };

    let pv: Vec<String> = details
        .variations
        .first()
        .map(|variation| variation.moves.iter().map(|m| m.to_string()).collect())
        .unwrap_or_default();

    println!(
        "info depth {} {} nodes {} time {} pv {}",
        details.depth,
        score_field,
        details.nodes,
        details.time_taken.as_millis(),
        pv.join(" ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_prefers_movetime() {
        let params = GoParams {
            movetime: Some(3_000),
            wtime: Some(60_000),
            ..GoParams::default()
        };
        assert_eq!(schedule(&params, Color::White), (3_000, false));
    }

    #[test]
    fn schedule_uses_own_clock() {
        let params = GoParams {
            wtime: Some(60_000),
            btime: Some(30_000),
            winc: Some(1_000),
            ..GoParams::default()
        };
        assert_eq!(schedule(&params, Color::White), (61_000, true));
        assert_eq!(schedule(&params, Color::Black), (30_000, true));
    }

    #[test]
    fn schedule_infinite_and_bare_go() {
        let infinite = GoParams {
            infinite: true,
            movetime: Some(1),
            ..GoParams::default()
        };
        assert_eq!(schedule(&infinite, Color::White), (0, false));
        assert_eq!(schedule(&GoParams::default(), Color::White), (0, false));
    }
}
