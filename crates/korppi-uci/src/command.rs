//! UCI command parsing.

use korppi_core::{generate_legal_moves, Board, Move};

use crate::error::UciError;

/// Parameters of a `go` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoParams {
    /// `wtime` in milliseconds.
    pub wtime: Option<u64>,
    /// `btime` in milliseconds.
    pub btime: Option<u64>,
    /// `winc` in milliseconds.
    pub winc: Option<u64>,
    /// `binc` in milliseconds.
    pub binc: Option<u64>,
    /// `movetime` in milliseconds.
    pub movetime: Option<u64>,
    /// `depth` in plies.
    pub depth: Option<u32>,
    /// `infinite` flag.
    pub infinite: bool,
}

/// One parsed line of UCI input.
#[derive(Debug)]
pub enum Command {
    /// `uci` -- identify the engine.
    Uci,
    /// `isready` -- synchronisation ping.
    IsReady,
    /// `ucinewgame` -- reset state between games.
    NewGame,
    /// `position ...` -- the position to search, with moves applied.
    Position(Board),
    /// `go ...` -- start searching.
    Go(GoParams),
    /// `stop` -- cancel the running search.
    Stop,
    /// `quit` -- terminate the session.
    Quit,
    /// Anything unrecognised; ignored per protocol.
    Unknown(String),
}

/// Parse one line of input.
pub fn parse(line: &str) -> Result<Command, UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.split_first() {
        None => Ok(Command::Unknown(String::new())),
        Some((&"uci", _)) => Ok(Command::Uci),
        Some((&"isready", _)) => Ok(Command::IsReady),
        Some((&"ucinewgame", _)) => Ok(Command::NewGame),
        Some((&"stop", _)) => Ok(Command::Stop),
        Some((&"quit", _)) => Ok(Command::Quit),
        Some((&"position", rest)) => parse_position(rest),
        Some((&"go", rest)) => parse_go(rest),
        Some((first, _)) => Ok(Command::Unknown(first.to_string())),
    }
}

fn parse_position(tokens: &[&str]) -> Result<Command, UciError> {
    let (mut board, rest): (Board, &[&str]) = match tokens.first() {
        Some(&"startpos") => (Board::starting_position(), &tokens[1..]),
        Some(&"fen") if tokens.len() >= 7 => {
            let fen = tokens[1..7].join(" ");
            (fen.parse()?, &tokens[7..])
        }
        _ => return Err(UciError::MalformedPosition),
    };

    if let Some((&"moves", moves)) = rest.split_first() {
        for uci_move in moves {
            let mv = Move::from_uci(uci_move, &board)
                .filter(|mv| generate_legal_moves(&board).contains(*mv))
                .ok_or_else(|| UciError::InvalidMove {
                    uci_move: uci_move.to_string(),
                })?;
            board = board.make_move(mv);
        }
    }

    Ok(Command::Position(board))
}

fn parse_go(tokens: &[&str]) -> Result<Command, UciError> {
    let mut params = GoParams::default();

    let mut iter = tokens.iter();
    while let Some(&token) = iter.next() {
        match token {
            "infinite" => params.infinite = true,
            "wtime" | "btime" | "winc" | "binc" | "movetime" | "depth" => {
                let value = iter.next().copied().unwrap_or_default();
                let parsed: u64 = value.parse().map_err(|_| UciError::InvalidGoValue {
                    param: token.to_string(),
                    value: value.to_string(),
                })?;
                match token {
                    "wtime" => params.wtime = Some(parsed),
                    "btime" => params.btime = Some(parsed),
                    "winc" => params.winc = Some(parsed),
                    "binc" => params.binc = Some(parsed),
                    "movetime" => params.movetime = Some(parsed),
                    _ => params.depth = Some(parsed as u32),
                }
            }
            // Unknown go subcommands are skipped, per protocol.
            _ => {}
        }
    }

    Ok(Command::Go(params))
}
