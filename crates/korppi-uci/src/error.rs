//! UCI protocol errors.

/// Errors raised while handling UCI input.
#[derive(Debug, thiserror::Error)]
pub enum UciError {
    /// The `position` command lacked `startpos` or `fen`.
    #[error("malformed position command: expected 'startpos' or 'fen'")]
    MalformedPosition,

    /// The FEN in a `position` command did not parse.
    #[error("invalid FEN: {0}")]
    InvalidFen(#[from] korppi_core::FenError),

    /// A move in the `position` command was unparseable or illegal.
    #[error("invalid move in position command: {uci_move}")]
    InvalidMove {
        /// The offending move string.
        uci_move: String,
    },

    /// A `go` parameter value did not parse as a number.
    #[error("invalid value for go parameter {param}: {value}")]
    InvalidGoValue {
        /// Parameter name, e.g. `wtime`.
        param: String,
        /// The value that failed to parse.
        value: String,
    },

    /// Engine construction failed.
    #[error(transparent)]
    Engine(#[from] korppi_engine::EngineError),

    /// Reading standard input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
