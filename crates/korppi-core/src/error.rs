//! Error types for board construction and FEN parsing.

/// Errors raised while parsing a FEN string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FenError {
    /// Wrong number of whitespace-separated fields (expected 4 or 6).
    #[error("expected 6 FEN fields, found {found}")]
    FieldCount {
        /// Number of fields found.
        found: usize,
    },

    /// A rank did not describe exactly eight files.
    #[error("rank {rank} does not span 8 files")]
    BadRank {
        /// 1-based rank number as written in the FEN.
        rank: u8,
    },

    /// The placement field has the wrong number of ranks.
    #[error("expected 8 ranks in the placement field")]
    RankCount,

    /// An unknown piece letter in the placement field.
    #[error("unknown piece letter '{letter}'")]
    BadPiece {
        /// The offending character.
        letter: char,
    },

    /// The side-to-move field was neither `w` nor `b`.
    #[error("side to move must be 'w' or 'b', found {field:?}")]
    BadSideToMove {
        /// The offending field.
        field: String,
    },

    /// Unparseable castling field.
    #[error("bad castling field {field:?}")]
    BadCastling {
        /// The offending field.
        field: String,
    },

    /// Unparseable en-passant field.
    #[error("bad en passant square {field:?}")]
    BadEnPassant {
        /// The offending field.
        field: String,
    },

    /// Unparseable halfmove or fullmove counter.
    #[error("bad move counter {field:?}")]
    BadCounter {
        /// The offending field.
        field: String,
    },

    /// The placement parsed but describes an unusable position.
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Structural problems with a parsed position.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    /// A side has no king or more than one.
    #[error("{color} must have exactly one king, found {count}")]
    KingCount {
        /// "white" or "black".
        color: &'static str,
        /// How many kings were found.
        count: u32,
    },

    /// A pawn on rank 1 or rank 8.
    #[error("pawns cannot stand on the back ranks")]
    PawnOnBackRank,
}
