//! FEN parsing and formatting.

use std::fmt;
use std::str::FromStr;

use crate::bitboard::Bitboard;
use crate::board::Board;
use crate::castling::{CastleRights, CastleSide};
use crate::color::Color;
use crate::error::{BoardError, FenError};
use crate::piece::{Piece, PieceKind};
use crate::square::Square;

/// The standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl FromStr for Board {
    type Err = FenError;

    fn from_str(fen: &str) -> Result<Board, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        // The move counters may be omitted (EPD style).
        if fields.len() != 4 && fields.len() != 6 {
            return Err(FenError::FieldCount {
                found: fields.len(),
            });
        }

        let mut pieces = [Bitboard::EMPTY; PieceKind::COUNT];
        let mut sides = [Bitboard::EMPTY; Color::COUNT];

        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::RankCount);
        }
        for (row, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - row as u8;
            let mut file = 0u8;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                } else {
                    let piece = Piece::from_fen_char(c)
                        .ok_or(FenError::BadPiece { letter: c })?;
                    if file >= 8 {
                        return Err(FenError::BadRank { rank: rank + 1 });
                    }
                    let sq = Square::from_coords(file, rank);
                    pieces[piece.kind().index()] |= sq.bitboard();
                    sides[piece.color().index()] |= sq.bitboard();
                    file += 1;
                }
            }
            if file != 8 {
                return Err(FenError::BadRank { rank: rank + 1 });
            }
        }

        let side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(FenError::BadSideToMove {
                    field: other.to_string(),
                });
            }
        };

        let castling = parse_castling(fields[2])?;

        let en_passant = match fields[3] {
            "-" => None,
            s => Some(Square::from_algebraic(s).ok_or_else(|| FenError::BadEnPassant {
                field: s.to_string(),
            })?),
        };

        let (halfmove_clock, fullmove_number) = if fields.len() == 6 {
            let half = fields[4].parse().map_err(|_| FenError::BadCounter {
                field: fields[4].to_string(),
            })?;
            let full = fields[5].parse().map_err(|_| FenError::BadCounter {
                field: fields[5].to_string(),
            })?;
            (half, full)
        } else {
            (0, 1)
        };

        validate(&pieces, &sides)?;

        Ok(Board::from_parts(
            pieces,
            sides,
            side_to_move,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number,
        ))
    }
}

fn parse_castling(field: &str) -> Result<CastleRights, FenError> {
    if field == "-" {
        return Ok(CastleRights::NONE);
    }
    let mut rights = CastleRights::NONE;
    for c in field.chars() {
        rights = match c {
            'K' => rights.grant(Color::White, CastleSide::King),
            'Q' => rights.grant(Color::White, CastleSide::Queen),
            'k' => rights.grant(Color::Black, CastleSide::King),
            'q' => rights.grant(Color::Black, CastleSide::Queen),
            _ => {
                return Err(FenError::BadCastling {
                    field: field.to_string(),
                });
            }
        };
    }
    Ok(rights)
}

fn validate(
    pieces: &[Bitboard; PieceKind::COUNT],
    sides: &[Bitboard; Color::COUNT],
) -> Result<(), BoardError> {
    for color in Color::ALL {
        let kings = (pieces[PieceKind::King.index()] & sides[color.index()]).count();
        if kings != 1 {
            return Err(BoardError::KingCount {
                color: if color == Color::White { "white" } else { "black" },
                count: kings,
            });
        }
    }
    let back_ranks = Bitboard::RANK_1 | Bitboard::RANK_8;
    if (pieces[PieceKind::Pawn.index()] & back_ranks).is_nonempty() {
        return Err(BoardError::PawnOnBackRank);
    }
    Ok(())
}

impl fmt::Display for Board {
    /// Writes the position as a FEN string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0u8..8).rev() {
            let mut empty = 0;
            for file in 0u8..8 {
                let sq = Square::from_coords(file, rank);
                match self.piece_at(sq) {
                    Some(piece) => {
                        if empty > 0 {
                            write!(f, "{empty}")?;
                            empty = 0;
                        }
                        write!(f, "{piece}")?;
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                write!(f, "{empty}")?;
            }
            if rank > 0 {
                write!(f, "/")?;
            }
        }

        let stm = if self.side_to_move() == Color::White { 'w' } else { 'b' };
        write!(f, " {stm} {} ", self.castling())?;
        match self.en_passant() {
            Some(sq) => write!(f, "{sq}")?,
            None => write!(f, "-")?,
        }
        write!(f, " {} {}", self.halfmove_clock(), self.fullmove_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_fen_roundtrip() {
        let board: Board = STARTING_FEN.parse().unwrap();
        assert_eq!(board.to_string(), STARTING_FEN);
    }

    #[test]
    fn kiwipete_roundtrip() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let board: Board = fen.parse().unwrap();
        assert_eq!(board.to_string(), fen);
    }

    #[test]
    fn en_passant_field_roundtrip() {
        let fen = "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3";
        let board: Board = fen.parse().unwrap();
        assert_eq!(board.en_passant(), Some(Square::D6));
        assert_eq!(board.to_string(), fen);
    }

    #[test]
    fn four_field_epd_accepted() {
        let board: Board = "4k3/8/8/8/8/8/8/4K3 w - -".parse().unwrap();
        assert_eq!(board.halfmove_clock(), 0);
        assert_eq!(board.fullmove_number(), 1);
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(matches!(
            "4k3/8/8/8/8/8/8/4K3 w".parse::<Board>(),
            Err(FenError::FieldCount { found: 3 })
        ));
    }

    #[test]
    fn rejects_bad_piece_letter() {
        assert!(matches!(
            "4x3/8/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>(),
            Err(FenError::BadPiece { letter: 'x' })
        ));
    }

    #[test]
    fn rejects_short_rank() {
        assert!(matches!(
            "4k2/8/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>(),
            Err(FenError::BadRank { .. })
        ));
    }

    #[test]
    fn rejects_missing_king() {
        assert!(matches!(
            "8/8/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>(),
            Err(FenError::Board(BoardError::KingCount { .. }))
        ));
    }

    #[test]
    fn rejects_pawn_on_back_rank() {
        assert!(matches!(
            "P3k3/8/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>(),
            Err(FenError::Board(BoardError::PawnOnBackRank))
        ));
    }

    #[test]
    fn rejects_bad_side_to_move() {
        assert!(matches!(
            "4k3/8/8/8/8/8/8/4K3 x - - 0 1".parse::<Board>(),
            Err(FenError::BadSideToMove { .. })
        ));
    }
}
