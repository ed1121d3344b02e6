use std::fmt;
use std::fmt::{Display, Formatter};

use anyhow::bail;
use colored::Colorize;
use strum_macros::{EnumIter, FromRepr};

use crate::chess::ChessColor;
use crate::chess::Chessboard;
use crate::chess::castling::CastleRight;
use crate::chess::castling::CastleRight::*;
use crate::chess::moves::ChessMoveFlags::*;
use crate::chess::pieces::ChessPieceType;
use crate::chess::pieces::ChessPieceType::*;
use crate::chess::squares::{ChessSquare, DimT, char_to_file, file_to_char};
use crate::general::common::Res;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, Debug, EnumIter, FromRepr)]
#[must_use]
pub enum ChessMoveFlags {
    #[default]
    NormalPawnMove,
    KnightMove,
    BishopMove,
    RookMove,
    QueenMove,
    NormalKingMove,
    CastleKingside,
    CastleQueenside,
    EnPassant,
    PromoKnight,
    PromoBishop,
    PromoRook,
    PromoQueen,
}

impl ChessMoveFlags {
    pub fn normal_move(piece: ChessPieceType) -> Self {
        debug_assert!(piece != Empty);
        Self::from_repr(piece as usize).unwrap()
    }

    pub fn is_promo(self) -> bool {
        self >= PromoKnight
    }

    pub fn promo_piece(self) -> ChessPieceType {
        if self < PromoKnight {
            Empty
        } else {
            ChessPieceType::from_repr(self as usize - PromoKnight as usize + Knight as usize).unwrap()
        }
    }

    pub fn piece_type(self) -> ChessPieceType {
        if self <= NormalKingMove {
            ChessPieceType::from_repr(self as usize).unwrap()
        } else if self >= EnPassant {
            Pawn
        } else {
            King
        }
    }
}

/// Members are stored as follows:
/// Bits 0-5: from square
/// Bits 6-11: to square
/// Bits 12-15: move type
///
/// A castling move is encoded with the king's square as source and the
/// *rook's* home square as destination, which is also how Polyglot encodes it.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Ord, PartialOrd, Hash)]
#[must_use]
#[repr(transparent)]
pub struct ChessMove(u16);

pub const WHITE_CASTLE_KINGSIDE: ChessMove = ChessMove::from_parts(4, 7, CastleKingside);
pub const WHITE_CASTLE_QUEENSIDE: ChessMove = ChessMove::from_parts(4, 0, CastleQueenside);
pub const BLACK_CASTLE_KINGSIDE: ChessMove = ChessMove::from_parts(60, 63, CastleKingside);
pub const BLACK_CASTLE_QUEENSIDE: ChessMove = ChessMove::from_parts(60, 56, CastleQueenside);

impl ChessMove {
    pub fn new(from: ChessSquare, to: ChessSquare, flags: ChessMoveFlags) -> Self {
        Self::from_parts(from.bb_idx(), to.bb_idx(), flags)
    }

    const fn from_parts(from: usize, to: usize, flags: ChessMoveFlags) -> Self {
        Self((from + (to << 6) + ((flags as usize) << 12)) as u16)
    }

    pub const fn castling_move(color: ChessColor, side: CastleRight) -> Self {
        match (color, side) {
            (ChessColor::White, Kingside) => WHITE_CASTLE_KINGSIDE,
            (ChessColor::White, Queenside) => WHITE_CASTLE_QUEENSIDE,
            (ChessColor::Black, Kingside) => BLACK_CASTLE_KINGSIDE,
            (ChessColor::Black, Queenside) => BLACK_CASTLE_QUEENSIDE,
        }
    }

    #[inline]
    pub fn src_square(self) -> ChessSquare {
        ChessSquare::from_bb_idx((self.0 & 0x3f) as usize)
    }

    #[inline]
    pub fn dest_square(self) -> ChessSquare {
        ChessSquare::from_bb_idx(((self.0 >> 6) & 0x3f) as usize)
    }

    #[inline]
    pub fn flags(self) -> ChessMoveFlags {
        ChessMoveFlags::from_repr((self.0 >> 12) as usize).unwrap()
    }

    pub fn piece_type(self) -> ChessPieceType {
        self.flags().piece_type()
    }

    pub fn is_castle(self) -> bool {
        self.flags() == CastleKingside || self.flags() == CastleQueenside
    }

    pub fn castle_side(self) -> CastleRight {
        debug_assert!(self.is_castle());
        if self.flags() == CastleQueenside { Queenside } else { Kingside }
    }

    pub fn is_ep(self) -> bool {
        self.flags() == EnPassant
    }

    pub fn is_promotion(self) -> bool {
        self.flags().is_promo()
    }

    pub fn promo_piece(self) -> ChessPieceType {
        self.flags().promo_piece()
    }

    pub fn is_capture(self, board: &Chessboard) -> bool {
        self.is_ep() || self.is_non_ep_capture(board)
    }

    pub fn is_non_ep_capture(self, board: &Chessboard) -> bool {
        !self.is_castle() && board.player_bb(board.active_player().other()).is_bit_set(self.dest_square())
    }

    pub fn is_double_pawn_push(self) -> bool {
        self.piece_type() == Pawn && self.dest_square().rank().abs_diff(self.src_square().rank()) == 2
    }

    #[inline]
    pub fn to_underlying(self) -> u16 {
        self.0
    }

    /// Parse a move in Short Algebraic Notation and resolve it against the current
    /// position. Fails unless exactly one legal move matches.
    pub fn from_san(s: &str, board: &Chessboard) -> Res<Self> {
        SanMove::parse(s)?.resolve(board)
    }

    /// Render this move in Short Algebraic Notation with minimal disambiguation.
    /// The move must be legal in the given position.
    pub fn to_san(self, board: &Chessboard) -> String {
        let mut res = if self.is_castle() {
            match self.castle_side() {
                Kingside => "O-O".to_string(),
                Queenside => "O-O-O".to_string(),
            }
        } else {
            let piece = self.piece_type();
            let mut res = String::new();
            if piece != Pawn {
                res.push(piece.to_ascii_char());
                let others = board
                    .legal_moves()
                    .into_iter()
                    .filter(|mov| {
                        mov.piece_type() == piece
                            && mov.dest_square() == self.dest_square()
                            && mov.src_square() != self.src_square()
                    })
                    .collect::<Vec<_>>();
                if !others.is_empty() {
                    if others.iter().all(|mov| mov.src_square().file() != self.src_square().file()) {
                        res.push(file_to_char(self.src_square().file()));
                    } else if others.iter().all(|mov| mov.src_square().rank() != self.src_square().rank()) {
                        res.push((b'1' + self.src_square().rank()) as char);
                    } else {
                        res += &self.src_square().to_string();
                    }
                }
            } else if self.is_capture(board) {
                res.push(file_to_char(self.src_square().file()));
            }
            if self.is_capture(board) {
                res.push('x');
            }
            res += &self.dest_square().to_string();
            if self.is_promotion() {
                res.push('=');
                res.push(self.promo_piece().to_ascii_char());
            }
            res
        };
        if let Some(new_board) = board.make_move(self) {
            if new_board.is_in_check() {
                res.push(if new_board.legal_moves().is_empty() { '#' } else { '+' });
            }
        }
        res
    }
}

/// Prints the raw from and to squares, so a castling move shows up in
/// king-takes-rook notation (`e1h1`), matching the Polyglot convention.
impl Display for ChessMove {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let flag = match self.flags() {
            PromoKnight => "n",
            PromoBishop => "b",
            PromoRook => "r",
            PromoQueen => "q",
            _ => "",
        };
        write!(f, "{from}{to}{flag}", from = self.src_square(), to = self.dest_square())
    }
}

/// The decoded parts of a SAN token, before resolution against a position.
///
/// Grammar (check and mate markers are stripped first):
/// ```text
/// "O-O-O" | "O-O"
/// |  [NBRQK]?  ([a-h]?[1-8]?)  x?  [a-h][1-8]  (=[NBRQ])?
/// ```
#[derive(Debug, Eq, PartialEq)]
enum SanMove {
    Castle(CastleRight),
    Normal {
        piece: ChessPieceType,
        start_file: Option<DimT>,
        start_rank: Option<DimT>,
        target: ChessSquare,
        promotion: ChessPieceType,
    },
}

impl SanMove {
    fn parse(original: &str) -> Res<Self> {
        let s = original.trim_end_matches(['+', '#', '!', '?']);
        if s.is_empty() {
            bail!("Empty SAN token");
        }
        match s {
            "O-O-O" | "0-0-0" => return Ok(SanMove::Castle(Queenside)),
            "O-O" | "0-0" => return Ok(SanMove::Castle(Kingside)),
            _ => {}
        }
        let mut chars = s.chars().peekable();
        let piece = match chars.peek().copied().and_then(ChessPieceType::from_san_char) {
            Some(piece) => {
                _ = chars.next();
                piece
            }
            None => Pawn,
        };
        let mut promotion = Empty;
        let mut body: Vec<char> = chars.collect();
        if body.len() >= 2 && body[body.len() - 2] == '=' {
            let Some(promo) = ChessPieceType::from_san_char(body[body.len() - 1]) else {
                bail!("Invalid promotion piece in SAN token '{}'", original.red())
            };
            if promo == King {
                bail!("Cannot promote to a king in '{}'", original.red());
            }
            promotion = promo;
            body.truncate(body.len() - 2);
        }
        let Some(&rank_char) = body.last() else { bail!("Missing target square in SAN token '{}'", original.red()) };
        let (Some(file_char), Some(rank)) = (body.len().checked_sub(2).map(|i| body[i]), rank_char.to_digit(10))
        else {
            bail!("Missing target square in SAN token '{}'", original.red())
        };
        let Some(file) = char_to_file(file_char) else {
            bail!("Invalid target square in SAN token '{}'", original.red())
        };
        if !(1..=8).contains(&rank) {
            bail!("Invalid target rank in SAN token '{}'", original.red());
        }
        let target = ChessSquare::from_rank_file(rank as DimT - 1, file);
        body.truncate(body.len() - 2);
        if body.last() == Some(&'x') {
            body.pop();
        }
        let mut start_file = None;
        let mut start_rank = None;
        for c in &body {
            if let Some(file) = char_to_file(*c) {
                if start_file.is_some() {
                    bail!("Duplicate disambiguation file in SAN token '{}'", original.red());
                }
                start_file = Some(file);
            } else if let Some(rank) = c.to_digit(10).filter(|r| (1..=8).contains(r)) {
                if start_rank.is_some() {
                    bail!("Duplicate disambiguation rank in SAN token '{}'", original.red());
                }
                start_rank = Some(rank as DimT - 1);
            } else {
                bail!("Unexpected character '{c}' in SAN token '{}'", original.red());
            }
        }
        Ok(SanMove::Normal { piece, start_file, start_rank, target, promotion })
    }

    fn resolve(self, board: &Chessboard) -> Res<ChessMove> {
        match self {
            SanMove::Castle(side) => {
                let mov = ChessMove::castling_move(board.active_player(), side);
                if board.make_move(mov).is_none() {
                    bail!("Castling is not legal in position '{board}'");
                }
                Ok(mov)
            }
            SanMove::Normal { piece, start_file, start_rank, target, promotion } => {
                let mut candidate = None;
                for mov in board.legal_moves() {
                    if mov.piece_type() != piece
                        || mov.dest_square() != target
                        || mov.promo_piece() != promotion
                        || start_file.is_some_and(|file| mov.src_square().file() != file)
                        || start_rank.is_some_and(|rank| mov.src_square().rank() != rank)
                    {
                        continue;
                    }
                    if candidate.is_some() {
                        bail!("Ambiguous SAN {piece} move to {target} in position '{board}'");
                    }
                    candidate = Some(mov);
                }
                match candidate {
                    Some(mov) => Ok(mov),
                    None => bail!("No legal {piece} move to {target} in position '{board}'"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::chess::START_FEN;

    fn sq(s: &str) -> ChessSquare {
        ChessSquare::from_str(s).unwrap()
    }

    #[test]
    fn move_packing_test() {
        let mov = ChessMove::new(sq("e2"), sq("e4"), NormalPawnMove);
        assert_eq!(mov.src_square(), sq("e2"));
        assert_eq!(mov.dest_square(), sq("e4"));
        assert_eq!(mov.flags(), NormalPawnMove);
        assert_eq!(mov.to_string(), "e2e4");
        let mov = ChessMove::new(sq("e7"), sq("e8"), PromoQueen);
        assert_eq!(mov.promo_piece(), Queen);
        assert_eq!(mov.to_string(), "e7e8q");
        assert_eq!(WHITE_CASTLE_KINGSIDE.to_string(), "e1h1");
        assert_eq!(BLACK_CASTLE_QUEENSIDE.to_string(), "e8a8");
        assert_eq!(WHITE_CASTLE_KINGSIDE.piece_type(), King);
    }

    #[test]
    fn san_parse_test() {
        assert_eq!(SanMove::parse("O-O").unwrap(), SanMove::Castle(Kingside));
        assert_eq!(SanMove::parse("O-O-O+").unwrap(), SanMove::Castle(Queenside));
        assert_eq!(
            SanMove::parse("e4").unwrap(),
            SanMove::Normal { piece: Pawn, start_file: None, start_rank: None, target: sq("e4"), promotion: Empty }
        );
        assert_eq!(
            SanMove::parse("Nbd2").unwrap(),
            SanMove::Normal {
                piece: Knight,
                start_file: Some(1),
                start_rank: None,
                target: sq("d2"),
                promotion: Empty
            }
        );
        assert_eq!(
            SanMove::parse("R1a3").unwrap(),
            SanMove::Normal { piece: Rook, start_file: None, start_rank: Some(0), target: sq("a3"), promotion: Empty }
        );
        assert_eq!(
            SanMove::parse("exd5").unwrap(),
            SanMove::Normal { piece: Pawn, start_file: Some(4), start_rank: None, target: sq("d5"), promotion: Empty }
        );
        assert_eq!(
            SanMove::parse("fxg8=Q#").unwrap(),
            SanMove::Normal { piece: Pawn, start_file: Some(5), start_rank: None, target: sq("g8"), promotion: Queen }
        );
        assert_eq!(
            SanMove::parse("Qh4xe1").unwrap(),
            SanMove::Normal {
                piece: Queen,
                start_file: Some(7),
                start_rank: Some(3),
                target: sq("e1"),
                promotion: Empty
            }
        );
        assert!(SanMove::parse("").is_err());
        assert!(SanMove::parse("Zf3").is_err());
        assert!(SanMove::parse("e9").is_err());
        assert!(SanMove::parse("e8=K").is_err());
        assert!(SanMove::parse("+").is_err());
    }

    #[test]
    fn san_resolve_test() {
        let board = Chessboard::startpos();
        let mov = ChessMove::from_san("e4", &board).unwrap();
        assert_eq!(mov, ChessMove::new(sq("e2"), sq("e4"), NormalPawnMove));
        let mov = ChessMove::from_san("Nf3", &board).unwrap();
        assert_eq!(mov, ChessMove::new(sq("g1"), sq("f3"), KnightMove));
        // e2 is occupied by white's own pawn
        assert!(ChessMove::from_san("Ke2", &board).is_err());
        assert!(ChessMove::from_san("O-O", &board).is_err());

        // both knights can reach d2
        let board = Chessboard::from_fen("4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1").unwrap();
        assert!(ChessMove::from_san("Nd2", &board).is_err());
        let mov = ChessMove::from_san("Nbd2", &board).unwrap();
        assert_eq!(mov.src_square(), sq("b1"));

        let board = Chessboard::from_fen("4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let mov = ChessMove::from_san("O-O", &board).unwrap();
        assert_eq!(mov, WHITE_CASTLE_KINGSIDE);
        let mov = ChessMove::from_san("O-O-O", &board).unwrap();
        assert_eq!(mov, WHITE_CASTLE_QUEENSIDE);

        // file disambiguation
        let board = Chessboard::from_fen("4k3/8/8/8/8/2R3R1/8/4K3 w - - 0 1").unwrap();
        assert!(ChessMove::from_san("Re3", &board).is_err());
        let mov = ChessMove::from_san("Rce3", &board).unwrap();
        assert_eq!(mov.src_square(), sq("c3"));

        // rank disambiguation
        let board = Chessboard::from_fen("4k3/8/8/8/R7/8/8/R3K3 w - - 0 1").unwrap();
        let mov = ChessMove::from_san("R4a3", &board).unwrap();
        assert_eq!(mov.src_square(), sq("a4"));
        let mov = ChessMove::from_san("R1a3", &board).unwrap();
        assert_eq!(mov.src_square(), sq("a1"));

        // en passant is resolved like any other pawn capture
        let board = Chessboard::from_fen("rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3").unwrap();
        let mov = ChessMove::from_san("exf6", &board).unwrap();
        assert!(mov.is_ep());
        // promotions must name the piece
        let board = Chessboard::from_fen("4k3/1P6/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(ChessMove::from_san("b8", &board).is_err());
        let mov = ChessMove::from_san("b8=N", &board).unwrap();
        assert_eq!(mov.promo_piece(), Knight);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        /// Rendering a legal move to SAN and resolving it again must be the
        /// identity, along any random playout.
        #[test]
        fn random_game_san_roundtrip(indices in proptest::collection::vec(0usize..1024, 0..60)) {
            let mut board = Chessboard::startpos();
            for idx in indices {
                let moves = board.legal_moves();
                if moves.is_empty() {
                    break;
                }
                let mov = moves[idx % moves.len()];
                let san = mov.to_san(&board);
                match ChessMove::from_san(&san, &board) {
                    Ok(resolved) => proptest::prop_assert_eq!(resolved, mov, "{} in '{}'", san, board),
                    Err(err) => proptest::prop_assert!(false, "{san} in '{board}': {err}"),
                }
                board = board.make_move(mov).unwrap();
            }
        }
    }

    #[test]
    fn san_roundtrip_test() {
        let fens = [
            START_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "4k3/8/8/8/R7/8/8/R3K2R w KQ - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 b - - 0 1",
        ];
        for fen in fens {
            let board = Chessboard::from_fen(fen).unwrap();
            for mov in board.legal_moves() {
                let san = mov.to_san(&board);
                let resolved = ChessMove::from_san(&san, &board)
                    .unwrap_or_else(|err| panic!("move {mov} ({san}) in '{fen}': {err}"));
                assert_eq!(resolved, mov, "{san} in '{fen}'");
            }
        }
    }
}
