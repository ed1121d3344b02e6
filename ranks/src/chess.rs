use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut, Not};
use std::str::FromStr;

use anyhow::{bail, ensure};
use strum::IntoEnumIterator;

use crate::chess::ChessColor::*;
use crate::chess::castling::CastleRight::*;
use crate::chess::castling::{CastleRight, CastlingFlags};
use crate::chess::moves::ChessMove;
use crate::chess::pieces::ChessPieceType::*;
use crate::chess::pieces::{ChessPieceType, ColoredChessPieceType, NUM_CHESS_PIECES};
use crate::chess::squares::{C_FILE_NUM, ChessSquare, D_FILE_NUM, DimT, F_FILE_NUM, G_FILE_NUM};
use crate::general::bitboards::ChessBitboard;
use crate::general::common::{Res, Tokens, parse_int_from_str, tokens};

pub mod castling;
pub mod movegen;
pub mod moves;
pub mod pieces;
pub mod squares;
pub mod zobrist;

pub const NUM_COLORS: usize = 2;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// White is always the first player, Black is always the second
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
#[must_use]
pub enum ChessColor {
    #[default]
    White = 0,
    Black = 1,
}

impl ChessColor {
    #[inline]
    pub const fn other(self) -> Self {
        match self {
            White => Black,
            Black => White,
        }
    }

    pub const fn to_char(self) -> char {
        match self {
            White => 'w',
            Black => 'b',
        }
    }
}

impl Not for ChessColor {
    type Output = Self;

    fn not(self) -> Self::Output {
        self.other()
    }
}

impl Display for ChessColor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let str = match self {
            White => "white",
            Black => "black",
        };
        write!(f, "{str}")
    }
}

impl<T> Index<ChessColor> for [T; NUM_COLORS] {
    type Output = T;
    fn index(&self, index: ChessColor) -> &Self::Output {
        &self[index as usize]
    }
}

impl<T> IndexMut<ChessColor> for [T; NUM_COLORS] {
    fn index_mut(&mut self, index: ChessColor) -> &mut Self::Output {
        &mut self[index as usize]
    }
}

impl ChessBitboard {
    #[inline]
    pub const fn pawn_advance(self, color: ChessColor) -> Self {
        match color {
            White => self.north(),
            Black => self.south(),
        }
    }

    // For attacks of a single pawn, there's a precomputed table
    #[inline]
    pub const fn pawn_attacks(self, color: ChessColor) -> Self {
        let advanced = self.pawn_advance(color);
        Self(advanced.east().0 | advanced.west().0)
    }
}

#[must_use]
const fn precompute_single_pawn_capture(color: ChessColor, square_idx: usize) -> u64 {
    let pawn: u64 = 1 << square_idx;
    let not_a_file = pawn & !ChessBitboard::A_FILE.0;
    let not_h_file = pawn & !ChessBitboard::H_FILE.0;
    match color {
        White => (not_a_file << 7) | (not_h_file << 9),
        Black => (not_a_file >> 9) | (not_h_file >> 7),
    }
}

pub const PAWN_CAPTURES: [[ChessBitboard; 64]; 2] = {
    let mut res = [[ChessBitboard::new(0); 64]; 2];
    let mut i = 0;
    while i < 64 {
        res[White as usize][i] = ChessBitboard::new(precompute_single_pawn_capture(White, i));
        res[Black as usize][i] = ChessBitboard::new(precompute_single_pawn_capture(Black, i));
        i += 1;
    }
    res
};

static STARTPOS: Chessboard = Chessboard {
    piece_bbs: [
        ChessBitboard::new(0x00ff_0000_0000_ff00),
        ChessBitboard::new(0x4200_0000_0000_0042),
        ChessBitboard::new(0x2400_0000_0000_0024),
        ChessBitboard::new(0x8100_0000_0000_0081),
        ChessBitboard::new(0x0800_0000_0000_0008),
        ChessBitboard::new(0x1000_0000_0000_0010),
    ],
    color_bbs: [ChessBitboard::new(0xffff), ChessBitboard::new(0xffff << (8 * 6))],
    active: White,
    castling: CastlingFlags::for_startpos(),
    ep_square: None,
    ply_100_ctr: 0,
    fullmove_ctr: 1,
};

/// A chess position: six piece bitboards, two occupancy bitboards per color, and the
/// supplementary state needed to replay a game forward. There is no unmake and no history;
/// `make_move` consumes the board by value and returns the successor.
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
#[must_use]
pub struct Chessboard {
    piece_bbs: [ChessBitboard; NUM_CHESS_PIECES],
    color_bbs: [ChessBitboard; NUM_COLORS],
    active: ChessColor,
    castling: CastlingFlags,
    ep_square: Option<ChessSquare>,
    ply_100_ctr: u8,
    fullmove_ctr: u32,
}

impl Default for Chessboard {
    fn default() -> Self {
        Self::startpos()
    }
}

impl Chessboard {
    pub fn startpos() -> Self {
        STARTPOS
    }

    #[inline]
    pub fn piece_bb(&self, piece: ChessPieceType) -> ChessBitboard {
        debug_assert_ne!(piece, Empty);
        self.piece_bbs[piece as usize]
    }

    #[inline]
    pub fn player_bb(&self, color: ChessColor) -> ChessBitboard {
        self.color_bbs[color as usize]
    }

    #[inline]
    pub fn col_piece_bb(&self, color: ChessColor, piece: ChessPieceType) -> ChessBitboard {
        self.piece_bb(piece) & self.player_bb(color)
    }

    #[inline]
    pub fn occupied_bb(&self) -> ChessBitboard {
        self.player_bb(White) | self.player_bb(Black)
    }

    #[inline]
    pub fn empty_bb(&self) -> ChessBitboard {
        !self.occupied_bb()
    }

    #[inline]
    pub fn is_empty(&self, sq: ChessSquare) -> bool {
        !self.occupied_bb().is_bit_set(sq)
    }

    #[inline]
    pub fn active_player(&self) -> ChessColor {
        self.active
    }

    #[inline]
    pub fn ep_square(&self) -> Option<ChessSquare> {
        self.ep_square
    }

    #[inline]
    pub fn castling_rights(&self) -> CastlingFlags {
        self.castling
    }

    pub fn halfmove_clock(&self) -> usize {
        self.ply_100_ctr as usize
    }

    pub fn fullmove_ctr(&self) -> u32 {
        self.fullmove_ctr
    }

    pub fn piece_type_on(&self, square: ChessSquare) -> ChessPieceType {
        let idx = square.bb_idx();
        ChessPieceType::from_repr(
            self.piece_bbs.iter().position(|bb| bb.is_bit_set_at(idx)).unwrap_or(NUM_CHESS_PIECES),
        )
        .unwrap()
    }

    pub fn colored_piece_on(&self, square: ChessSquare) -> Option<ColoredChessPieceType> {
        let piece = self.piece_type_on(square);
        if piece == Empty {
            return None;
        }
        let color = if self.player_bb(Black).is_bit_set(square) { Black } else { White };
        Some(ColoredChessPieceType::new(color, piece))
    }

    pub fn king_square(&self, color: ChessColor) -> ChessSquare {
        ChessSquare::from_bb_idx(self.col_piece_bb(color, King).num_trailing_zeros())
    }

    pub fn is_in_check(&self) -> bool {
        self.is_square_attacked(self.king_square(self.active), self.active.other())
    }

    fn remove_piece(&mut self, square: ChessSquare, piece: ChessPieceType, color: ChessColor) {
        debug_assert_eq!(self.colored_piece_on(square), Some(ColoredChessPieceType::new(color, piece)));
        let bb = square.bb();
        self.piece_bbs[piece] ^= bb;
        self.color_bbs[color] ^= bb;
    }

    fn move_piece(&mut self, from: ChessSquare, to: ChessSquare, piece: ChessPieceType) {
        debug_assert_ne!(piece, Empty);
        debug_assert_eq!(self.piece_type_on(from), piece);
        debug_assert!(self.is_empty(to));
        let bb = from.bb() ^ to.bb();
        self.piece_bbs[piece] ^= bb;
        self.color_bbs[self.active] ^= bb;
    }

    pub fn rook_start_square(color: ChessColor, side: CastleRight) -> ChessSquare {
        let file = match side {
            Kingside => 7,
            Queenside => 0,
        };
        ChessSquare::from_rank_file(Self::backrank(color), file)
    }

    pub fn backrank(color: ChessColor) -> DimT {
        7 * color as DimT
    }

    /// Apply a move, updating bitboards, castling rights, the en passant target,
    /// the move counters and the side to move. Returns `None` when the move would
    /// leave the mover's own king attacked (or a castling path is obstructed or
    /// passes through check), which is what filters pseudo-legal moves to legal ones.
    pub fn make_move(mut self, mov: ChessMove) -> Option<Self> {
        let color = self.active;
        let other = color.other();
        let piece = mov.piece_type();
        let from = mov.src_square();
        let to = mov.dest_square();
        let ep_square = self.ep_square.take();
        self.ply_100_ctr = self.ply_100_ctr.saturating_add(1);
        if mov.is_castle() {
            if !self.make_castle_move(mov, color) {
                return None;
            }
        } else {
            if mov.is_ep() {
                if ep_square != Some(to) {
                    return None;
                }
                let taken = to.pawn_advance_unchecked(other);
                self.remove_piece(taken, Pawn, other);
                self.ply_100_ctr = 0;
            } else if self.player_bb(other).is_bit_set(to) {
                let captured = self.piece_type_on(to);
                debug_assert_ne!(captured, King);
                self.remove_piece(to, captured, other);
                self.ply_100_ctr = 0;
            } else if piece == Pawn {
                self.ply_100_ctr = 0;
                if from.rank().abs_diff(to.rank()) == 2 {
                    self.ep_square = Some(ChessSquare::from_rank_file((to.rank() + from.rank()) / 2, to.file()));
                }
            }
            if piece == King {
                self.castling.clear_castle_rights(color);
            } else if from == Self::rook_start_square(color, Queenside) {
                self.castling.unset_castle_right(color, Queenside);
            } else if from == Self::rook_start_square(color, Kingside) {
                self.castling.unset_castle_right(color, Kingside);
            }
            if to == Self::rook_start_square(other, Queenside) {
                self.castling.unset_castle_right(other, Queenside);
            } else if to == Self::rook_start_square(other, Kingside) {
                self.castling.unset_castle_right(other, Kingside);
            }
            self.move_piece(from, to, piece);
            if mov.is_promotion() {
                let bb = to.bb();
                self.piece_bbs[Pawn] ^= bb;
                self.piece_bbs[mov.promo_piece()] ^= bb;
            }
        }
        if color == Black {
            self.fullmove_ctr += 1;
        }
        self.active = other;
        if self.is_square_attacked(self.king_square(color), other) { None } else { Some(self) }
    }

    /// A castling move is encoded with the rook's home square as destination.
    /// Returns false when the rights are gone, a square between king and rook is
    /// occupied, or the king starts in or passes through check.
    fn make_castle_move(&mut self, mov: ChessMove, color: ChessColor) -> bool {
        let side = mov.castle_side();
        let from = mov.src_square();
        let rook_from = mov.dest_square();
        if !self.castling.can_castle(color, side)
            || from != self.king_square(color)
            || rook_from != Self::rook_start_square(color, side)
        {
            return false;
        }
        let rank = from.rank();
        let (king_to_file, rook_to_file) = match side {
            Kingside => (G_FILE_NUM, F_FILE_NUM),
            Queenside => (C_FILE_NUM, D_FILE_NUM),
        };
        let low = from.file().min(rook_from.file());
        let high = from.file().max(rook_from.file());
        for file in low + 1..high {
            if !self.is_empty(ChessSquare::from_rank_file(rank, file)) {
                return false;
            }
        }
        // the destination square is verified by the final king-safety check in make_move
        let other = color.other();
        let step: i8 = if side == Kingside { 1 } else { -1 };
        let mut file = from.file() as i8;
        while file != king_to_file as i8 {
            if self.is_square_attacked(ChessSquare::from_rank_file(rank, file as DimT), other) {
                return false;
            }
            file += step;
        }
        self.move_piece(rook_from, ChessSquare::from_rank_file(rank, rook_to_file), Rook);
        self.move_piece(from, ChessSquare::from_rank_file(rank, king_to_file), King);
        self.castling.clear_castle_rights(color);
        true
    }

    pub fn from_fen(fen: &str) -> Res<Self> {
        let mut words = tokens(fen);
        let res = Self::read_fen_and_advance_input(&mut words)?;
        ensure!(words.next().is_none(), "Additional input after the FEN '{fen}'");
        Ok(res)
    }

    pub fn read_fen_and_advance_input(words: &mut Tokens) -> Res<Self> {
        let Some(position) = words.next() else { bail!("Empty FEN") };
        let mut board = Self {
            piece_bbs: Default::default(),
            color_bbs: Default::default(),
            active: White,
            castling: CastlingFlags::default(),
            ep_square: None,
            ply_100_ctr: 0,
            fullmove_ctr: 1,
        };
        board.read_position_fen_part(position)?;
        let Some(color) = words.next() else { bail!("FEN ends after piece placement, missing side to move") };
        board.active = match color {
            "w" => White,
            "b" => Black,
            _ => bail!("Invalid side to move '{color}' in FEN"),
        };
        let Some(castling_word) = words.next() else { bail!("FEN ends after side to move, missing castling rights") };
        board.castling = CastlingFlags::parse_castling_rights(castling_word)?;
        board.sanitize_castling_rights();
        let Some(ep) = words.next() else { bail!("FEN ends after castling rights, missing en passant square") };
        if ep != "-" {
            // kept even when no pawn can recapture; the Polyglot hash tests reachability itself
            board.ep_square = Some(ChessSquare::from_str(ep)?);
        }
        let Some(halfmove) = words.next() else { bail!("FEN ends after en passant square, missing halfmove clock") };
        board.ply_100_ctr = parse_int_from_str(halfmove, "halfmove clock")?;
        let Some(fullmove) = words.next() else { bail!("FEN ends after halfmove clock, missing fullmove counter") };
        board.fullmove_ctr = parse_int_from_str(fullmove, "fullmove counter")?;
        ensure!(board.fullmove_ctr > 0, "The fullmove counter must be at least 1");
        for color in [White, Black] {
            ensure!(
                board.col_piece_bb(color, King).is_single_piece(),
                "The {color} player must have exactly one king"
            );
        }
        Ok(board)
    }

    fn read_position_fen_part(&mut self, position: &str) -> Res<()> {
        let ranks: Vec<&str> = position.split('/').collect();
        ensure!(ranks.len() == 8, "FEN piece placement must contain eight ranks, got {}", ranks.len());
        for (i, rank_data) in ranks.iter().enumerate() {
            let rank = 7 - i as DimT;
            let mut file = 0;
            for c in rank_data.chars() {
                if let Some(digit) = c.to_digit(10) {
                    ensure!((1..=8).contains(&digit), "Invalid empty square count '{c}'");
                    file += digit as DimT;
                } else {
                    let Some(piece) = ColoredChessPieceType::from_char(c) else {
                        bail!("Invalid piece character '{c}' in FEN rank '{rank_data}'")
                    };
                    ensure!(file < 8, "Rank '{rank_data}' in FEN describes more than eight squares");
                    let bb = ChessSquare::from_rank_file(rank, file).bb();
                    self.piece_bbs[piece.piece] |= bb;
                    self.color_bbs[piece.color] |= bb;
                    file += 1;
                }
            }
            ensure!(file == 8, "Rank '{rank_data}' in FEN describes {file} squares instead of eight");
        }
        Ok(())
    }

    /// A castling right whose king or rook is not on its home square can never be
    /// exercised; drop it so replay and hashing agree on the position.
    fn sanitize_castling_rights(&mut self) {
        for color in [White, Black] {
            let king_home = ChessSquare::from_rank_file(Self::backrank(color), squares::E_FILE_NUM);
            for side in CastleRight::iter() {
                if !self.castling.can_castle(color, side) {
                    continue;
                }
                let rook_home = Self::rook_start_square(color, side);
                if self.col_piece_bb(color, King) != king_home.bb()
                    || !self.col_piece_bb(color, Rook).is_bit_set(rook_home)
                {
                    self.castling.unset_castle_right(color, side);
                }
            }
        }
    }

    fn write_position_fen_part(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let square = ChessSquare::from_rank_file(rank, file);
                match self.colored_piece_on(square) {
                    Some(piece) => {
                        if empty > 0 {
                            write!(f, "{empty}")?;
                            empty = 0;
                        }
                        write!(f, "{}", piece.to_char())?;
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
        Ok(())
    }

    pub fn as_fen(&self) -> String {
        self.to_string()
    }
}

/// Renders the position as its canonical six-field FEN.
impl Display for Chessboard {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.write_position_fen_part(f)?;
        write!(f, " {} {} ", self.active.to_char(), self.castling)?;
        match self.ep_square {
            Some(square) => write!(f, "{square} ")?,
            None => write!(f, "- ")?,
        }
        write!(f, "{0} {1}", self.ply_100_ctr, self.fullmove_ctr)
    }
}
