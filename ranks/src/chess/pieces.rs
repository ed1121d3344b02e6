use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut};

use itertools::Itertools;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, FromRepr};

use crate::chess::ChessColor;
use crate::chess::ChessColor::*;
use crate::chess::pieces::ChessPieceType::*;

pub const NUM_CHESS_PIECES: usize = 6;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, EnumIter, FromRepr)]
#[must_use]
pub enum ChessPieceType {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
    #[default]
    Empty,
}

impl ChessPieceType {
    pub fn pieces() -> impl Iterator<Item = ChessPieceType> {
        Self::iter().dropping_back(1)
    }

    pub fn non_king_pieces() -> impl Iterator<Item = ChessPieceType> {
        Self::iter().dropping_back(2)
    }

    pub fn promo_pieces() -> impl Iterator<Item = ChessPieceType> {
        Self::non_king_pieces().dropping(1)
    }

    pub fn to_name(self) -> &'static str {
        match self {
            Pawn => "pawn",
            Knight => "knight",
            Bishop => "bishop",
            Rook => "rook",
            Queen => "queen",
            King => "king",
            Empty => "empty",
        }
    }

    pub fn to_ascii_char(self) -> char {
        match self {
            Pawn => 'P',
            Knight => 'N',
            Bishop => 'B',
            Rook => 'R',
            Queen => 'Q',
            King => 'K',
            Empty => '.',
        }
    }

    /// The uppercase letter used for this piece in SAN move text. Pawn moves carry no letter.
    pub fn from_san_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Knight),
            'B' => Some(Bishop),
            'R' => Some(Rook),
            'Q' => Some(Queen),
            'K' => Some(King),
            _ => None,
        }
    }

    pub fn parse_from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'p' => Some(Pawn),
            'n' => Some(Knight),
            'b' => Some(Bishop),
            'r' => Some(Rook),
            'q' => Some(Queen),
            'k' => Some(King),
            _ => None,
        }
    }
}

impl Display for ChessPieceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_name())
    }
}

impl<T> Index<ChessPieceType> for [T; NUM_CHESS_PIECES] {
    type Output = T;

    fn index(&self, index: ChessPieceType) -> &Self::Output {
        &self[index as usize]
    }
}

impl<T> IndexMut<ChessPieceType> for [T; NUM_CHESS_PIECES] {
    fn index_mut(&mut self, index: ChessPieceType) -> &mut Self::Output {
        &mut self[index as usize]
    }
}

/// A piece together with its color, as it appears in FEN piece placement:
/// uppercase letters are white, lowercase letters are black.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[must_use]
pub struct ColoredChessPieceType {
    pub color: ChessColor,
    pub piece: ChessPieceType,
}

impl ColoredChessPieceType {
    pub fn new(color: ChessColor, piece: ChessPieceType) -> Self {
        Self { color, piece }
    }

    pub fn from_char(c: char) -> Option<Self> {
        let piece = ChessPieceType::parse_from_char(c)?;
        let color = if c.is_ascii_uppercase() { White } else { Black };
        Some(Self { color, piece })
    }

    pub fn to_char(self) -> char {
        let c = self.piece.to_ascii_char();
        match self.color {
            White => c,
            Black => c.to_ascii_lowercase(),
        }
    }
}
