//! The Polyglot on-disk primitives: the packed 16-bit move and the 16-byte
//! big-endian book record.

use std::fmt;
use std::fmt::{Display, Formatter};

use anyhow::{bail, ensure};

use crate::chess::moves::ChessMove;
use crate::chess::pieces::ChessPieceType;
use crate::chess::pieces::ChessPieceType::*;
use crate::chess::squares::{ChessSquare, file_to_char};
use crate::general::common::Res;

/// A move packed as `(promotion << 12) | (from_row << 9) | (from_file << 6) |
/// (to_row << 3) | to_file` with promotion 0 = none, 1 = knight, 2 = bishop,
/// 3 = rook, 4 = queen.
///
/// Castling is encoded with the rook's home square as the destination, so white
/// kingside castling reads `e1h1`. [`ChessMove`] uses the same convention, which
/// makes the conversion uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[must_use]
pub struct PolyMove(u16);

impl PolyMove {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    pub fn from_move(mov: ChessMove) -> Self {
        let promo = match mov.promo_piece() {
            Empty => 0,
            piece => {
                debug_assert!(matches!(piece, Knight | Bishop | Rook | Queen));
                piece as u16
            }
        };
        let from = mov.src_square();
        let to = mov.dest_square();
        Self(
            (promo << 12)
                | ((from.rank() as u16) << 9)
                | ((from.file() as u16) << 6)
                | ((to.rank() as u16) << 3)
                | to.file() as u16,
        )
    }

    pub const fn promo_piece_idx(self) -> u16 {
        self.0 >> 12 & 0x7
    }

    pub fn src_square(self) -> ChessSquare {
        ChessSquare::from_rank_file((self.0 >> 9 & 0x7) as u8, (self.0 >> 6 & 0x7) as u8)
    }

    pub fn dest_square(self) -> ChessSquare {
        ChessSquare::from_rank_file((self.0 >> 3 & 0x7) as u8, (self.0 & 0x7) as u8)
    }

    pub fn from_uci(s: &str) -> Res<Self> {
        ensure!(s.is_ascii(), "UCI move '{s}' contains a non-ASCII character");
        ensure!(s.len() == 4 || s.len() == 5, "A UCI move consists of four or five characters, but got '{s}'");
        let from: ChessSquare = s[..2].parse()?;
        let to: ChessSquare = s[2..4].parse()?;
        let promo = match s.as_bytes().get(4) {
            None => 0,
            Some(b'n') => 1,
            Some(b'b') => 2,
            Some(b'r') => 3,
            Some(b'q') => 4,
            Some(&c) => bail!("Invalid promotion piece '{}' in UCI move '{s}'", c as char),
        };
        Ok(Self(
            (promo << 12)
                | ((from.rank() as u16) << 9)
                | ((from.file() as u16) << 6)
                | ((to.rank() as u16) << 3)
                | to.file() as u16,
        ))
    }

    pub fn promo_piece(self) -> ChessPieceType {
        match self.promo_piece_idx() {
            0 => Empty,
            idx => ChessPieceType::from_repr(idx as usize).unwrap(),
        }
    }
}

impl Display for PolyMove {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let from = self.src_square();
        let to = self.dest_square();
        let promo = match self.promo_piece_idx() {
            1 => "n",
            2 => "b",
            3 => "r",
            4 => "q",
            _ => "",
        };
        write!(
            f,
            "{}{}{}{}{promo}",
            file_to_char(from.file()),
            from.rank() + 1,
            file_to_char(to.file()),
            to.rank() + 1
        )
    }
}

pub const BOOK_ENTRY_SIZE: usize = 16;

/// One book record, stored big-endian: 8 bytes key, 2 bytes move, 2 bytes
/// weight, 4 bytes learn (always zero on write).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[must_use]
pub struct BookRecord {
    pub key: u64,
    pub mov: PolyMove,
    pub weight: u16,
    pub learn: u32,
}

impl BookRecord {
    pub fn to_bytes(self) -> [u8; BOOK_ENTRY_SIZE] {
        let mut bytes = [0; BOOK_ENTRY_SIZE];
        bytes[..8].copy_from_slice(&self.key.to_be_bytes());
        bytes[8..10].copy_from_slice(&self.mov.raw().to_be_bytes());
        bytes[10..12].copy_from_slice(&self.weight.to_be_bytes());
        bytes[12..].copy_from_slice(&self.learn.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; BOOK_ENTRY_SIZE]) -> Self {
        Self {
            key: u64::from_be_bytes(bytes[..8].try_into().unwrap()),
            mov: PolyMove::new(u16::from_be_bytes(bytes[8..10].try_into().unwrap())),
            weight: u16::from_be_bytes(bytes[10..12].try_into().unwrap()),
            learn: u32::from_be_bytes(bytes[12..].try_into().unwrap()),
        }
    }
}
