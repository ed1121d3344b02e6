use std::fmt;
use std::fmt::{Display, Formatter};

use anyhow::bail;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::chess::ChessColor;
use crate::chess::ChessColor::*;
use crate::chess::castling::CastleRight::*;
use crate::general::common::Res;

#[derive(Debug, Copy, Clone, Eq, PartialEq, EnumIter)]
#[must_use]
pub enum CastleRight {
    Kingside,
    Queenside,
}

/// The four castling rights in a single nibble.
///
/// The bit layout matches the order in which the Polyglot hash enumerates
/// castling entries: white kingside, white queenside, black kingside, black queenside.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
#[must_use]
pub struct CastlingFlags(u8);

impl CastlingFlags {
    pub const fn for_startpos() -> Self {
        Self(0b1111)
    }

    const fn bit(color: ChessColor, side: CastleRight) -> u8 {
        1 << (2 * color as u8 + side as u8)
    }

    #[inline]
    pub fn can_castle(self, color: ChessColor, side: CastleRight) -> bool {
        self.0 & Self::bit(color, side) != 0
    }

    pub fn set_castle_right(&mut self, color: ChessColor, side: CastleRight) {
        self.0 |= Self::bit(color, side);
    }

    pub fn unset_castle_right(&mut self, color: ChessColor, side: CastleRight) {
        self.0 &= !Self::bit(color, side);
    }

    /// Rights are never re-granted, so a king move simply drops both of its side's bits.
    pub fn clear_castle_rights(&mut self, color: ChessColor) {
        self.0 &= !(0b11 << (2 * color as u8));
    }

    /// The raw nibble, bit `r` set iff the `r`-th Polyglot castling entry applies.
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    pub fn parse_castling_rights(word: &str) -> Res<Self> {
        let mut res = Self::default();
        if word == "-" {
            return Ok(res);
        }
        if word.is_empty() || word.len() > 4 {
            bail!("Invalid castling rights '{word}'");
        }
        for c in word.chars() {
            match c {
                'K' => res.set_castle_right(White, Kingside),
                'Q' => res.set_castle_right(White, Queenside),
                'k' => res.set_castle_right(Black, Kingside),
                'q' => res.set_castle_right(Black, Queenside),
                _ => bail!("Invalid castling rights character '{c}' in '{word}'"),
            }
        }
        Ok(res)
    }
}

impl Display for CastlingFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "-");
        }
        for (color, side, c) in
            [(White, Kingside, 'K'), (White, Queenside, 'Q'), (Black, Kingside, 'k'), (Black, Queenside, 'q')]
        {
            if self.can_castle(color, side) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}
