use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::bail;

use crate::general::common::Res;

pub mod chess;
pub mod general;
pub mod polyglot;

pub const WHITE_VICTORY: &str = "1-0";
pub const BLACK_VICTORY: &str = "0-1";
pub const DRAW: &str = "1/2-1/2";

/// The result of a finished game, from white's perspective.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[must_use]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
}

impl Display for GameResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::WhiteWin => write!(f, "{WHITE_VICTORY}"),
            GameResult::BlackWin => write!(f, "{BLACK_VICTORY}"),
            GameResult::Draw => write!(f, "{DRAW}"),
        }
    }
}

impl FromStr for GameResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Res<Self> {
        match s {
            WHITE_VICTORY => Ok(GameResult::WhiteWin),
            BLACK_VICTORY => Ok(GameResult::BlackWin),
            DRAW => Ok(GameResult::Draw),
            _ => bail!("'{s}' is not a valid game result"),
        }
    }
}

impl From<GameResult> for f64 {
    fn from(value: GameResult) -> Self {
        match value {
            GameResult::WhiteWin => 1.0,
            GameResult::BlackWin => 0.0,
            GameResult::Draw => 0.5,
        }
    }
}

impl GameResult {
    pub fn is_decisive(self) -> bool {
        self != GameResult::Draw
    }
}
