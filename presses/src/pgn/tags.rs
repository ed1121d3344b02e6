use std::sync::LazyLock;

use regex::Regex;
use strum_macros::{Display, EnumString};

/// The recognized PGN tags. Unknown tags parse to `None`, always pass the
/// pre-filter and are never committed to a record.
#[derive(Debug, Copy, Clone, Eq, PartialEq, EnumString, Display)]
pub enum PgnTag {
    Event,
    Site,
    Date,
    Round,
    White,
    Black,
    Result,
    Termination,
    TimeControl,
    #[strum(serialize = "ECO")]
    Eco,
    WhiteElo,
    BlackElo,
}

static TAG_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^\[(\w+)\s+"(.*)"\]\s*$"#).unwrap());

/// Splits a `[Tag "value"]` line into its parts. The trailing `"]` is treated
/// as a single closing token, so quotes may appear inside the value.
pub fn parse_tag_line(line: &str) -> Option<(&str, &str)> {
    let caps = TAG_LINE.captures(line.trim())?;
    Some((caps.get(1).unwrap().as_str(), caps.get(2).unwrap().as_str()))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn tag_line_test() {
        assert_eq!(parse_tag_line(r#"[Event "Rated Blitz game"]"#), Some(("Event", "Rated Blitz game")));
        assert_eq!(parse_tag_line(r#"[WhiteElo "2713"]"#), Some(("WhiteElo", "2713")));
        assert_eq!(parse_tag_line(r#"[Opening "King's Gambit"]"#), Some(("Opening", "King's Gambit")));
        assert_eq!(parse_tag_line(r#"  [Result "1-0"]  "#), Some(("Result", "1-0")));
        assert_eq!(parse_tag_line("1. e4 e5 2. Nf3"), None);
        assert_eq!(parse_tag_line("[Event \"missing bracket\""), None);
        assert_eq!(parse_tag_line("[]"), None);
    }

    #[test]
    fn tag_parse_test() {
        assert_eq!(PgnTag::from_str("Event").unwrap(), PgnTag::Event);
        assert_eq!(PgnTag::from_str("ECO").unwrap(), PgnTag::Eco);
        assert_eq!(PgnTag::Eco.to_string(), "ECO");
        assert!(PgnTag::from_str("UTCDate").is_err());
    }
}
