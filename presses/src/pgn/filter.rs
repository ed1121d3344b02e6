use crate::pgn::tags::PgnTag;

pub const TERM_NORMAL: &str = "Normal";

// Upper bounds for adjusted seconds per game. Bullet assumes a 40 move game,
// so each increment second counts as roughly a minute of total time.
pub const TC_BULLET: u32 = 0;
pub const TC_BLITZ: u32 = 3 * 60;
pub const TC_RAPID: u32 = 10 * 60;
pub const TC_CLASSICAL: u32 = 60 * 60;

pub const MIN_ELO: u32 = 2500;

/// Filter conditions that can be decided on a single tag. A failing tag marks
/// the whole record for skipping; unknown tags always pass.
pub fn pre_filter(tag: PgnTag, value: &str) -> bool {
    match tag {
        PgnTag::Result => matches!(value, "1-0" | "0-1" | "1/2-1/2"),
        PgnTag::Termination => value == TERM_NORMAL,
        PgnTag::TimeControl => adjusted_time(value) >= TC_BLITZ,
        PgnTag::WhiteElo | PgnTag::BlackElo => value.parse::<u32>().is_ok_and(|elo| elo > MIN_ELO),
        _ => true,
    }
}

/// `"base+inc"` as total seconds per game. Unparseable values (`"-"`, `"?"`)
/// count as zero and fail the time control filter.
fn adjusted_time(value: &str) -> u32 {
    let mut parts = value.split('+').map(str::parse::<u32>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(base)), None, _) => base,
        (Some(Ok(base)), Some(Ok(inc)), None) => base + 60 * inc,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjusted_time_test() {
        assert_eq!(adjusted_time("300"), 300);
        assert_eq!(adjusted_time("180+2"), 300);
        assert_eq!(adjusted_time("60+1"), 120);
        assert_eq!(adjusted_time("-"), 0);
        assert_eq!(adjusted_time("?"), 0);
        assert_eq!(adjusted_time("300+3+1"), 0);
        assert_eq!(adjusted_time(""), 0);
    }

    #[test]
    fn pre_filter_test() {
        assert!(pre_filter(PgnTag::Result, "1-0"));
        assert!(pre_filter(PgnTag::Result, "0-1"));
        assert!(pre_filter(PgnTag::Result, "1/2-1/2"));
        assert!(!pre_filter(PgnTag::Result, "*"));
        assert!(pre_filter(PgnTag::Termination, "Normal"));
        assert!(!pre_filter(PgnTag::Termination, "Time forfeit"));
        assert!(!pre_filter(PgnTag::Termination, "Abandoned"));
        // blitz and above passes, bullet does not
        assert!(pre_filter(PgnTag::TimeControl, "180+0"));
        assert!(pre_filter(PgnTag::TimeControl, "120+1"));
        assert!(!pre_filter(PgnTag::TimeControl, "60+0"));
        assert!(!pre_filter(PgnTag::TimeControl, "-"));
        assert!(pre_filter(PgnTag::WhiteElo, "2501"));
        assert!(!pre_filter(PgnTag::WhiteElo, "2500"));
        assert!(!pre_filter(PgnTag::BlackElo, "1830"));
        assert!(!pre_filter(PgnTag::BlackElo, "?"));
        // tags outside the filter always pass
        assert!(pre_filter(PgnTag::Eco, "C57"));
        assert!(pre_filter(PgnTag::Round, "-"));
    }
}
