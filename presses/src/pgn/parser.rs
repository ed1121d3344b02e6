use std::io::Write;
use std::mem::take;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::ComposeError;
use crate::pgn::PgnRecord;
use crate::pgn::filter::pre_filter;
use crate::pgn::source::PgnSource;
use crate::pgn::tags::{PgnTag, parse_tag_line};

// Removes variation continuations (`3...`), single-level parenthesised
// variations, brace comments, NAGs, and annotation glyphs. Nested variations do
// not occur in well-formed exports and are left alone.
static ANNOTATIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\.\.|\([^()]*\)|\{[^{}]*\}|\$\d+|[!?+#*]").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Move number indicators and the game result at the end of the move text.
static MOVE_NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\s|\s*1-0|\s*0-1|\s*1/2-1/2").unwrap());

impl PgnRecord {
    /// The move text with comments, variations, NAGs and glyphs removed and
    /// whitespace collapsed.
    pub fn remove_annotations(&self) -> String {
        let text = ANNOTATIONS.replace_all(&self.moves, "");
        WHITESPACE.replace_all(&text, " ").trim().to_string()
    }

    /// The bare SAN tokens of the game, in order.
    pub fn san_moves(&self) -> Vec<String> {
        let stripped = self.remove_annotations();
        let cleaned = MOVE_NUMBERS.replace_all(&stripped, "");
        cleaned.split_whitespace().map(str::to_string).collect()
    }
}

/// Segments a line source into filtered games.
///
/// Tag lines update the record in flight; a failing filter tag marks it for
/// skipping, which still consumes lines up to the next game so the stream stays
/// in sync. A new game starts when an `[Event ...]` line arrives after the
/// current record has a non-empty event; that line is held back as a one-line
/// look-ahead so it seeds the next record.
pub struct PgnParser {
    source: Box<dyn PgnSource>,
    record: PgnRecord,
    carry_over: Option<String>,
    game_count: u64,
    skipping: bool,
    done: bool,
    show_progress: bool,
    clock: Instant,
}

impl PgnParser {
    pub fn new(source: Box<dyn PgnSource>, show_progress: bool) -> Self {
        Self {
            source,
            record: PgnRecord::default(),
            carry_over: None,
            game_count: 0,
            skipping: false,
            done: false,
            show_progress,
            clock: Instant::now(),
        }
    }

    pub fn game_count(&self) -> u64 {
        self.game_count
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// The next game that passes the pre-filter, or `None` once the source is
    /// exhausted or cancellation was requested.
    pub fn scan(&mut self, cancel: &AtomicBool) -> Option<PgnRecord> {
        if self.done {
            return None;
        }
        if let Some(line) = self.carry_over.take() {
            self.handle_tag_line(&line);
        }
        loop {
            if cancel.load(Relaxed) {
                self.done = true;
                return None;
            }
            if self.show_progress && self.clock.elapsed() >= Duration::from_secs(1) {
                self.progress(false);
                self.clock = Instant::now();
            }
            let Some(line) = self.source.next_line() else {
                self.done = true;
                if !self.skipping && !self.record.event.is_empty() {
                    self.game_count += 1;
                    return Some(take(&mut self.record));
                }
                return None;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') {
                if self.start_of_next_game(&line) {
                    self.carry_over = Some(line);
                    self.game_count += 1;
                    return Some(take(&mut self.record));
                }
            } else {
                self.record.moves.push_str(trimmed);
                self.record.moves.push(' ');
            }
        }
    }

    /// Returns true when this line begins the next game and the current record
    /// should be emitted.
    fn start_of_next_game(&mut self, line: &str) -> bool {
        let Some((tag_name, value)) = parse_tag_line(line) else {
            // a malformed tag abandons the game it belongs to
            let err = ComposeError::MalformedTag { line: line.trim().to_string() };
            eprintln!("{err}");
            self.skipping = true;
            return false;
        };
        let tag = PgnTag::from_str(tag_name).ok();
        if !self.skipping {
            if let Some(tag) = tag {
                self.skipping = !pre_filter(tag, value);
            }
        }
        if tag == Some(PgnTag::Event) && (!self.record.event.is_empty() || self.skipping) {
            if self.skipping {
                // drop the rejected record and start over at this event
                self.record = PgnRecord { event: value.to_string(), ..PgnRecord::default() };
                self.skipping = false;
                return false;
            }
            return true;
        }
        self.record.add_tag(tag, value.to_string());
        false
    }

    fn handle_tag_line(&mut self, line: &str) {
        if let Some((tag_name, value)) = parse_tag_line(line) {
            self.record.add_tag(PgnTag::from_str(tag_name).ok(), value.to_string());
        }
    }

    /// Redraws the single progress line. The size estimate of compressed
    /// sources drifts, so the fraction is clamped.
    pub fn progress(&self, done: bool) {
        let size = self.source.size();
        let fraction = if done || size == 0 {
            1.0
        } else {
            (self.source.bytes_read() as f64 / size as f64).min(1.0)
        };
        print!("games: {} size: {} done: {:.2}%\r", self.game_count, format_bytes(size), 100.0 * fraction);
        _ = std::io::stdout().flush();
        if done {
            println!();
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes}{}", UNITS[0]) } else { format!("{value:.2}{}", UNITS[unit]) }
}
