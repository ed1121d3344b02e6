use std::sync::Mutex;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::thread;

use colored::Colorize;
use crossbeam_channel::bounded;
use ranks::general::common::Res;

use crate::book::{PolyglotBook, ingest_game};
use crate::pgn::PgnRecord;
use crate::pgn::parser::PgnParser;
use crate::pgn::source::source_from_path;

/// Games in flight between the producer and the workers. The producer blocks
/// when the workers lag, which bounds memory no matter how fast the source is.
pub const PGN_CHANNEL_CAP: usize = 20;

pub struct ComposeOpts {
    pub paths: Vec<String>,
    pub out_path: String,
    pub move_limit: usize,
}

/// Builds the book from all sources and saves it. Sources that fail to open
/// are skipped; an interrupt stops the producer, lets the workers drain, and
/// still writes the partial book.
pub fn compose(opts: &ComposeOpts, cancel: &AtomicBool) -> Res<()> {
    let book = Mutex::new(PolyglotBook::new());
    let dropped = AtomicU64::new(0);
    for path in &opts.paths {
        if cancel.load(Relaxed) {
            break;
        }
        let source = match source_from_path(path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("{}: {err}", "skipping source".yellow());
                continue;
            }
        };
        let mut parser = PgnParser::new(source, true);
        run_pipeline(&mut parser, &book, opts.move_limit, cancel, &dropped);
        parser.progress(true);
    }
    let book = book.into_inner().unwrap();
    let dropped = dropped.load(Relaxed);
    if dropped > 0 {
        eprintln!("dropped {dropped} games with unreadable move text");
    }
    book.save_to_path(&opts.out_path)?;
    println!("Book saved: {0} ({1} positions)", opts.out_path.bold(), book.num_positions());
    Ok(())
}

/// One producer (this thread) feeding a bounded channel, one worker per core
/// replaying games into the shared book.
pub fn run_pipeline(
    parser: &mut PgnParser,
    book: &Mutex<PolyglotBook>,
    move_limit: usize,
    cancel: &AtomicBool,
    dropped: &AtomicU64,
) {
    let num_workers = thread::available_parallelism().map_or(1, |n| n.get());
    thread::scope(|scope| {
        let (game_tx, game_rx) = bounded::<PgnRecord>(PGN_CHANNEL_CAP);
        for _ in 0..num_workers {
            let game_rx = game_rx.clone();
            scope.spawn(move || {
                for game in game_rx.iter() {
                    if ingest_game(book, &game, move_limit).is_err() {
                        dropped.fetch_add(1, Relaxed);
                    }
                }
            });
        }
        drop(game_rx);
        while let Some(game) = parser.scan(cancel) {
            if game_tx.send(game).is_err() {
                break;
            }
        }
        drop(game_tx);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::DEFAULT_MOVE_LIMIT;
    use crate::pgn::source::StringSource;
    use ranks::polyglot::PolyMove;

    const GAMES: &str = r#"[Event "A"]
[Result "1-0"]

1. e4 e5 2. Nf3 1-0

[Event "B"]
[Result "1/2-1/2"]

1. e4 d5 1/2-1/2

[Event "C"]
[Result "0-1"]

1. e4 e5 0-1
"#;

    #[test]
    fn pipeline_test() {
        let cancel = AtomicBool::new(false);
        let dropped = AtomicU64::new(0);
        let book = Mutex::new(PolyglotBook::new());
        let mut parser = PgnParser::new(StringSource::boxed(GAMES), false);
        run_pipeline(&mut parser, &book, DEFAULT_MOVE_LIMIT, &cancel, &dropped);
        assert_eq!(parser.game_count(), 3);
        assert_eq!(dropped.load(Relaxed), 0);
        let book = book.into_inner().unwrap();
        let start = book.moves_for(0x463B_9618_1691_FC9C).unwrap();
        // game A: win as white (2), game B: draw (1, same move, +1), game C: loss as white (nothing)
        assert_eq!(start.len(), 1);
        assert_eq!(start[0].mov, PolyMove::from_uci("e2e4").unwrap());
        assert_eq!(start[0].weight, 3);
        // after 1. e4: d5 from the drawn game B (1) and e5 from black's win in C (2)
        let after_e4 = book.moves_for(0x823C_9B50_FD11_4196).unwrap();
        assert_eq!(after_e4.len(), 2);
        let weight_of = |uci: &str| {
            after_e4.iter().find(|entry| entry.mov == PolyMove::from_uci(uci).unwrap()).unwrap().weight
        };
        assert_eq!(weight_of("d7d5"), 1);
        assert_eq!(weight_of("e7e5"), 2);
    }

    #[test]
    fn compose_end_to_end_test() {
        let dir = std::env::temp_dir().join("presses_compose_test");
        _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let pgn_path = dir.join("games.pgn");
        std::fs::write(&pgn_path, GAMES).unwrap();
        let out_path = dir.join("book.bin");
        let opts = ComposeOpts {
            paths: vec![pgn_path.to_str().unwrap().to_string()],
            out_path: out_path.to_str().unwrap().to_string(),
            move_limit: DEFAULT_MOVE_LIMIT,
        };
        compose(&opts, &AtomicBool::new(false)).unwrap();
        let book = PolyglotBook::load_from_path(out_path.to_str().unwrap()).unwrap();
        let start = book.moves_for(0x463B_9618_1691_FC9C).unwrap();
        assert_eq!(start[0].mov, PolyMove::from_uci("e2e4").unwrap());
        assert_eq!(start[0].weight, 3);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn pipeline_counts_dropped_games_test() {
        let broken = "[Event \"A\"]\n[Result \"1-0\"]\n\n1. e4 e5 2. Qxe5 1-0\n";
        let cancel = AtomicBool::new(false);
        let dropped = AtomicU64::new(0);
        let book = Mutex::new(PolyglotBook::new());
        let mut parser = PgnParser::new(StringSource::boxed(broken), false);
        run_pipeline(&mut parser, &book, DEFAULT_MOVE_LIMIT, &cancel, &dropped);
        assert_eq!(dropped.load(Relaxed), 1);
        // the plies before the unresolvable token still contributed
        assert!(!book.into_inner().unwrap().is_empty());
    }
}
