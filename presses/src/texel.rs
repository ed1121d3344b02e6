use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{LazyLock, Mutex};
use std::thread;

use anyhow::anyhow;
use colored::Colorize;
use crossbeam_channel::bounded;
use ranks::GameResult;
use ranks::chess::Chessboard;
use ranks::chess::moves::ChessMove;
use ranks::general::common::Res;
use regex::Regex;

use crate::compose::PGN_CHANNEL_CAP;
use crate::pgn::PgnRecord;
use crate::pgn::parser::PgnParser;
use crate::pgn::source::source_from_path;

// The shape cutechess gives engine evaluation comments, e.g. `{+0.33/12 1.1s}`.
// Book moves (`{book}`) and mate scores (`{+M5}`) don't match and are skipped.
static EVAL_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[+-]\d+\.\d+.*?\}").unwrap());

pub struct TexelOpts {
    pub paths: Vec<String>,
    pub out_path: String,
}

/// For every ply of a game whose comment carries a valid engine evaluation,
/// emits `<result> <FEN>` for the position the move was played in, where the
/// result is `1`, `0` or `0.5` from white's point of view.
pub fn annotated_fens(pgn: &PgnRecord) -> Vec<String> {
    let result = match pgn.result {
        Some(GameResult::WhiteWin) => "1",
        Some(GameResult::BlackWin) => "0",
        _ => "0.5",
    };
    let comments = per_ply_comments(&pgn.moves);
    let mut fens = Vec::new();
    let mut board = Chessboard::startpos();
    for (ply, san) in pgn.san_moves().iter().enumerate() {
        let Ok(mov) = ChessMove::from_san(san, &board) else { break };
        let annotated =
            comments.get(ply).and_then(Option::as_ref).is_some_and(|comment| EVAL_ANNOTATION.is_match(comment));
        if annotated {
            fens.push(format!("{result} {board}\n"));
        }
        let Some(next) = board.make_move(mov) else { break };
        board = next;
    }
    fens
}

/// Walks the raw move text and attaches each top-level brace comment to the
/// move it follows. Moves inside parenthesised variations don't count.
fn per_ply_comments(moves: &str) -> Vec<Option<String>> {
    let mut comments: Vec<Option<String>> = Vec::new();
    let mut depth = 0_usize;
    let mut chars = moves.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '{' => {
                let mut comment = String::from('{');
                for c in chars.by_ref() {
                    comment.push(c);
                    if c == '}' {
                        break;
                    }
                }
                if depth == 0 {
                    if let Some(slot) = comments.last_mut() {
                        if slot.is_none() {
                            *slot = Some(comment);
                        }
                    }
                }
            }
            c if c.is_whitespace() => {}
            _ => {
                let mut token = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '{' | '(' | ')') {
                        break;
                    }
                    token.push(next);
                    _ = chars.next();
                }
                if depth == 0 && is_san_token(&token) {
                    comments.push(None);
                }
            }
        }
    }
    comments
}

/// Anything that is not a move number indicator, a NAG or a result marker.
fn is_san_token(token: &str) -> bool {
    !matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
        && !token.starts_with('$')
        && !token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Streams all sources through the same producer/worker topology as the book
/// builder, but fans annotated FEN lines into a shared buffered writer.
pub fn emit_texel_data(opts: &TexelOpts, cancel: &AtomicBool) -> Res<()> {
    let file = File::create(&opts.out_path)
        .map_err(|err| anyhow!("failed opening '{0}' for writing: {err}", opts.out_path))?;
    let writer = Mutex::new(BufWriter::new(file));
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
        let num_workers = thread::available_parallelism().map_or(1, |n| n.get());
        thread::scope(|scope| {
            let (game_tx, game_rx) = bounded::<PgnRecord>(PGN_CHANNEL_CAP);
            for _ in 0..num_workers {
                let game_rx = game_rx.clone();
                let writer = &writer;
                scope.spawn(move || {
                    for game in game_rx.iter() {
                        for fen in annotated_fens(&game) {
                            let mut writer = writer.lock().unwrap();
                            if let Err(err) = writer.write_all(fen.as_bytes()) {
                                eprintln!("{}: {err}", "write error".red());
                            }
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
        parser.progress(true);
    }
    writer.into_inner().unwrap().flush()?;
    println!("Texel data saved: {}", opts.out_path.bold());
    Ok(())
}
