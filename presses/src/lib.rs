use std::env;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;

use ranks::general::common::Res;
use thiserror::Error;

pub mod book;
pub mod cli;
pub mod compose;
pub mod pgn;
pub mod texel;

/// The failure kinds of the pipeline. None of them aborts the whole run: bad
/// sources are skipped, bad games abandoned, bad records reported. Only failing
/// to create the output file at save time propagates out of `run_program`.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("could not open source '{path}': {reason}")]
    SourceOpen { path: String, reason: String },
    #[error("decoder rejected '{path}': {reason}")]
    Decoder { path: String, reason: String },
    #[error("malformed tag line: '{line}'")]
    MalformedTag { line: String },
    #[error("unresolved SAN token '{token}': {reason}")]
    SanUnresolved { token: String, reason: String },
    #[error("failed to write book record: {reason}")]
    BookWrite { reason: String },
    #[error("could not open book '{path}': {reason}")]
    BookOpen { path: String, reason: String },
}

fn install_interrupt_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, SeqCst)) {
        eprintln!("could not install interrupt handler: {err}");
    }
    cancel
}

/// The book building front-end: `presses -pgn <paths> [-o <book>] [-d <plies>]`.
pub fn run_program() -> Res<()> {
    let args = cli::parse_composer_args(env::args().skip(1))?;
    let opts = compose::ComposeOpts {
        paths: cli::expand_paths(&args.pgn_path),
        out_path: args.out_path,
        move_limit: args.move_limit,
    };
    let cancel = install_interrupt_handler();
    compose::compose(&opts, &cancel)
}

/// The annotated FEN front-end: `texel-data -pgn <paths> [-o <file>]`.
pub fn run_texel_program() -> Res<()> {
    let args = cli::parse_texel_args(env::args().skip(1))?;
    let opts = texel::TexelOpts { paths: cli::expand_paths(&args.pgn_path), out_path: args.out_path };
    let cancel = install_interrupt_handler();
    texel::emit_texel_data(&opts, &cancel)
}
