use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail};
use ranks::general::common::{Res, parse_int_from_str};

use crate::book::DEFAULT_MOVE_LIMIT;
use crate::pgn::source::{SOURCE_EXTENSIONS, is_url};

pub const DEFAULT_BOOK_PATH: &str = "poly_out.bin";
pub const DEFAULT_TEXEL_PATH: &str = "texel_data.txt";

pub fn get_next_arg(args: &mut impl Iterator<Item = String>, name: &str) -> Res<String> {
    match args.next() {
        None => Err(anyhow!("Missing value for {name} (args ended)")),
        Some(arg) if arg.starts_with('-') => Err(anyhow!("Missing value for {name} (next arg was '{arg}')")),
        Some(arg) => Ok(arg),
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct ComposerArgs {
    pub pgn_path: String,
    pub out_path: String,
    pub move_limit: usize,
}

pub fn parse_composer_args(mut args: impl Iterator<Item = String>) -> Res<ComposerArgs> {
    let mut res = ComposerArgs {
        pgn_path: String::new(),
        out_path: DEFAULT_BOOK_PATH.to_string(),
        move_limit: DEFAULT_MOVE_LIMIT,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-pgn" => res.pgn_path = get_next_arg(&mut args, "-pgn")?,
            "-o" => res.out_path = get_next_arg(&mut args, "-o")?,
            "-d" => res.move_limit = parse_int_from_str(&get_next_arg(&mut args, "-d")?, "move depth limit")?,
            _ => bail!("Unrecognized option '{arg}'"),
        }
    }
    if res.pgn_path.is_empty() {
        bail!("no pgn provided");
    }
    Ok(res)
}

#[derive(Debug, Eq, PartialEq)]
pub struct TexelArgs {
    pub pgn_path: String,
    pub out_path: String,
}

pub fn parse_texel_args(mut args: impl Iterator<Item = String>) -> Res<TexelArgs> {
    let mut res = TexelArgs { pgn_path: String::new(), out_path: DEFAULT_TEXEL_PATH.to_string() };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-pgn" => res.pgn_path = get_next_arg(&mut args, "-pgn")?,
            "-o" => res.out_path = get_next_arg(&mut args, "-o")?,
            _ => bail!("Unrecognized option '{arg}'"),
        }
    }
    if res.pgn_path.is_empty() {
        bail!("no pgn provided");
    }
    Ok(res)
}

/// Expands the comma separated `-pgn` value into concrete sources: URLs stay as
/// they are, directories contribute their children with a supported extension
/// (sorted, so runs are reproducible), everything else is taken as a file path.
/// Unreadable entries are reported and skipped.
pub fn expand_paths(pgn_path: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for part in pgn_path.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if is_url(part) {
            paths.push(part.to_string());
            continue;
        }
        let meta = match fs::metadata(part) {
            Ok(meta) => meta,
            Err(err) => {
                eprintln!("ignoring '{part}': {err}");
                continue;
            }
        };
        if !meta.is_dir() {
            paths.push(part.to_string());
            continue;
        }
        match fs::read_dir(part) {
            Ok(dir) => {
                let mut children: Vec<String> = dir
                    .flatten()
                    .map(|entry| entry.path())
                    .filter(|path| !path.is_dir() && has_source_extension(path))
                    .map(|path| path.to_string_lossy().into_owned())
                    .collect();
                children.sort();
                paths.append(&mut children);
            }
            Err(err) => eprintln!("ignoring directory '{part}': {err}"),
        }
    }
    paths
}

fn has_source_extension(path: &Path) -> bool {
    path.extension().and_then(OsStr::to_str).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}
