pub use anyhow;
use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};

pub type Res<T> = anyhow::Result<T>;

pub type Tokens<'a> = Peekable<SplitWhitespace<'a>>;

pub fn tokens(input: &str) -> Tokens {
    input.split_whitespace().peekable()
}

pub fn parse_int_from_str<T: FromStr>(as_str: &str, name: &str) -> Res<T> {
    // parse::<T>() returns a completely unbounded Err on failure,
    // so we just write the error message ourselves
    as_str.parse::<T>().map_err(|_err| anyhow::anyhow!("Couldn't parse {name} ('{as_str}')"))
}
