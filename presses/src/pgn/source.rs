use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

use colored::Colorize;
use ranks::general::common::Res;
use url::Url;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::ComposeError;

/// File extensions that dispatch to a source implementation.
pub const SOURCE_EXTENSIONS: [&str; 3] = ["pgn", "bz2", "zst"];

/// A stateful producer of logical PGN lines with enough accounting to estimate
/// progress. For compressed sources the on-disk size is only a lower bound for
/// the stream, so [`size`](Self::size) extrapolates from the observed
/// compression ratio and gets more accurate as the stream advances.
pub trait PgnSource: Send {
    /// The next line, without its terminator. `None` at end of input; read and
    /// decode errors also end the stream after a note on stderr.
    fn next_line(&mut self) -> Option<String>;

    /// Estimated total uncompressed size in bytes.
    fn size(&self) -> u64;

    /// Uncompressed bytes delivered so far.
    fn bytes_read(&self) -> u64;

    fn name(&self) -> &str;
}

pub fn is_url(path: &str) -> bool {
    Url::parse(path).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

#[derive(Clone, Default)]
struct ByteCount(Arc<AtomicU64>);

impl ByteCount {
    fn get(&self) -> u64 {
        self.0.load(Relaxed)
    }
}

struct CountingReader<R> {
    inner: R,
    count: ByteCount,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R, count: ByteCount) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.0.fetch_add(n as u64, Relaxed);
        Ok(n)
    }
}

/// The uniform reader stack: raw bytes are counted on the way in, optionally
/// decompressed, and counted again on the way out.
struct LineSource {
    reader: BufReader<CountingReader<Box<dyn Read + Send>>>,
    name: String,
    nominal: u64,
    input: ByteCount,
    output: ByteCount,
    buf: String,
}

impl PgnSource for LineSource {
    fn next_line(&mut self) -> Option<String> {
        self.buf.clear();
        match self.reader.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while self.buf.ends_with(['\n', '\r']) {
                    self.buf.pop();
                }
                Some(self.buf.clone())
            }
            Err(err) => {
                eprintln!("{}: stopping '{}' early: {err}", "read error".red(), self.name);
                None
            }
        }
    }

    fn size(&self) -> u64 {
        let input = self.input.get();
        if input == 0 {
            return self.nominal;
        }
        (self.nominal as f64 * self.output.get() as f64 / input as f64) as u64
    }

    fn bytes_read(&self) -> u64 {
        self.output.get()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn open_raw(path: &str) -> Res<(Box<dyn Read + Send>, u64)> {
    if is_url(path) {
        let response = reqwest::blocking::get(path)
            .and_then(|response| response.error_for_status())
            .map_err(|err| ComposeError::SourceOpen { path: path.to_string(), reason: err.to_string() })?;
        let nominal = response.content_length().unwrap_or(0);
        return Ok((Box::new(response), nominal));
    }
    let file = File::open(path)
        .map_err(|err| ComposeError::SourceOpen { path: path.to_string(), reason: err.to_string() })?;
    let nominal = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    Ok((Box::new(file), nominal))
}

/// Dispatches on the path suffix: `.pgn` plain, `.bz2` bzip2, `.zst` zstandard.
/// URLs open an HTTP stream and decode the same way.
pub fn source_from_path(path: &str) -> Res<Box<dyn PgnSource>> {
    let extension = Path::new(path).extension().and_then(|ext| ext.to_str()).unwrap_or_default();
    let (raw, nominal) = open_raw(path)?;
    let input = ByteCount::default();
    let output = ByteCount::default();
    let counted = CountingReader::new(raw, input.clone());
    let decoded: Box<dyn Read + Send> = match extension {
        "pgn" => Box::new(counted),
        "bz2" => Box::new(bzip2::read::MultiBzDecoder::new(counted)),
        "zst" => Box::new(
            ZstdDecoder::new(counted)
                .map_err(|err| ComposeError::Decoder { path: path.to_string(), reason: err.to_string() })?,
        ),
        _ => {
            return Err(ComposeError::SourceOpen {
                path: path.to_string(),
                reason: "unsupported file format".to_string(),
            }
            .into());
        }
    };
    Ok(Box::new(LineSource {
        reader: BufReader::new(CountingReader::new(decoded, output.clone())),
        name: path.to_string(),
        nominal,
        input,
        output,
        buf: String::new(),
    }))
}

/// An in-memory source, used by tests and small experiments.
pub struct StringSource {
    lines: Vec<String>,
    next: usize,
    total: u64,
    read: u64,
}

impl StringSource {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            next: 0,
            total: text.len() as u64,
            read: 0,
        }
    }

    pub fn boxed(text: &str) -> Box<dyn PgnSource> {
        Box::new(Self::new(text))
    }
}

impl PgnSource for StringSource {
    fn next_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.next)?.clone();
        self.next += 1;
        self.read += line.len() as u64 + 1;
        Some(line)
    }

    fn size(&self) -> u64 {
        self.total
    }

    fn bytes_read(&self) -> u64 {
        self.read
    }

    fn name(&self) -> &str {
        "<memory>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection_test() {
        assert!(is_url("https://database.lichess.org/standard/lichess_db.pgn.zst"));
        assert!(is_url("http://example.com/games.pgn"));
        assert!(!is_url("games.pgn"));
        assert!(!is_url("/data/archive/games.bz2"));
        assert!(!is_url("ftp://example.com/games.pgn"));
    }

    #[test]
    fn unsupported_format_test() {
        assert!(source_from_path("games.txt").is_err());
        assert!(source_from_path("no_such_file.pgn").is_err());
    }

    #[test]
    fn string_source_test() {
        let mut source = StringSource::new("line one\nline two\n");
        assert_eq!(source.next_line().as_deref(), Some("line one"));
        assert_eq!(source.next_line().as_deref(), Some("line two"));
        assert_eq!(source.next_line(), None);
        assert_eq!(source.size(), 18);
    }
}
