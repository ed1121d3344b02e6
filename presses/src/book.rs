use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Mutex;

use colored::Colorize;
use itertools::Itertools;
use ranks::GameResult;
use ranks::chess::moves::ChessMove;
use ranks::chess::{ChessColor, Chessboard};
use ranks::general::common::Res;
use ranks::polyglot::{BOOK_ENTRY_SIZE, BookRecord, PolyMove};

use crate::ComposeError;
use crate::pgn::PgnRecord;

/// The default cap on plies ingested per game.
pub const DEFAULT_MOVE_LIMIT: usize = 40;

/// The largest weight a book record can carry.
const MAX_BOOK_WEIGHT: u64 = u16::MAX as u64;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BookMove {
    pub mov: PolyMove,
    pub weight: u64,
}

/// Accumulates `(position key, move) -> weight` over many games. Weights grow
/// without bound during aggregation and are rescaled into 16 bits on save.
#[derive(Debug, Default)]
pub struct PolyglotBook {
    entries: HashMap<u64, Vec<BookMove>>,
}

impl PolyglotBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_positions(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First sighting of a move inserts it with `base_weight`; every repeat
    /// bumps it by one, regardless of the repeat's own base weight.
    pub fn add_move(&mut self, key: u64, mov: PolyMove, base_weight: u64) {
        let moves = self.entries.entry(key).or_default();
        match moves.iter_mut().find(|entry| entry.mov == mov) {
            Some(entry) => entry.weight += 1,
            None => moves.push(BookMove { mov, weight: base_weight }),
        }
    }

    pub fn moves_for(&self, key: u64) -> Option<&[BookMove]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    /// All records in on-disk order: keys ascending, each entry list sorted by
    /// weight descending (ties broken by the move bits, so identical aggregates
    /// serialize identically) and rescaled to fit 16 bits.
    fn normalized_records(&self) -> Vec<BookRecord> {
        let mut records = Vec::new();
        for (&key, moves) in self.entries.iter().sorted_by_key(|(&key, _)| key) {
            let mut moves = moves.clone();
            moves.sort_by_key(|entry| (Reverse(entry.weight), entry.mov.raw()));
            normalize_weights(&mut moves);
            for entry in &moves {
                debug_assert!(entry.weight <= MAX_BOOK_WEIGHT);
                records.push(BookRecord { key, mov: entry.mov, weight: entry.weight as u16, learn: 0 });
            }
        }
        records
    }

    /// Writes the book. Individual record failures are reported and skipped so
    /// that as much of the book as possible ends up on disk.
    pub fn save<W: Write>(&self, writer: &mut W) -> Res<()> {
        for record in self.normalized_records() {
            if let Err(err) = writer.write_all(&record.to_bytes()) {
                let err = ComposeError::BookWrite { reason: err.to_string() };
                eprintln!("{}", err.to_string().red());
            }
        }
        Ok(())
    }

    pub fn save_to_path(&self, path: &str) -> Res<()> {
        let file = File::create(Path::new(path))
            .map_err(|err| ComposeError::BookOpen { path: path.to_string(), reason: err.to_string() })?;
        let mut writer = BufWriter::new(file);
        self.save(&mut writer)?;
        writer.flush().map_err(|err| ComposeError::BookWrite { reason: err.to_string() })?;
        Ok(())
    }

    /// Re-reads a saved book, mainly to verify what was written. A short final
    /// read is treated as end of file.
    pub fn load<R: Read>(reader: &mut R) -> Res<Self> {
        let mut book = Self::new();
        let mut buf = [0; BOOK_ENTRY_SIZE];
        loop {
            match read_record(reader, &mut buf) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    return Err(ComposeError::BookOpen { path: "<stream>".to_string(), reason: err.to_string() }.into());
                }
            }
            let record = BookRecord::from_bytes(&buf);
            book.entries
                .entry(record.key)
                .or_default()
                .push(BookMove { mov: record.mov, weight: record.weight as u64 });
        }
        Ok(book)
    }

    pub fn load_from_path(path: &str) -> Res<Self> {
        let file = File::open(Path::new(path))
            .map_err(|err| ComposeError::BookOpen { path: path.to_string(), reason: err.to_string() })?;
        Self::load(&mut BufReader::new(file))
    }
}

fn read_record<R: Read>(reader: &mut R, buf: &mut [u8; BOOK_ENTRY_SIZE]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < BOOK_ENTRY_SIZE {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

/// Rescales one entry list so the largest weight fits in 16 bits.
///
/// Keeps the longest prefix whose weights are within a factor of 65535 of the
/// best move, then divides everything by the weight of the last survivor.
fn normalize_weights(moves: &mut Vec<BookMove>) {
    debug_assert!(moves.iter().tuple_windows().all(|(a, b)| a.weight >= b.weight));
    let Some(best) = moves.first().map(|entry| entry.weight) else { return };
    if best <= MAX_BOOK_WEIGHT {
        return;
    }
    let last_kept = moves.iter().rposition(|entry| best / entry.weight < MAX_BOOK_WEIGHT).unwrap_or(0);
    moves.truncate(last_kept + 1);
    let divisor = moves[last_kept].weight;
    for entry in moves {
        entry.weight /= divisor;
    }
}

/// The weight a move earns when first seen: 2 when the side that played it went
/// on to win, 1 otherwise (the filter only lets decisive and drawn games
/// through). The side that lost contributes nothing.
fn base_weight(active: ChessColor, result: Option<GameResult>) -> Option<u64> {
    match (active, result) {
        (ChessColor::White, Some(GameResult::WhiteWin)) | (ChessColor::Black, Some(GameResult::BlackWin)) => Some(2),
        (_, Some(GameResult::WhiteWin)) | (_, Some(GameResult::BlackWin)) => None,
        _ => Some(1),
    }
}

/// Replays one game from the start position and folds each played move into the
/// book, up to `move_limit` plies. An unresolvable SAN token ends the replay;
/// the moves before it keep their contribution.
pub fn ingest_game(book: &Mutex<PolyglotBook>, pgn: &PgnRecord, move_limit: usize) -> Res<()> {
    let mut board = Chessboard::startpos();
    for (ply, san) in pgn.san_moves().into_iter().enumerate() {
        if ply >= move_limit {
            break;
        }
        let mov = ChessMove::from_san(&san, &board)
            .map_err(|err| ComposeError::SanUnresolved { token: san.clone(), reason: err.to_string() })?;
        if let Some(weight) = base_weight(board.active_player(), pgn.result) {
            let key = board.polyglot_hash();
            book.lock().unwrap().add_move(key, PolyMove::from_move(mov), weight);
        }
        let Some(next) = board.make_move(mov) else { break };
        board = next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(uci: &str) -> PolyMove {
        PolyMove::from_uci(uci).unwrap()
    }

    #[test]
    fn add_move_test() {
        let mut book = PolyglotBook::new();
        book.add_move(1, poly("e2e4"), 2);
        book.add_move(1, poly("e2e4"), 2);
        book.add_move(1, poly("d2d4"), 1);
        // a repeat bumps by one even if its own base weight differs
        book.add_move(1, poly("d2d4"), 2);
        book.add_move(2, poly("e7e5"), 1);
        let moves = book.moves_for(1).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0], BookMove { mov: poly("e2e4"), weight: 3 });
        assert_eq!(moves[1], BookMove { mov: poly("d2d4"), weight: 2 });
        assert_eq!(book.num_positions(), 2);
    }

    #[test]
    fn normalize_test() {
        // weights already within range stay untouched
        let mut moves = vec![BookMove { mov: poly("e2e4"), weight: 65535 }, BookMove { mov: poly("d2d4"), weight: 1 }];
        normalize_weights(&mut moves);
        assert_eq!(moves[0].weight, 65535);
        assert_eq!(moves[1].weight, 1);

        // 200000/1 >= 65535 drops the last move; d = 10 from the largest survivor
        let mut moves = vec![
            BookMove { mov: poly("e2e4"), weight: 200_000 },
            BookMove { mov: poly("d2d4"), weight: 10 },
            BookMove { mov: poly("g1f3"), weight: 1 },
        ];
        normalize_weights(&mut moves);
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].weight, 20_000);
        assert_eq!(moves[1].weight, 1);
    }

    #[test]
    fn save_is_sorted_and_bounded_test() {
        let mut book = PolyglotBook::new();
        book.add_move(0xDEAD_BEEF, poly("e2e4"), 2);
        book.add_move(0x0000_0001, poly("d2d4"), 10);
        book.add_move(0x0000_0001, poly("g1f3"), 200_000);
        book.add_move(0xBEEF_0000, poly("e7e5"), 1);
        let mut bytes = Vec::new();
        book.save(&mut bytes).unwrap();
        assert_eq!(bytes.len() % BOOK_ENTRY_SIZE, 0);
        let records: Vec<BookRecord> = bytes
            .chunks_exact(BOOK_ENTRY_SIZE)
            .map(|chunk| BookRecord::from_bytes(chunk.try_into().unwrap()))
            .collect();
        // keys ascending, no duplicate (key, move) pairs, weights bounded
        assert!(records.windows(2).all(|pair| pair[0].key <= pair[1].key));
        assert!(records.iter().map(|record| (record.key, record.mov)).all_unique());
        for record in &records {
            assert!(record.learn == 0);
        }
        // per-key entries sorted by weight descending
        let first_key: Vec<_> = records.iter().filter(|record| record.key == 1).collect();
        assert_eq!(first_key.len(), 2);
        assert!(first_key[0].weight >= first_key[1].weight);
        assert_eq!(first_key[0].mov, poly("g1f3"));
    }

    #[test]
    fn save_load_roundtrip_test() {
        let mut book = PolyglotBook::new();
        book.add_move(42, poly("e2e4"), 2);
        book.add_move(42, poly("b1c3"), 1);
        book.add_move(7, poly("e7e8q"), 1);
        let mut bytes = Vec::new();
        book.save(&mut bytes).unwrap();
        let reloaded = PolyglotBook::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(reloaded.num_positions(), 2);
        assert_eq!(reloaded.moves_for(42).unwrap().len(), 2);
        assert_eq!(reloaded.moves_for(7).unwrap()[0].mov, poly("e7e8q"));
        // a short final read is treated as end of file
        bytes.extend_from_slice(&[1, 2, 3]);
        let reloaded = PolyglotBook::load(&mut bytes.as_slice()).unwrap();
        assert_eq!(reloaded.num_positions(), 2);
    }

    #[test]
    fn empty_book_test() {
        let book = PolyglotBook::new();
        let mut bytes = Vec::new();
        book.save(&mut bytes).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn base_weight_test() {
        use ChessColor::*;
        use GameResult::*;
        assert_eq!(base_weight(White, Some(WhiteWin)), Some(2));
        assert_eq!(base_weight(Black, Some(BlackWin)), Some(2));
        assert_eq!(base_weight(White, Some(BlackWin)), None);
        assert_eq!(base_weight(Black, Some(WhiteWin)), None);
        assert_eq!(base_weight(White, Some(Draw)), Some(1));
        assert_eq!(base_weight(Black, Some(Draw)), Some(1));
    }

    #[test]
    fn ingest_game_test() {
        let book = Mutex::new(PolyglotBook::new());
        let pgn = PgnRecord {
            result: Some(GameResult::WhiteWin),
            moves: "1. e4 e5 2. Nf3 1-0".to_string(),
            ..PgnRecord::default()
        };
        ingest_game(&book, &pgn, DEFAULT_MOVE_LIMIT).unwrap();
        let book = book.into_inner().unwrap();
        // white's moves enter with weight 2, black lost and contributes nothing
        let start = book.moves_for(0x463B_9618_1691_FC9C).unwrap();
        assert_eq!(start, &[BookMove { mov: poly("e2e4"), weight: 2 }]);
        assert!(book.moves_for(0x823C_9B50_FD11_4196).is_none());
        let after_e5 = book.moves_for(0x0844_931A_6EF4_B9A0).unwrap();
        assert_eq!(after_e5[0].mov, poly("g1f3"));
        assert_eq!(book.num_positions(), 2);
    }

    #[test]
    fn ingest_respects_move_limit_test() {
        let book = Mutex::new(PolyglotBook::new());
        let pgn = PgnRecord {
            result: Some(GameResult::Draw),
            moves: "1. e4 e5 2. Nf3 Nc6 3. Bb5 1/2-1/2".to_string(),
            ..PgnRecord::default()
        };
        ingest_game(&book, &pgn, 2).unwrap();
        assert_eq!(book.into_inner().unwrap().num_positions(), 2);
    }

    #[test]
    fn ingest_stops_at_bad_san_test() {
        let book = Mutex::new(PolyglotBook::new());
        let pgn = PgnRecord {
            result: Some(GameResult::Draw),
            moves: "1. e4 e5 2. Qxe5 Nc6 1/2-1/2".to_string(),
            ..PgnRecord::default()
        };
        // Qxe5 is not legal; the prior plies stay in the book
        assert!(ingest_game(&book, &pgn, DEFAULT_MOVE_LIMIT).is_err());
        assert_eq!(book.into_inner().unwrap().num_positions(), 2);
    }

    #[test]
    fn castling_is_encoded_with_the_rook_square_test() {
        let book = Mutex::new(PolyglotBook::new());
        let pgn = PgnRecord {
            result: Some(GameResult::WhiteWin),
            moves: "1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. O-O 1-0".to_string(),
            ..PgnRecord::default()
        };
        ingest_game(&book, &pgn, DEFAULT_MOVE_LIMIT).unwrap();
        let book = book.into_inner().unwrap();
        let found = book.entries.values().flatten().any(|entry| entry.mov == poly("e1h1"));
        assert!(found, "kingside castling must serialize as e1h1");
    }
}
