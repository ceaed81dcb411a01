use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use cozy_chess::Board;
use nnue::features::{active_features, active_virtual_features};
use nnue::Architecture;

/// A single record from a shard file.
#[derive(Debug, Clone)]
pub struct Record {
    pub fen: String,
    pub score: i32,
}

/// Sparse features of one position, side to move first.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub own: Vec<usize>,
    pub opponent: Vec<usize>,
    pub target: f32,
}

impl Record {
    /// Encodes the record into real and virtual features of both perspectives
    /// and a target in network output units.
    pub fn encode(&self, arch: &Architecture) -> Option<Sample> {
        let board = Board::from_str(&self.fen).ok()?;
        let stm = board.side_to_move();

        let perspective = |color| {
            let mut features = active_features(&board, color);
            features.extend(active_virtual_features(&board, color));
            features
        };

        Some(Sample {
            own: perspective(stm),
            opponent: perspective(!stm),
            target: self.score as f32 * arch.fv_scale as f32 / arch.bias_scale(),
        })
    }
}

/// Reads records sequentially from a single CSV shard file.
/// Lines that do not parse (including a `fen,score` header) are skipped.
pub struct Shard {
    reader: BufReader<File>,
    line: String,
}

impl Shard {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            line: String::new(),
        })
    }

    /// Counts parseable records without keeping them.
    pub fn count_records(path: &Path) -> io::Result<usize> {
        let mut shard = Self::open(path)?;
        let mut count = 0;
        while let Some(record) = shard.next_record()? {
            if record.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// `Ok(None)` at end of file, `Ok(Some(None))` for a skipped line.
    fn next_record(&mut self) -> io::Result<Option<Option<Record>>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        Ok(Some(parse_line(&self.line)))
    }
}

impl Iterator for Shard {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            match self.next_record() {
                Ok(Some(Some(record))) => return Some(record),
                Ok(Some(None)) => continue,
                Ok(None) => return None,
                Err(e) => {
                    log::warn!("Failed to read shard: {}", e);
                    return None;
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<Record> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (fen, score) = line.rsplit_once(',')?;
    let score: i32 = score.trim().parse().ok()?;

    Some(Record {
        fen: fen.trim().to_string(),
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_line() {
        let record = parse_line("8/8/8/8/8/5k2/8/4K2R w - - 0 1,-254\n").unwrap();
        assert_eq!(record.fen, "8/8/8/8/8/5k2/8/4K2R w - - 0 1");
        assert_eq!(record.score, -254);

        assert!(parse_line("fen,score").is_none());
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn test_shard_skips_header_and_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fen,score").unwrap();
        writeln!(file, "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1,12").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "8/8/8/8/8/5k2/8/4K2R b - - 0 1,508").unwrap();
        file.flush().unwrap();

        let records: Vec<Record> = Shard::open(file.path()).unwrap().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(Shard::count_records(file.path()).unwrap(), 2);
        assert_eq!(records[1].score, 508);
    }

    #[test]
    fn test_encode_scales_target_and_orders_perspectives() {
        let arch = Architecture::default();
        let record = Record {
            fen: "8/8/8/8/8/5k2/8/4K2R b - - 0 1".to_string(),
            score: 508,
        };

        let sample = record.encode(&arch).unwrap();
        assert_eq!(sample.target, 1.0);

        let board = Board::from_str(&record.fen).unwrap();
        let mut own = active_features(&board, cozy_chess::Color::Black);
        own.extend(active_virtual_features(&board, cozy_chess::Color::Black));
        assert_eq!(sample.own, own);
        // Rook plus its virtual twin
        assert_eq!(sample.opponent.len(), 2);
    }
}
