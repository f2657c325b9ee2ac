//! Append-only trade journal written by the trading loop.
//!
//! Record format: `timestamp,strategy,signal,entry_price[,...]`, with CSV
//! quoting. Records that do not parse are skipped.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use csv::{ReaderBuilder, StringRecord, Trim};

use super::StorageError;

/// One executed signal recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub timestamp: String,
    pub strategy: String,
    /// Signal label as written by the strategy, e.g. "BUY" or "STRONG_SELL".
    pub signal: String,
    pub entry_price: f64,
}

impl JournalEntry {
    /// Parses one CSV line. Returns `None` for headers and malformed lines.
    pub fn parse(line: &str) -> Option<Self> {
        read_records(line.as_bytes()).ok()?.into_iter().next()
    }

    fn from_record(record: &StringRecord) -> Option<Self> {
        let entry_price: f64 = record.get(3)?.parse().ok()?;
        if !entry_price.is_finite() {
            return None;
        }

        Some(Self {
            timestamp: record.get(0)?.to_string(),
            strategy: record.get(1)?.to_string(),
            signal: record.get(2)?.to_uppercase(),
            entry_price,
        })
    }
}

/// Reads headerless, ragged CSV and keeps the records that form an entry.
fn read_records(data: &[u8]) -> Result<Vec<JournalEntry>, StorageError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    let mut entries = Vec::new();
    for record in reader.records() {
        if let Some(entry) = JournalEntry::from_record(&record?) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// TradeJournal exposes a bounded recent suffix of the ledger.
pub trait TradeJournal: Send + Sync {
    /// Returns up to `limit` of the most recent entries, oldest first.
    fn recent_entries(&self, limit: usize) -> Result<Vec<JournalEntry>, StorageError>;
}

/// CsvTradeJournal reads the journal from a CSV file.
#[derive(Debug, Clone)]
pub struct CsvTradeJournal {
    path: PathBuf,
}

impl CsvTradeJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TradeJournal for CsvTradeJournal {
    fn recent_entries(&self, limit: usize) -> Result<Vec<JournalEntry>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(limit);
        let tail = lines[start..].join("\n");

        read_records(tail.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_skips_header() {
        assert!(JournalEntry::parse("timestamp,strategy,signal,entry_price").is_none());
    }

    #[test]
    fn test_parse_line() {
        let entry = JournalEntry::parse("2026-01-01T00:00:00Z,breakout,buy,43000.5,0.01").unwrap();
        assert_eq!(entry.strategy, "breakout");
        assert_eq!(entry.signal, "BUY");
        assert_eq!(entry.entry_price, 43000.5);
    }

    #[test]
    fn test_parse_quoted_field() {
        let entry =
            JournalEntry::parse(r#"2026-01-01T00:00:00Z,"grid, v2",BUY,43000.0"#).unwrap();
        assert_eq!(entry.strategy, "grid, v2");
        assert_eq!(entry.signal, "BUY");
        assert_eq!(entry.entry_price, 43000.0);
    }

    #[test]
    fn test_parse_short_line() {
        assert!(JournalEntry::parse("2026-01-01T00:00:00Z,grid,BUY").is_none());
    }

    #[test]
    fn test_recent_entries_skips_malformed_records() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,strategy,signal,entry_price").unwrap();
        writeln!(file, "2026-01-01T00:00:00Z,a,BUY,oops").unwrap();
        writeln!(file, r#"2026-01-01T00:00:01Z,"b, c",sell,2500.5,0.1"#).unwrap();

        let journal = CsvTradeJournal::new(file.path());
        let entries = journal.recent_entries(1000).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].strategy, "b, c");
        assert_eq!(entries[0].signal, "SELL");
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = CsvTradeJournal::new(dir.path().join("absent.csv"));
        assert!(journal.recent_entries(1000).unwrap().is_empty());
    }

    #[test]
    fn test_recent_entries_reads_only_tail() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,strategy,signal,entry_price").unwrap();
        for i in 0..20 {
            writeln!(file, "2026-01-01T00:00:{:02}Z,s,BUY,{}", i, 100 + i).unwrap();
        }

        let journal = CsvTradeJournal::new(file.path());
        let entries = journal.recent_entries(5).unwrap();

        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].entry_price, 115.0);
        assert_eq!(entries[4].entry_price, 119.0);
    }
}
