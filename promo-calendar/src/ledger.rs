//! Append-only record of registered event dates.
//!
//! One `YYYY-MM-DD` per line, oldest first. Only the last non-blank line is
//! consulted: an event is registered when its ISO date sorts strictly after
//! it. Lines are never rewritten.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger {}: refusing to append {date} after {tail:?}", path.display())]
    OutOfOrder {
        path: PathBuf,
        date: NaiveDate,
        tail: String,
    },
}

/// `true` when `date` is newer than everything recorded so far.
///
/// ```
/// use chrono::NaiveDate;
/// use promo_calendar::ledger::should_register;
///
/// let date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
/// assert!(should_register(date, "2024-06-01"));
/// assert!(!should_register(date, "2024-06-02"));
/// assert!(should_register(date, ""));
/// ```
pub fn should_register(date: NaiveDate, tail: &str) -> bool {
    iso(date).as_str() > tail.trim()
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (creating if needed) and read the current tail.
    ///
    /// The returned session owns the file handle until it is dropped.
    pub fn open(&self) -> Result<LedgerSession, LedgerError> {
        let io = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(io)?;

        let mut contents = String::new();
        file.seek(SeekFrom::Start(0)).map_err(io)?;
        file.read_to_string(&mut contents).map_err(io)?;
        let tail = last_entry(&contents).to_string();
        let needs_newline = !contents.is_empty() && !contents.ends_with('\n');

        tracing::debug!(path = %self.path.display(), %tail, "ledger.open");
        Ok(LedgerSession {
            path: self.path.clone(),
            file,
            tail,
            needs_newline,
        })
    }
}

fn last_entry(contents: &str) -> &str {
    contents
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// An open ledger file. Closed on drop.
#[derive(Debug)]
pub struct LedgerSession {
    path: PathBuf,
    file: File,
    tail: String,
    needs_newline: bool,
}

impl LedgerSession {
    /// Last non-blank line, or `""` for an empty ledger.
    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn should_register(&self, date: NaiveDate) -> bool {
        should_register(date, &self.tail)
    }

    /// Append `date` and flush it to disk.
    pub fn append(&mut self, date: NaiveDate) -> Result<(), LedgerError> {
        if !self.should_register(date) {
            return Err(LedgerError::OutOfOrder {
                path: self.path.clone(),
                date,
                tail: self.tail.clone(),
            });
        }
        let line = iso(date);
        let prefix = if self.needs_newline { "\n" } else { "" };
        let io = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        writeln!(self.file, "{prefix}{line}").map_err(io)?;
        self.file.sync_all().map_err(io)?;

        tracing::info!(path = %self.path.display(), date = %line, "ledger.append");
        self.tail = line;
        self.needs_newline = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger_with(contents: &str) -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.log");
        std::fs::write(&path, contents).unwrap();
        (dir, Ledger::new(path))
    }

    #[test]
    fn same_date_is_not_registered_again() {
        let (_dir, ledger) = ledger_with("2024-05-01\n2024-06-01\n");
        let session = ledger.open().unwrap();
        assert_eq!(session.tail(), "2024-06-01");
        assert!(!session.should_register(date(2024, 6, 1)));
        assert!(!session.should_register(date(2024, 5, 31)));
    }

    #[test]
    fn newer_date_appends_exactly_one_line() {
        let (_dir, ledger) = ledger_with("2024-06-01\n");
        let mut session = ledger.open().unwrap();
        assert!(session.should_register(date(2024, 6, 2)));
        session.append(date(2024, 6, 2)).unwrap();
        drop(session);

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "2024-06-01\n2024-06-02\n");
    }

    #[test]
    fn sequential_registrations_stay_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("event.log"));
        let dates = [date(2024, 1, 5), date(2024, 3, 1), date(2024, 12, 25), date(2025, 1, 5)];
        for d in dates {
            let mut session = ledger.open().unwrap();
            assert!(session.should_register(d));
            session.append(d).unwrap();
        }

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), dates.len());
        assert!(lines.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn missing_file_is_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("nested/event.log"));
        let session = ledger.open().unwrap();
        assert_eq!(session.tail(), "");
        assert!(ledger.path().exists());
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let (_dir, ledger) = ledger_with("2024-06-01\n\n  \n");
        assert_eq!(ledger.open().unwrap().tail(), "2024-06-01");
    }

    #[test]
    fn missing_trailing_newline_is_repaired_on_append() {
        let (_dir, ledger) = ledger_with("2024-06-01");
        ledger.open().unwrap().append(date(2024, 7, 1)).unwrap();
        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "2024-06-01\n2024-07-01\n");
    }

    #[test]
    fn out_of_order_append_is_refused() {
        let (_dir, ledger) = ledger_with("2024-06-01\n");
        let err = ledger.open().unwrap().append(date(2024, 6, 1)).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfOrder { .. }));
        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "2024-06-01\n");
    }

    #[test]
    fn comparison_is_lexicographic_on_iso_dates() {
        assert!(should_register(date(2024, 10, 1), "2024-09-30"));
        assert!(!should_register(date(999, 1, 1), "2024-01-01"));
    }
}
