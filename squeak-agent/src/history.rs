//! Click history
//!
//! One CSV row per successful mouse poll: a local timestamp followed by the
//! seven counters. The header is written once, when the file is new or
//! empty. Battery and DPI are not recorded.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone};
use squeak_protocol::StatusSnapshot;
use thiserror::Error;

pub const HEADER: &str = "timestamp,left_clicks,right_clicks,middle_clicks,backward_clicks,\
forward_clicks,downward_scrolls,upward_scrolls";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed history row {0:?}")]
    Malformed(String),
}

/// One history row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub timestamp: NaiveDateTime,
    /// Left, right, middle, backward, forward, downward, upward
    pub counters: [u64; 7],
}

impl HistoryRecord {
    fn parse(line: &str) -> Result<Self, HistoryError> {
        let malformed = || HistoryError::Malformed(line.to_string());
        let mut columns = line.split(',');

        let timestamp = columns
            .next()
            .and_then(|t| NaiveDateTime::parse_from_str(t.trim(), TIMESTAMP_FORMAT).ok())
            .ok_or_else(malformed)?;

        let mut counters = [0u64; 7];
        for counter in &mut counters {
            *counter = columns
                .next()
                .and_then(|c| c.trim().parse().ok())
                .ok_or_else(malformed)?;
        }
        if columns.next().is_some() {
            return Err(malformed());
        }

        Ok(Self {
            timestamp,
            counters,
        })
    }

    pub fn total_clicks(&self) -> u64 {
        self.counters.iter().fold(0u64, |sum, c| sum.saturating_add(*c))
    }
}

/// Append-only CSV click history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a row for `snapshot` taken at `at`
    pub fn append<Tz: TimeZone>(
        &self,
        snapshot: &StatusSnapshot,
        at: &DateTime<Tz>,
    ) -> Result<(), HistoryError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let io_error = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_error)?;

        let mut row = String::new();
        if file.metadata().map_err(io_error)?.len() == 0 {
            row.push_str(HEADER);
            row.push('\n');
        }
        row.push_str(&at.format(TIMESTAMP_FORMAT).to_string());
        for counter in snapshot.counters() {
            row.push(',');
            row.push_str(&counter.to_string());
        }
        row.push('\n');

        file.write_all(row.as_bytes()).map_err(io_error)
    }

    /// The most recent row, if the file has any
    pub fn last_record(&self) -> Result<Option<HistoryRecord>, HistoryError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        text.lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty() && *line != HEADER)
            .map(HistoryRecord::parse)
            .transpose()
    }
}
