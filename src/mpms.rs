//! MPMS log file polling.
//!
//! The MPMS control software (MultiVu) appends comma-separated lines to a
//! `.dc.dat` log while a sweep runs. This module watches that file with a
//! line-count cursor: a poll reads the whole file, and only when the line
//! count has grown since the last poll is the newest line parsed for the
//! current magnetic field (field index 2, in Oe) and temperature (field
//! index 3, in K).
//!
//! A missing or unreadable file is a transient condition, identical to "no
//! new data": MultiVu may simply not have started the sweep yet. A newest
//! line that is present but not numeric is a real parse error and is
//! reported as such.

use crate::error::{AppResult, DaqError};
use log::{debug, trace};
use std::fs;
use std::path::Path;

/// Column index of the magnetic field in an MPMS log line.
pub const FIELD_INDEX: usize = 2;

/// Column index of the temperature in an MPMS log line.
pub const TEMPERATURE_INDEX: usize = 3;

/// Line-count cursor recording how much of the log has been consumed.
///
/// Advances only when a poll yields a parsed reading, so a malformed
/// newest line is retried until the external writer appends a good one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCursor {
    lines_seen: usize,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of log lines consumed so far.
    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }

    fn advance_to(&mut self, lines: usize) {
        self.lines_seen = lines;
    }
}

/// Outcome of one poll of the MPMS log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Poll {
    /// The log grew; values are taken from the newest line.
    Reading { temperature_k: f64, field_oe: f64 },
    /// Nothing new since the last poll (or the file is not there yet).
    /// Expected condition; retry after a short pause.
    NoNewData,
}

/// Poll the log once, advancing `cursor` if a new reading was accepted.
///
/// I/O failures are treated as transient and reported as
/// [`Poll::NoNewData`]. A malformed newest line returns
/// [`DaqError::Parse`] and leaves the cursor untouched.
pub fn read_latest(path: &Path, cursor: &mut LogCursor) -> AppResult<Poll> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!("MPMS log {} not readable yet: {}", path.display(), err);
            return Ok(Poll::NoNewData);
        }
    };

    let lines: Vec<&str> = contents.lines().collect();
    let count = lines.len();
    if count <= cursor.lines_seen() {
        trace!(
            "MPMS log unchanged ({} lines, {} seen)",
            count,
            cursor.lines_seen()
        );
        return Ok(Poll::NoNewData);
    }

    // count > lines_seen >= 0, so the file has at least one line.
    let newest = lines[count - 1];
    let reading = parse_line(newest)?;
    cursor.advance_to(count);
    if let Poll::Reading {
        temperature_k,
        field_oe,
    } = reading
    {
        debug!(
            "MPMS log line {}: T = {} K, H = {} Oe",
            count, temperature_k, field_oe
        );
    }
    Ok(reading)
}

/// Parse one MPMS log line into a reading.
fn parse_line(line: &str) -> AppResult<Poll> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() <= TEMPERATURE_INDEX {
        return Err(DaqError::Parse(format!(
            "MPMS line has {} fields, need at least {}: '{}'",
            fields.len(),
            TEMPERATURE_INDEX + 1,
            line
        )));
    }
    let field_oe = parse_numeric(fields[FIELD_INDEX], "field")?;
    let temperature_k = parse_numeric(fields[TEMPERATURE_INDEX], "temperature")?;
    Ok(Poll::Reading {
        temperature_k,
        field_oe,
    })
}

fn parse_numeric(token: &str, name: &str) -> AppResult<f64> {
    let trimmed = token.trim();
    trimmed.parse::<f64>().map_err(|_| {
        DaqError::Parse(format!("MPMS {name} value '{trimmed}' is not numeric"))
    })
}
