//! Measurement records.
//!
//! A [`Sample`] is one completed measurement event: the raw lock-in
//! readings, the MPMS environment values they were taken at, and the
//! derived resistance/resistivity. Samples are immutable once created and
//! accumulate in a [`SampleTable`] for the duration of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One measurement event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// UTC timestamp when the lock-in was read.
    pub timestamp: DateTime<Utc>,
    /// Oscillator output amplitude, in volts.
    pub src_v: f64,
    /// Channel 1 magnitude (Vxx), in volts.
    pub ch1r_v: f64,
    /// Channel 2 magnitude (Vxy), in volts.
    pub ch2r_v: f64,
    /// MPMS temperature, in kelvin.
    pub temperature_k: f64,
    /// MPMS magnetic field, in oersted.
    pub field_oe: f64,
    /// Derived sample resistance, in ohms.
    pub resistance_ohm: f64,
    /// Derived sample resistivity, in ohm meters.
    pub resistivity_ohm_m: f64,
}

impl Sample {
    /// Timestamp as fractional unix seconds, for plot axes.
    pub fn time_s(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 1e3
    }
}

/// Ordered, append-only collection of samples.
///
/// Insertion order is chronological and significant; the table grows
/// monotonically and is never truncated during a run. Each entry pairs
/// with exactly one row in the output CSV.
#[derive(Debug, Default)]
pub struct SampleTable {
    rows: Vec<Sample>,
}

impl SampleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, preserving arrival order.
    pub fn push(&mut self, sample: Sample) {
        self.rows.push(sample);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent sample, if any.
    pub fn last(&self) -> Option<&Sample> {
        self.rows.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.rows.iter()
    }
}
