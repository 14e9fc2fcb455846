//! Configuration management.
//!
//! Settings are loaded from `config/default.toml` (or a named alternative
//! via `--config`) and deserialized into the [`Settings`] tree. Values that
//! parse but are physically meaningless are rejected by
//! [`Settings::validate`] before a run starts.
//!
//! ```toml
//! log_level = "info"
//!
//! [acquisition]
//! poll_interval = "1s"
//! retry_delay = "200ms"
//!
//! [lockin]
//! resource = "GPIB0::12::INSTR"
//! timeout = "2s"
//! time_constant = 1
//! sensitivity = 19
//! frequency_hz = 1234.567
//! amplitude_uv = 1.0
//! shunt_ohm = 10000.0
//!
//! [sample]
//! cross_section_1_mm = 1000.0
//! cross_section_2_mm = 1000.0
//! length_mm = 1000.0
//!
//! [paths]
//! mpms_log = "data.dc.dat"
//! output_csv = "cu-RvsT-2.csv"
//! ```

use crate::error::{AppResult, DaqError};
use crate::resistivity;
use config::Config;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub log_level: String,
    pub acquisition: AcquisitionSettings,
    pub lockin: LockinSettings,
    pub sample: SampleSettings,
    pub paths: PathSettings,
}

/// Timing of the polling loop.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionSettings {
    /// Pause after a completed iteration. Doubles as the polling rate.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Pause after a "no new data" poll before trying again.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

/// Lock-in amplifier settings.
///
/// The front-panel codes (`time_constant`, `sensitivity`) and the oscillator
/// values are recorded in the run manifest and echoed at startup as a
/// checklist. They are never written to the instrument; setup stays manual.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LockinSettings {
    /// VISA resource string, e.g. `GPIB0::12::INSTR`.
    pub resource: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Time constant code, see manual p. 6-14.
    pub time_constant: u8,
    /// Sensitivity code, see manual p. 6-11.
    pub sensitivity: u8,
    /// Oscillator frequency in Hz.
    pub frequency_hz: f64,
    /// Oscillator amplitude in microvolts.
    pub amplitude_uv: f64,
    /// Series shunt resistor in ohms, turning the oscillator output into a
    /// pseudo current source.
    pub shunt_ohm: f64,
}

/// Sample geometry in millimeters.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct SampleSettings {
    pub cross_section_1_mm: f64,
    pub cross_section_2_mm: f64,
    pub length_mm: f64,
}

/// Input and output file locations.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathSettings {
    /// Temperature/field log appended to by the MPMS control software.
    pub mpms_log: PathBuf,
    /// Output CSV, appended one row per sample.
    pub output_csv: PathBuf,
}

impl Settings {
    /// Load settings from `config/<name>.toml`, defaulting to
    /// `config/default.toml`.
    pub fn new(config_name: Option<&str>) -> AppResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(DaqError::Config)?;

        s.try_deserialize().map_err(DaqError::Config)
    }

    /// Reject configurations that would make the run meaningless or divide
    /// by zero inside the resistivity calculation.
    pub fn validate(&self) -> AppResult<()> {
        let denominator = self.lockin.shunt_ohm + resistivity::FIXED_SERIES_OHM;
        if !denominator.is_finite() || denominator == 0.0 {
            return Err(DaqError::Configuration(format!(
                "shunt_ohm ({}) plus the fixed series resistance ({}) must be finite and nonzero",
                self.lockin.shunt_ohm,
                resistivity::FIXED_SERIES_OHM
            )));
        }
        let dims = [
            ("cross_section_1_mm", self.sample.cross_section_1_mm),
            ("cross_section_2_mm", self.sample.cross_section_2_mm),
            ("length_mm", self.sample.length_mm),
        ];
        for (name, value) in dims {
            if !value.is_finite() || value <= 0.0 {
                return Err(DaqError::Configuration(format!(
                    "sample.{name} must be positive, got {value}"
                )));
            }
        }
        if self.acquisition.poll_interval.is_zero() {
            return Err(DaqError::Configuration(
                "acquisition.poll_interval must be nonzero".to_string(),
            ));
        }
        if self.acquisition.retry_delay.is_zero() {
            return Err(DaqError::Configuration(
                "acquisition.retry_delay must be nonzero".to_string(),
            ));
        }
        if self.lockin.resource.trim().is_empty() {
            return Err(DaqError::Configuration(
                "lockin.resource must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
