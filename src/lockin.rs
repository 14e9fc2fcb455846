//! Lock-in amplifier driver.
//!
//! Speaks the Signal Recovery / EG&G text protocol: commands suffixed with
//! `.` return the value as floating-point ASCII, optionally followed by
//! status tokens. One measurement is three queries in a fixed order:
//! oscillator amplitude, channel 1 magnitude, channel 2 magnitude.
//!
//! Instrument *setup* (time constant, sensitivity, oscillator) is manual
//! by design; [`front_panel_checklist`] echoes the configured values at
//! startup so the operator can verify the panel, and nothing is ever
//! written to the instrument.

use crate::bus::Bus;
use crate::config::LockinSettings;
use crate::error::{AppResult, DaqError};
use log::info;

/// Query for the oscillator output amplitude, in volts.
pub const OSC_AMPLITUDE_QUERY: &str = "OA.";

/// Query for the channel 1 (Vxx) magnitude, in volts.
pub const CH1_MAGNITUDE_QUERY: &str = "MAG1.";

/// Query for the channel 2 (Vxy) magnitude, in volts.
pub const CH2_MAGNITUDE_QUERY: &str = "MAG2.";

/// The three raw voltages read in one measurement pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReadings {
    pub src_v: f64,
    pub ch1r_v: f64,
    pub ch2r_v: f64,
}

/// Driver for the lock-in amplifier over any [`Bus`].
pub struct Lockin<B: Bus> {
    bus: B,
}

impl<B: Bus> Lockin<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Access the underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Read oscillator amplitude and both channel magnitudes.
    ///
    /// Three bus round-trips in a fixed order; aborts on the first
    /// failure, so a fault leaves no half-read hidden state. Bus faults
    /// surface as [`DaqError::Bus`], unparseable responses as
    /// [`DaqError::Parse`].
    pub async fn read_magnitudes(&mut self) -> AppResult<RawReadings> {
        let src_v = self.query_value(OSC_AMPLITUDE_QUERY).await?;
        let ch1r_v = self.query_value(CH1_MAGNITUDE_QUERY).await?;
        let ch2r_v = self.query_value(CH2_MAGNITUDE_QUERY).await?;
        Ok(RawReadings {
            src_v,
            ch1r_v,
            ch2r_v,
        })
    }

    async fn query_value(&mut self, command: &str) -> AppResult<f64> {
        let response = self
            .bus
            .query(command)
            .await
            .map_err(|err| DaqError::Bus(format!("{command} failed: {err:#}")))?;
        parse_first_token(command, &response)
    }
}

/// Parse the first whitespace-delimited token of a response as f64.
fn parse_first_token(command: &str, response: &str) -> AppResult<f64> {
    let token = response
        .split_whitespace()
        .next()
        .ok_or_else(|| DaqError::Parse(format!("empty response to {command}")))?;
    token.parse::<f64>().map_err(|_| {
        DaqError::Parse(format!(
            "response to {command} is not numeric: '{token}'"
        ))
    })
}

/// Log the configured lock-in settings as a manual-setup checklist.
pub fn front_panel_checklist(settings: &LockinSettings) {
    info!("Lock-in setup is manual; confirm on the front panel:");
    info!("  time constant code {} (manual p. 6-14)", settings.time_constant);
    info!("  sensitivity code {} (manual p. 6-11)", settings.sensitivity);
    info!(
        "  oscillator {} Hz at {} uV, shunt {} ohm in series",
        settings.frequency_hz, settings.amplitude_uv, settings.shunt_ohm
    );
}
