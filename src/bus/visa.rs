//! VISA transport for GPIB/USB/Ethernet instruments.
//!
//! Wraps the `visa-rs` crate and provides async I/O by running the
//! synchronous VISA calls on Tokio's blocking executor. Compiled against
//! real hardware support only with `--features instrument_visa`; without
//! the feature every operation reports the missing feature instead.

use super::Bus;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use anyhow::Context;
#[cfg(feature = "instrument_visa")]
use log::debug;
#[cfg(feature = "instrument_visa")]
use std::sync::Arc;
#[cfg(feature = "instrument_visa")]
use tokio::sync::Mutex;

#[cfg(feature = "instrument_visa")]
use visa_rs::{DefaultRM, Instrument, VISA};

/// VISA-backed instrument bus.
///
/// Supports resource strings like:
/// - "GPIB0::12::INSTR" (GPIB interface)
/// - "USB0::0x1234::0x5678::SERIAL::INSTR" (USB)
/// - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
pub struct VisaBus {
    /// VISA resource string (e.g., "GPIB0::12::INSTR")
    pub(crate) resource_string: String,

    /// Read/write timeout
    pub(crate) timeout: Duration,

    /// Line terminator for commands
    pub(crate) line_terminator: String,

    /// The open VISA session (behind Arc<Mutex> for the blocking tasks)
    #[cfg(feature = "instrument_visa")]
    instrument: Option<Arc<Mutex<Box<dyn Instrument>>>>,
}

impl VisaBus {
    /// Create a bus for the given resource with default settings.
    pub fn new(resource_string: String) -> Self {
        Self {
            resource_string,
            timeout: Duration::from_secs(2),
            line_terminator: "\n".to_string(),
            #[cfg(feature = "instrument_visa")]
            instrument: None,
        }
    }

    /// Set the read/write timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the command line terminator.
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Open the VISA resource.
    #[cfg(feature = "instrument_visa")]
    pub async fn connect(&mut self) -> Result<()> {
        let resource_str = self.resource_string.clone();
        let timeout_ms = self.timeout.as_millis() as u32;

        let instrument = tokio::task::spawn_blocking(move || {
            let rm = DefaultRM::new().context("Failed to create VISA resource manager")?;

            let instr = rm
                .open(&resource_str, timeout_ms, 0)
                .with_context(|| format!("Failed to open VISA resource: {}", resource_str))?;

            Ok::<Box<dyn Instrument>, anyhow::Error>(instr)
        })
        .await
        .context("VISA open task panicked")??;

        self.instrument = Some(Arc::new(Mutex::new(instrument)));

        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            self.resource_string,
            self.timeout.as_millis()
        );
        Ok(())
    }

    #[cfg(not(feature = "instrument_visa"))]
    pub async fn connect(&mut self) -> Result<()> {
        Err(anyhow!(crate::error::DaqError::VisaFeatureDisabled))
    }

    /// Close the VISA resource. Safe to call when not connected.
    pub async fn disconnect(&mut self) {
        #[cfg(feature = "instrument_visa")]
        if self.instrument.is_some() {
            self.instrument = None;
            debug!("VISA resource '{}' closed", self.resource_string);
        }
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_visa")]
        {
            self.instrument.is_some()
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            false
        }
    }

    /// Human-readable connection summary.
    pub fn info(&self) -> String {
        format!(
            "VisaBus({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}

#[async_trait]
impl Bus for VisaBus {
    #[cfg(feature = "instrument_visa")]
    async fn query(&mut self, command: &str) -> Result<String> {
        let instrument = self
            .instrument
            .as_ref()
            .ok_or_else(|| anyhow!("VISA instrument not connected"))?;

        let command_str = format!("{}{}", command, self.line_terminator);
        let command_for_log = command.to_string();
        let instrument_clone = instrument.clone();
        let timeout = self.timeout;

        // Blocking VISA I/O stays off the async runtime.
        tokio::task::spawn_blocking(move || {
            let mut instr_guard = instrument_clone.blocking_lock();

            instr_guard
                .set_timeout(timeout.as_millis() as u32)
                .context("Failed to set VISA timeout")?;

            let response = instr_guard
                .query(&command_str)
                .with_context(|| format!("VISA query failed for: {}", command_for_log))?;

            let response = response.trim().to_string();
            debug!("VISA query '{}' -> '{}'", command_for_log.trim(), response);
            Ok(response)
        })
        .await
        .context("VISA I/O task panicked")?
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn query(&mut self, _command: &str) -> Result<String> {
        Err(anyhow!(crate::error::DaqError::VisaFeatureDisabled))
    }

    #[cfg(feature = "instrument_visa")]
    async fn write(&mut self, command: &str) -> Result<()> {
        let instrument = self
            .instrument
            .as_ref()
            .ok_or_else(|| anyhow!("VISA instrument not connected"))?;

        let command_str = format!("{}{}", command, self.line_terminator);
        let command_for_log = command.to_string();
        let instrument_clone = instrument.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let mut instr_guard = instrument_clone.blocking_lock();

            instr_guard
                .set_timeout(timeout.as_millis() as u32)
                .context("Failed to set VISA timeout")?;

            instr_guard
                .write(&command_str)
                .with_context(|| format!("VISA write failed for: {}", command_for_log))?;

            debug!("VISA write sent: {}", command_for_log.trim());
            Ok(())
        })
        .await
        .context("VISA write task panicked")?
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn write(&mut self, _command: &str) -> Result<()> {
        Err(anyhow!(crate::error::DaqError::VisaFeatureDisabled))
    }
}
