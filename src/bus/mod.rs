//! Instrument bus abstraction.
//!
//! The lock-in amplifier speaks a line-based text protocol over GPIB. The
//! [`Bus`] trait is the seam between the driver and the transport: the real
//! transport is VISA ([`VisaBus`], behind the `instrument_visa` feature),
//! and [`MockLockin`] stands in for development and tests.

use anyhow::Result;
use async_trait::async_trait;

pub mod mock;
pub mod visa;

pub use mock::MockLockin;
pub use visa::VisaBus;

/// Text-level access to a bus-addressed instrument.
///
/// Each call is one synchronous round-trip to the hardware. No caching and
/// no internal retry; retry policy belongs to the caller.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Issue a query command and return the raw response text.
    async fn query(&mut self, command: &str) -> Result<String>;

    /// Issue a command that produces no response.
    async fn write(&mut self, command: &str) -> Result<()>;
}
