//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of errors a measurement run
//! can produce, from I/O and configuration issues to instrument-specific
//! problems.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically file
//!   parsing or format issues in `config/*.toml`.
//! - **`Configuration`**: Semantic errors in the configuration, such as
//!   values that parse fine but are logically invalid (zero shunt chain,
//!   nonpositive sample dimensions). Caught during the validation step.
//! - **`Io`**: Wraps standard `std::io::Error`, covering CSV and manifest
//!   file handling.
//! - **`Bus`**: Communication failures on the instrument bus (VISA/GPIB
//!   round-trip errors, timeouts). Per-iteration recoverable.
//! - **`Parse`**: A response or log line that arrived intact but did not
//!   contain the expected numeric fields. Per-iteration recoverable, and
//!   deliberately distinct from `Bus` so callers can tell a dead cable
//!   from a confused instrument.
//! - **`VisaFeatureDisabled`**: Returned when VISA communication is
//!   requested but the `instrument_visa` feature was not compiled in.
//!
//! By using `#[from]`, `DaqError` can be seamlessly created from underlying
//! error types, simplifying error handling with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument bus error: {0}")]
    Bus(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("VISA support not enabled. Rebuild with --features instrument_visa")]
    VisaFeatureDisabled,
}
