//! Core library for the resistivity-daq application.
//!
//! Polls an MPMS MultiVu log for temperature and field, reads a lock-in
//! amplifier over GPIB for the four-point voltage, derives resistance
//! and resistivity, and appends every sample to a CSV log. The `rdaq`
//! binary wires these pieces to a live plotting window; the library is
//! usable headless as well.

pub mod acquisition;
pub mod bus;
pub mod config;
pub mod error;
pub mod gui;
pub mod lockin;
pub mod log_capture;
pub mod metadata;
pub mod mpms;
pub mod resistivity;
pub mod sample;
pub mod storage;
