//! Acquisition engine.
//!
//! One [`Acquisition`] value is the whole run context: the lock-in driver,
//! the MPMS log cursor, the sample table, the CSV logger and the outgoing
//! channels all live here, and [`Acquisition::run`] drives the polling
//! loop.
//!
//! Each iteration produces a [`Tick`]:
//!
//! - `Sample`: new MPMS data arrived, the lock-in was read, the
//!   derived sample was persisted and published.
//! - `NoNewData`: the MPMS log had nothing new; retry after a short
//!   pause. Expected, not an error.
//! - `InstrumentError`: the lock-in could not be reached; the iteration
//!   is skipped and the MPMS reading for it is dropped.
//! - `ParseError`: a response or log line arrived but was not numeric;
//!   the iteration is skipped.
//!
//! Only CSV persistence failures abort the run: losing rows silently
//! would defeat the point of the logger. Samples are fanned out over a
//! broadcast channel; rendering never back-pressures acquisition, and a
//! lagging subscriber only loses its own view.
//!
//! Stop requests (Ctrl-C, GUI) are observed at the top of each iteration
//! and wake any in-progress pause early; an in-flight measurement always
//! completes and is recorded first.

use crate::bus::Bus;
use crate::config::Settings;
use crate::error::DaqError;
use crate::lockin::Lockin;
use crate::mpms::{self, LogCursor, Poll};
use crate::resistivity;
use crate::sample::{Sample, SampleTable};
use crate::storage::CsvLogger;
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Capacity of the sample broadcast channel behind [`Acquisition::subscribe`].
///
/// A subscriber that falls further behind than this loses the oldest
/// samples from its own view only; the table and CSV keep every row.
pub const SAMPLE_CHANNEL_CAPACITY: usize = 1024;

/// Observable state of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed but not yet running.
    Idle,
    /// Polling the MPMS log for a new line.
    AwaitingNewData,
    /// Querying the lock-in.
    Measuring,
    /// Appending the sample to the CSV and table.
    Recording,
    /// Sample published; pausing until the next poll.
    Plotting,
    /// The run has ended; no further samples will appear.
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::AwaitingNewData => "awaiting new data",
            EngineState::Measuring => "measuring",
            EngineState::Recording => "recording",
            EngineState::Plotting => "plotting",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Outcome of one loop iteration.
#[derive(Debug)]
pub enum Tick {
    /// A sample was measured, persisted and published.
    Sample(Sample),
    /// The MPMS log had nothing new.
    NoNewData,
    /// The lock-in could not be read; the iteration was skipped.
    InstrumentError(DaqError),
    /// A response or log line was not numeric; the iteration was skipped.
    ParseError(DaqError),
}

/// Cloneable handle that requests the run to stop.
#[derive(Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Ask the loop to end after the current iteration.
    pub fn request_stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// The run context: owns every piece of state the loop touches.
pub struct Acquisition<B: Bus> {
    settings: Settings,
    lockin: Lockin<B>,
    table: SampleTable,
    cursor: LogCursor,
    csv: CsvLogger,
    geometry_factor: f64,
    sample_tx: broadcast::Sender<Sample>,
    state_tx: watch::Sender<EngineState>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl<B: Bus> Acquisition<B> {
    /// Build a run context. Validates the settings and opens the output
    /// CSV up front so a misconfigured run fails before touching the
    /// instrument.
    pub fn new(settings: Settings, bus: B) -> Result<Self> {
        settings.validate()?;
        let csv = CsvLogger::open(&settings.paths.output_csv)?;
        let geometry_factor = resistivity::geometry_factor(
            settings.sample.cross_section_1_mm,
            settings.sample.cross_section_2_mm,
            settings.sample.length_mm,
        );

        let (sample_tx, _) = broadcast::channel(SAMPLE_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(EngineState::Idle);
        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Self {
            settings,
            lockin: Lockin::new(bus),
            table: SampleTable::new(),
            cursor: LogCursor::new(),
            csv,
            geometry_factor,
            sample_tx,
            state_tx,
            stop_tx,
            stop_rx,
        })
    }

    /// Subscribe to the stream of recorded samples.
    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.sample_tx.subscribe()
    }

    /// Watch the engine state for status displays.
    pub fn state_watch(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Handle for requesting a stop from another task or thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Samples recorded so far.
    pub fn table(&self) -> &SampleTable {
        &self.table
    }

    /// One pass of the read-measure-record sequence.
    ///
    /// Recoverable conditions come back inside the [`Tick`]; an `Err`
    /// means persisting a measured sample failed and the run must end.
    pub async fn tick(&mut self) -> Result<Tick> {
        let (temperature_k, field_oe) =
            match mpms::read_latest(&self.settings.paths.mpms_log, &mut self.cursor) {
                Ok(Poll::NoNewData) => return Ok(Tick::NoNewData),
                Ok(Poll::Reading {
                    temperature_k,
                    field_oe,
                }) => (temperature_k, field_oe),
                Err(err) => return Ok(Tick::ParseError(err)),
            };

        self.set_state(EngineState::Measuring);
        let raw = match self.lockin.read_magnitudes().await {
            Ok(raw) => raw,
            Err(err @ DaqError::Parse(_)) => return Ok(Tick::ParseError(err)),
            Err(err) => return Ok(Tick::InstrumentError(err)),
        };

        let derived = resistivity::derive(
            raw.src_v,
            raw.ch1r_v,
            self.settings.lockin.shunt_ohm,
            self.geometry_factor,
        );
        let sample = Sample {
            timestamp: Utc::now(),
            src_v: raw.src_v,
            ch1r_v: raw.ch1r_v,
            ch2r_v: raw.ch2r_v,
            temperature_k,
            field_oe,
            resistance_ohm: derived.resistance_ohm,
            resistivity_ohm_m: derived.resistivity_ohm_m,
        };

        // CSV first, table second: a row exists on disk for every table
        // entry even if the run dies between the two.
        self.set_state(EngineState::Recording);
        self.csv
            .append(&sample)
            .context("Recording a sample failed; ending run to avoid silent data loss")?;
        self.table.push(sample.clone());

        if self.sample_tx.send(sample.clone()).is_err() {
            debug!("No live subscribers for samples");
        }
        Ok(Tick::Sample(sample))
    }

    /// Drive the polling loop until a stop is requested.
    ///
    /// Returns the completed sample table.
    pub async fn run(mut self) -> Result<SampleTable> {
        info!(
            "Acquisition started: polling '{}' every {:?}, writing '{}'",
            self.settings.paths.mpms_log.display(),
            self.settings.acquisition.poll_interval,
            self.csv.path().display()
        );

        let poll_interval = self.settings.acquisition.poll_interval;
        let retry_delay = self.settings.acquisition.retry_delay;

        loop {
            // Stop requests are honored here, before a new measurement
            // begins.
            if *self.stop_rx.borrow() {
                break;
            }
            self.set_state(EngineState::AwaitingNewData);

            match self.tick().await? {
                Tick::Sample(sample) => {
                    info!(
                        "Sample {}: T = {:.3} K, H = {:.1} Oe, R = {:.4e} ohm, rho = {:.4e} ohm m",
                        self.table.len(),
                        sample.temperature_k,
                        sample.field_oe,
                        sample.resistance_ohm,
                        sample.resistivity_ohm_m
                    );
                    self.set_state(EngineState::Plotting);
                    self.pause(poll_interval).await;
                }
                Tick::NoNewData => {
                    self.pause(retry_delay).await;
                }
                Tick::InstrumentError(err) => {
                    warn!("Skipping iteration, lock-in unreadable: {err}");
                    self.pause(poll_interval).await;
                }
                Tick::ParseError(err) => {
                    warn!("Skipping iteration, unparseable data: {err}");
                    self.pause(poll_interval).await;
                }
            }
        }

        self.set_state(EngineState::Stopped);
        info!("Acquisition stopped after {} samples", self.table.len());
        Ok(self.table)
    }

    /// Sleep, waking early if a stop is requested meanwhile.
    async fn pause(&mut self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.stop_rx.changed() => {}
        }
    }

    fn set_state(&self, state: EngineState) {
        if *self.state_tx.borrow() != state {
            debug!("Engine state: {state}");
            let _ = self.state_tx.send(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockLockin;
    use std::fs;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        let toml = format!(
            r#"
            log_level = "info"

            [acquisition]
            poll_interval = "20ms"
            retry_delay = "10ms"

            [lockin]
            resource = "GPIB0::12::INSTR"
            timeout = "2s"
            time_constant = 1
            sensitivity = 19
            frequency_hz = 1234.567
            amplitude_uv = 1.0
            shunt_ohm = 10000.0

            [sample]
            cross_section_1_mm = 1000.0
            cross_section_2_mm = 1000.0
            length_mm = 1000.0

            [paths]
            mpms_log = "{}"
            output_csv = "{}"
        "#,
            dir.path().join("data.dc.dat").display(),
            dir.path().join("out.csv").display()
        );
        toml::from_str(&toml).unwrap()
    }

    fn csv_data_rows(dir: &TempDir) -> usize {
        fs::read_to_string(dir.path().join("out.csv"))
            .unwrap()
            .lines()
            .count()
            .saturating_sub(1)
    }

    #[test]
    fn test_new_rejects_invalid_settings() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.sample.length_mm = -1.0;
        assert!(Acquisition::new(settings, MockLockin::new()).is_err());
    }

    #[tokio::test]
    async fn test_tick_without_log_is_no_new_data() {
        let dir = TempDir::new().unwrap();
        let mut engine =
            Acquisition::new(settings_in(&dir), MockLockin::new().with_phase(0.0)).unwrap();
        assert!(matches!(engine.tick().await.unwrap(), Tick::NoNewData));
        assert!(engine.table().is_empty());
    }

    #[tokio::test]
    async fn test_tick_records_derived_sample() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        fs::write(&settings.paths.mpms_log, "0,0,100.0,77.4\n").unwrap();

        let mut mock = MockLockin::new().with_phase(0.0);
        mock.push_response("2.0");
        mock.push_response("1.0 0");
        mock.push_response("0.5");
        let mut engine = Acquisition::new(settings, mock).unwrap();

        let tick = engine.tick().await.unwrap();
        let sample = match tick {
            Tick::Sample(sample) => sample,
            other => panic!("expected a sample, got {other:?}"),
        };
        assert_eq!(sample.temperature_k, 77.4);
        assert_eq!(sample.field_oe, 100.0);
        // 1.0 V over 2.0/10062 A.
        assert!((sample.resistance_ohm - 5031.0).abs() < 0.5);
        assert_eq!(engine.table().len(), 1);
        assert_eq!(csv_data_rows(&dir), 1);
    }

    #[tokio::test]
    async fn test_instrument_fault_leaves_table_and_csv_unchanged() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        fs::write(&settings.paths.mpms_log, "0,0,100.0,77.4\n").unwrap();

        let mut mock = MockLockin::new().with_phase(0.0);
        mock.push_error("GPIB timeout");
        let mut engine = Acquisition::new(settings, mock).unwrap();

        let tick = engine.tick().await.unwrap();
        assert!(matches!(tick, Tick::InstrumentError(DaqError::Bus(_))));
        assert!(engine.table().is_empty());
        assert_eq!(csv_data_rows(&dir), 0);
    }

    #[tokio::test]
    async fn test_malformed_lockin_response_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        fs::write(&settings.paths.mpms_log, "0,0,100.0,77.4\n").unwrap();

        let mut mock = MockLockin::new().with_phase(0.0);
        mock.push_response("OVLD");
        let mut engine = Acquisition::new(settings, mock).unwrap();

        let tick = engine.tick().await.unwrap();
        assert!(matches!(tick, Tick::ParseError(DaqError::Parse(_))));
        assert!(engine.table().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_mpms_line_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        fs::write(&settings.paths.mpms_log, "0,0,oops,77.4\n").unwrap();

        let mut engine =
            Acquisition::new(settings, MockLockin::new().with_phase(0.0)).unwrap();
        let tick = engine.tick().await.unwrap();
        assert!(matches!(tick, Tick::ParseError(DaqError::Parse(_))));
    }

    #[tokio::test]
    async fn test_consumed_reading_is_not_remeasured() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        fs::write(&settings.paths.mpms_log, "0,0,100.0,77.4\n").unwrap();

        let mut engine =
            Acquisition::new(settings, MockLockin::new().with_phase(0.0)).unwrap();
        assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));
        // Same log contents again: nothing new.
        assert!(matches!(engine.tick().await.unwrap(), Tick::NoNewData));
        assert_eq!(engine.table().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_request_and_reports_stopped() {
        let dir = TempDir::new().unwrap();
        let engine =
            Acquisition::new(settings_in(&dir), MockLockin::new().with_phase(0.0)).unwrap();
        let stop = engine.stop_handle();
        let mut state_rx = engine.state_watch();

        let task = tokio::spawn(engine.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.request_stop();

        let table = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(table.is_empty());
        // Watch holds the last value sent.
        assert_eq!(*state_rx.borrow_and_update(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_sample() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        fs::write(&settings.paths.mpms_log, "0,0,100.0,77.4\n").unwrap();

        let mut engine =
            Acquisition::new(settings, MockLockin::new().with_phase(0.0)).unwrap();
        let mut rx = engine.subscribe();

        engine.tick().await.unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(received.temperature_k, 77.4);
    }
}
