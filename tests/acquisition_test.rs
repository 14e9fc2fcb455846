//! End-to-end acquisition tests: a temp-dir MPMS log, the synthetic
//! lock-in and a real CSV on disk. No hardware required.

use resistivity_daq::acquisition::{Acquisition, Tick, SAMPLE_CHANNEL_CAPACITY};
use resistivity_daq::bus::MockLockin;
use resistivity_daq::config::Settings;
use resistivity_daq::error::DaqError;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;

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
        dir.path().join("cu-RvsT-2.csv").display()
    );
    toml::from_str(&toml).unwrap()
}

fn append_mpms_line(path: &Path, line: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    writeln!(file, "{line}").unwrap();
}

fn csv_lines(dir: &TempDir) -> Vec<String> {
    fs::read_to_string(dir.path().join("cu-RvsT-2.csv"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn full_run_records_every_new_reading() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(&dir);
    let mpms_log = settings.paths.mpms_log.clone();

    append_mpms_line(&mpms_log, "0,0,100.0,77.4");
    let mut engine = Acquisition::new(settings, MockLockin::new()).unwrap();

    assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));

    append_mpms_line(&mpms_log, "0,0,90.0,77.3");
    assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));

    // Nothing new in the log now.
    assert!(matches!(engine.tick().await.unwrap(), Tick::NoNewData));

    assert_eq!(engine.table().len(), 2);
    let lines = csv_lines(&dir);
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "time,src,ch1r,ch2r,temp,field,resistance,resistivity"
    );
    assert!(lines[1].contains("77.4"));
    assert!(lines[2].contains("77.3"));
}

#[tokio::test]
async fn csv_and_table_stay_in_step_through_faults() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(&dir);
    let mpms_log = settings.paths.mpms_log.clone();

    let mut mock = MockLockin::new().with_phase(0.0);
    mock.push_response("2.0");
    mock.push_response("1.0 0");
    mock.push_response("0.5");
    mock.push_error("GPIB timeout");

    append_mpms_line(&mpms_log, "0,0,100.0,77.4");
    let mut engine = Acquisition::new(settings, mock).unwrap();

    let first = engine.tick().await.unwrap();
    let sample = match first {
        Tick::Sample(sample) => sample,
        other => panic!("expected a sample, got {other:?}"),
    };
    assert!((sample.resistance_ohm - 5031.0).abs() < 0.5);

    // The lock-in faults on the next reading; the reading is skipped
    // but nothing already recorded is disturbed.
    append_mpms_line(&mpms_log, "0,0,90.0,77.3");
    let second = engine.tick().await.unwrap();
    assert!(matches!(second, Tick::InstrumentError(DaqError::Bus(_))));
    assert_eq!(engine.table().len(), 1);
    assert_eq!(csv_lines(&dir).len(), 2);

    // Recovery: the scripted fault is consumed, synthetic replies
    // resume for the next new reading.
    append_mpms_line(&mpms_log, "0,0,80.0,77.2");
    assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));
    assert_eq!(engine.table().len(), 2);
    assert_eq!(csv_lines(&dir).len(), 3);
}

#[tokio::test]
async fn restart_appends_without_second_header() {
    let dir = TempDir::new().unwrap();

    {
        let settings = settings_in(&dir);
        let mpms_log = settings.paths.mpms_log.clone();
        append_mpms_line(&mpms_log, "0,0,100.0,77.4");
        let mut engine = Acquisition::new(settings, MockLockin::new()).unwrap();
        assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));
    }

    // A fresh engine against the same output file starts a new cursor,
    // re-reads the last MPMS line and keeps appending below the
    // existing rows.
    let settings = settings_in(&dir);
    let mut engine = Acquisition::new(settings, MockLockin::new()).unwrap();
    assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));

    let lines = csv_lines(&dir);
    assert_eq!(lines.len(), 3);
    let headers = lines.iter().filter(|line| line.starts_with("time,")).count();
    assert_eq!(headers, 1);
}

#[tokio::test]
async fn acquisition_does_not_need_a_subscriber() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(&dir);
    let mpms_log = settings.paths.mpms_log.clone();

    append_mpms_line(&mpms_log, "0,0,100.0,77.4");
    let mut engine = Acquisition::new(settings, MockLockin::new()).unwrap();

    // No subscriber: recording still proceeds.
    assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));
    assert_eq!(engine.table().len(), 1);

    // A late subscriber sees only what is published after it joins.
    let mut rx = engine.subscribe();
    append_mpms_line(&mpms_log, "0,0,90.0,77.3");
    assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));

    let received = rx.try_recv().unwrap();
    assert_eq!(received.temperature_k, 77.3);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn undrained_subscriber_lags_without_losing_rows() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(&dir);
    let mpms_log = settings.paths.mpms_log.clone();

    let mut engine = Acquisition::new(settings, MockLockin::new().with_phase(0.0)).unwrap();
    let mut rx = engine.subscribe();

    // Overfill the broadcast channel without ever draining the
    // subscriber. The field column counts the readings.
    let overflow = 6;
    let total = SAMPLE_CHANNEL_CAPACITY + overflow;
    for n in 0..total {
        append_mpms_line(&mpms_log, &format!("0,0,{n},300.0"));
        assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));
    }

    // Acquisition kept every row.
    assert_eq!(engine.table().len(), total);
    assert_eq!(csv_lines(&dir).len(), total + 1);

    // The subscriber's view lost exactly the overflow, oldest first.
    assert!(matches!(
        rx.try_recv(),
        Err(TryRecvError::Lagged(n)) if n == overflow as u64
    ));
    let oldest_retained = rx.try_recv().unwrap();
    assert_eq!(oldest_retained.field_oe, overflow as f64);
}

#[tokio::test]
async fn malformed_mpms_line_is_retried_until_rewritten() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(&dir);
    let mpms_log = settings.paths.mpms_log.clone();

    append_mpms_line(&mpms_log, "0,0,not-a-number,77.4");
    let mut engine = Acquisition::new(settings, MockLockin::new()).unwrap();

    // The cursor does not advance past a line it could not parse, so
    // the same line is reported again next pass.
    assert!(matches!(
        engine.tick().await.unwrap(),
        Tick::ParseError(DaqError::Parse(_))
    ));
    assert!(matches!(
        engine.tick().await.unwrap(),
        Tick::ParseError(DaqError::Parse(_))
    ));

    // Once a good line lands, acquisition resumes.
    append_mpms_line(&mpms_log, "0,0,100.0,77.4");
    assert!(matches!(engine.tick().await.unwrap(), Tick::Sample(_)));
    assert_eq!(engine.table().len(), 1);
}
