//! CSV persistence and startup file handling.
//!
//! One CSV row per sample, append-only. The header is written only when
//! the write position at open is the start of the file, so a run appended
//! to an existing CSV continues it seamlessly and a fresh file starts
//! with column names. Rows are flushed as they are written; an
//! interrupted run keeps every completed row.

use crate::sample::Sample;
use anyhow::{Context, Result};
use log::info;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Column order of the output CSV.
pub const CSV_HEADER: [&str; 8] = [
    "time",
    "src",
    "ch1r",
    "ch2r",
    "temp",
    "field",
    "resistance",
    "resistivity",
];

/// Append-only CSV writer for measurement rows.
pub struct CsvLogger {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvLogger {
    /// Open (or create) the output CSV in append mode, emitting the
    /// header row only if the file is empty.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output CSV at {:?}", path))?;

        // Append mode positions writes at the end; the size tells us
        // whether a header is already present.
        let position = file
            .seek(SeekFrom::End(0))
            .context("Failed to locate end of output CSV")?;
        let header_pending = position == 0;

        let mut writer = csv::Writer::from_writer(file);
        if header_pending {
            writer
                .write_record(CSV_HEADER)
                .context("Failed to write CSV header")?;
            writer.flush().context("Failed to flush CSV header")?;
            info!("Started new CSV at '{}'", path.display());
        } else {
            info!("Appending to existing CSV at '{}'", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    /// Append one sample as a CSV row and flush it to disk.
    pub fn append(&mut self, sample: &Sample) -> Result<()> {
        self.writer
            .write_record(&[
                sample.timestamp.to_rfc3339(),
                sample.src_v.to_string(),
                sample.ch1r_v.to_string(),
                sample.ch2r_v.to_string(),
                sample.temperature_k.to_string(),
                sample.field_oe.to_string(),
                sample.resistance_ohm.to_string(),
                sample.resistivity_ohm_m.to_string(),
            ])
            .context("Failed to write sample to CSV file")?;
        self.writer.flush().context("Failed to flush CSV writer")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// If a leftover MPMS log exists, ask the operator whether to delete it.
///
/// Returns `true` only when the file existed and was deleted. Only the
/// exact answer `y` deletes; anything else (including `Y`) leaves the
/// file untouched, and new-data detection then starts from the caller's
/// cursor state. `assume_yes` answers affirmatively without prompting,
/// for unattended runs.
pub fn confirm_delete_mpms_log(
    path: &Path,
    assume_yes: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    if !assume_yes {
        write!(output, "MPMS data file already exists. Delete? [y/N]: ")
            .context("Failed to write prompt")?;
        output.flush().context("Failed to flush prompt")?;

        let mut answer = String::new();
        input
            .read_line(&mut answer)
            .context("Failed to read prompt answer")?;
        if answer.trim() != "y" {
            info!("Keeping existing MPMS log '{}'", path.display());
            return Ok(false);
        }
    }

    fs::remove_file(path)
        .with_context(|| format!("Failed to delete MPMS log at {:?}", path))?;
    info!("Deleted leftover MPMS log '{}'", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn sample() -> Sample {
        Sample {
            timestamp: Utc::now(),
            src_v: 2.0,
            ch1r_v: 1.0,
            ch2r_v: 0.5,
            temperature_k: 77.4,
            field_oe: 100.0,
            resistance_ohm: 5031.0,
            resistivity_ohm_m: 5031.0,
        }
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_written_once_for_fresh_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut logger = CsvLogger::open(&path).unwrap();
        logger.append(&sample()).unwrap();
        logger.append(&sample()).unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");

        {
            let mut logger = CsvLogger::open(&path).unwrap();
            logger.append(&sample()).unwrap();
        }
        {
            let mut logger = CsvLogger::open(&path).unwrap();
            logger.append(&sample()).unwrap();
            logger.append(&sample()).unwrap();
        }

        let lines = lines(&path);
        assert_eq!(lines.len(), 4);
        let headers = lines
            .iter()
            .filter(|l| l.starts_with("time,"))
            .count();
        assert_eq!(headers, 1);
    }

    #[test]
    fn test_row_contains_all_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut logger = CsvLogger::open(&path).unwrap();
        logger.append(&sample()).unwrap();

        let lines = lines(&path);
        assert_eq!(lines[1].split(',').count(), CSV_HEADER.len());
        assert!(lines[1].contains("77.4"));
        assert!(lines[1].contains("5031"));
    }

    #[test]
    fn test_prompt_skipped_when_file_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.dc.dat");
        let mut input = Cursor::new(b"y\n".to_vec());
        let mut output = Vec::new();

        let deleted = confirm_delete_mpms_log(&path, false, &mut input, &mut output).unwrap();
        assert!(!deleted);
        assert!(output.is_empty());
    }

    #[test]
    fn test_exact_y_deletes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.dc.dat");
        fs::write(&path, "0,0,1.0,2.0\n").unwrap();
        let mut input = Cursor::new(b"y\n".to_vec());
        let mut output = Vec::new();

        let deleted = confirm_delete_mpms_log(&path, false, &mut input, &mut output).unwrap();
        assert!(deleted);
        assert!(!path.exists());
        let prompt = String::from_utf8(output).unwrap();
        assert_eq!(prompt, "MPMS data file already exists. Delete? [y/N]: ");
    }

    #[test]
    fn test_uppercase_y_keeps_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.dc.dat");
        fs::write(&path, "0,0,1.0,2.0\n").unwrap();
        let mut input = Cursor::new(b"Y\n".to_vec());
        let mut output = Vec::new();

        let deleted = confirm_delete_mpms_log(&path, false, &mut input, &mut output).unwrap();
        assert!(!deleted);
        assert!(path.exists());
    }

    #[test]
    fn test_default_answer_keeps_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.dc.dat");
        fs::write(&path, "0,0,1.0,2.0\n").unwrap();
        let mut input = Cursor::new(b"\n".to_vec());
        let mut output = Vec::new();

        let deleted = confirm_delete_mpms_log(&path, false, &mut input, &mut output).unwrap();
        assert!(!deleted);
        assert!(path.exists());
    }

    #[test]
    fn test_assume_yes_deletes_without_prompting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.dc.dat");
        fs::write(&path, "0,0,1.0,2.0\n").unwrap();
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();

        let deleted = confirm_delete_mpms_log(&path, true, &mut input, &mut output).unwrap();
        assert!(deleted);
        assert!(!path.exists());
        // No prompt text and no read from the input.
        assert!(output.is_empty());
    }

    #[test]
    fn test_assume_yes_with_no_file_is_a_no_op() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.dc.dat");
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();

        let deleted = confirm_delete_mpms_log(&path, true, &mut input, &mut output).unwrap();
        assert!(!deleted);
        assert!(output.is_empty());
    }
}
