//! Run manifest: provenance for each measurement run.
//!
//! A [`RunManifest`] snapshots everything needed to interpret the CSV
//! later: the configured lock-in settings (which are applied manually on
//! the front panel), the sample geometry and derived factor, file paths,
//! and which machine/software produced the data. It is written once at
//! startup as pretty JSON beside the output CSV.

use crate::config::{LockinSettings, SampleSettings, Settings};
use crate::resistivity;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Provenance record for one measurement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Unique id for this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Machine the run was recorded on.
    pub hostname: String,
    /// Version of this software.
    pub software_version: String,
    /// Lock-in settings as configured (set manually on the front panel).
    pub lockin: LockinSettings,
    /// Sample geometry in millimeters.
    pub sample: SampleSettings,
    /// Resistance-to-resistivity factor derived from the geometry.
    pub geometry_factor: f64,
    /// MPMS log polled during the run.
    pub mpms_log: PathBuf,
    /// CSV the samples were appended to.
    pub output_csv: PathBuf,
}

impl RunManifest {
    /// Build a manifest for a run about to start with these settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            hostname,
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            lockin: settings.lockin.clone(),
            sample: settings.sample,
            geometry_factor: resistivity::geometry_factor(
                settings.sample.cross_section_1_mm,
                settings.sample.cross_section_2_mm,
                settings.sample.length_mm,
            ),
            mpms_log: settings.paths.mpms_log.clone(),
            output_csv: settings.paths.output_csv.clone(),
        }
    }

    /// Sidecar path for a given CSV, e.g. `run.csv` -> `run.manifest.json`.
    pub fn sidecar_path(csv_path: &Path) -> PathBuf {
        csv_path.with_extension("manifest.json")
    }

    /// Write the manifest as pretty JSON next to the output CSV.
    pub fn write_beside(&self, csv_path: &Path) -> Result<PathBuf> {
        let path = Self::sidecar_path(csv_path);
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize run manifest to JSON")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write run manifest at {:?}", path))?;
        Ok(path)
    }
}
