//! The `rdaq` binary: four-point resistivity logging against an MPMS
//! temperature/field sweep.
//!
//! Wires the acquisition engine to a lock-in bus (VISA hardware or the
//! synthetic mock), starts the run on a tokio runtime and hands the
//! main thread to the plotting window. `--headless` skips the window
//! and runs until Ctrl-C.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use mimalloc::MiMalloc;
use resistivity_daq::acquisition::Acquisition;
use resistivity_daq::bus::{Bus, MockLockin, VisaBus};
use resistivity_daq::config::Settings;
use resistivity_daq::gui::RunGui;
use resistivity_daq::lockin;
use resistivity_daq::log_capture::{LogBuffer, LogCollector};
use resistivity_daq::metadata::RunManifest;
use resistivity_daq::storage;
use std::io;
use std::path::PathBuf;
use tokio::runtime::Runtime;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Four-point resistivity logger for MPMS runs")]
struct Cli {
    /// Configuration name under config/ (for example "default")
    #[arg(long, value_name = "NAME")]
    config: Option<String>,

    /// Write samples to this CSV instead of the configured path
    #[arg(short = 'f', long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Use the synthetic lock-in instead of VISA hardware
    #[arg(long)]
    mock: bool,

    /// Run without the plotting window
    #[arg(long)]
    headless: bool,

    /// Delete an existing MPMS log without prompting
    #[arg(short = 'y', long)]
    yes: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::new(cli.config.as_deref())
        .context("Failed to load configuration from config/")?;
    if let Some(output) = cli.output {
        settings.paths.output_csv = output;
    }
    settings.validate()?;

    let log_buffer = LogBuffer::new();
    init_logging(&settings.log_level, log_buffer.clone())?;

    info!(
        "Resistivity logger {} starting (config '{}')",
        env!("CARGO_PKG_VERSION"),
        cli.config.as_deref().unwrap_or("default")
    );
    lockin::front_panel_checklist(&settings.lockin);

    prepare_mpms_log(&settings, cli.yes)?;

    let manifest = RunManifest::from_settings(&settings);
    let manifest_path = manifest.write_beside(&settings.paths.output_csv)?;
    info!(
        "Run {} manifest written to '{}'",
        manifest.run_id,
        manifest_path.display()
    );

    let runtime = Runtime::new().context("Failed to start the async runtime")?;

    if cli.mock {
        info!("Using the synthetic lock-in; no hardware will be touched");
        launch(&runtime, settings, MockLockin::new(), cli.headless, log_buffer)
    } else {
        let mut bus = VisaBus::new(settings.lockin.resource.clone())
            .with_timeout(settings.lockin.timeout);
        runtime.block_on(bus.connect())?;
        info!("{}", bus.info());
        launch(&runtime, settings, bus, cli.headless, log_buffer)
    }
}

/// Stderr logging plus the in-process buffer the GUI log panel reads.
fn init_logging(log_level: &str, buffer: LogBuffer) -> Result<()> {
    let stderr_logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .build();
    let collector = LogCollector::new(buffer);
    multi_log::MultiLogger::init(
        vec![Box::new(stderr_logger), Box::new(collector)],
        log::Level::Trace,
    )
    .context("Failed to initialize logging")
}

/// A stale MPMS log would replay an old sweep, so offer to delete it
/// before the run starts. `--yes` answers the prompt affirmatively.
fn prepare_mpms_log(settings: &Settings, assume_yes: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    storage::confirm_delete_mpms_log(
        &settings.paths.mpms_log,
        assume_yes,
        &mut input,
        &mut output,
    )?;
    Ok(())
}

/// Start the engine on the runtime and either hand the main thread to
/// the plot window or wait for the run to finish.
fn launch<B: Bus + 'static>(
    runtime: &Runtime,
    settings: Settings,
    bus: B,
    headless: bool,
    log_buffer: LogBuffer,
) -> Result<()> {
    let output_csv = settings.paths.output_csv.clone();

    let engine = Acquisition::new(settings, bus)?;
    let stop = engine.stop_handle();
    let sample_receiver = engine.subscribe();
    let state_receiver = engine.state_watch();
    let engine_task = runtime.spawn(engine.run());

    {
        let stop = stop.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received; stopping after the current iteration");
                stop.request_stop();
            }
        });
    }

    if headless {
        drop(sample_receiver);
        drop(state_receiver);
        info!("Headless mode; press Ctrl-C to stop");
    } else {
        let native_options = eframe::NativeOptions {
            viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1280.0, 860.0]),
            ..Default::default()
        };
        eframe::run_native(
            "Resistivity Logger",
            native_options,
            Box::new(move |cc| {
                Ok(Box::new(RunGui::new(
                    cc,
                    sample_receiver,
                    state_receiver,
                    stop,
                    log_buffer,
                )))
            }),
        )
        .map_err(|err| anyhow!("Plot window error: {err}"))?;
    }

    let table = runtime
        .block_on(engine_task)
        .context("Acquisition task panicked")??;
    info!(
        "Run complete: {} samples recorded to '{}'",
        table.len(),
        output_csv.display()
    );
    Ok(())
}
