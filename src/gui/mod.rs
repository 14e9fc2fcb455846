//! The eframe/egui implementation for the live run window.
//!
//! The window mirrors what the acquisition engine records, nothing
//! more: it subscribes to the engine's sample broadcast and renders
//! whatever has arrived since the last frame. Acquisition never waits
//! on rendering; if the window falls behind, the broadcast channel
//! drops the oldest samples for this subscriber only and the CSV on
//! disk stays complete.
//!
//! Layout:
//!
//! - `TopBottomPanel` (top): run state, sample count, the latest
//!   reading and the Stop button.
//! - `CentralPanel`: a fixed 2x2 chart grid. Resistivity vs T and the
//!   channel magnitudes vs T as scatter series (temperature sweeps run
//!   both ways, a line would zigzag), temperature and field vs elapsed
//!   time as lines.
//! - `SidePanel` (right): a table of the most recent samples.
//! - `TopBottomPanel` (bottom): the filterable event log panel.
//!
//! Closing the window requests an engine stop, like Ctrl-C, and then
//! closes; the engine finishes its in-flight iteration on the runtime
//! and the binary waits for it before exiting.

mod log_panel;

use crate::acquisition::{EngineState, StopHandle};
use crate::log_capture::LogBuffer;
use crate::sample::Sample;
use eframe::egui;
use egui_extras::{Column, Size, StripBuilder, TableBuilder};
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};
use log::warn;
use log_panel::LogPanel;
use std::collections::VecDeque;
use tokio::sync::{broadcast, watch};

const PLOT_DATA_CAPACITY: usize = 100_000;
const RECENT_ROWS: usize = 8;

/// Plot series built incrementally from the sample stream.
#[derive(Default)]
struct PlotBuffers {
    resistivity_vs_t: VecDeque<[f64; 2]>,
    ch1r_vs_t: VecDeque<[f64; 2]>,
    ch2r_vs_t: VecDeque<[f64; 2]>,
    temperature_vs_time: VecDeque<[f64; 2]>,
    field_vs_time: VecDeque<[f64; 2]>,
    recent: VecDeque<Sample>,
    first_timestamp: f64,
    total: usize,
}

impl PlotBuffers {
    fn push(&mut self, sample: Sample) {
        let timestamp = sample.time_s();
        if self.first_timestamp == 0.0 {
            self.first_timestamp = timestamp;
        }
        let elapsed = timestamp - self.first_timestamp;

        push_capped(
            &mut self.resistivity_vs_t,
            [sample.temperature_k, sample.resistivity_ohm_m],
        );
        push_capped(&mut self.ch1r_vs_t, [sample.temperature_k, sample.ch1r_v]);
        push_capped(&mut self.ch2r_vs_t, [sample.temperature_k, sample.ch2r_v]);
        push_capped(
            &mut self.temperature_vs_time,
            [elapsed, sample.temperature_k],
        );
        push_capped(&mut self.field_vs_time, [elapsed, sample.field_oe]);

        if self.recent.len() >= RECENT_ROWS {
            self.recent.pop_front();
        }
        self.recent.push_back(sample);
        self.total += 1;
    }

    fn latest(&self) -> Option<&Sample> {
        self.recent.back()
    }

    fn len(&self) -> usize {
        self.total
    }
}

fn push_capped(series: &mut VecDeque<[f64; 2]>, point: [f64; 2]) {
    if series.len() >= PLOT_DATA_CAPACITY {
        series.pop_front();
    }
    series.push_back(point);
}

fn plot_points(series: &VecDeque<[f64; 2]>) -> PlotPoints {
    series.iter().copied().collect()
}

/// The main window.
pub struct RunGui {
    sample_receiver: broadcast::Receiver<Sample>,
    state_receiver: watch::Receiver<EngineState>,
    stop: StopHandle,
    log_buffer: LogBuffer,
    log_panel: LogPanel,
    buffers: PlotBuffers,
}

impl RunGui {
    /// Creates the window against an already-running engine's channels.
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        sample_receiver: broadcast::Receiver<Sample>,
        state_receiver: watch::Receiver<EngineState>,
        stop: StopHandle,
        log_buffer: LogBuffer,
    ) -> Self {
        Self {
            sample_receiver,
            state_receiver,
            stop,
            log_buffer,
            log_panel: LogPanel::default(),
            buffers: PlotBuffers::default(),
        }
    }

    /// Drains everything the engine has published since the last frame.
    fn update_data(&mut self) {
        loop {
            match self.sample_receiver.try_recv() {
                Ok(sample) => self.buffers.push(sample),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Plot stream lagged; {n} samples were not plotted");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
    }

    fn resistivity_plot(&self, ui: &mut egui::Ui) {
        Plot::new("resistivity_vs_t")
            .x_axis_label("T (K)")
            .y_axis_label("resistivity (ohm m)")
            .show(ui, |plot_ui| {
                plot_ui.points(
                    Points::new(plot_points(&self.buffers.resistivity_vs_t))
                        .radius(2.0)
                        .name("rho"),
                );
            });
    }

    fn channel_plot(&self, ui: &mut egui::Ui) {
        Plot::new("channels_vs_t")
            .x_axis_label("T (K)")
            .y_axis_label("magnitude (V)")
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                plot_ui.points(
                    Points::new(plot_points(&self.buffers.ch1r_vs_t))
                        .radius(2.0)
                        .name("Ch1R"),
                );
                plot_ui.points(
                    Points::new(plot_points(&self.buffers.ch2r_vs_t))
                        .radius(2.0)
                        .name("Ch2R"),
                );
            });
    }

    fn temperature_plot(&self, ui: &mut egui::Ui) {
        Plot::new("temperature_vs_time")
            .x_axis_label("t (s)")
            .y_axis_label("T (K)")
            .show(ui, |plot_ui| {
                plot_ui.line(Line::new(plot_points(&self.buffers.temperature_vs_time)));
            });
    }

    fn field_plot(&self, ui: &mut egui::Ui) {
        Plot::new("field_vs_time")
            .x_axis_label("t (s)")
            .y_axis_label("H (Oe)")
            .show(ui, |plot_ui| {
                plot_ui.line(Line::new(plot_points(&self.buffers.field_vs_time)));
            });
    }

    fn recent_samples_table(&self, ui: &mut egui::Ui) {
        ui.heading("Recent Samples");
        ui.separator();
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::auto())
            .columns(Column::remainder(), 4)
            .header(18.0, |mut header| {
                for title in ["Time", "T (K)", "H (Oe)", "R (ohm)", "rho (ohm m)"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for sample in self.buffers.recent.iter().rev() {
                    body.row(16.0, |mut row| {
                        row.col(|ui| {
                            ui.monospace(
                                sample
                                    .timestamp
                                    .with_timezone(&chrono::Local)
                                    .format("%H:%M:%S")
                                    .to_string(),
                            );
                        });
                        row.col(|ui| {
                            ui.monospace(format!("{:.3}", sample.temperature_k));
                        });
                        row.col(|ui| {
                            ui.monospace(format!("{:.1}", sample.field_oe));
                        });
                        row.col(|ui| {
                            ui.monospace(format!("{:.4e}", sample.resistance_ohm));
                        });
                        row.col(|ui| {
                            ui.monospace(format!("{:.4e}", sample.resistivity_ohm_m));
                        });
                    });
                }
            });
    }
}

impl eframe::App for RunGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_data();

        if ctx.input(|i| i.viewport().close_requested()) {
            self.stop.request_stop();
        }

        let state = *self.state_receiver.borrow();

        egui::TopBottomPanel::bottom("log_panel")
            .resizable(true)
            .min_height(150.0)
            .show(ctx, |ui| {
                self.log_panel.ui(ui, &self.log_buffer);
            });

        egui::TopBottomPanel::top("status_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Resistivity Logger");
                ui.separator();
                ui.label(format!("State: {state}"));
                ui.separator();
                ui.label(format!("Samples: {}", self.buffers.len()));
                if let Some(sample) = self.buffers.latest() {
                    ui.separator();
                    ui.monospace(format!(
                        "T = {:.3} K  H = {:.1} Oe  R = {:.4e} ohm  rho = {:.4e} ohm m",
                        sample.temperature_k,
                        sample.field_oe,
                        sample.resistance_ohm,
                        sample.resistivity_ohm_m
                    ));
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if state == EngineState::Stopped {
                        ui.label("Run finished");
                    } else if ui.button("Stop").clicked() {
                        self.stop.request_stop();
                    }
                });
            });
        });

        egui::SidePanel::right("recent_samples")
            .resizable(true)
            .min_width(320.0)
            .show(ctx, |ui| {
                self.recent_samples_table(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            StripBuilder::new(ui)
                .size(Size::remainder())
                .size(Size::remainder())
                .vertical(|mut strip| {
                    strip.strip(|builder| {
                        builder
                            .size(Size::remainder())
                            .size(Size::remainder())
                            .horizontal(|mut strip| {
                                strip.cell(|ui| {
                                    self.resistivity_plot(ui);
                                });
                                strip.cell(|ui| {
                                    self.channel_plot(ui);
                                });
                            });
                    });
                    strip.strip(|builder| {
                        builder
                            .size(Size::remainder())
                            .size(Size::remainder())
                            .horizontal(|mut strip| {
                                strip.cell(|ui| {
                                    self.temperature_plot(ui);
                                });
                                strip.cell(|ui| {
                                    self.field_plot(ui);
                                });
                            });
                    });
                });
        });

        // Samples arrive without user input; keep the frame loop going.
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
