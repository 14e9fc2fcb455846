//! Renders the event log panel.
//!
//! The panel shows the shared [`LogBuffer`] as a time-stamped,
//! color-coded, scrollable list with level and text filtering. The
//! buffer captures everything; filtering happens here at display time,
//! so changing the filter never loses history. `ScrollArea::show_rows`
//! renders only the visible rows, which keeps the panel cheap even at
//! the buffer's capacity.

use crate::log_capture::{LogBuffer, LogEntry};
use eframe::egui::{self, Color32, ScrollArea, Ui};
use log::LevelFilter;

/// Per-panel view state. Owned by the main window and fed the shared
/// buffer each frame.
pub struct LogPanel {
    level_filter: LevelFilter,
    filter_text: String,
    scroll_to_bottom: bool,
}

impl Default for LogPanel {
    fn default() -> Self {
        Self {
            level_filter: LevelFilter::Trace,
            filter_text: String::new(),
            scroll_to_bottom: true,
        }
    }
}

impl LogPanel {
    pub fn ui(&mut self, ui: &mut Ui, buffer: &LogBuffer) {
        ui.heading("Event Log");

        ui.horizontal(|ui| {
            ui.label("Filter Level:");
            level_filter_combo_box(ui, &mut self.level_filter);

            ui.label("Filter Text:");
            let _ = ui.text_edit_singleline(&mut self.filter_text);

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Clear").clicked() {
                    buffer.clear();
                }
                ui.toggle_value(&mut self.scroll_to_bottom, "Scroll to Bottom");
            });
        });

        ui.separator();

        let scroll_area = ScrollArea::vertical()
            .auto_shrink([false; 2])
            .stick_to_bottom(self.scroll_to_bottom);
        let text_style = egui::TextStyle::Monospace;
        let row_height = ui.text_style_height(&text_style);

        let logs = buffer.read();
        let filtered_logs: Vec<_> = logs
            .iter()
            .filter(|entry| entry_matches(entry, self.level_filter, &self.filter_text))
            .collect();

        let num_rows = filtered_logs.len();
        scroll_area.show_rows(ui, row_height, num_rows, |ui, row_range| {
            for i in row_range {
                if let Some(entry) = filtered_logs.get(i) {
                    ui.horizontal(|ui| {
                        let level_text = format!("[{:<5}]", entry.level);
                        ui.colored_label(entry.color(), level_text);
                        ui.label(entry.timestamp.format("%H:%M:%S%.3f").to_string());
                        ui.colored_label(Color32::from_gray(150), &entry.target);
                        ui.label(&entry.message);
                    });
                }
            }
        });
    }
}

/// A combo box for selecting the log level filter.
fn level_filter_combo_box(ui: &mut Ui, level_filter: &mut LevelFilter) {
    egui::ComboBox::from_id_salt("log_level_filter")
        .selected_text(format!("{:?}", level_filter))
        .show_ui(ui, |ui| {
            ui.selectable_value(level_filter, LevelFilter::Off, "Off");
            ui.selectable_value(level_filter, LevelFilter::Error, "Error");
            ui.selectable_value(level_filter, LevelFilter::Warn, "Warn");
            ui.selectable_value(level_filter, LevelFilter::Info, "Info");
            ui.selectable_value(level_filter, LevelFilter::Debug, "Debug");
            ui.selectable_value(level_filter, LevelFilter::Trace, "Trace");
        });
}

/// True if an entry passes both the level and the text filter. Text
/// matching is a plain substring test over message and target.
fn entry_matches(entry: &LogEntry, level_filter: LevelFilter, filter_text: &str) -> bool {
    let level_match = entry.level <= level_filter;
    let text_match = filter_text.is_empty()
        || entry.message.contains(filter_text)
        || entry.target.contains(filter_text);
    level_match && text_match
}
