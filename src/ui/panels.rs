use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use crate::data::LoadMode;
use crate::state::ViewerState;

// ---------------------------------------------------------------------------
// Left side panel – per-cell legends
// ---------------------------------------------------------------------------

/// Render the left panel: dataset summary and one legend row per cell.
pub fn side_panel(ui: &mut Ui, state: &ViewerState) {
    if let Some(ds) = &state.dataset {
        ui.heading("Dataset");
        ui.separator();
        for (index, batch) in ds.batches.iter().enumerate() {
            ui.label(format!("batch {index}: {} events", batch.n_events));
        }
        ui.strong(format!("total: {} events", ds.len()));
        ui.add_space(8.0);
    }

    ui.heading("Legend");
    ui.separator();

    let Some(grid) = &state.grid else {
        ui.label("No grid loaded.");
        return;
    };

    ScrollArea::horizontal().show(ui, |ui: &mut Ui| {
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::auto())
            .column(Column::remainder())
            .header(20.0, |mut header| {
                for title in ["cell", "role", "sample", "min", "max", "caption"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for (index, cell) in grid.cells.iter().enumerate() {
                    body.row(18.0, |mut row| {
                        row.col(|ui| {
                            ui.label(index.to_string());
                        });
                        row.col(|ui| {
                            ui.label(cell.role.label());
                        });
                        row.col(|ui| {
                            ui.label(cell.sample.to_string());
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.4}", cell.scale.min));
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.4}", cell.scale.max));
                        });
                        row.col(|ui| {
                            ui.label(cell.caption.as_deref().unwrap_or(""));
                        });
                    });
                }
            });
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut ViewerState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open grid image…").clicked() {
                open_image_dialog(state);
                ui.close_menu();
            }
            if ui.button("Open dataset…").clicked() {
                open_dataset_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        let full = state.load_mode == LoadMode::Full;
        if ui.selectable_label(full, "Full set").clicked() {
            state.load_mode = if full { LoadMode::Test } else { LoadMode::Full };
        }

        if let Some(ds) = &state.dataset {
            let fields = ds.image_fields();
            let current = state.preview_field.clone().unwrap_or_default();
            let mut chosen = None;
            egui::ComboBox::from_id_salt("preview_field")
                .selected_text(&current)
                .show_ui(ui, |ui: &mut Ui| {
                    for field in &fields {
                        if ui.selectable_label(current == *field, field).clicked() {
                            chosen = Some(field.clone());
                        }
                    }
                });
            if let Some(field) = chosen {
                state.set_preview_field(field);
            }
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_image_dialog(state: &mut ViewerState) {
    let file = rfd::FileDialog::new()
        .set_title("Open grid image")
        .add_filter("PNG", &["png"])
        .pick_file();

    if let Some(path) = file {
        state.open_image(&path);
    }
}

pub fn open_dataset_dialog(state: &mut ViewerState) {
    let dir = rfd::FileDialog::new()
        .set_title("Open dataset directory")
        .pick_folder();

    if let Some(dir) = dir {
        state.open_dataset(&dir);
    }
}
