use eframe::egui::{self, ColorImage, TextureOptions, Ui};
use egui_plot::{Plot, PlotImage, PlotPoint};

use crate::state::ViewerState;

// ---------------------------------------------------------------------------
// Grid plot (central panel)
// ---------------------------------------------------------------------------

/// Render the current grid raster, zoomable and draggable, without axes.
pub fn grid_plot(ui: &mut Ui, state: &mut ViewerState) {
    let Some(raster) = &state.raster else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a grid image or a dataset  (File → Open…)");
        });
        return;
    };

    let (width, height) = raster.dimensions();
    let texture = state.texture.get_or_insert_with(|| {
        let pixels = ColorImage::from_rgb([width as usize, height as usize], raster.as_raw());
        ui.ctx()
            .load_texture("prediction_grid", pixels, TextureOptions::NEAREST)
    });

    if !state.title.is_empty() {
        ui.label(&state.title);
    }

    let (w, h) = (f64::from(width), f64::from(height));
    Plot::new("grid_plot")
        .data_aspect(1.0)
        .show_axes(false)
        .show_grid(false)
        .show_x(false)
        .show_y(false)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            let image = PlotImage::new(
                texture.id(),
                PlotPoint::new(w / 2.0, h / 2.0),
                egui::vec2(width as f32, height as f32),
            );
            plot_ui.image(image);
        });
}
