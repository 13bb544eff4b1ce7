pub mod panels;
pub mod plot;

use anyhow::{anyhow, Result};
use eframe::egui;

use crate::app::GridViewerApp;
use crate::grid::PredictionGrid;
use crate::sink::GridSink;
use crate::state::ViewerState;

/// Open the viewer window and block until it is closed.
pub fn run_viewer(title: &str, state: ViewerState) -> eframe::Result {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        title,
        options,
        Box::new(|_cc| Ok(Box::new(GridViewerApp::new(state)))),
    )
}

/// Display sink: shows each grid in the viewer, blocking like an
/// interactive plot window.
#[derive(Debug, Clone)]
pub struct ViewerSink {
    title: String,
}

impl Default for ViewerSink {
    fn default() -> Self {
        Self::new("Event Grid")
    }
}

impl ViewerSink {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl GridSink for ViewerSink {
    fn consume(&mut self, grid: &PredictionGrid, epoch: u32) -> Result<()> {
        let caption = format!("epoch {epoch}");
        let state = ViewerState::with_grid(grid.clone(), caption.clone());
        log::debug!("Displaying {} cells for {caption}", grid.cells.len());
        run_viewer(&format!("{} – {caption}", self.title), state)
            .map_err(|e| anyhow!("viewer failed: {e}"))
    }
}
