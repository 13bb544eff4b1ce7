use std::path::Path;

use eframe::egui::TextureHandle;
use image::RgbImage;

use crate::config::RunConfig;
use crate::data::{load_dataset, CombinedDataset, LoadMode};
use crate::grid::{GridLayout, PredictionGrid};
use crate::sink::{FileSink, GridSink, DEFAULT_ZOOM};

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// The full viewer state, independent of rendering.
pub struct ViewerState {
    /// Grid behind the raster (None when a PNG was opened from disk).
    pub grid: Option<PredictionGrid>,

    /// What the central panel shows.
    pub raster: Option<RgbImage>,

    /// GPU copy of `raster`; dropped whenever the raster changes.
    pub texture: Option<TextureHandle>,

    /// Caption above the plot.
    pub title: String,

    /// Dataset opened for preview.
    pub dataset: Option<CombinedDataset>,

    /// Field of `dataset` currently shown.
    pub preview_field: Option<String>,

    /// Batches read by "Open dataset…".
    pub load_mode: LoadMode,

    pub scale: f32,
    pub zoom: u32,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            grid: None,
            raster: None,
            texture: None,
            title: String::new(),
            dataset: None,
            preview_field: None,
            load_mode: LoadMode::Test,
            scale: 1.0,
            zoom: DEFAULT_ZOOM,
            status_message: None,
        }
    }
}

impl ViewerState {
    pub fn with_grid(grid: PredictionGrid, title: impl Into<String>) -> Self {
        let mut state = Self::default();
        state.set_grid(grid, title);
        state
    }

    pub fn with_status(message: impl Into<String>) -> Self {
        Self {
            status_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Load the configured dataset, preview it and export the preview when
    /// the configuration asks for it. Failures end up in the status line.
    pub fn from_config(cfg: &RunConfig) -> Self {
        let mut state = Self {
            scale: cfg.scale,
            load_mode: cfg.mode,
            ..Self::default()
        };

        match load_dataset(&cfg.dataset_dir, cfg.mode) {
            Ok(dataset) => state.set_dataset(dataset, cfg.preview_field.clone()),
            Err(e) => {
                log::error!("Failed to load dataset: {e:#}");
                state.status_message = Some(format!("Error: {e:#}"));
                return state;
            }
        }

        let options = cfg.report_options();
        if let (true, Some(dir), Some(grid)) = (options.save, &options.output_dir, &state.grid) {
            let mut sink = FileSink::new(dir).with_zoom(options.zoom);
            if let Err(e) = sink.consume(grid, options.epoch) {
                log::error!("Failed to save preview: {e:#}");
                state.status_message = Some(format!("Error: {e:#}"));
            }
        }
        state
    }

    /// Show a grid, re-rendering the raster.
    pub fn set_grid(&mut self, grid: PredictionGrid, title: impl Into<String>) {
        self.raster = Some(grid.render(self.zoom));
        self.texture = None;
        self.grid = Some(grid);
        self.title = title.into();
    }

    /// Show an already rendered image, e.g. a saved grid.
    pub fn set_image(&mut self, raster: RgbImage, title: impl Into<String>) {
        self.raster = Some(raster);
        self.texture = None;
        self.grid = None;
        self.title = title.into();
        self.status_message = None;
    }

    /// Open a saved grid PNG.
    pub fn open_image(&mut self, path: &Path) {
        match image::open(path) {
            Ok(img) => {
                log::info!("Opened {}", path.display());
                self.set_image(img.to_rgb8(), path.display().to_string());
            }
            Err(e) => {
                log::error!("Failed to open image: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    /// Load a dataset directory with the current `load_mode`.
    pub fn open_dataset(&mut self, dir: &Path) {
        match load_dataset(dir, self.load_mode) {
            Ok(dataset) => {
                log::info!(
                    "Loaded {} events with fields {:?}",
                    dataset.len(),
                    dataset.field_names().collect::<Vec<_>>()
                );
                self.set_dataset(dataset, None);
            }
            Err(e) => {
                log::error!("Failed to load dataset: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    /// Ingest a dataset and preview `preferred` or its first image field.
    pub fn set_dataset(&mut self, dataset: CombinedDataset, preferred: Option<String>) {
        let field = preferred.or_else(|| dataset.image_fields().into_iter().next());
        self.dataset = Some(dataset);
        self.status_message = None;
        match field {
            Some(field) => self.set_preview_field(field),
            None => {
                self.preview_field = None;
                self.status_message = Some("Dataset has no image-like field".to_string());
            }
        }
    }

    /// Switch the previewed field and rebuild the grid.
    pub fn set_preview_field(&mut self, field: String) {
        let Some(dataset) = &self.dataset else {
            return;
        };
        let Some(array) = dataset.get(&field) else {
            self.status_message = Some(format!("Error: no field '{field}'"));
            return;
        };

        let title = format!("{field} – first events of {}", dataset.len());
        match PredictionGrid::from_field(&array.to_f32(), self.scale, GridLayout::default()) {
            Ok(grid) => {
                self.set_grid(grid, title);
                self.status_message = None;
            }
            Err(e) => {
                log::warn!("Cannot preview '{field}': {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
        self.preview_field = Some(field);
    }
}
