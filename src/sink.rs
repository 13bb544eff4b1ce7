use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::grid::PredictionGrid;

/// Magnification used when rasterising a grid for export or display.
pub const DEFAULT_ZOOM: u32 = 8;

/// Somewhere a finished grid can go: a file, a window, a test recorder.
pub trait GridSink {
    fn consume(&mut self, grid: &PredictionGrid, epoch: u32) -> Result<()>;
}

/// `image_at_epoch_0007.png` for epoch 7.
pub fn image_filename(epoch: u32) -> String {
    format!("image_at_epoch_{epoch:04}.png")
}

/// Writes each grid as a PNG under a directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    zoom: u32,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn with_zoom(mut self, zoom: u32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, epoch: u32) -> PathBuf {
        self.dir.join(image_filename(epoch))
    }
}

impl GridSink for FileSink {
    fn consume(&mut self, grid: &PredictionGrid, epoch: u32) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output directory {}", self.dir.display()))?;
        let path = self.path_for(epoch);
        grid.render(self.zoom)
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::debug!("Saved {} cells to {}", grid.cells.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridLayout;
    use ndarray::Array4;

    #[test]
    fn filename_is_zero_padded() {
        assert_eq!(image_filename(7), "image_at_epoch_0007.png");
        assert_eq!(image_filename(1234), "image_at_epoch_1234.png");
        assert_eq!(image_filename(12345), "image_at_epoch_12345.png");
    }

    #[test]
    fn file_sink_creates_missing_parents() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("runs").join("a").join("images");
        let grid = PredictionGrid::plain(&Array4::zeros((2, 3, 3, 1)), 1.0, GridLayout::default())
            .unwrap();

        let mut sink = FileSink::new(&dir).with_zoom(1);
        sink.consume(&grid, 3).unwrap();
        // Existing directory is fine the second time.
        sink.consume(&grid, 4).unwrap();

        let saved = image::open(dir.join("image_at_epoch_0003.png")).unwrap();
        assert_eq!(saved.width(), grid.render(1).width());
        assert!(dir.join("image_at_epoch_0004.png").is_file());
    }
}
