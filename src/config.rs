use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::LoadMode;
use crate::report::ReportOptions;

/// Run configuration, read from a JSON file:
///
/// ```json
/// {
///   "dataset_dir": "/data/calo/batches",
///   "mode": "test",
///   "preview_field": "x",
///   "scale": 1.0,
///   "save": true,
///   "output_dir": "plots"
/// }
/// ```
///
/// Only `dataset_dir` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding `batch<N>.pickle`.
    pub dataset_dir: PathBuf,

    #[serde(default)]
    pub mode: LoadMode,

    /// Field previewed in the viewer; first image-like field when unset.
    #[serde(default)]
    pub preview_field: Option<String>,

    /// Pixel multiplier for grids.
    #[serde(default = "default_scale")]
    pub scale: f32,

    #[serde(default)]
    pub save: bool,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub epoch: u32,
}

fn default_scale() -> f32 {
    1.0
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Grid settings derived from this configuration.
    pub fn report_options(&self) -> ReportOptions {
        let mut options = ReportOptions::new(self.epoch).with_scale(self.scale);
        options.save = self.save;
        options.output_dir = self.output_dir.clone();
        options
    }
}
