use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayD, Axis};

use crate::generator::{ExecutionMode, Generator, GeneratorInput};
use crate::grid::{GridLayout, PredictionGrid};
use crate::sink::{FileSink, GridSink, DEFAULT_ZOOM};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-call settings of [`report`].
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub epoch: u32,
    /// Multiplier applied to every pixel before display.
    pub scale: f32,
    /// Write a PNG. Only honoured together with `output_dir`.
    pub save: bool,
    pub output_dir: Option<PathBuf>,
    pub layout: GridLayout,
    pub zoom: u32,
}

impl ReportOptions {
    pub fn new(epoch: u32) -> Self {
        Self {
            epoch,
            scale: 1.0,
            save: false,
            output_dir: None,
            layout: GridLayout::default(),
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn save_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save = true;
        self.output_dir = Some(dir.into());
        self
    }

    /// The PNG writer for this call, present only when `save` is set and
    /// an output directory is given.
    pub fn save_target(&self) -> Option<FileSink> {
        match (self.save, &self.output_dir) {
            (true, Some(dir)) => Some(FileSink::new(dir).with_zoom(self.zoom)),
            _ => None,
        }
    }
}

/// Ground truth shown next to conditional samples.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    pub images: &'a Array4<f32>,
    pub labels: Option<&'a ArrayD<f32>>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run `generator` in inference mode on `input`, lay the output out as a
/// grid and hand it to the sinks.
///
/// * Without `reference` the grid holds up to `rows × cols` generated images.
/// * With `reference` it holds up to `rows × cols / 2` generated/reference
///   pairs side by side; reference labels become cell captions.
///
/// The PNG is written only when `options.save` is set **and** an output
/// directory is given. `display` receives the grid afterwards.
pub fn report<G: Generator + ?Sized>(
    generator: &G,
    input: &GeneratorInput,
    reference: Option<Reference<'_>>,
    options: &ReportOptions,
    display: Option<&mut dyn GridSink>,
) -> Result<PredictionGrid> {
    let generated = generator
        .generate(input, ExecutionMode::Inference)
        .context("running generator in inference mode")?;

    let grid = match reference {
        None => PredictionGrid::plain(&generated, options.scale, options.layout)?,
        Some(reference) => {
            let captions = reference.labels.map(label_captions);
            PredictionGrid::paired(
                &generated,
                reference.images,
                captions.as_deref(),
                options.scale,
                options.layout,
            )?
        }
    };

    match options.save_target() {
        Some(mut file) => file.consume(&grid, options.epoch)?,
        None if options.save => {
            log::debug!("epoch {}: save requested without an output directory", options.epoch)
        }
        None => {}
    }

    if let Some(sink) = display {
        sink.consume(&grid, options.epoch)?;
    }
    Ok(grid)
}

/// One caption per sample: the value itself for scalar labels, the index of
/// the largest entry for one-hot (or score) vectors.
pub fn label_captions(labels: &ArrayD<f32>) -> Vec<String> {
    if labels.ndim() == 0 {
        return labels.iter().map(|&v| format_label(v)).collect();
    }
    labels
        .axis_iter(Axis(0))
        .map(|row| {
            if row.len() == 1 {
                row.iter().next().map(|&v| format_label(v)).unwrap_or_default()
            } else {
                let best = row
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_nan())
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(i, _)| i);
                match best {
                    Some(class) => format!("class {class}"),
                    None => String::new(),
                }
            }
        })
        .collect()
}

fn format_label(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.3}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellRole;
    use ndarray::{arr1, arr2, Array4};
    use std::cell::Cell;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(u32, usize)>,
    }

    impl GridSink for Recorder {
        fn consume(&mut self, grid: &PredictionGrid, epoch: u32) -> Result<()> {
            self.seen.push((epoch, grid.cells.len()));
            Ok(())
        }
    }

    fn constant_generator(samples: usize) -> impl Fn(&GeneratorInput, ExecutionMode) -> Result<Array4<f32>> {
        move |_input: &GeneratorInput, mode: ExecutionMode| -> Result<Array4<f32>> {
            assert_eq!(mode, ExecutionMode::Inference);
            Ok(Array4::from_elem((samples, 4, 4, 1), 2.0))
        }
    }

    fn noise(samples: usize) -> GeneratorInput {
        GeneratorInput::plain(ArrayD::zeros(ndarray::IxDyn(&[samples, 8])))
    }

    #[test]
    fn plain_report_displays_without_saving() {
        let mut display = Recorder::default();
        let options = ReportOptions::new(5).with_scale(0.5);

        let grid = report(
            &constant_generator(20),
            &noise(20),
            None,
            &options,
            Some(&mut display),
        )
        .unwrap();

        assert_eq!(grid.cells.len(), 16);
        assert_eq!(grid.cells[0].image[[0, 0]], 1.0);
        assert_eq!(display.seen, vec![(5, 16)]);
    }

    #[test]
    fn save_flag_without_directory_writes_nothing() {
        let mut display = Recorder::default();
        let mut options = ReportOptions::new(9001);
        options.save = true;

        assert!(options.save_target().is_none());

        report(&constant_generator(4), &noise(4), None, &options, Some(&mut display)).unwrap();
        assert_eq!(display.seen, vec![(9001, 4)]);
    }

    #[test]
    fn saving_creates_directory_and_epoch_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("plots").join("gan");
        let mut options = ReportOptions::new(42).save_to(&dir);
        options.zoom = 1;
        assert_eq!(
            options.save_target().map(|sink| sink.path_for(42)),
            Some(dir.join("image_at_epoch_0042.png"))
        );

        report(&constant_generator(3), &noise(3), None, &options, None).unwrap();

        assert!(dir.join("image_at_epoch_0042.png").is_file());
    }

    #[test]
    fn directory_without_save_flag_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let mut options = ReportOptions::new(2);
        options.output_dir = Some(root.path().to_path_buf());
        assert!(options.save_target().is_none());

        report(&constant_generator(3), &noise(3), None, &options, None).unwrap();

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn conditional_report_pairs_generated_with_reference() {
        let calls = Cell::new(0);
        let generator = |input: &GeneratorInput, mode: ExecutionMode| -> Result<Array4<f32>> {
            calls.set(calls.get() + 1);
            assert_eq!(mode, ExecutionMode::Inference);
            assert!(input.is_conditional());
            Ok(Array4::from_elem((12, 4, 4, 1), 1.0))
        };
        let input = GeneratorInput::conditional(
            ArrayD::zeros(ndarray::IxDyn(&[12, 8])),
            ArrayD::zeros(ndarray::IxDyn(&[12, 1])),
        );
        let reference_images = Array4::from_elem((12, 4, 4, 1), -1.0);
        let labels = ArrayD::from_shape_fn(ndarray::IxDyn(&[12, 1]), |idx| idx[0] as f32);
        let reference = Reference {
            images: &reference_images,
            labels: Some(&labels),
        };

        let grid = report(&generator, &input, Some(reference), &ReportOptions::new(0), None).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(grid.cells.len(), 16);
        assert_eq!(grid.cells[6].role, CellRole::Generated);
        assert_eq!(grid.cells[7].role, CellRole::Reference);
        assert_eq!(grid.cells[7].sample, 3);
        assert_eq!(grid.cells[7].caption.as_deref(), Some("3"));
        assert_eq!(grid.cells[7].image[[0, 0]], -1.0);
    }

    #[test]
    fn generator_failure_propagates() {
        let failing = |_: &GeneratorInput, _: ExecutionMode| -> Result<Array4<f32>> {
            anyhow::bail!("out of memory")
        };
        let mut display = Recorder::default();
        let err = report(&failing, &noise(1), None, &ReportOptions::new(0), Some(&mut display))
            .unwrap_err();

        assert!(format!("{err:#}").contains("out of memory"));
        assert!(display.seen.is_empty());
    }

    #[test]
    fn captions_for_scalar_and_one_hot_labels() {
        let scalar = arr1(&[3.0_f32, 0.25]).into_dyn();
        assert_eq!(label_captions(&scalar), vec!["3", "0.250"]);

        let one_hot = arr2(&[[0.0_f32, 1.0, 0.0], [0.9, 0.1, 0.0]]).into_dyn();
        assert_eq!(label_captions(&one_hot), vec!["class 1", "class 0"]);
    }
}
