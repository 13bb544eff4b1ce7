use anyhow::{ensure, Context, Result};
use image::{Rgb, RgbImage};
use ndarray::{s, Array2, Array4, ArrayD, Axis, Ix2};

use crate::color::{ColorScale, Colormap};

const MARGIN: u32 = 8;
const BAR_GAP: u32 = 3;
const BAR_WIDTH: u32 = 6;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Rows × columns of the figure. Cells fill it row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self { rows: 4, cols: 4 }
    }
}

impl GridLayout {
    pub fn capacity(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of generated/reference pairs that fit.
    pub fn pairs(&self) -> usize {
        self.capacity() / 2
    }
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRole {
    /// Model output.
    Generated,
    /// Ground-truth image shown next to a generated one.
    Reference,
    /// An event taken straight from a dataset field.
    Data,
}

impl CellRole {
    pub fn label(&self) -> &'static str {
        match self {
            CellRole::Generated => "generated",
            CellRole::Reference => "reference",
            CellRole::Data => "data",
        }
    }
}

/// One image of the grid, already multiplied by the display factor.
#[derive(Debug, Clone)]
pub struct GridCell {
    pub image: Array2<f32>,
    pub scale: ColorScale,
    pub role: CellRole,
    /// Index of the sample inside its source batch.
    pub sample: usize,
    pub caption: Option<String>,
}

impl GridCell {
    fn new(image: Array2<f32>, factor: f32, role: CellRole, sample: usize) -> Self {
        let image = image.mapv(|v| v * factor);
        let scale = ColorScale::from_values(image.iter());
        Self {
            image,
            scale,
            role,
            sample,
            caption: None,
        }
    }
}

// ---------------------------------------------------------------------------
// PredictionGrid
// ---------------------------------------------------------------------------

/// An arrangement of images ready to be rendered to a raster.
#[derive(Debug, Clone)]
pub struct PredictionGrid {
    pub layout: GridLayout,
    /// Row-major, never longer than `layout.capacity()`.
    pub cells: Vec<GridCell>,
}

impl PredictionGrid {
    /// Up to `layout.capacity()` generated images, one per cell.
    pub fn plain(images: &Array4<f32>, factor: f32, layout: GridLayout) -> Result<Self> {
        ensure_channels(images, "generated")?;
        let count = images.len_of(Axis(0)).min(layout.capacity());
        let cells = (0..count)
            .map(|i| GridCell::new(first_channel(images, i), factor, CellRole::Generated, i))
            .collect();
        Ok(Self { layout, cells })
    }

    /// Generated sample `i` in cell `2i`, reference sample `i` in cell
    /// `2i + 1`, for the first `layout.pairs()` samples present in both.
    pub fn paired(
        generated: &Array4<f32>,
        reference: &Array4<f32>,
        captions: Option<&[String]>,
        factor: f32,
        layout: GridLayout,
    ) -> Result<Self> {
        ensure_channels(generated, "generated")?;
        ensure_channels(reference, "reference")?;
        let count = generated
            .len_of(Axis(0))
            .min(reference.len_of(Axis(0)))
            .min(layout.pairs());

        let mut cells = Vec::with_capacity(count * 2);
        for i in 0..count {
            cells.push(GridCell::new(first_channel(generated, i), factor, CellRole::Generated, i));
            let mut truth = GridCell::new(first_channel(reference, i), factor, CellRole::Reference, i);
            truth.caption = captions.and_then(|c| c.get(i)).cloned();
            cells.push(truth);
        }
        Ok(Self { layout, cells })
    }

    /// The first events of a dataset field shaped `(events, h, w, ...)`.
    /// Trailing axes beyond the second image axis are reduced to index 0.
    pub fn from_field(field: &ArrayD<f32>, factor: f32, layout: GridLayout) -> Result<Self> {
        ensure!(
            field.ndim() >= 3,
            "field of shape {:?} is not an image batch",
            field.shape()
        );
        ensure!(
            field.shape()[3..].iter().all(|&d| d > 0),
            "field of shape {:?} has an empty channel axis",
            field.shape()
        );

        let count = field.len_of(Axis(0)).min(layout.capacity());
        let mut cells = Vec::with_capacity(count);
        for i in 0..count {
            let mut view = field.index_axis(Axis(0), i);
            while view.ndim() > 2 {
                let last = view.ndim() - 1;
                view = view.index_axis_move(Axis(last), 0);
            }
            let image = view
                .into_dimensionality::<Ix2>()
                .context("reducing event to a 2-D image")?
                .to_owned();
            cells.push(GridCell::new(image, factor, CellRole::Data, i));
        }
        Ok(Self { layout, cells })
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Draw the grid: each cell at `zoom`× nearest-neighbour magnification
    /// followed by its vertical colorbar (maximum at the top). Empty slots
    /// stay background. No axes or ticks are drawn.
    pub fn render(&self, zoom: u32) -> RgbImage {
        let zoom = zoom.max(1);
        let cmap = Colormap::viridis();

        let max_h = self.cells.iter().map(|c| c.image.nrows()).max().unwrap_or(1) as u32;
        let max_w = self.cells.iter().map(|c| c.image.ncols()).max().unwrap_or(1) as u32;
        let cell_h = max_h * zoom;
        let slot_w = max_w * zoom + BAR_GAP + BAR_WIDTH;

        let rows = self.layout.rows as u32;
        let cols = self.layout.cols as u32;
        let width = cols * slot_w + (cols + 1) * MARGIN;
        let height = rows * cell_h + (rows + 1) * MARGIN;
        let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

        for (index, cell) in self.cells.iter().enumerate() {
            let row = index as u32 / cols;
            let col = index as u32 % cols;
            let x0 = MARGIN + col * (slot_w + MARGIN);
            let y0 = MARGIN + row * (cell_h + MARGIN);
            draw_cell(&mut canvas, cell, &cmap, x0, y0, zoom);
        }
        canvas
    }
}

fn draw_cell(canvas: &mut RgbImage, cell: &GridCell, cmap: &Colormap, x0: u32, y0: u32, zoom: u32) {
    let (h, w) = cell.image.dim();
    for ((y, x), &value) in cell.image.indexed_iter() {
        let color = cell
            .scale
            .normalize(value)
            .map(|t| Rgb(cmap.map(t)))
            .unwrap_or(BACKGROUND);
        for dy in 0..zoom {
            for dx in 0..zoom {
                canvas.put_pixel(x0 + x as u32 * zoom + dx, y0 + y as u32 * zoom + dy, color);
            }
        }
    }

    let bar_x = x0 + w as u32 * zoom + BAR_GAP;
    let bar_h = h as u32 * zoom;
    for dy in 0..bar_h {
        let t = if bar_h > 1 {
            1.0 - dy as f32 / (bar_h - 1) as f32
        } else {
            1.0
        };
        let color = Rgb(cmap.map(t));
        for dx in 0..BAR_WIDTH {
            canvas.put_pixel(bar_x + dx, y0 + dy, color);
        }
    }
}

fn ensure_channels(images: &Array4<f32>, what: &str) -> Result<()> {
    ensure!(
        images.len_of(Axis(3)) > 0,
        "{what} images of shape {:?} have no channels",
        images.shape()
    );
    Ok(())
}

fn first_channel(images: &Array4<f32>, sample: usize) -> Array2<f32> {
    images.slice(s![sample, .., .., 0]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::IxDyn;

    fn ramp(samples: usize, h: usize, w: usize) -> Array4<f32> {
        Array4::from_shape_fn((samples, h, w, 1), |(n, y, x, _)| (n * 100 + y * w + x) as f32)
    }

    #[test]
    fn plain_grid_caps_at_sixteen_cells() {
        let grid = PredictionGrid::plain(&ramp(20, 2, 2), 1.0, GridLayout::default()).unwrap();
        assert_eq!(grid.cells.len(), 16);
        assert!(grid.cells.iter().all(|c| c.role == CellRole::Generated));
        assert_eq!(grid.cells[15].sample, 15);

        let small = PredictionGrid::plain(&ramp(3, 2, 2), 1.0, GridLayout::default()).unwrap();
        assert_eq!(small.cells.len(), 3);
    }

    #[test]
    fn factor_scales_every_pixel() {
        let grid = PredictionGrid::plain(&ramp(1, 2, 2), 0.5, GridLayout::default()).unwrap();
        let cell = &grid.cells[0];
        assert_relative_eq!(cell.image[[1, 1]], 1.5);
        assert_relative_eq!(cell.scale.min, 0.0);
        assert_relative_eq!(cell.scale.max, 1.5);
    }

    #[test]
    fn paired_grid_interleaves_first_eight_samples() {
        let generated = ramp(10, 2, 2);
        let reference = ramp(10, 2, 2).mapv(|v| -v);
        let captions: Vec<String> = (0..10).map(|i| format!("label {i}")).collect();
        let grid = PredictionGrid::paired(
            &generated,
            &reference,
            Some(&captions),
            1.0,
            GridLayout::default(),
        )
        .unwrap();

        assert_eq!(grid.cells.len(), 16);
        for (pair, cells) in grid.cells.chunks(2).enumerate() {
            assert_eq!(cells[0].role, CellRole::Generated);
            assert_eq!(cells[1].role, CellRole::Reference);
            assert_eq!(cells[0].sample, pair);
            assert_eq!(cells[1].sample, pair);
            assert_eq!(cells[0].caption, None);
            assert_eq!(cells[1].caption.as_deref(), Some(format!("label {pair}").as_str()));
        }
        assert_relative_eq!(grid.cells[3].image[[0, 1]], -101.0);
    }

    #[test]
    fn paired_grid_stops_at_shorter_batch() {
        let grid =
            PredictionGrid::paired(&ramp(5, 2, 2), &ramp(2, 2, 2), None, 1.0, GridLayout::default())
                .unwrap();
        assert_eq!(grid.cells.len(), 4);
    }

    #[test]
    fn channelless_batches_are_rejected() {
        let empty = Array4::<f32>::zeros((2, 2, 2, 0));
        assert!(PredictionGrid::plain(&empty, 1.0, GridLayout::default()).is_err());
    }

    #[test]
    fn field_preview_drops_channel_axis() {
        let field = ArrayD::from_shape_fn(IxDyn(&[3, 4, 5, 2]), |idx| (idx[3] * 10) as f32);
        let grid = PredictionGrid::from_field(&field, 1.0, GridLayout::default()).unwrap();
        assert_eq!(grid.cells.len(), 3);
        assert_eq!(grid.cells[0].image.dim(), (4, 5));
        assert!(grid.cells[0].image.iter().all(|&v| v == 0.0));
        assert_eq!(grid.cells[2].role, CellRole::Data);

        let flat = ArrayD::<f32>::zeros(IxDyn(&[3, 4]));
        assert!(PredictionGrid::from_field(&flat, 1.0, GridLayout::default()).is_err());
    }

    #[test]
    fn render_size_follows_layout_and_zoom() {
        let grid = PredictionGrid::plain(&ramp(2, 3, 5), 1.0, GridLayout::default()).unwrap();
        let img = grid.render(2);
        let slot_w = 5 * 2 + BAR_GAP + BAR_WIDTH;
        assert_eq!(img.width(), 4 * slot_w + 5 * MARGIN);
        assert_eq!(img.height(), 4 * 3 * 2 + 5 * MARGIN);

        // Empty third slot stays background; first cell's top-left pixel is
        // the minimum of its range.
        let third_x = MARGIN + 2 * (slot_w + MARGIN);
        assert_eq!(*img.get_pixel(third_x, MARGIN), BACKGROUND);
        assert_eq!(img.get_pixel(MARGIN, MARGIN).0, Colormap::viridis().map(0.0));
    }
}
