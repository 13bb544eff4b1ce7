//! Batched pickle dataset loading and generated-image grid reporting.
//!
//! * [`data`] reads `batch<N>.pickle` files and concatenates them field-wise.
//! * [`report`] runs a [`Generator`] in inference mode, lays its output out
//!   as a [`PredictionGrid`] and hands the grid to [`sink`]s: a PNG file
//!   and/or the egui viewer in [`ui`].

pub mod app;
pub mod color;
pub mod config;
pub mod data;
pub mod generator;
pub mod grid;
pub mod report;
pub mod sink;
pub mod state;
pub mod ui;

pub use config::RunConfig;
pub use data::{load_dataset, CombinedDataset, DataError, FieldArray, LoadMode};
pub use generator::{ExecutionMode, Generator, GeneratorInput};
pub use grid::{GridLayout, PredictionGrid};
pub use report::{report, Reference, ReportOptions};
pub use sink::{FileSink, GridSink};
pub use ui::ViewerSink;
