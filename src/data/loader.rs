use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::error::DataError;
use super::model::{Batch, BatchSummary, CombinedDataset, FieldArray};
use super::pickle::{decode_batch, encode_batch};
use super::unpickler::read_object;

// ---------------------------------------------------------------------------
// Load mode
// ---------------------------------------------------------------------------

/// How many batch files a load reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// A single batch, for quick checks.
    Test,
    /// The full training set.
    #[default]
    Full,
}

impl LoadMode {
    pub fn batch_count(self) -> usize {
        match self {
            LoadMode::Test => 1,
            LoadMode::Full => 5,
        }
    }
}

/// `<dir>/batch<index>.pickle`
pub fn batch_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("batch{index}.pickle"))
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load `mode.batch_count()` batches from `dir` and concatenate them.
pub fn load_dataset(dir: &Path, mode: LoadMode) -> Result<CombinedDataset> {
    load_batches(dir, mode.batch_count())
}

/// Load `batch0 .. batch{count-1}` from `dir` and concatenate them field by
/// field. All or nothing: the first failing batch aborts the load.
pub fn load_batches(dir: &Path, count: usize) -> Result<CombinedDataset> {
    let mut batches = Vec::with_capacity(count);
    let mut summaries = Vec::with_capacity(count);
    let mut total = 0;

    for index in 0..count {
        let path = batch_path(dir, index);
        log::info!("Opening file: {}", path.display());

        let batch = load_batch(&path)?;
        let n_events = batch
            .n_events()
            .with_context(|| format!("counting events in {}", path.display()))?;
        warn_on_uneven_fields(&batch, n_events, &path);
        log::info!("Dataset {index} contains {n_events} events");

        total += n_events;
        summaries.push(BatchSummary { path, n_events });
        batches.push(batch);
    }

    log::info!("Total train set contains {total} events");

    let fields = concat_batches(&batches)?;
    Ok(CombinedDataset {
        fields,
        n_events: total,
        batches: summaries,
    })
}

/// Read and decode a single batch file.
pub fn load_batch(path: &Path) -> Result<Batch> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let root = read_object(BufReader::new(file))
        .with_context(|| format!("unpickling {}", path.display()))?;
    let batch = decode_batch(&root).with_context(|| format!("decoding {}", path.display()))?;
    Ok(batch)
}

/// Write a batch as a dict of numpy arrays, the layout [`load_batch`] reads.
pub fn write_batch(path: &Path, batch: &Batch) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(&encode_batch(batch))
        .with_context(|| format!("writing {}", path.display()))?;
    file.flush().context("flushing batch file")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Concatenate every field of the first batch across all batches.
/// Fields that only appear in later batches are dropped.
fn concat_batches(batches: &[Batch]) -> Result<BTreeMap<String, FieldArray>> {
    let Some(first) = batches.first() else {
        return Ok(BTreeMap::new());
    };

    let mut combined = BTreeMap::new();
    for name in first.names() {
        let parts = batches
            .iter()
            .enumerate()
            .map(|(index, batch)| {
                batch.get(name).ok_or_else(|| DataError::MissingField {
                    field: name.to_string(),
                    batch: index,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let joined = FieldArray::concat(name, &parts)?;
        combined.insert(name.to_string(), joined);
    }
    Ok(combined)
}

fn warn_on_uneven_fields(batch: &Batch, n_events: usize, path: &Path) {
    for (name, array) in batch.iter() {
        if array.n_events() != Some(n_events) {
            log::warn!(
                "{}: field '{name}' has shape {:?}, expected {n_events} events",
                path.display(),
                array.shape()
            );
        }
    }
}
