/// Data layer: batch decoding, loading and concatenation.
///
/// Architecture:
/// ```text
///  batch0.pickle … batch4.pickle
///        │
///        ▼
///   ┌────────────┐
///   │ unpickler   │  opcode stream → Object (globals kept, nothing run)
///   └────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  pickle   │  Object → Batch (numpy arrays or nested lists)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  read N batches, concatenate along events
///   └──────────┘
///        │
///        ▼
///   ┌─────────────────┐
///   │ CombinedDataset  │  field → FieldArray, total event count
///   └─────────────────┘
/// ```

pub mod error;
pub mod loader;
pub mod model;
pub mod pickle;
pub mod unpickler;

pub use error::DataError;
pub use loader::{batch_path, load_batch, load_batches, load_dataset, write_batch, LoadMode};
pub use model::{Batch, BatchSummary, CombinedDataset, FieldArray};
