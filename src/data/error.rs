use ndarray::ShapeError;

/// Violations of the batch-file contract.
///
/// I/O failures and malformed pickle streams are not listed here; they
/// travel up unchanged inside the `anyhow` chain.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("expected a dict at the top of the pickle, found {found}")]
    UnexpectedRoot { found: &'static str },

    #[error("field names must be strings, found {found}")]
    NonStringKey { found: String },

    #[error("field '{field}': nested lists are ragged at depth {depth}")]
    RaggedField { field: String, depth: usize },

    #[error("field '{field}': unsupported element {kind}")]
    UnsupportedValue { field: String, kind: &'static str },

    #[error("field '{field}': unsupported numpy dtype '{descr}'")]
    UnsupportedDtype { field: String, descr: String },

    #[error("field '{field}': malformed numpy array ({what})")]
    MalformedArray { field: String, what: &'static str },

    #[error("field '{field}': array buffer holds {found} bytes, shape and dtype need {expected}")]
    BufferSize {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("field '{field}' is a scalar and has no event dimension")]
    ScalarField { field: String },

    #[error("batch has no fields, cannot determine its event count")]
    EmptyBatch,

    #[error("batch {batch} is missing field '{field}'")]
    MissingField { field: String, batch: usize },

    #[error("field '{field}': batch {batch} holds {found} values, expected {expected}")]
    DtypeMismatch {
        field: String,
        batch: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field '{field}': cannot concatenate along the event axis")]
    ShapeMismatch {
        field: String,
        #[source]
        source: ShapeError,
    },
}
