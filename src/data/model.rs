use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use ndarray::{ArrayD, Axis};

use super::error::DataError;

// ---------------------------------------------------------------------------
// FieldArray – one named column of per-event values
// ---------------------------------------------------------------------------

/// A homogeneous n-dimensional array whose leading axis is the event axis.
///
/// The three element types mirror what the upstream preparation step
/// writes: floating point features, integer labels and boolean flags.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldArray {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
    Bool(ArrayD<bool>),
}

impl FieldArray {
    /// Element type name, used in diagnostics.
    pub fn dtype(&self) -> &'static str {
        match self {
            FieldArray::Float(_) => "float",
            FieldArray::Int(_) => "int",
            FieldArray::Bool(_) => "bool",
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            FieldArray::Float(a) => a.shape(),
            FieldArray::Int(a) => a.shape(),
            FieldArray::Bool(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Length of the event axis, `None` for a 0-d array.
    pub fn n_events(&self) -> Option<usize> {
        self.shape().first().copied()
    }

    /// Numeric view of the field as `f32`, booleans become 0 / 1.
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            FieldArray::Float(a) => a.mapv(|v| v as f32),
            FieldArray::Int(a) => a.mapv(|v| v as f32),
            FieldArray::Bool(a) => a.mapv(|v| if v { 1.0 } else { 0.0 }),
        }
    }

    /// Concatenate the same field taken from consecutive batches along the
    /// event axis. `parts[i]` must come from batch `i`; the element type of
    /// `parts[0]` is the one every other batch has to match.
    pub fn concat(field: &str, parts: &[&FieldArray]) -> Result<FieldArray, DataError> {
        let Some(first) = parts.first() else {
            return Err(DataError::EmptyBatch);
        };
        match first {
            FieldArray::Float(_) => concat_typed(field, parts, "float", |p| match p {
                FieldArray::Float(a) => Some(a),
                _ => None,
            })
            .map(FieldArray::Float),
            FieldArray::Int(_) => concat_typed(field, parts, "int", |p| match p {
                FieldArray::Int(a) => Some(a),
                _ => None,
            })
            .map(FieldArray::Int),
            FieldArray::Bool(_) => concat_typed(field, parts, "bool", |p| match p {
                FieldArray::Bool(a) => Some(a),
                _ => None,
            })
            .map(FieldArray::Bool),
        }
    }
}

fn concat_typed<A: Clone>(
    field: &str,
    parts: &[&FieldArray],
    expected: &'static str,
    pick: impl Fn(&FieldArray) -> Option<&ArrayD<A>>,
) -> Result<ArrayD<A>, DataError> {
    let views = parts
        .iter()
        .enumerate()
        .map(|(batch, part)| {
            pick(part)
                .map(|a| a.view())
                .ok_or_else(|| DataError::DtypeMismatch {
                    field: field.to_string(),
                    batch,
                    expected,
                    found: part.dtype(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    ndarray::concatenate(Axis(0), &views).map_err(|source| DataError::ShapeMismatch {
        field: field.to_string(),
        source,
    })
}

impl fmt::Display for FieldArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype(), self.shape())
    }
}

// ---------------------------------------------------------------------------
// Batch – one decoded batch file
// ---------------------------------------------------------------------------

/// The content of a single `batch<N>.pickle`, fields in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    fields: Vec<(String, FieldArray)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, or replace it in place if the name is taken.
    pub fn insert(&mut self, name: impl Into<String>, array: FieldArray) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = array,
            None => self.fields.push((name, array)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldArray> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldArray)> {
        self.fields.iter().map(|(n, a)| (n.as_str(), a))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Event count taken from the leading dimension of the field that
    /// was written first.
    pub fn n_events(&self) -> Result<usize, DataError> {
        let (name, first) = self.fields.first().ok_or(DataError::EmptyBatch)?;
        first.n_events().ok_or_else(|| DataError::ScalarField {
            field: name.clone(),
        })
    }
}

impl<S: Into<String>> FromIterator<(S, FieldArray)> for Batch {
    fn from_iter<I: IntoIterator<Item = (S, FieldArray)>>(iter: I) -> Self {
        let mut batch = Batch::new();
        for (name, array) in iter {
            batch.insert(name, array);
        }
        batch
    }
}

// ---------------------------------------------------------------------------
// CombinedDataset – all batches concatenated
// ---------------------------------------------------------------------------

/// Where a batch came from and how many events it contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub path: PathBuf,
    pub n_events: usize,
}

/// Field-wise concatenation of every loaded batch, in batch order.
#[derive(Debug, Clone)]
pub struct CombinedDataset {
    pub fields: BTreeMap<String, FieldArray>,
    /// Sum of the per-batch event counts.
    pub n_events: usize,
    pub batches: Vec<BatchSummary>,
}

impl CombinedDataset {
    pub fn get(&self, field: &str) -> Option<&FieldArray> {
        self.fields.get(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Fields that can be shown as images: at least `(events, h, w)`.
    pub fn image_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, arr)| arr.ndim() >= 3)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.n_events
    }

    /// Whether the dataset has no events.
    pub fn is_empty(&self) -> bool {
        self.n_events == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn floats(shape: &[usize], start: f64) -> FieldArray {
        let n: usize = shape.iter().product();
        let data = (0..n).map(|i| start + i as f64).collect();
        FieldArray::Float(ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
    }

    #[test]
    fn concat_keeps_batch_order() {
        let a = floats(&[2, 3], 0.0);
        let b = floats(&[1, 3], 100.0);
        let joined = FieldArray::concat("x", &[&a, &b]).unwrap();

        assert_eq!(joined.shape(), &[3, 3]);
        let FieldArray::Float(arr) = joined else {
            panic!("expected float array");
        };
        assert_eq!(arr[[1, 2]], 5.0);
        assert_eq!(arr[[2, 0]], 100.0);
    }

    #[test]
    fn concat_rejects_mixed_dtypes() {
        let a = floats(&[2], 0.0);
        let b = FieldArray::Int(ArrayD::from_elem(IxDyn(&[2]), 1));
        let err = FieldArray::concat("y", &[&a, &b]).unwrap_err();
        assert!(matches!(
            err,
            DataError::DtypeMismatch { batch: 1, expected: "float", found: "int", .. }
        ));
    }

    #[test]
    fn concat_rejects_trailing_shape_mismatch() {
        let a = floats(&[2, 3], 0.0);
        let b = floats(&[2, 4], 0.0);
        let err = FieldArray::concat("x", &[&a, &b]).unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch { .. }));
    }

    #[test]
    fn batch_event_count_uses_first_written_field() {
        // "b" sorts before "z" but was written second.
        let batch: Batch = [("z", floats(&[7, 2], 0.0)), ("b", floats(&[5], 0.0))]
            .into_iter()
            .collect();
        assert_eq!(batch.names().collect::<Vec<_>>(), vec!["z", "b"]);
        assert_eq!(batch.n_events().unwrap(), 7);

        assert!(matches!(Batch::new().n_events(), Err(DataError::EmptyBatch)));
    }

    #[test]
    fn reinserting_a_field_keeps_its_position() {
        let mut batch = Batch::new();
        batch.insert("x", floats(&[2], 0.0));
        batch.insert("y", floats(&[2], 0.0));
        batch.insert("x", floats(&[4], 0.0));

        assert_eq!(batch.names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(batch.n_events().unwrap(), 4);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn bool_fields_convert_to_unit_floats() {
        let arr = FieldArray::Bool(ArrayD::from_shape_vec(IxDyn(&[2]), vec![true, false]).unwrap());
        assert_eq!(arr.to_f32().into_raw_vec(), vec![1.0, 0.0]);
    }
}
