use std::rc::Rc;

use ndarray::{ArrayD, IxDyn, ShapeBuilder, StrideShape};

use super::error::DataError;
use super::model::{Batch, FieldArray};
use super::unpickler::{op, Object};

// ---------------------------------------------------------------------------
// Decoding: pickle Object → Batch
// ---------------------------------------------------------------------------

/// Expected pickle layout (what `pickle.dump({k: arr ...})` writes):
///
/// ```text
/// {
///   "x": numpy.ndarray (events, 28, 28, 1) float64,
///   "y": numpy.ndarray (events,) int64,
/// }
/// ```
///
/// Arrays pickled by numpy 1.x or 2.x are read from their raw buffer,
/// honouring dtype, byte order and Fortran layout. Plain nested lists
/// (`arr.tolist()`) are accepted as well. Field order is kept.
pub fn decode_batch(root: &Object) -> Result<Batch, DataError> {
    let Object::Dict(entries) = root else {
        return Err(DataError::UnexpectedRoot { found: root.kind() });
    };

    let mut batch = Batch::new();
    for (key, value) in entries.borrow().iter() {
        let name = field_name(key)?;
        let array = decode_field(&name, value)?;
        batch.insert(name, array);
    }
    Ok(batch)
}

fn field_name(key: &Object) -> Result<String, DataError> {
    match key {
        Object::Str(s) => Ok(s.to_string()),
        Object::Bytes(b) => String::from_utf8(b.to_vec()).map_err(|_| DataError::NonStringKey {
            found: format!("{:?}", &b[..]),
        }),
        other => Err(DataError::NonStringKey {
            found: other.kind().to_string(),
        }),
    }
}

fn decode_field(field: &str, value: &Object) -> Result<FieldArray, DataError> {
    match NdArray::recognize(field, value)? {
        Some(array) => array.into_field(field),
        None => decode_nested(field, value),
    }
}

fn shape_err(field: &str, source: ndarray::ShapeError) -> DataError {
    DataError::ShapeMismatch {
        field: field.to_string(),
        source,
    }
}

// ---------------------------------------------------------------------------
// numpy arrays
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Signed,
    Unsigned,
    Bool,
}

/// A fixed-width numeric dtype such as `<f8` or `|b1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    kind: Kind,
    width: usize,
    big_endian: bool,
}

/// The pieces of a pickled `numpy.ndarray`.
struct NdArray {
    shape: Vec<usize>,
    dtype: Dtype,
    fortran: bool,
    data: Rc<[u8]>,
}

fn is_numpy(module: &str) -> bool {
    module == "numpy" || module.starts_with("numpy.")
}

fn malformed(field: &str, what: &'static str) -> DataError {
    DataError::MalformedArray {
        field: field.to_string(),
        what,
    }
}

impl NdArray {
    /// `Some` for the two ways numpy pickles an array:
    ///
    /// * protocols 0-4: `_reconstruct(ndarray, (0,), b'b')` then
    ///   `__setstate__((1, shape, dtype, is_fortran, raw))`
    /// * protocol 5: `_frombuffer(raw, dtype, shape, order)`
    fn recognize(field: &str, value: &Object) -> Result<Option<NdArray>, DataError> {
        let Object::Instance(inst) = value else {
            return Ok(None);
        };
        let inst = inst.borrow();
        match inst.callable.global() {
            Some((module, "_reconstruct")) if is_numpy(module) => {
                Self::from_state(field, inst.state.as_ref()).map(Some)
            }
            Some((module, "_frombuffer")) if is_numpy(module) => {
                Self::from_buffer_args(field, &inst.args).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn from_state(field: &str, state: Option<&Object>) -> Result<NdArray, DataError> {
        let state = state
            .and_then(Object::items)
            .ok_or_else(|| malformed(field, "missing __setstate__ tuple"))?;
        // Version 1 state carries a leading version number.
        let parts = match state.len() {
            5 => &state[1..],
            _ => &state[..],
        };
        let [shape, dtype, fortran, data] = parts else {
            return Err(malformed(field, "__setstate__ tuple has the wrong length"));
        };

        let dtype = parse_dtype(field, dtype)?;
        Ok(NdArray {
            shape: parse_shape(field, shape)?,
            dtype,
            fortran: fortran
                .as_bool()
                .ok_or_else(|| malformed(field, "fortran flag"))?,
            data: raw_buffer(field, data)?,
        })
    }

    fn from_buffer_args(field: &str, args: &Object) -> Result<NdArray, DataError> {
        let args = args.items().unwrap_or_default();
        let [data, dtype, shape, order] = args.as_slice() else {
            return Err(malformed(field, "_frombuffer arguments"));
        };

        let dtype = parse_dtype(field, dtype)?;
        let fortran = match order.as_str() {
            Some("C") => false,
            Some("F") => true,
            _ => return Err(malformed(field, "memory order")),
        };
        Ok(NdArray {
            shape: parse_shape(field, shape)?,
            dtype,
            fortran,
            data: raw_buffer(field, data)?,
        })
    }

    fn into_field(self, field: &str) -> Result<FieldArray, DataError> {
        if self.shape.is_empty() {
            return Err(DataError::ScalarField {
                field: field.to_string(),
            });
        }

        let count = self
            .shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| malformed(field, "shape overflows"))?;
        let expected = count
            .checked_mul(self.dtype.width)
            .ok_or_else(|| malformed(field, "shape overflows"))?;
        if self.data.len() != expected {
            return Err(DataError::BufferSize {
                field: field.to_string(),
                expected,
                found: self.data.len(),
            });
        }

        let Dtype {
            kind,
            width,
            big_endian: big,
        } = self.dtype;
        let words = self.data.chunks_exact(width);
        let array = match (kind, width) {
            (Kind::Float, 8) => {
                FieldArray::Float(self.shaped(field, words.map(|w| f64::from_le_bytes(le(w, big))).collect())?)
            }
            (Kind::Float, _) => FieldArray::Float(
                self.shaped(field, words.map(|w| f64::from(f32::from_le_bytes(le(w, big)))).collect())?,
            ),
            (Kind::Bool, _) => FieldArray::Bool(self.shaped(field, words.map(|w| w[0] != 0).collect())?),
            (Kind::Signed, 1) => FieldArray::Int(self.shaped(field, words.map(|w| i64::from(w[0] as i8)).collect())?),
            (Kind::Signed, 2) => {
                FieldArray::Int(self.shaped(field, words.map(|w| i64::from(i16::from_le_bytes(le(w, big)))).collect())?)
            }
            (Kind::Signed, 4) => {
                FieldArray::Int(self.shaped(field, words.map(|w| i64::from(i32::from_le_bytes(le(w, big)))).collect())?)
            }
            (Kind::Signed, _) => {
                FieldArray::Int(self.shaped(field, words.map(|w| i64::from_le_bytes(le(w, big))).collect())?)
            }
            (Kind::Unsigned, 1) => FieldArray::Int(self.shaped(field, words.map(|w| i64::from(w[0])).collect())?),
            (Kind::Unsigned, 2) => {
                FieldArray::Int(self.shaped(field, words.map(|w| i64::from(u16::from_le_bytes(le(w, big)))).collect())?)
            }
            (Kind::Unsigned, 4) => {
                FieldArray::Int(self.shaped(field, words.map(|w| i64::from(u32::from_le_bytes(le(w, big)))).collect())?)
            }
            (Kind::Unsigned, _) => {
                let data = words
                    .map(|w| i64::try_from(u64::from_le_bytes(le(w, big))))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| DataError::UnsupportedValue {
                        field: field.to_string(),
                        kind: "uint64 above the int64 range",
                    })?;
                FieldArray::Int(self.shaped(field, data)?)
            }
        };
        Ok(array)
    }

    /// Lay `data` out in the array's shape; Fortran buffers are column-major.
    fn shaped<A>(&self, field: &str, data: Vec<A>) -> Result<ArrayD<A>, DataError> {
        let dim = IxDyn(&self.shape);
        let shape: StrideShape<IxDyn> = if self.fortran {
            dim.f().into()
        } else {
            dim.into()
        };
        ArrayD::from_shape_vec(shape, data).map_err(|source| shape_err(field, source))
    }
}

/// One element's bytes, reordered to little-endian.
fn le<const N: usize>(word: &[u8], big_endian: bool) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(word);
    if big_endian {
        bytes.reverse();
    }
    bytes
}

fn parse_shape(field: &str, shape: &Object) -> Result<Vec<usize>, DataError> {
    shape
        .items()
        .ok_or_else(|| malformed(field, "shape is not a tuple"))?
        .iter()
        .map(|d| {
            d.as_int()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| malformed(field, "shape entry"))
        })
        .collect()
}

fn raw_buffer(field: &str, data: &Object) -> Result<Rc<[u8]>, DataError> {
    match data {
        Object::Bytes(bytes) => Ok(bytes.clone()),
        // Latin-1 text: how Python 2 pickles store the buffer.
        Object::Str(text) => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).ok())
            .collect::<Option<Vec<u8>>>()
            .map(Rc::from)
            .ok_or_else(|| malformed(field, "array buffer")),
        Object::List(_) => Err(DataError::UnsupportedDtype {
            field: field.to_string(),
            descr: "object".to_string(),
        }),
        _ => Err(malformed(field, "array buffer")),
    }
}

/// `numpy.dtype(descr, align, copy)` with `__setstate__((3, order, …))`.
fn parse_dtype(field: &str, dtype: &Object) -> Result<Dtype, DataError> {
    let Object::Instance(inst) = dtype else {
        return Err(malformed(field, "dtype"));
    };
    let inst = inst.borrow();
    if !matches!(inst.callable.global(), Some((module, "dtype")) if is_numpy(module)) {
        return Err(malformed(field, "dtype"));
    }

    let args = inst.args.items().unwrap_or_default();
    let descr = args
        .first()
        .and_then(Object::as_str)
        .ok_or_else(|| malformed(field, "dtype descriptor"))?;
    let state_order = inst
        .state
        .as_ref()
        .and_then(Object::items)
        .and_then(|state| state.get(1).and_then(Object::as_str).and_then(|o| o.chars().next()));

    let (prefix, body) = match descr.chars().next() {
        Some(c @ ('<' | '>' | '|' | '=')) => (Some(c), &descr[1..]),
        _ => (None, descr),
    };
    let unsupported = || DataError::UnsupportedDtype {
        field: field.to_string(),
        descr: descr.to_string(),
    };

    let mut chars = body.chars();
    let kind = match chars.next() {
        Some('f') => Kind::Float,
        Some('i') => Kind::Signed,
        Some('u') => Kind::Unsigned,
        Some('b') => Kind::Bool,
        _ => return Err(unsupported()),
    };
    let width: usize = chars.as_str().parse().map_err(|_| unsupported())?;
    let supported = matches!(
        (kind, width),
        (Kind::Float, 4 | 8) | (Kind::Signed | Kind::Unsigned, 1 | 2 | 4 | 8) | (Kind::Bool, 1)
    );
    if !supported {
        return Err(unsupported());
    }

    let big_endian = match state_order.or(prefix).unwrap_or('=') {
        '>' => true,
        '=' => cfg!(target_endian = "big"),
        _ => false,
    };
    Ok(Dtype {
        kind,
        width,
        big_endian,
    })
}

// ---------------------------------------------------------------------------
// Nested lists
// ---------------------------------------------------------------------------

fn decode_nested(field: &str, value: &Object) -> Result<FieldArray, DataError> {
    let shape = infer_shape(value);
    if shape.is_empty() {
        return Err(match value {
            Object::Bool(_) | Object::Int(_) | Object::Float(_) => DataError::ScalarField {
                field: field.to_string(),
            },
            other => DataError::UnsupportedValue {
                field: field.to_string(),
                kind: other.kind(),
            },
        });
    }

    let mut leaves = Vec::with_capacity(shape.iter().product());
    collect_leaves(field, value, &shape, 0, &mut leaves)?;

    let mut any_float = false;
    let mut all_bool = true;
    for leaf in &leaves {
        match leaf {
            Object::Float(_) => {
                any_float = true;
                all_bool = false;
            }
            Object::Int(_) => all_bool = false,
            Object::Bool(_) => {}
            other => {
                return Err(DataError::UnsupportedValue {
                    field: field.to_string(),
                    kind: other.kind(),
                })
            }
        }
    }

    let dim = IxDyn(&shape);
    let array = if leaves.is_empty() || any_float {
        let data = leaves.iter().map(leaf_f64).collect();
        FieldArray::Float(ArrayD::from_shape_vec(dim, data).map_err(|source| shape_err(field, source))?)
    } else if all_bool {
        let data = leaves.iter().map(|v| matches!(v, Object::Bool(true))).collect();
        FieldArray::Bool(ArrayD::from_shape_vec(dim, data).map_err(|source| shape_err(field, source))?)
    } else {
        let data = leaves.iter().map(|v| v.as_int().unwrap_or_default()).collect();
        FieldArray::Int(ArrayD::from_shape_vec(dim, data).map_err(|source| shape_err(field, source))?)
    };
    Ok(array)
}

/// Shape implied by following the first element at every nesting level.
fn infer_shape(value: &Object) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cursor = value.clone();
    while let Some(items) = cursor.items() {
        shape.push(items.len());
        match items.into_iter().next() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    shape
}

fn collect_leaves(
    field: &str,
    value: &Object,
    shape: &[usize],
    depth: usize,
    out: &mut Vec<Object>,
) -> Result<(), DataError> {
    let ragged = || DataError::RaggedField {
        field: field.to_string(),
        depth,
    };

    let items = value.items();
    if depth == shape.len() {
        if items.is_some() {
            return Err(ragged());
        }
        out.push(value.clone());
        return Ok(());
    }

    match items {
        Some(items) if items.len() == shape[depth] => {
            for item in &items {
                collect_leaves(field, item, shape, depth + 1, out)?;
            }
            Ok(())
        }
        _ => Err(ragged()),
    }
}

fn leaf_f64(value: &Object) -> f64 {
    match value {
        Object::Float(v) => *v,
        Object::Int(v) => *v as f64,
        Object::Bool(b) => f64::from(u8::from(*b)),
        _ => f64::NAN,
    }
}

// ---------------------------------------------------------------------------
// Encoding: Batch → pickle bytes
// ---------------------------------------------------------------------------

/// Inverse of [`decode_batch`]: a protocol-4 pickle in which every field
/// is a C-ordered little-endian `numpy.ndarray`, loadable by numpy 1.x
/// and 2.x.
pub fn encode_batch(batch: &Batch) -> Vec<u8> {
    let mut out = Encoder::default();
    out.op(op::PROTO);
    out.buf.push(4);
    out.op(op::EMPTY_DICT);
    if !batch.is_empty() {
        out.op(op::MARK);
        for (name, array) in batch.iter() {
            out.unicode(name);
            out.ndarray(array);
        }
        out.op(op::SETITEMS);
    }
    out.op(op::STOP);
    out.buf
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn op(&mut self, opcode: u8) {
        self.buf.push(opcode);
    }

    fn int(&mut self, value: i64) {
        if let Ok(small) = u8::try_from(value) {
            self.op(op::BININT1);
            self.buf.push(small);
        } else if let Ok(word) = i32::try_from(value) {
            self.op(op::BININT);
            self.buf.extend_from_slice(&word.to_le_bytes());
        } else {
            self.op(op::LONG1);
            self.buf.push(8);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn unicode(&mut self, text: &str) {
        match u8::try_from(text.len()) {
            Ok(len) => {
                self.op(op::SHORT_BINUNICODE);
                self.buf.push(len);
            }
            Err(_) => {
                self.op(op::BINUNICODE8);
                self.buf.extend_from_slice(&(text.len() as u64).to_le_bytes());
            }
        }
        self.buf.extend_from_slice(text.as_bytes());
    }

    fn bytes(&mut self, data: &[u8]) {
        if let Ok(len) = u8::try_from(data.len()) {
            self.op(op::SHORT_BINBYTES);
            self.buf.push(len);
        } else if let Ok(len) = u32::try_from(data.len()) {
            self.op(op::BINBYTES);
            self.buf.extend_from_slice(&len.to_le_bytes());
        } else {
            self.op(op::BINBYTES8);
            self.buf.extend_from_slice(&(data.len() as u64).to_le_bytes());
        }
        self.buf.extend_from_slice(data);
    }

    fn global(&mut self, module: &str, name: &str) {
        self.op(op::GLOBAL);
        self.buf.extend_from_slice(format!("{module}\n{name}\n").as_bytes());
    }

    /// Same opcode stream `ndarray.__reduce__` produces.
    fn ndarray(&mut self, array: &FieldArray) {
        let (descr, order, raw): (&str, &str, Vec<u8>) = match array {
            FieldArray::Float(a) => ("f8", "<", a.iter().flat_map(|v| v.to_le_bytes()).collect()),
            FieldArray::Int(a) => ("i8", "<", a.iter().flat_map(|v| v.to_le_bytes()).collect()),
            FieldArray::Bool(a) => ("b1", "|", a.iter().map(|&v| u8::from(v)).collect()),
        };

        self.global("numpy.core.multiarray", "_reconstruct");
        self.global("numpy", "ndarray");
        self.int(0);
        self.op(op::TUPLE1);
        self.bytes(b"b");
        self.op(op::TUPLE3);
        self.op(op::REDUCE);

        self.op(op::MARK);
        self.int(1);
        self.op(op::MARK);
        for &extent in array.shape() {
            self.int(extent as i64);
        }
        self.op(op::TUPLE);
        self.dtype(descr, order);
        self.op(op::NEWFALSE);
        self.bytes(&raw);
        self.op(op::TUPLE);
        self.op(op::BUILD);
    }

    fn dtype(&mut self, descr: &str, order: &str) {
        self.global("numpy", "dtype");
        self.unicode(descr);
        self.op(op::NEWFALSE);
        self.op(op::NEWTRUE);
        self.op(op::TUPLE3);
        self.op(op::REDUCE);

        self.op(op::MARK);
        self.int(3);
        self.unicode(order);
        self.op(op::NONE);
        self.op(op::NONE);
        self.op(op::NONE);
        self.int(-1);
        self.int(-1);
        self.int(0);
        self.op(op::TUPLE);
        self.op(op::BUILD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::unpickler::read_object;
    use serde_pickle::{HashableValue, SerOptions, Value};

    const CALO_PROTO2: &[u8] = include_bytes!("testdata/calo_proto2.pickle");
    const CALO_PROTO4: &[u8] = include_bytes!("testdata/calo_proto4.pickle");
    const CALO_PROTO5: &[u8] = include_bytes!("testdata/calo_proto5.pickle");
    const LAYOUTS_PROTO2: &[u8] = include_bytes!("testdata/layouts_proto2.pickle");
    const COMPLEX_PROTO4: &[u8] = include_bytes!("testdata/complex_proto4.pickle");

    fn decode_bytes(bytes: &[u8]) -> Result<Batch, DataError> {
        decode_batch(&read_object(bytes).unwrap())
    }

    /// Pickle built by an independent encoder, for the nested-list path.
    fn from_value(entries: Vec<(&str, Value)>) -> Result<Batch, DataError> {
        let dict = Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (HashableValue::String(k.to_string()), v))
                .collect(),
        );
        decode_bytes(&serde_pickle::value_to_vec(&dict, SerOptions::new()).unwrap())
    }

    fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    /// `make_fixtures.py`: x = i*1000 + r*28 + c, written in the order
    /// x, y, e, sig.
    fn assert_calo_batch(batch: &Batch) {
        assert_eq!(batch.names().collect::<Vec<_>>(), vec!["x", "y", "e", "sig"]);
        assert_eq!(batch.n_events().unwrap(), 3);

        let Some(FieldArray::Float(x)) = batch.get("x") else {
            panic!("x should be float, got {:?}", batch.get("x"));
        };
        assert_eq!(x.shape(), &[3, 28, 28, 1]);
        assert_eq!(x[[0, 0, 0, 0]], 0.0);
        assert_eq!(x[[1, 2, 3, 0]], 1059.0);
        assert_eq!(x[[2, 27, 27, 0]], 2755.0);

        let Some(FieldArray::Int(y)) = batch.get("y") else {
            panic!("y should be int");
        };
        assert_eq!(y.shape(), &[3]);
        assert_eq!(y.iter().copied().collect::<Vec<_>>(), vec![7, -2, 5]);

        let Some(FieldArray::Float(e)) = batch.get("e") else {
            panic!("e should be float");
        };
        assert_eq!(e.iter().copied().collect::<Vec<_>>(), vec![0.5, 1.25, -3.0]);

        let Some(FieldArray::Bool(sig)) = batch.get("sig") else {
            panic!("sig should be bool");
        };
        assert_eq!(sig.iter().copied().collect::<Vec<_>>(), vec![true, false, true]);
    }

    #[test]
    fn numpy_arrays_from_protocol_2() {
        assert_calo_batch(&decode_bytes(CALO_PROTO2).unwrap());
    }

    #[test]
    fn numpy_arrays_from_protocol_4() {
        assert_calo_batch(&decode_bytes(CALO_PROTO4).unwrap());
    }

    #[test]
    fn numpy_arrays_from_protocol_5_buffers() {
        assert_calo_batch(&decode_bytes(CALO_PROTO5).unwrap());
    }

    #[test]
    fn fortran_order_and_big_endian_buffers() {
        let batch = decode_bytes(LAYOUTS_PROTO2).unwrap();

        let Some(FieldArray::Int(m)) = batch.get("m") else {
            panic!("m should be int");
        };
        assert_eq!(m.shape(), &[2, 3]);
        assert_eq!(m.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);

        let Some(FieldArray::Float(b)) = batch.get("b") else {
            panic!("b should be float");
        };
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![1.5, -2.0]);
    }

    #[test]
    fn complex_dtype_is_rejected() {
        let err = decode_bytes(COMPLEX_PROTO4).unwrap_err();
        match err {
            DataError::UnsupportedDtype { field, descr } => {
                assert_eq!(field, "z");
                assert_eq!(descr, "c16");
            }
            other => panic!("expected UnsupportedDtype, got {other:?}"),
        }
    }

    #[test]
    fn encoded_batch_decodes_to_the_same_fields() {
        let x = ArrayD::from_shape_vec(IxDyn(&[2, 2, 1]), vec![0.0, 0.5, 1.0, 1.5]).unwrap();
        let y = ArrayD::from_shape_vec(IxDyn(&[2]), vec![7_i64, -300_000]).unwrap();
        let flags = ArrayD::from_shape_vec(IxDyn(&[2]), vec![true, false]).unwrap();
        let batch: Batch = [
            ("y", FieldArray::Int(y)),
            ("x", FieldArray::Float(x)),
            ("flags", FieldArray::Bool(flags)),
        ]
        .into_iter()
        .collect();

        let decoded = decode_bytes(&encode_batch(&batch)).unwrap();
        assert_eq!(decoded, batch);
        assert_eq!(decoded.names().next(), Some("y"));
    }

    #[test]
    fn truncated_buffer_is_reported() {
        let batch: Batch = [("x", FieldArray::Float(ArrayD::zeros(IxDyn(&[2, 3]))))]
            .into_iter()
            .collect();
        let mut bytes = encode_batch(&batch);
        // The 48-byte buffer is written as SHORT_BINBYTES; claim 40 instead.
        let at = bytes
            .windows(2)
            .rposition(|w| w == [op::SHORT_BINBYTES, 48])
            .unwrap();
        bytes[at + 1] = 40;
        bytes.drain(at + 2..at + 10);

        let err = decode_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DataError::BufferSize { expected: 48, found: 40, .. }
        ));
    }

    #[test]
    fn nested_lists_become_a_shaped_array() {
        let x = list(vec![
            list(vec![Value::F64(1.0), Value::F64(2.0)]),
            list(vec![Value::F64(3.0), Value::F64(4.0)]),
            list(vec![Value::F64(5.0), Value::F64(6.0)]),
        ]);
        let batch = from_value(vec![("x", x)]).unwrap();
        let field = batch.get("x").unwrap();
        assert_eq!(field.shape(), &[3, 2]);
        assert_eq!(field.dtype(), "float");
        assert_eq!(batch.n_events().unwrap(), 3);
    }

    #[test]
    fn element_type_is_promoted_by_leaves() {
        let mixed = list(vec![Value::I64(1), Value::F64(0.5)]);
        let ints = Value::Tuple(vec![Value::I64(1), Value::Bool(true)]);
        let flags = list(vec![Value::Bool(false), Value::Bool(true)]);
        let batch = from_value(vec![("m", mixed), ("i", ints), ("f", flags)]).unwrap();

        assert_eq!(batch.get("m").unwrap().dtype(), "float");
        assert_eq!(batch.get("i").unwrap().dtype(), "int");
        assert_eq!(batch.get("f").unwrap().dtype(), "bool");
    }

    #[test]
    fn ragged_lists_are_rejected() {
        let x = list(vec![
            list(vec![Value::F64(1.0), Value::F64(2.0)]),
            list(vec![Value::F64(3.0)]),
        ]);
        let err = from_value(vec![("x", x)]).unwrap_err();
        assert!(matches!(err, DataError::RaggedField { depth: 1, .. }));
    }

    #[test]
    fn root_must_be_a_dict() {
        // pickle.dumps([], protocol=2)
        let err = decode_bytes(b"\x80\x02]q\x00.").unwrap_err();
        assert!(matches!(err, DataError::UnexpectedRoot { found: "list" }));
    }

    #[test]
    fn scalar_fields_are_rejected() {
        let err = from_value(vec![("n", Value::I64(4))]).unwrap_err();
        assert!(matches!(err, DataError::ScalarField { .. }));
    }

    #[test]
    fn strings_are_not_array_elements() {
        let names = list(vec![Value::String("a".into())]);
        let err = from_value(vec![("names", names)]).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedValue { kind: "str", .. }));
    }
}
