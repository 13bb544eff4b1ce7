use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

/// Highest pickle protocol the reader understands.
pub const HIGHEST_PROTOCOL: u8 = 5;

// ---------------------------------------------------------------------------
// Object – what the pickle stream builds
// ---------------------------------------------------------------------------

/// A Python object as rebuilt from a pickle stream.
///
/// Nothing is imported or called: globals stay as names, and `REDUCE` /
/// `NEWOBJ` / `BUILD` become [`Instance`] records that keep the callable,
/// its arguments and any state set afterwards. Mutable containers are
/// shared handles, so a memoised list or instance sees later `APPEND`s and
/// `BUILD`s exactly like the Python object would.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Rc<[Object]>),
    List(Rc<RefCell<Vec<Object>>>),
    /// Entries in insertion order.
    Dict(Rc<RefCell<Vec<(Object, Object)>>>),
    Global { module: Rc<str>, name: Rc<str> },
    Instance(Rc<RefCell<Instance>>),
}

/// `callable(*args)`, followed by an optional `__setstate__(state)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub callable: Object,
    pub args: Object,
    pub state: Option<Object>,
}

impl Object {
    /// Python type name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Object::None => "None",
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Str(_) => "str",
            Object::Bytes(_) => "bytes",
            Object::Tuple(_) => "tuple",
            Object::List(_) => "list",
            Object::Dict(_) => "dict",
            Object::Global { .. } => "global",
            Object::Instance(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Object::Int(v) => Some(*v),
            Object::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Bool(b) => Some(*b),
            Object::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Elements of a tuple or list. Cheap: nested containers are shared.
    pub fn items(&self) -> Option<Vec<Object>> {
        match self {
            Object::Tuple(items) => Some(items.to_vec()),
            Object::List(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    /// `(module, name)` of a global reference.
    pub fn global(&self) -> Option<(&str, &str)> {
        match self {
            Object::Global { module, name } => Some((&**module, &**name)),
            _ => None,
        }
    }

    fn tuple(items: Vec<Object>) -> Object {
        Object::Tuple(items.into())
    }

    fn list(items: Vec<Object>) -> Object {
        Object::List(Rc::new(RefCell::new(items)))
    }

    fn dict(entries: Vec<(Object, Object)>) -> Object {
        let dict = Object::Dict(Rc::default());
        for (key, value) in entries {
            dict_set(&dict, key, value);
        }
        dict
    }
}

/// Python dict assignment: an existing key keeps its position.
fn dict_set(dict: &Object, key: Object, value: Object) -> bool {
    let Object::Dict(entries) = dict else {
        return false;
    };
    let mut entries = entries.borrow_mut();
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
    true
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PickleError {
    #[error("reading pickle stream")]
    Io(#[from] std::io::Error),

    #[error("unsupported pickle protocol {0}")]
    Protocol(u8),

    #[error("unknown opcode 0x{opcode:02x} at byte {pos}")]
    UnknownOpcode { opcode: u8, pos: usize },

    #[error("{opcode} at byte {pos} is not supported")]
    Unsupported { opcode: &'static str, pos: usize },

    #[error("stack underflow at byte {pos}")]
    StackUnderflow { pos: usize },

    #[error("no MARK on the stack at byte {pos}")]
    MissingMark { pos: usize },

    #[error("memo key {key} not found at byte {pos}")]
    MissingMemo { key: u32, pos: usize },

    #[error("malformed {what} at byte {pos}")]
    Malformed { what: &'static str, pos: usize },
}

// ---------------------------------------------------------------------------
// Opcodes (protocols 0-5, binary forms plus the common text ones)
// ---------------------------------------------------------------------------

pub(super) mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const DUP: u8 = b'2';
    pub const FLOAT: u8 = b'F';
    pub const INT: u8 = b'I';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const LONG: u8 = b'L';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const PERSID: u8 = b'P';
    pub const BINPERSID: u8 = b'Q';
    pub const REDUCE: u8 = b'R';
    pub const STRING: u8 = b'S';
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
    pub const UNICODE: u8 = b'V';
    pub const BINUNICODE: u8 = b'X';
    pub const APPEND: u8 = b'a';
    pub const BUILD: u8 = b'b';
    pub const GLOBAL: u8 = b'c';
    pub const DICT: u8 = b'd';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPENDS: u8 = b'e';
    pub const GET: u8 = b'g';
    pub const BINGET: u8 = b'h';
    pub const INST: u8 = b'i';
    pub const LONG_BINGET: u8 = b'j';
    pub const LIST: u8 = b'l';
    pub const EMPTY_LIST: u8 = b']';
    pub const OBJ: u8 = b'o';
    pub const PUT: u8 = b'p';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const SETITEM: u8 = b's';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';
    // protocol 2
    pub const PROTO: u8 = 0x80;
    pub const NEWOBJ: u8 = 0x81;
    pub const EXT1: u8 = 0x82;
    pub const EXT2: u8 = 0x83;
    pub const EXT4: u8 = 0x84;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const LONG4: u8 = 0x8b;
    // protocol 3
    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';
    // protocol 4
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const EMPTY_SET: u8 = 0x8f;
    pub const ADDITEMS: u8 = 0x90;
    pub const FROZENSET: u8 = 0x91;
    pub const NEWOBJ_EX: u8 = 0x92;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
    // protocol 5
    pub const BYTEARRAY8: u8 = 0x96;
    pub const NEXT_BUFFER: u8 = 0x97;
    pub const READONLY_BUFFER: u8 = 0x98;
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Run the pickle machine over `reader` until `STOP` and return the result.
pub fn read_object<R: Read>(reader: R) -> Result<Object, PickleError> {
    Machine::new(reader).run()
}

// ---------------------------------------------------------------------------
// The machine
// ---------------------------------------------------------------------------

struct Machine<R> {
    reader: R,
    pos: usize,
    stack: Vec<Object>,
    /// Stack heights at each open MARK.
    marks: Vec<usize>,
    memo: HashMap<u32, Object>,
}

impl<R: Read> Machine<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
        }
    }

    fn run(mut self) -> Result<Object, PickleError> {
        loop {
            let at = self.pos;
            let opcode = self.read_u8()?;
            match opcode {
                op::PROTO => {
                    let version = self.read_u8()?;
                    if version > HIGHEST_PROTOCOL {
                        return Err(PickleError::Protocol(version));
                    }
                }
                op::FRAME => {
                    self.read_u64()?;
                }
                op::STOP => return self.pop(at),

                // Stack manipulation
                op::MARK => self.marks.push(self.stack.len()),
                op::POP => {
                    if self.marks.last() == Some(&self.stack.len()) {
                        self.marks.pop();
                    } else {
                        self.pop(at)?;
                    }
                }
                op::POP_MARK => {
                    self.pop_mark(at)?;
                }
                op::DUP => {
                    let top = self.top(at)?.clone();
                    self.stack.push(top);
                }

                // Scalars
                op::NONE => self.stack.push(Object::None),
                op::NEWTRUE => self.stack.push(Object::Bool(true)),
                op::NEWFALSE => self.stack.push(Object::Bool(false)),
                op::INT => {
                    let line = self.read_line(at)?;
                    let value = match line.as_str() {
                        "00" => Object::Bool(false),
                        "01" => Object::Bool(true),
                        text => Object::Int(parse_text(text, "INT", at)?),
                    };
                    self.stack.push(value);
                }
                op::LONG => {
                    let line = self.read_line(at)?;
                    let value = parse_text(line.trim_end_matches('L'), "LONG", at)?;
                    self.stack.push(Object::Int(value));
                }
                op::BININT => {
                    let value = i32::from_le_bytes(self.read_array()?);
                    self.stack.push(Object::Int(i64::from(value)));
                }
                op::BININT1 => {
                    let value = self.read_u8()?;
                    self.stack.push(Object::Int(i64::from(value)));
                }
                op::BININT2 => {
                    let value = u16::from_le_bytes(self.read_array()?);
                    self.stack.push(Object::Int(i64::from(value)));
                }
                op::LONG1 => {
                    let len = usize::from(self.read_u8()?);
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(Object::Int(decode_long(&bytes, at)?));
                }
                op::LONG4 => {
                    let len = self.read_len_i32(at)?;
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(Object::Int(decode_long(&bytes, at)?));
                }
                op::FLOAT => {
                    let line = self.read_line(at)?;
                    self.stack.push(Object::Float(parse_text(&line, "FLOAT", at)?));
                }
                op::BINFLOAT => {
                    let value = f64::from_be_bytes(self.read_array()?);
                    self.stack.push(Object::Float(value));
                }

                // Strings and bytes
                op::BINUNICODE => {
                    let len = self.read_len_u32()?;
                    self.push_str(len, at)?;
                }
                op::SHORT_BINUNICODE => {
                    let len = usize::from(self.read_u8()?);
                    self.push_str(len, at)?;
                }
                op::BINUNICODE8 => {
                    let len = self.read_len_u64(at)?;
                    self.push_str(len, at)?;
                }
                // Python 2 `str` is a byte string.
                op::BINSTRING => {
                    let len = self.read_len_i32(at)?;
                    self.push_bytes(len)?;
                }
                op::SHORT_BINSTRING | op::SHORT_BINBYTES => {
                    let len = usize::from(self.read_u8()?);
                    self.push_bytes(len)?;
                }
                op::BINBYTES => {
                    let len = self.read_len_u32()?;
                    self.push_bytes(len)?;
                }
                op::BINBYTES8 | op::BYTEARRAY8 => {
                    let len = self.read_len_u64(at)?;
                    self.push_bytes(len)?;
                }
                op::READONLY_BUFFER => {}

                // Containers
                op::EMPTY_TUPLE => self.stack.push(Object::tuple(Vec::new())),
                op::TUPLE => {
                    let items = self.pop_mark(at)?;
                    self.stack.push(Object::tuple(items));
                }
                op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                    let n = usize::from(opcode - op::TUPLE1 + 1);
                    let items = self.pop_n(n, at)?;
                    self.stack.push(Object::tuple(items));
                }
                op::EMPTY_LIST | op::EMPTY_SET => self.stack.push(Object::list(Vec::new())),
                op::LIST => {
                    let items = self.pop_mark(at)?;
                    self.stack.push(Object::list(items));
                }
                op::FROZENSET => {
                    let items = self.pop_mark(at)?;
                    self.stack.push(Object::tuple(items));
                }
                op::APPEND => {
                    let item = self.pop(at)?;
                    self.extend_top(vec![item], at)?;
                }
                op::APPENDS | op::ADDITEMS => {
                    let items = self.pop_mark(at)?;
                    self.extend_top(items, at)?;
                }
                op::EMPTY_DICT => self.stack.push(Object::dict(Vec::new())),
                op::DICT => {
                    let items = self.pop_mark(at)?;
                    let entries = pairs(items, at)?;
                    self.stack.push(Object::dict(entries));
                }
                op::SETITEM => {
                    let value = self.pop(at)?;
                    let key = self.pop(at)?;
                    self.set_items(vec![(key, value)], at)?;
                }
                op::SETITEMS => {
                    let items = self.pop_mark(at)?;
                    let entries = pairs(items, at)?;
                    self.set_items(entries, at)?;
                }

                // Globals and object construction
                op::GLOBAL => {
                    let module = self.read_line(at)?;
                    let name = self.read_line(at)?;
                    self.stack.push(Object::Global {
                        module: module.into(),
                        name: name.into(),
                    });
                }
                op::STACK_GLOBAL => {
                    let name = self.pop(at)?;
                    let module = self.pop(at)?;
                    let (Some(module), Some(name)) = (module.as_str(), name.as_str()) else {
                        return Err(PickleError::Malformed {
                            what: "STACK_GLOBAL operands",
                            pos: at,
                        });
                    };
                    self.stack.push(Object::Global {
                        module: module.into(),
                        name: name.into(),
                    });
                }
                op::REDUCE | op::NEWOBJ => {
                    let args = self.pop(at)?;
                    let callable = self.pop(at)?;
                    let object = reduce(callable, args, at)?;
                    self.stack.push(object);
                }
                op::NEWOBJ_EX => {
                    let _kwargs = self.pop(at)?;
                    let args = self.pop(at)?;
                    let class = self.pop(at)?;
                    self.stack.push(instance(class, args));
                }
                op::BUILD => {
                    let state = self.pop(at)?;
                    let target = self.top(at)?;
                    if let Object::Instance(inst) = target {
                        inst.borrow_mut().state = Some(state);
                    } else {
                        let target = self.pop(at)?;
                        self.stack.push(Object::Instance(Rc::new(RefCell::new(Instance {
                            callable: target,
                            args: Object::tuple(Vec::new()),
                            state: Some(state),
                        }))));
                    }
                }

                // Memo
                op::PUT => {
                    let key = parse_text(&self.read_line(at)?, "PUT", at)?;
                    self.memoize(key, at)?;
                }
                op::BINPUT => {
                    let key = u32::from(self.read_u8()?);
                    self.memoize(key, at)?;
                }
                op::LONG_BINPUT => {
                    let key = u32::from_le_bytes(self.read_array()?);
                    self.memoize(key, at)?;
                }
                op::MEMOIZE => {
                    let key = u32::try_from(self.memo.len()).map_err(|_| PickleError::Malformed {
                        what: "memo size",
                        pos: at,
                    })?;
                    self.memoize(key, at)?;
                }
                op::GET => {
                    let key = parse_text(&self.read_line(at)?, "GET", at)?;
                    self.recall(key, at)?;
                }
                op::BINGET => {
                    let key = u32::from(self.read_u8()?);
                    self.recall(key, at)?;
                }
                op::LONG_BINGET => {
                    let key = u32::from_le_bytes(self.read_array()?);
                    self.recall(key, at)?;
                }

                op::STRING => return Err(unsupported("STRING", at)),
                op::UNICODE => return Err(unsupported("UNICODE", at)),
                op::PERSID | op::BINPERSID => return Err(unsupported("persistent id", at)),
                op::INST | op::OBJ => return Err(unsupported("protocol 0 instance", at)),
                op::EXT1 | op::EXT2 | op::EXT4 => return Err(unsupported("extension registry", at)),
                op::NEXT_BUFFER => return Err(unsupported("out-of-band buffer", at)),
                _ => return Err(PickleError::UnknownOpcode { opcode, pos: at }),
            }
        }
    }

    // -- stack ------------------------------------------------------------

    fn pop(&mut self, pos: usize) -> Result<Object, PickleError> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() <= floor {
            return Err(PickleError::StackUnderflow { pos });
        }
        self.stack.pop().ok_or(PickleError::StackUnderflow { pos })
    }

    fn pop_n(&mut self, n: usize, pos: usize) -> Result<Vec<Object>, PickleError> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() < floor + n {
            return Err(PickleError::StackUnderflow { pos });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn pop_mark(&mut self, pos: usize) -> Result<Vec<Object>, PickleError> {
        let mark = self.marks.pop().ok_or(PickleError::MissingMark { pos })?;
        if mark > self.stack.len() {
            return Err(PickleError::StackUnderflow { pos });
        }
        Ok(self.stack.split_off(mark))
    }

    fn top(&self, pos: usize) -> Result<&Object, PickleError> {
        self.stack.last().ok_or(PickleError::StackUnderflow { pos })
    }

    fn extend_top(&mut self, items: Vec<Object>, pos: usize) -> Result<(), PickleError> {
        match self.top(pos)? {
            Object::List(list) => {
                list.borrow_mut().extend(items);
                Ok(())
            }
            _ => Err(PickleError::Malformed {
                what: "append target",
                pos,
            }),
        }
    }

    fn set_items(&mut self, entries: Vec<(Object, Object)>, pos: usize) -> Result<(), PickleError> {
        let dict = self.top(pos)?;
        for (key, value) in entries {
            if !dict_set(dict, key, value) {
                return Err(PickleError::Malformed {
                    what: "setitem target",
                    pos,
                });
            }
        }
        Ok(())
    }

    fn push_str(&mut self, len: usize, pos: usize) -> Result<(), PickleError> {
        let bytes = self.read_bytes(len)?;
        let text = String::from_utf8(bytes).map_err(|_| PickleError::Malformed {
            what: "utf-8 string",
            pos,
        })?;
        self.stack.push(Object::Str(text.into()));
        Ok(())
    }

    fn push_bytes(&mut self, len: usize) -> Result<(), PickleError> {
        let bytes = self.read_bytes(len)?;
        self.stack.push(Object::Bytes(bytes.into()));
        Ok(())
    }

    // -- memo -------------------------------------------------------------

    fn memoize(&mut self, key: u32, pos: usize) -> Result<(), PickleError> {
        let top = self.top(pos)?.clone();
        self.memo.insert(key, top);
        Ok(())
    }

    fn recall(&mut self, key: u32, pos: usize) -> Result<(), PickleError> {
        let value = self
            .memo
            .get(&key)
            .cloned()
            .ok_or(PickleError::MissingMemo { key, pos })?;
        self.stack.push(value);
        Ok(())
    }

    // -- input ------------------------------------------------------------

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PickleError> {
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf)?;
        self.pos += N;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, PickleError> {
        let [byte] = self.read_array()?;
        Ok(byte)
    }

    fn read_u64(&mut self) -> Result<u64, PickleError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_len_u32(&mut self) -> Result<usize, PickleError> {
        let len = u32::from_le_bytes(self.read_array()?);
        Ok(len as usize)
    }

    fn read_len_i32(&mut self, pos: usize) -> Result<usize, PickleError> {
        let len = i32::from_le_bytes(self.read_array()?);
        usize::try_from(len).map_err(|_| PickleError::Malformed { what: "length", pos })
    }

    fn read_len_u64(&mut self, pos: usize) -> Result<usize, PickleError> {
        let len = self.read_u64()?;
        usize::try_from(len).map_err(|_| PickleError::Malformed { what: "length", pos })
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, PickleError> {
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        self.pos += read;
        if read != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(buf)
    }

    /// A newline-terminated argument of the text opcodes.
    fn read_line(&mut self, pos: usize) -> Result<String, PickleError> {
        let mut line = Vec::new();
        loop {
            match self.read_u8()? {
                b'\n' => break,
                byte => line.push(byte),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).map_err(|_| PickleError::Malformed {
            what: "text argument",
            pos,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unsupported(opcode: &'static str, pos: usize) -> PickleError {
    PickleError::Unsupported { opcode, pos }
}

fn parse_text<T: std::str::FromStr>(text: &str, what: &'static str, pos: usize) -> Result<T, PickleError> {
    text.trim()
        .parse()
        .map_err(|_| PickleError::Malformed { what, pos })
}

/// Little-endian two's complement, as written by LONG1 / LONG4.
fn decode_long(bytes: &[u8], pos: usize) -> Result<i64, PickleError> {
    if bytes.len() > 8 {
        return Err(PickleError::Malformed {
            what: "integer wider than 64 bits",
            pos,
        });
    }
    let negative = bytes.last().is_some_and(|b| b & 0x80 != 0);
    let mut buf = if negative { [0xff; 8] } else { [0; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

fn pairs(items: Vec<Object>, pos: usize) -> Result<Vec<(Object, Object)>, PickleError> {
    if items.len() % 2 != 0 {
        return Err(PickleError::Malformed {
            what: "odd number of dict items",
            pos,
        });
    }
    let mut entries = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        entries.push((key, value));
    }
    Ok(entries)
}

fn instance(callable: Object, args: Object) -> Object {
    Object::Instance(Rc::new(RefCell::new(Instance {
        callable,
        args,
        state: None,
    })))
}

/// `REDUCE` without running anything, except for the few builtins that
/// only exist to spell `bytes` in older protocols.
fn reduce(callable: Object, args: Object, pos: usize) -> Result<Object, PickleError> {
    let codecs_encode = matches!(callable.global(), Some(("_codecs", "encode")));
    let bytes_builtin = matches!(
        callable.global(),
        Some(("builtins" | "__builtin__", "bytes" | "bytearray"))
    );
    let items = args.items().unwrap_or_default();

    // Protocol 2 writes `b"…"` as `_codecs.encode("…", "latin1")`.
    if codecs_encode {
        let [text, encoding] = items.as_slice() else {
            return Err(PickleError::Malformed {
                what: "_codecs.encode arguments",
                pos,
            });
        };
        if let (Some(text), Some("latin1" | "latin-1")) = (text.as_str(), encoding.as_str()) {
            let bytes = text
                .chars()
                .map(|c| u8::try_from(u32::from(c)))
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| PickleError::Malformed {
                    what: "latin1 byte string",
                    pos,
                })?;
            return Ok(Object::Bytes(bytes.into()));
        }
    }

    if bytes_builtin {
        match items.as_slice() {
            [] => return Ok(Object::Bytes(Rc::from(Vec::new()))),
            [Object::Bytes(bytes)] => return Ok(Object::Bytes(bytes.clone())),
            _ => {}
        }
    }

    Ok(instance(callable, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(bytes: &[u8]) -> Result<Object, PickleError> {
        read_object(bytes)
    }

    fn entries(object: &Object) -> Vec<(Object, Object)> {
        match object {
            Object::Dict(entries) => entries.borrow().clone(),
            other => panic!("expected dict, got {other:?}"),
        }
    }

    fn s(text: &str) -> Object {
        Object::Str(text.into())
    }

    #[test]
    fn protocol_2_dict_keeps_insertion_order() {
        // pickle.dumps({'b': 1, 'a': -2}, protocol=2)
        let bytes = b"\x80\x02}q\x00(X\x01\x00\x00\x00bq\x01K\x01X\x01\x00\x00\x00aq\x02J\xfe\xff\xff\xffu.";
        let dict = read(bytes).unwrap();
        assert_eq!(
            entries(&dict),
            vec![(s("b"), Object::Int(1)), (s("a"), Object::Int(-2))]
        );
    }

    #[test]
    fn memoised_list_sees_later_appends() {
        // l = [1]; pickle.dumps([l, l], protocol=2) with the inner list
        // memoised before it is filled.
        let bytes = b"\x80\x02]q\x00(]q\x01K\x01ah\x01e.";
        let outer = read(bytes).unwrap();
        let items = outer.items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], items[1]);
        assert_eq!(items[1].items().unwrap(), vec![Object::Int(1)]);
    }

    #[test]
    fn build_state_is_visible_through_the_memo() {
        // GLOBAL m.C, (), REDUCE, BINPUT 0, state 7, BUILD, POP, BINGET 0
        let bytes = b"\x80\x02cm\nC\n)Rq\x00K\x07b0h\x00.";
        let Object::Instance(inst) = read(bytes).unwrap() else {
            panic!("expected an instance");
        };
        let inst = inst.borrow();
        assert_eq!(inst.callable.global(), Some(("m", "C")));
        assert_eq!(inst.state, Some(Object::Int(7)));
    }

    #[test]
    fn codecs_encode_becomes_bytes() {
        // pickle.dumps(b'\x01\xff', protocol=2)
        let bytes = b"\x80\x02c_codecs\nencode\nq\x00X\x03\x00\x00\x00\x01\xc3\xbfq\x01X\x06\x00\x00\x00latin1q\x02\x86q\x03Rq\x04.";
        assert_eq!(read(bytes).unwrap(), Object::Bytes(Rc::from(vec![1u8, 255])));
    }

    #[test]
    fn protocol_4_framing_and_stack_global() {
        // FRAME, SHORT_BINUNICODE 'numpy', MEMOIZE, 'dtype', MEMOIZE, STACK_GLOBAL
        let bytes = b"\x80\x04\x95\x12\x00\x00\x00\x00\x00\x00\x00\x8c\x05numpy\x94\x8c\x05dtype\x94\x93\x94.";
        assert_eq!(read(bytes).unwrap().global(), Some(("numpy", "dtype")));
    }

    #[test]
    fn long_and_float_opcodes() {
        // LONG1 of -129, BINFLOAT 1.5, TUPLE2
        let bytes = b"\x80\x02\x8a\x02\x7f\xffG?\xf8\x00\x00\x00\x00\x00\x00\x86.";
        assert_eq!(
            read(bytes).unwrap().items().unwrap(),
            vec![Object::Int(-129), Object::Float(1.5)]
        );
    }

    #[test]
    fn newer_protocols_are_rejected() {
        assert!(matches!(read(b"\x80\x06N."), Err(PickleError::Protocol(6))));
    }

    #[test]
    fn unknown_opcodes_report_their_position() {
        assert!(matches!(
            read(b"\x80\x02\xff"),
            Err(PickleError::UnknownOpcode { opcode: 0xff, pos: 2 })
        ));
    }

    #[test]
    fn truncated_stream_is_an_io_error() {
        let err = read(b"\x80\x02X\x05\x00\x00\x00ab").unwrap_err();
        assert!(matches!(err, PickleError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn out_of_band_buffers_are_unsupported() {
        assert!(matches!(
            read(b"\x80\x05\x97."),
            Err(PickleError::Unsupported { opcode: "out-of-band buffer", .. })
        ));
    }
}
