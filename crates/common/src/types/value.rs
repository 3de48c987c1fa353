// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Dynamic runtime values captured from a failing program.
//!
//! A [`Value`] is what a variable of the debugged program held when it was
//! captured. Most variants are plain data and can be transmitted; two are not:
//!
//! - [`Value::Opaque`] stands for a resource-bound object (file handle, socket,
//!   lock guard, ...) that only makes sense inside the producing process.
//! - [`Value::Shared`] is an aliased node. Aliasing makes object graphs with
//!   cycles possible, so encoders must track the nodes they are inside of.

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mapping from variable name to its captured value
pub type VariableMap = BTreeMap<String, Value>;

/// Maximum number of container items shown by the [`fmt::Display`] impl
const DISPLAY_MAX_ITEMS: usize = 10;
/// Maximum nesting shown by the [`fmt::Display`] impl
const DISPLAY_MAX_DEPTH: usize = 6;

/// A captured runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Growable sequence
    List(Vec<Value>),
    /// Fixed sequence
    Tuple(Vec<Value>),
    /// String-keyed mapping
    Map(BTreeMap<String, Value>),
    /// User-defined object, described by its class name and attributes
    Object {
        /// Class (type) name of the object
        class: String,
        /// Attribute values of the object
        attrs: BTreeMap<String, Value>,
    },
    /// Column-oriented tabular data
    Table(Table),
    /// Aliased value that may be referenced from several places
    Shared(SharedValue),
    /// Resource-bound object that cannot leave its process
    Opaque {
        /// Type name of the object, for display purposes
        type_name: String,
    },
}

impl Value {
    /// Create an opaque (never transmissible) value of the given type
    pub fn opaque(type_name: impl Into<String>) -> Self {
        Self::Opaque { type_name: type_name.into() }
    }

    /// Wrap a value into a new shared node
    pub fn shared(value: Self) -> Self {
        Self::Shared(SharedValue::new(value))
    }

    /// Create an object value
    pub fn object(
        class: impl Into<String>,
        attrs: impl IntoIterator<Item = (impl Into<String>, Self)>,
    ) -> Self {
        Self::Object {
            class: class.into(),
            attrs: attrs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Short type name of the value, as shown next to variables
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Map(_) => "map",
            Self::Object { class, .. } => class,
            Self::Table(_) => "table",
            Self::Shared(_) => "shared",
            Self::Opaque { type_name } => type_name,
        }
    }

    /// Truthiness of the value (empty containers, zero and `None` are false)
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::List(items) | Self::Tuple(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
            Self::Table(table) => table.num_columns() > 0,
            Self::Object { .. } | Self::Opaque { .. } => true,
            Self::Shared(shared) => shared.try_read().map(|v| v.is_truthy()).unwrap_or(true),
        }
    }

    /// Returns the string slice if this is a [`Value::Str`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is a [`Value::Int`]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the items if this is a [`Value::List`] or [`Value::Tuple`]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Drop everything this value holds, leaving it empty in place.
    ///
    /// Shared nodes are emptied as well, so memory pinned by other holders of
    /// the same node is released too. Cycles terminate because a node is
    /// emptied before its former contents are walked.
    pub fn release(&mut self) {
        match self {
            Self::List(items) | Self::Tuple(items) => {
                for item in items.iter_mut() {
                    item.release();
                }
                items.clear();
                items.shrink_to_fit();
            }
            Self::Map(map) | Self::Object { attrs: map, .. } => {
                for value in map.values_mut() {
                    value.release();
                }
                map.clear();
            }
            Self::Table(table) => table.clear(),
            Self::Bytes(bytes) => {
                bytes.clear();
                bytes.shrink_to_fit();
            }
            Self::Str(s) => {
                s.clear();
                s.shrink_to_fit();
            }
            Self::Shared(shared) => {
                let mut inner = shared.take();
                inner.release();
            }
            Self::None | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Opaque { .. } => {}
        }
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth > DISPLAY_MAX_DEPTH {
            return write!(f, "…");
        }
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::List(items) => fmt_seq(f, "[", "]", items, depth),
            Self::Tuple(items) => fmt_seq(f, "(", ")", items, depth),
            Self::Map(map) => {
                write!(f, "{{")?;
                fmt_entries(f, map, ": ", depth)?;
                write!(f, "}}")
            }
            Self::Object { class, attrs } => {
                write!(f, "{class} {{ ")?;
                fmt_entries(f, attrs, ": ", depth)?;
                write!(f, " }}")
            }
            Self::Table(table) => {
                write!(f, "<table {} columns × {} rows>", table.num_columns(), table.num_rows())
            }
            Self::Shared(shared) => match shared.try_read() {
                Some(inner) => inner.fmt_depth(f, depth + 1),
                None => write!(f, "<shared (locked)>"),
            },
            Self::Opaque { type_name } => write!(f, "<{type_name} object>"),
        }
    }
}

fn fmt_seq(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    close: &str,
    items: &[Value],
    depth: usize,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().take(DISPLAY_MAX_ITEMS).enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        item.fmt_depth(f, depth + 1)?;
    }
    if items.len() > DISPLAY_MAX_ITEMS {
        write!(f, ", … {} more", items.len() - DISPLAY_MAX_ITEMS)?;
    }
    write!(f, "{close}")
}

fn fmt_entries(
    f: &mut fmt::Formatter<'_>,
    entries: &BTreeMap<String, Value>,
    sep: &str,
    depth: usize,
) -> fmt::Result {
    for (i, (key, value)) in entries.iter().take(DISPLAY_MAX_ITEMS).enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key}{sep}")?;
        value.fmt_depth(f, depth + 1)?;
    }
    if entries.len() > DISPLAY_MAX_ITEMS {
        write!(f, ", … {} more", entries.len() - DISPLAY_MAX_ITEMS)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}

/// Structural equality. Shared nodes compare equal when they are the same
/// node or hold equal contents; comparing two distinct cyclic graphs does not
/// terminate.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object { class: ca, attrs: aa }, Self::Object { class: cb, attrs: ab }) => {
                ca == cb && aa == ab
            }
            (Self::Table(a), Self::Table(b)) => a == b,
            (Self::Shared(a), Self::Shared(b)) => a.ptr_eq(b) || *a.read() == *b.read(),
            (Self::Opaque { type_name: a }, Self::Opaque { type_name: b }) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, Self>> for Value {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Map(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Self::Table(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::None)
    }
}

/// Reference-counted, lockable value node
#[derive(Clone, Default)]
pub struct SharedValue(Arc<RwLock<Value>>);

impl SharedValue {
    /// Create a new shared node holding `value`
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Lock the node for reading
    pub fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read()
    }

    /// Try to lock the node for reading without blocking
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Value>> {
        self.0.try_read()
    }

    /// Lock the node for writing
    pub fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.0.write()
    }

    /// Replace the contents with [`Value::None`], returning the old contents
    pub fn take(&self) -> Value {
        std::mem::replace(&mut *self.0.write(), Value::None)
    }

    /// Whether both handles point at the same node
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the node, valid while any handle is alive
    pub fn node_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedValue({:#x})", self.node_id())
    }
}

/// Column-oriented table (a dataframe)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Columns in display order
    pub columns: Vec<Column>,
}

/// A named table column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Cell values, one per row
    pub values: Vec<Value>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.columns
            .push(Column { name: name.into(), values: values.into_iter().map(Into::into).collect() });
        self
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows (length of the longest column)
    pub fn num_rows(&self) -> usize {
        self.columns.iter().map(|c| c.values.len()).max().unwrap_or(0)
    }

    /// Drop all columns and rows, returning memory to the allocator
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            for value in &mut column.values {
                value.release();
            }
        }
        self.columns.clear();
        self.columns.shrink_to_fit();
    }
}
