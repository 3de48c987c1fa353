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

//! Serializable mirror of [`Value`].
//!
//! Only the transmissible part of the value model exists here. Converting a
//! [`Value`] into a [`WireValue`] is where unserializable values are detected:
//! opaque handles, cycles through shared nodes and runaway nesting.
//!
//! Decoding enforces the same nesting limit as encoding, so bytes from an
//! untrusted dump cannot nest deeper than a value the encoder would accept.

use std::{collections::BTreeMap, fmt};

use serde::{
    de::{self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, Unexpected, VariantAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use tbx_common::{Column, Table, Value};

use super::variable::NotSerializable;

/// Maximum nesting depth accepted by the encoder and the decoder
pub const MAX_ENCODE_DEPTH: usize = 128;

/// Upper bound on pre-allocated sequence capacity while decoding
const MAX_PREALLOC: usize = 4096;

#[derive(Debug, Serialize)]
pub(crate) enum WireValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<WireValue>),
    Tuple(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
    Object { class: String, attrs: BTreeMap<String, WireValue> },
    Table(Vec<WireColumn>),
}

#[derive(Debug, Serialize)]
pub(crate) struct WireColumn {
    name: String,
    values: Vec<WireValue>,
}

/// Converts values to their wire form, tracking the shared nodes currently
/// being visited.
#[derive(Debug, Default)]
pub(crate) struct WireEncoder {
    path: Vec<usize>,
}

impl WireEncoder {
    pub(crate) fn encode(value: &Value) -> Result<WireValue, NotSerializable> {
        Self::default().convert(value, 0)
    }

    fn convert(&mut self, value: &Value, depth: usize) -> Result<WireValue, NotSerializable> {
        if depth > MAX_ENCODE_DEPTH {
            return Err(NotSerializable::TooDeep { limit: MAX_ENCODE_DEPTH });
        }

        Ok(match value {
            Value::None => WireValue::None,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int(i) => WireValue::Int(*i),
            Value::Float(x) => WireValue::Float(*x),
            Value::Str(s) => WireValue::Str(s.clone()),
            Value::Bytes(b) => WireValue::Bytes(b.clone()),
            Value::List(items) => WireValue::List(self.convert_all(items, depth)?),
            Value::Tuple(items) => WireValue::Tuple(self.convert_all(items, depth)?),
            Value::Map(map) => WireValue::Map(self.convert_map(map, depth)?),
            Value::Object { class, attrs } => {
                WireValue::Object { class: class.clone(), attrs: self.convert_map(attrs, depth)? }
            }
            Value::Table(table) => WireValue::Table(
                table
                    .columns
                    .iter()
                    .map(|column| {
                        Ok(WireColumn {
                            name: column.name.clone(),
                            values: self.convert_all(&column.values, depth)?,
                        })
                    })
                    .collect::<Result<_, NotSerializable>>()?,
            ),
            Value::Shared(node) => {
                let node_id = node.node_id();
                if self.path.contains(&node_id) {
                    return Err(NotSerializable::Cycle);
                }
                let inner = node.try_read().ok_or(NotSerializable::Locked)?;
                self.path.push(node_id);
                let converted = self.convert(&inner, depth + 1);
                self.path.pop();
                converted?
            }
            Value::Opaque { type_name } => {
                return Err(NotSerializable::Unsupported { type_name: type_name.clone() })
            }
        })
    }

    fn convert_all(
        &mut self,
        items: &[Value],
        depth: usize,
    ) -> Result<Vec<WireValue>, NotSerializable> {
        items.iter().map(|item| self.convert(item, depth + 1)).collect()
    }

    fn convert_map(
        &mut self,
        map: &BTreeMap<String, Value>,
        depth: usize,
    ) -> Result<BTreeMap<String, WireValue>, NotSerializable> {
        map.iter().map(|(k, v)| Ok((k.clone(), self.convert(v, depth + 1)?))).collect()
    }
}

const VARIANTS: &[&str] =
    &["None", "Bool", "Int", "Float", "Str", "Bytes", "List", "Tuple", "Map", "Object", "Table"];

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ValueSeed { depth: 0 }.deserialize(deserializer)
    }
}

/// Decodes one value found at `depth`
#[derive(Debug, Clone, Copy)]
struct ValueSeed {
    depth: usize,
}

impl ValueSeed {
    fn nested(self) -> Self {
        Self { depth: self.depth + 1 }
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = WireValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        if self.depth > MAX_ENCODE_DEPTH {
            return Err(de::Error::custom(format_args!(
                "value nesting exceeds {MAX_ENCODE_DEPTH} levels"
            )));
        }
        deserializer.deserialize_enum("WireValue", VARIANTS, ValueVisitor(self))
    }
}

struct ValueVisitor(ValueSeed);

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a wire value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<WireValue, A::Error> {
        let (index, variant) = data.variant::<u32>()?;
        let nested = self.0.nested();
        Ok(match index {
            0 => {
                variant.unit_variant()?;
                WireValue::None
            }
            1 => WireValue::Bool(variant.newtype_variant()?),
            2 => WireValue::Int(variant.newtype_variant()?),
            3 => WireValue::Float(variant.newtype_variant()?),
            4 => WireValue::Str(variant.newtype_variant()?),
            5 => WireValue::Bytes(variant.newtype_variant()?),
            6 => WireValue::List(variant.newtype_variant_seed(SeqSeed(nested))?),
            7 => WireValue::Tuple(variant.newtype_variant_seed(SeqSeed(nested))?),
            8 => WireValue::Map(variant.newtype_variant_seed(MapSeed(nested))?),
            9 => variant.struct_variant(&["class", "attrs"], ObjectVisitor(nested))?,
            10 => WireValue::Table(variant.newtype_variant_seed(ColumnsSeed(nested))?),
            other => {
                return Err(de::Error::invalid_value(
                    Unexpected::Unsigned(other.into()),
                    &"a wire value variant index",
                ))
            }
        })
    }
}

/// Elements of a list, tuple or column
struct SeqSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for SeqSeed {
    type Value = Vec<WireValue>;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Vec<WireValue>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for SeqSeed {
    type Value = Vec<WireValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence of wire values")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<WireValue>, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(MAX_PREALLOC));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

/// Entries of a map or of an object's attributes
struct MapSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
    type Value = BTreeMap<String, WireValue>;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<BTreeMap<String, WireValue>, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MapSeed {
    type Value = BTreeMap<String, WireValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of wire values")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> Result<BTreeMap<String, WireValue>, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(self.0)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }
}

struct ObjectVisitor(ValueSeed);

impl<'de> Visitor<'de> for ObjectVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with a class and attributes")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        let class = seq
            .next_element::<String>()?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(0, &self))?;
        let attrs = seq
            .next_element_seed(MapSeed(self.0))?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(1, &self))?;
        Ok(WireValue::Object { class, attrs })
    }
}

/// Columns of a table
struct ColumnsSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ColumnsSeed {
    type Value = Vec<WireColumn>;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Vec<WireColumn>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ColumnsSeed {
    type Value = Vec<WireColumn>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence of table columns")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<WireColumn>, A::Error> {
        let mut columns = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(MAX_PREALLOC));
        while let Some(column) = seq.next_element_seed(ColumnSeed(self.0))? {
            columns.push(column);
        }
        Ok(columns)
    }
}

struct ColumnSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ColumnSeed {
    type Value = WireColumn;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireColumn, D::Error> {
        deserializer.deserialize_struct("WireColumn", &["name", "values"], self)
    }
}

impl<'de> Visitor<'de> for ColumnSeed {
    type Value = WireColumn;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a table column")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireColumn, A::Error> {
        let name = seq
            .next_element::<String>()?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(0, &self))?;
        let values = seq
            .next_element_seed(SeqSeed(self.0))?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(1, &self))?;
        Ok(WireColumn { name, values })
    }
}

impl From<WireValue> for Value {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::None => Self::None,
            WireValue::Bool(b) => Self::Bool(b),
            WireValue::Int(i) => Self::Int(i),
            WireValue::Float(x) => Self::Float(x),
            WireValue::Str(s) => Self::Str(s),
            WireValue::Bytes(b) => Self::Bytes(b),
            WireValue::List(items) => Self::List(items.into_iter().map(Into::into).collect()),
            WireValue::Tuple(items) => Self::Tuple(items.into_iter().map(Into::into).collect()),
            WireValue::Map(map) => Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
            WireValue::Object { class, attrs } => Self::Object {
                class,
                attrs: attrs.into_iter().map(|(k, v)| (k, v.into())).collect(),
            },
            WireValue::Table(columns) => Self::Table(Table {
                columns: columns
                    .into_iter()
                    .map(|column| Column {
                        name: column.name,
                        values: column.values.into_iter().map(Into::into).collect(),
                    })
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbx_common::SharedValue;

    #[test]
    fn test_shared_dag_is_not_a_cycle() {
        let node = SharedValue::new(Value::Int(7));
        let value = Value::List(vec![Value::Shared(node.clone()), Value::Shared(node)]);
        let wire = WireEncoder::encode(&value).unwrap();
        assert_eq!(Value::from(wire), Value::List(vec![Value::Int(7), Value::Int(7)]));
    }

    #[test]
    fn test_cycle_is_detected() {
        let node = SharedValue::new(Value::None);
        *node.write() = Value::List(vec![Value::Shared(node.clone())]);
        let err = WireEncoder::encode(&Value::Shared(node)).unwrap_err();
        assert_eq!(err, NotSerializable::Cycle);
    }

    #[test]
    fn test_depth_limit() {
        let mut value = Value::Int(0);
        for _ in 0..=MAX_ENCODE_DEPTH {
            value = Value::List(vec![value]);
        }
        let err = WireEncoder::encode(&value).unwrap_err();
        assert_eq!(err, NotSerializable::TooDeep { limit: MAX_ENCODE_DEPTH });
    }

    fn nested_lists(levels: usize) -> Value {
        (0..levels).fold(Value::Int(0), |inner, _| Value::List(vec![inner]))
    }

    #[test]
    fn test_deepest_encodable_value_decodes() {
        let value = nested_lists(MAX_ENCODE_DEPTH);
        let bytes = bincode::serialize(&WireEncoder::encode(&value).unwrap()).unwrap();
        let wire: WireValue = bincode::deserialize(&bytes).unwrap();
        assert_eq!(Value::from(wire), value);
    }

    #[test]
    fn test_decoder_rejects_excessive_nesting() {
        // `List` tag followed by a length of one, repeated, then a `None` leaf
        let mut bytes = Vec::new();
        for _ in 0..200_000 {
            bytes.extend_from_slice(&6u32.to_le_bytes());
            bytes.extend_from_slice(&1u64.to_le_bytes());
        }
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let err = bincode::deserialize::<WireValue>(&bytes).unwrap_err();
        assert!(err.to_string().contains("nesting exceeds"), "{err}");
    }

    #[test]
    fn test_decoder_reads_every_variant() {
        let value = Value::Tuple(vec![
            Value::None,
            Value::Bool(true),
            Value::Float(1.5),
            Value::Bytes(vec![1, 2]),
            Value::Map([("k".to_string(), Value::from("v"))].into()),
            Value::object("Point", [("x", Value::Int(1))]),
            Value::Table(Table::new().with_column("id", [1, 2])),
        ]);
        let bytes = bincode::serialize(&WireEncoder::encode(&value).unwrap()).unwrap();
        let wire: WireValue = bincode::deserialize(&bytes).unwrap();
        assert_eq!(Value::from(wire), value);
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        assert!(bincode::deserialize::<WireValue>(&42u32.to_le_bytes()).is_err());
    }

    #[test]
    fn test_locked_node_is_skipped() {
        let node = SharedValue::new(Value::Int(1));
        let _guard = node.write();
        let err = WireEncoder::encode(&Value::Shared(node.clone())).unwrap_err();
        assert_eq!(err, NotSerializable::Locked);
    }
}
