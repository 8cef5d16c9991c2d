//! Conversion of snapshots into the remote document representation.
//!
//! The remote store rejects documents with absent values. Locally a field
//! that is unset is simply omitted (`skip_serializing_if`); remotely every
//! such field must be present as an explicit `null`.
//!
//! [`sanitize`] serializes through [`NullFilling`], a serializer that builds a
//! [`serde_json::Value`] like `serde_json::to_value` does, except that every
//! skipped struct field is emitted as `null` instead of being dropped.

use crate::error::{Result, StoreError};
use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};

/// Convert `value` into a document with no absent fields at any depth.
///
/// Sequences are converted element-wise, maps key-wise, and primitives pass
/// through unchanged. Applying it to its own output is the identity.
pub fn sanitize<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    value
        .serialize(NullFilling)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn error(msg: impl std::fmt::Display) -> serde_json::Error {
    <serde_json::Error as ser::Error>::custom(msg)
}

/// Serializer producing a [`Value`] with skipped fields filled by `null`.
pub struct NullFilling;

impl ser::Serializer for NullFilling {
    type Ok = Value;
    type Error = serde_json::Error;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i16(self, v: i16) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i32(self, v: i32) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i64(self, v: i64) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u8(self, v: u8) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u16(self, v: u16) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u32(self, v: u32) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u64(self, v: u64) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_f32(self, v: f32) -> std::result::Result<Value, Self::Error> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> std::result::Result<Value, Self::Error> {
        // Non-finite floats have no JSON form; serde_json maps them to null too.
        Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn serialize_char(self, v: char) -> std::result::Result<Value, Self::Error> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> std::result::Result<Value, Self::Error> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Array(
            v.iter().map(|b| Value::Number((*b).into())).collect(),
        ))
    }

    fn serialize_none(self) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> std::result::Result<Value, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> std::result::Result<Value, Self::Error> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> std::result::Result<Value, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> std::result::Result<Value, Self::Error> {
        let mut map = Map::new();
        map.insert(variant.to_owned(), value.serialize(NullFilling)?);
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> std::result::Result<SeqBuilder, Self::Error> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> std::result::Result<SeqBuilder, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> std::result::Result<SeqBuilder, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> std::result::Result<VariantSeqBuilder, Self::Error> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<MapBuilder, Self::Error> {
        Ok(MapBuilder {
            map: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> std::result::Result<MapBuilder, Self::Error> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> std::result::Result<VariantMapBuilder, Self::Error> {
        Ok(VariantMapBuilder {
            variant,
            map: Map::new(),
        })
    }
}

/// Map keys must end up as strings.
fn key_to_string<T: Serialize + ?Sized>(key: &T) -> std::result::Result<String, serde_json::Error> {
    match key.serialize(NullFilling)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(error(format!("map key must be a string, got {}", other))),
    }
}

pub struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), Self::Error> {
        self.items.push(value.serialize(NullFilling)?);
        Ok(())
    }

    fn end(self) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> std::result::Result<Value, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), Self::Error> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> std::result::Result<Value, Self::Error> {
        ser::SerializeSeq::end(self)
    }
}

pub struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), Self::Error> {
        self.items.push(value.serialize(NullFilling)?);
        Ok(())
    }

    fn end(self) -> std::result::Result<Value, Self::Error> {
        let mut map = Map::new();
        map.insert(self.variant.to_owned(), Value::Array(self.items));
        Ok(Value::Object(map))
    }
}

pub struct MapBuilder {
    map: Map<String, Value>,
    next_key: Option<String>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(
        &mut self,
        key: &T,
    ) -> std::result::Result<(), Self::Error> {
        self.next_key = Some(key_to_string(key)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), Self::Error> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| error("serialize_value called before serialize_key"))?;
        self.map.insert(key, value.serialize(NullFilling)?);
        Ok(())
    }

    fn end(self) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> std::result::Result<(), Self::Error> {
        self.map.insert(key.to_owned(), value.serialize(NullFilling)?);
        Ok(())
    }

    fn skip_field(&mut self, key: &'static str) -> std::result::Result<(), Self::Error> {
        self.map.insert(key.to_owned(), Value::Null);
        Ok(())
    }

    fn end(self) -> std::result::Result<Value, Self::Error> {
        Ok(Value::Object(self.map))
    }
}

pub struct VariantMapBuilder {
    variant: &'static str,
    map: Map<String, Value>,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> std::result::Result<(), Self::Error> {
        self.map.insert(key.to_owned(), value.serialize(NullFilling)?);
        Ok(())
    }

    fn skip_field(&mut self, key: &'static str) -> std::result::Result<(), Self::Error> {
        self.map.insert(key.to_owned(), Value::Null);
        Ok(())
    }

    fn end(self) -> std::result::Result<Value, Self::Error> {
        let mut outer = Map::new();
        outer.insert(self.variant.to_owned(), Value::Object(self.map));
        Ok(Value::Object(outer))
    }
}
