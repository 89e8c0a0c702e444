//! Deep structural capture of arbitrary values.
//!
//! A snapshot is a self-contained [`Value`] tree. Once taken it shares
//! nothing with the original, so later in-place mutation of the source cannot
//! leak into a stored "before" state.

use serde::ser::{self, Error as _, Serialize, Serializer};
use serde_json::Value;

use crate::errors::SnapshotError;

/// Capture `value` as a structural snapshot.
///
/// Fails when the value cannot be fully represented, for example a map with
/// non-string keys, a NaN or infinite float, or a `Serialize` impl that
/// reports an error. Nothing is silently dropped.
pub fn snapshot<T: Serialize + ?Sized>(
    subject: impl Into<String>,
    value: &T,
) -> Result<Value, SnapshotError> {
    value
        .serialize(FiniteFloats)
        .and_then(|()| serde_json::to_value(value))
        .map_err(|source| SnapshotError {
            subject: subject.into(),
            source,
        })
}

/// Walks a value and rejects floats JSON cannot hold.
///
/// `serde_json` writes NaN and infinities as `null`, which would lose the
/// original value without a trace.
struct FiniteFloats;

type Check = Result<(), serde_json::Error>;

fn finite(v: f64) -> Check {
    if v.is_finite() {
        Ok(())
    } else {
        Err(serde_json::Error::custom(format!(
            "non-finite float {v} has no JSON form"
        )))
    }
}

impl Serializer for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Check {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Check {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Check {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Check {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Check {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Check {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Check {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Check {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Check {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Check {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Check {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Check {
        finite(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Check {
        finite(v)
    }
    fn serialize_char(self, _: char) -> Check {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Check {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Check {
        Ok(())
    }
    fn serialize_none(self) -> Check {
        Ok(())
    }
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Check {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Check {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Check {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Check {
        Ok(())
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(self, _: &'static str, value: &T) -> Check {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Check {
        key.serialize(FiniteFloats)
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Check {
        value.serialize(FiniteFloats)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

/// Short, human-readable name of `T` for the `Target.Type` field.
///
/// Module paths are stripped from every path segment, so
/// `shop::model::Order` becomes `Order` and
/// `alloc::vec::Vec<shop::Order>` becomes `Vec<Order>`.
#[must_use]
pub fn type_label<T: ?Sized>() -> String {
    shorten(std::any::type_name::<T>())
}

fn shorten(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            out.push_str(segment.rsplit("::").next().unwrap_or_default());
            segment.clear();
            out.push(ch);
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or_default());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Serialize, Clone)]
    struct Order {
        id: u32,
        status: i32,
        lines: Vec<String>,
    }

    #[test]
    fn snapshot_is_independent_of_later_mutation() {
        let mut order = Order {
            id: 1,
            status: 2,
            lines: vec!["a".into()],
        };
        let before = snapshot("Order", &order).unwrap();
        order.status = -1;
        order.lines.push("b".into());

        assert_eq!(before["status"], 2);
        assert_eq!(before["lines"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn nested_structures_are_captured() {
        let mut nested: HashMap<String, Vec<i32>> = HashMap::new();
        let _ = nested.insert("k".into(), vec![1, 2, 3]);
        let value = snapshot("map", &nested).unwrap();
        assert_eq!(value["k"][2], 3);
    }

    #[test]
    fn non_string_map_keys_fail() {
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        let _ = bad.insert((1, 2), 3);
        let err = snapshot("grid", &bad).unwrap_err();
        assert_eq!(err.subject, "grid");
    }

    #[derive(Serialize)]
    struct Reading {
        sensor: &'static str,
        value: f64,
    }

    #[test]
    fn non_finite_floats_fail() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = snapshot("Reading", &Reading { sensor: "t1", value }).unwrap_err();
            assert_eq!(err.subject, "Reading");
            assert!(err.to_string().contains("non-finite"));
        }
    }

    #[test]
    fn nested_non_finite_float_fails() {
        let mut readings: HashMap<String, Vec<Option<f32>>> = HashMap::new();
        let _ = readings.insert("t1".into(), vec![Some(1.5), Some(f32::NAN)]);
        assert!(snapshot("readings", &readings).is_err());
    }

    #[test]
    fn finite_floats_pass() {
        let value = snapshot("Reading", &Reading { sensor: "t1", value: -0.25 }).unwrap();
        assert_eq!(value["value"], -0.25);
    }

    #[test]
    fn type_label_strips_paths() {
        assert_eq!(type_label::<Order>(), "Order");
        assert_eq!(type_label::<Vec<Order>>(), "Vec<Order>");
        assert_eq!(type_label::<HashMap<String, i32>>(), "HashMap<String, i32>");
        assert_eq!(type_label::<i64>(), "i64");
    }
}
