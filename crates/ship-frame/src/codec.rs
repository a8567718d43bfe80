//! The SHIP JSON convention: a structure travels as an ordered array of
//! single-key objects, one per field.
//!
//! ```text
//! struct Hello { phase: "ready", waiting: 60000 }
//!   ⇅
//! [{"phase":"ready"},{"waiting":60000}]
//! ```
//!
//! The codec is driven by each type's serde layout, so every message shape
//! shares one implementation:
//! - field order is the declared order (`serde_json` with `preserve_order`)
//! - omit-if-empty is `#[serde(skip_serializing_if = "Option::is_none")]`
//! - the wire key is the serde name (`rename`/`rename_all`)
//! - missing keys fall back to `#[serde(default)]`
//!
//! Nested structures that follow the same convention opt in with
//! `#[serde(with = "codec::nested")]` (or [`nested_option`]); any other
//! field value is ordinary JSON.
//!
//! [`to_vec`] and [`from_slice`] move each field value as raw JSON text, so a
//! `Box<RawValue>` field keeps its exact bytes (number precision, whitespace
//! and key order included).

use std::fmt;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::error::{FrameError, Result};

/// Encode a structure into its array-of-single-key-objects form.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(Value::Array(
            fields
                .into_iter()
                .map(|(key, value)| {
                    let mut entry = Map::with_capacity(1);
                    entry.insert(key, value);
                    Value::Object(entry)
                })
                .collect(),
        )),
        _ => Err(FrameError::NotAStruct(std::any::type_name::<T>())),
    }
}

/// Encode a structure into wire bytes.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let text = serde_json::to_string(value)?;
    if raw_kind(&text) != "object" {
        return Err(FrameError::NotAStruct(std::any::type_name::<T>()));
    }
    let RawEntries(fields) = serde_json::from_str(&text)?;

    let mut out = String::with_capacity(text.len() + 2 * fields.len() + 2);
    out.push('[');
    for (index, (key, value)) in fields.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push('{');
        push_member(&mut out, key, value)?;
        out.push('}');
    }
    out.push(']');
    Ok(out.into_bytes())
}

/// Decode a structure from its array-of-single-key-objects form.
///
/// A bare object is accepted as a one-element array. Keys without a matching
/// field are rejected with [`FrameError::FieldNotFound`].
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    let fields =
        struct_fields::<T>().ok_or(FrameError::NotAStruct(std::any::type_name::<T>()))?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(entry) => vec![Value::Object(entry)],
        other => {
            return Err(FrameError::InvalidShape(format!(
                "expected array of objects, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut merged = Map::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(entry) = entry else {
            return Err(FrameError::InvalidShape(format!(
                "expected single-key object, got {}",
                json_kind(&entry)
            )));
        };
        for (key, value) in entry {
            if !fields.contains(&key.as_str()) {
                return Err(FrameError::FieldNotFound(key));
            }
            merged.insert(key, value);
        }
    }

    Ok(serde_json::from_value(Value::Object(merged))?)
}

/// Decode a structure from wire bytes.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let raw: Box<RawValue> = serde_json::from_slice(bytes)?;
    from_raw(&raw)
}

/// Decode a structure from raw JSON text in the array convention.
///
/// Same rules as [`from_value`], but field values reach `T` as their
/// original text.
pub fn from_raw<T: DeserializeOwned>(raw: &RawValue) -> Result<T> {
    let fields =
        struct_fields::<T>().ok_or(FrameError::NotAStruct(std::any::type_name::<T>()))?;

    let entries: Vec<Box<RawValue>> = match raw_kind(raw.get()) {
        "array" => serde_json::from_str(raw.get())?,
        "object" => vec![raw.to_owned()],
        other => {
            return Err(FrameError::InvalidShape(format!(
                "expected array of objects, got {other}"
            )))
        }
    };

    let mut merged: Vec<(String, Box<RawValue>)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let kind = raw_kind(entry.get());
        if kind != "object" {
            return Err(FrameError::InvalidShape(format!(
                "expected single-key object, got {kind}"
            )));
        }
        let RawEntries(members) = serde_json::from_str(entry.get())?;
        for (key, value) in members {
            if !fields.contains(&key.as_str()) {
                return Err(FrameError::FieldNotFound(key));
            }
            // A repeated key overwrites the earlier value.
            match merged.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => merged.push((key, value)),
            }
        }
    }

    let mut object = String::from("{");
    for (index, (key, value)) in merged.iter().enumerate() {
        if index > 0 {
            object.push(',');
        }
        push_member(&mut object, key, value)?;
    }
    object.push('}');
    Ok(serde_json::from_str(&object)?)
}

fn push_member(out: &mut String, key: &str, value: &RawValue) -> Result<()> {
    out.push_str(&serde_json::to_string(key)?);
    out.push(':');
    out.push_str(value.get());
    Ok(())
}

/// The members of one JSON object, in document order, values left raw.
pub(crate) struct RawEntries(pub(crate) Vec<(String, Box<RawValue>)>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<RawEntries, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Box<RawValue>>()? {
                    entries.push(entry);
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// JSON kind of raw text, judged by its first significant character.
fn raw_kind(text: &str) -> &'static str {
    match text.trim_start().as_bytes().first() {
        Some(b'{') => "object",
        Some(b'[') => "array",
        Some(b'"') => "string",
        Some(b't' | b'f') => "bool",
        Some(b'n') => "null",
        _ => "number",
    }
}

/// The wire keys of `T` in declared order, or `None` if `T` is not a struct.
///
/// Discovered by handing `T` a deserializer that records the field list serde
/// passes to `deserialize_struct` and then bails out.
pub fn struct_fields<T: DeserializeOwned>() -> Option<&'static [&'static str]> {
    match T::deserialize(FieldCapture) {
        Err(CaptureError::Fields(fields)) => Some(fields),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug)]
enum CaptureError {
    Fields(&'static [&'static str]),
    NotAStruct,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Fields(fields) => write!(f, "captured {} fields", fields.len()),
            CaptureError::NotAStruct => f.write_str("not a struct"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl serde::de::Error for CaptureError {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        CaptureError::NotAStruct
    }
}

struct FieldCapture;

impl<'de> Deserializer<'de> for FieldCapture {
    type Error = CaptureError;

    fn deserialize_any<V: Visitor<'de>>(
        self,
        _visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        Err(CaptureError::NotAStruct)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        Err(CaptureError::Fields(fields))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

/// Serde adapter for a nested field that itself uses the array convention.
pub mod nested {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        super::to_value(value)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        super::from_value(value).map_err(D::Error::custom)
    }
}

/// Serde adapter for an optional nested field that uses the array convention.
///
/// Pair with `skip_serializing_if = "Option::is_none"` and `default`.
pub mod nested_option {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(value) => super::nested::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => super::from_value(value)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default, rename_all = "camelCase")]
    struct Sample {
        phase: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        waiting: Option<u32>,
        #[serde(rename = "prolong")]
        prolongation: bool,
        #[serde(with = "nested")]
        version: Inner,
        #[serde(with = "nested_option", skip_serializing_if = "Option::is_none")]
        extra: Option<Inner>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Inner {
        major: u8,
        minor: u8,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Empty {}

    fn sample() -> Sample {
        Sample {
            phase: "ready".to_string(),
            waiting: Some(60_000),
            prolongation: true,
            version: Inner { major: 1, minor: 0 },
            extra: Some(Inner { major: 2, minor: 3 }),
        }
    }

    #[test]
    fn marshal_keeps_declared_order_and_wire_keys() {
        let json = String::from_utf8(to_vec(&sample()).unwrap()).unwrap();
        assert_eq!(
            json,
            r#"[{"phase":"ready"},{"waiting":60000},{"prolong":true},{"version":[{"major":1},{"minor":0}]},{"extra":[{"major":2},{"minor":3}]}]"#
        );
    }

    #[test]
    fn marshal_omits_empty_optional_fields_only() {
        let value = Sample {
            waiting: None,
            extra: None,
            ..sample()
        };
        let json = String::from_utf8(to_vec(&value).unwrap()).unwrap();
        assert_eq!(
            json,
            r#"[{"phase":"ready"},{"prolong":true},{"version":[{"major":1},{"minor":0}]}]"#
        );

        // zero-valued but not omit-if-empty: still emitted
        let zero = to_value(&Sample::default()).unwrap();
        assert_eq!(zero.as_array().unwrap().len(), 3);
    }

    #[test]
    fn unmarshal_roundtrip() {
        let original = sample();
        let decoded: Sample = from_slice(&to_vec(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn unmarshal_partial_leaves_zero_values() {
        let decoded: Sample = from_slice(br#"[{"waiting":5}]"#).unwrap();
        assert_eq!(decoded.waiting, Some(5));
        assert_eq!(decoded.phase, "");
        assert!(!decoded.prolongation);
        assert_eq!(decoded.version, Inner::default());
        assert!(decoded.extra.is_none());
    }

    #[test]
    fn unmarshal_rejects_unknown_key() {
        let err = from_slice::<Sample>(br#"[{"phase":"ready"},{"bogus":1}]"#).unwrap_err();
        assert!(matches!(err, FrameError::FieldNotFound(key) if key == "bogus"));
    }

    #[test]
    fn unmarshal_rejects_unknown_nested_key() {
        let err = from_slice::<Sample>(br#"[{"version":[{"major":1},{"patch":2}]}]"#).unwrap_err();
        assert!(matches!(err, FrameError::Json(_)));
        assert!(err.to_string().contains("field not found: patch"));
    }

    #[test]
    fn unmarshal_accepts_lone_object() {
        let decoded: Sample = from_slice(br#"{"phase":"pending"}"#).unwrap();
        assert_eq!(decoded.phase, "pending");
    }

    #[test]
    fn unmarshal_rejects_non_object_entries() {
        let err = from_slice::<Sample>(br#"[1,2]"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidShape(_)));

        let err = from_slice::<Sample>(br#""ready""#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidShape(_)));
    }

    #[test]
    fn empty_struct_is_empty_array() {
        assert_eq!(to_vec(&Empty {}).unwrap(), b"[]");
        let decoded: Empty = from_slice(b"[]").unwrap();
        assert_eq!(decoded, Empty {});
        assert!(from_slice::<Empty>(br#"[{"x":1}]"#).is_err());
    }

    #[derive(Debug, Deserialize, Serialize)]
    struct Opaque {
        label: String,
        body: Box<RawValue>,
    }

    #[test]
    fn raw_fields_keep_their_exact_text() {
        let wire = br#"[{"label":"n"},{"body":{"n": 100000000000000000000000001, "a":1,"a":2}}]"#;
        let decoded: Opaque = from_slice(wire).unwrap();
        assert_eq!(
            decoded.body.get(),
            r#"{"n": 100000000000000000000000001, "a":1,"a":2}"#
        );
        assert_eq!(to_vec(&decoded).unwrap(), wire.to_vec());
    }

    #[test]
    fn repeated_key_keeps_last_value() {
        let decoded: Sample = from_slice(br#"[{"phase":"pending"},{"phase":"ready"}]"#).unwrap();
        assert_eq!(decoded.phase, "ready");
    }

    #[test]
    fn struct_fields_reports_wire_keys() {
        assert_eq!(
            struct_fields::<Sample>().unwrap(),
            &["phase", "waiting", "prolong", "version", "extra"]
        );
        assert!(struct_fields::<Empty>().unwrap().is_empty());
        assert!(struct_fields::<u32>().is_none());
        assert!(struct_fields::<Vec<String>>().is_none());
    }

    #[test]
    fn non_struct_values_are_rejected() {
        assert!(matches!(to_value(&5u8), Err(FrameError::NotAStruct(_))));
        assert!(matches!(to_vec(&5u8), Err(FrameError::NotAStruct(_))));
        assert!(matches!(
            from_slice::<String>(br#"[{"a":1}]"#),
            Err(FrameError::NotAStruct(_))
        ));
    }
}
