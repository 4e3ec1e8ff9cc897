// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Byte buffers as scripts see them.
//!
//! A [`Buffer`] is an ordinary script value with three visible properties:
//! `type` (always `"Buffer"`), `data` (the bytes) and a read-only `length`.
//! Serialized, it looks like `{"type":"Buffer","data":[1,2,3]}`; `length` is
//! not part of the serialized form.
//!
//! What a script passes in is resolved once into a [`BufferSource`].

use log::debug;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

pub const TYPE_NAME: &str = "Buffer";

/// Everything a buffer can be built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferSource {
    /// `size` bytes, optionally filled by cycling over `fill`.
    Alloc { size: usize, fill: Option<String> },
    /// The UTF-8 bytes of a string.
    Text(String),
    /// One byte per integer, wrapped to `0..=255`.
    Integers(Vec<i64>),
    /// A value no buffer can be built from. Holds the kind of value that was
    /// passed, for diagnostics.
    Unsupported(&'static str),
}

impl BufferSource {
    /// Resolves a script value passed to `Buffer.from`.
    ///
    /// Strings become [`BufferSource::Text`], arrays become
    /// [`BufferSource::Integers`] (each item converted like JavaScript's
    /// `ToInteger`), everything else is [`BufferSource::Unsupported`].
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(text) => BufferSource::Text(text.clone()),
            Value::Array(items) => BufferSource::Integers(items.iter().map(to_integer).collect()),
            Value::Null => BufferSource::Unsupported("null"),
            Value::Bool(_) => BufferSource::Unsupported("boolean"),
            Value::Number(_) => BufferSource::Unsupported("number"),
            Value::Object(_) => BufferSource::Unsupported("object"),
        }
    }
}

// NaN, non-numeric strings and objects all end up as 0.
fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
            .unwrap_or(0),
        Value::Bool(true) => 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Allocates `size` bytes. A non-empty `fill` is repeated over the whole
    /// buffer; an empty or missing one leaves it zeroed.
    pub fn alloc(size: usize, fill: Option<&str>) -> Self {
        let data = match fill.map(str::as_bytes) {
            Some(pattern) if !pattern.is_empty() => {
                pattern.iter().copied().cycle().take(size).collect()
            }
            _ => vec![0; size],
        };
        Self { data }
    }

    pub fn from_source(source: BufferSource) -> Self {
        match source {
            BufferSource::Alloc { size, fill } => Self::alloc(size, fill.as_deref()),
            BufferSource::Text(text) => Self {
                data: text.into_bytes(),
            },
            BufferSource::Integers(items) => Self {
                data: items.into_iter().map(|i| i as u8).collect(),
            },
            BufferSource::Unsupported(kind) => {
                debug!("cannot build a buffer from a {kind}, returning an empty one");
                Self::default()
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Read-only: there is intentionally no way to change a buffer's length
    /// after construction.
    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Serialize for Buffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut object = serializer.serialize_struct(TYPE_NAME, 2)?;
        object.serialize_field("type", TYPE_NAME)?;
        object.serialize_field("data", &self.data)?;
        object.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_json(buffer: &Buffer) -> String {
        serde_json::to_string(buffer).unwrap()
    }

    #[test]
    fn test_buffer_json_shape() {
        let cases: Vec<(&str, Buffer, &str)> = vec![
            (
                "alloc empty",
                Buffer::alloc(5, None),
                r#"{"type":"Buffer","data":[0,0,0,0,0]}"#,
            ),
            (
                "alloc character",
                Buffer::alloc(5, Some("a")),
                r#"{"type":"Buffer","data":[97,97,97,97,97]}"#,
            ),
            (
                "alloc string",
                Buffer::alloc(10, Some("abc")),
                r#"{"type":"Buffer","data":[97,98,99,97,98,99,97,98,99,97]}"#,
            ),
            (
                "from string",
                Buffer::from_source(BufferSource::from_json(&json!("test string"))),
                r#"{"type":"Buffer","data":[116,101,115,116,32,115,116,114,105,110,103]}"#,
            ),
            (
                "from int array",
                Buffer::from_source(BufferSource::from_json(&json!([1, 2, 3]))),
                r#"{"type":"Buffer","data":[1,2,3]}"#,
            ),
        ];

        for (name, buffer, expected) in cases {
            assert_eq!(to_json(&buffer), expected, "case {name}");
        }
    }

    #[test]
    fn test_length() {
        let text = Buffer::from_source(BufferSource::from_json(&json!("test string")));
        assert_eq!(text.length(), 11);

        let ints = Buffer::from_source(BufferSource::from_json(&json!([1, 2, 3])));
        assert_eq!(ints.length(), 3);
        assert_eq!(ints.type_name(), "Buffer");
    }

    #[test]
    fn test_empty_fill_leaves_zeroes() {
        assert_eq!(Buffer::alloc(3, Some("")).data(), &[0, 0, 0]);
        assert_eq!(Buffer::alloc(0, Some("abc")).length(), 0);
    }

    #[test]
    fn test_integers_wrap_and_coerce() {
        let source = BufferSource::from_json(&json!([256, 257, -1, 3.9, "7", "x", null, true]));
        assert_eq!(
            source,
            BufferSource::Integers(vec![256, 257, -1, 3, 7, 0, 0, 1])
        );
        assert_eq!(
            Buffer::from_source(source).data(),
            &[0, 1, 255, 3, 7, 0, 0, 1]
        );
    }

    #[test]
    fn test_unsupported_sources_give_empty_buffer() {
        for value in [json!(null), json!(42), json!({"a": 1}), json!(false)] {
            let source = BufferSource::from_json(&value);
            assert!(matches!(source, BufferSource::Unsupported(_)));
            assert_eq!(
                to_json(&Buffer::from_source(source)),
                r#"{"type":"Buffer","data":[]}"#
            );
        }
    }
}
