//! Result document encoding
//!
//! Compact JSON, keys and rows in the order the dispatcher produced them.
//! Timestamps are RFC 3339 at second precision in their own offset; object ids
//! use their hex form. Values with no JSON form are an [`Error::Encoding`].

use crate::error::{Error, Result};
use crate::value::Value;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};

/// Encode a result document.
pub fn to_json(rows: &[Value]) -> Result<String> {
    serde_json::to_string(&Rows(rows)).map_err(|e| Error::Encoding(e.to_string()))
}

/// `2024-05-01T12:30:05+00:00`
pub fn format_time(t: &DateTime<FixedOffset>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, false)
}

struct Rows<'a>(&'a [Value]);

impl Serialize for Rows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(Encode))
    }
}

struct Encode<'a>(&'a Value);

impl Serialize for Encode<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(f) => Err(S::Error::custom(format!(
                "can't JSON serialize non-finite float {f}"
            ))),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Time(t) => serializer.serialize_str(&format_time(t)),
            Value::Id(id) => serializer.collect_str(id),
            Value::Binary(bytes) => Err(S::Error::custom(format!(
                "can't JSON serialize {} bytes of binary data",
                bytes.len()
            ))),
            Value::Array(items) => serializer.collect_seq(items.iter().map(Encode)),
            Value::Doc(doc) => {
                let mut map = serializer.serialize_map(Some(doc.len()))?;
                for (key, value) in doc.iter() {
                    map.serialize_entry(key, &Encode(value))?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Document, ObjectId};

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_compact_and_ordered() {
        let rows = vec![
            Value::Doc(
                Document::new()
                    .with("_id", "soda")
                    .with("count", 3)
                    .with("latest", ts("2024-05-01T12:30:05.987654Z")),
            ),
            Value::Doc(Document::new().with("z", Value::Null).with("a", true)),
        ];
        assert_eq!(
            to_json(&rows).unwrap(),
            r#"[{"_id":"soda","count":3,"latest":"2024-05-01T12:30:05+00:00"},{"z":null,"a":true}]"#
        );
    }

    #[test]
    fn test_timestamp_keeps_offset() {
        let rows = vec![Value::Time(ts("2024-05-01T12:30:05.5-04:00"))];
        assert_eq!(to_json(&rows).unwrap(), r#"["2024-05-01T12:30:05-04:00"]"#);
    }

    #[test]
    fn test_object_id_and_nested_arrays() {
        let id: ObjectId = "0123456789abcdef01234567".parse().unwrap();
        let rows = vec![Value::Array(vec![Value::Id(id), Value::Float(1.5)])];
        assert_eq!(
            to_json(&rows).unwrap(),
            r#"[["0123456789abcdef01234567",1.5]]"#
        );
    }

    #[test]
    fn test_non_ascii_is_verbatim() {
        let rows = vec![Value::from("über ☕")];
        assert_eq!(to_json(&rows).unwrap(), "[\"über ☕\"]");
    }

    #[test]
    fn test_unencodable_values_fail() {
        let binary = vec![Value::Doc(Document::new().with("blob", Value::Binary(vec![1, 2])))];
        assert!(matches!(to_json(&binary), Err(Error::Encoding(_))));

        let nan = vec![Value::Float(f64::NAN)];
        assert!(matches!(to_json(&nan), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(to_json(&[]).unwrap(), "[]");
    }
}
