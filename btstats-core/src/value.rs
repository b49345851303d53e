//! Store-native value model
//!
//! Events come out of the store as [`Document`]s: ordered key/value maps whose
//! values may be timestamps and object ids in addition to the usual JSON shapes.
//! Values carry a total order so they can serve as grouping keys and sort keys.

use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// 12-byte opaque event identifier.
///
/// Layout: 4 bytes big-endian unix seconds, then 8 random bytes. The canonical
/// string form is 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a fresh id stamped with `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; 12];
        let seconds = at.timestamp().clamp(0, u32::MAX as i64) as u32;
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Creation time encoded in the leading four bytes.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(seconds as i64, 0)
            .single()
            .unwrap_or_default()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = hex::decode(s)
            .map_err(|e| Error::Pipeline(format!("invalid object id {s:?}: {e}")))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| Error::Pipeline(format!("object id {s:?} is not 12 bytes")))?;
        Ok(Self(bytes))
    }
}

/// A single value inside an event or result document.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Timezone-aware timestamp; keeps the offset it was stored with
    Time(DateTime<FixedOffset>),
    Id(ObjectId),
    /// Raw bytes. Has no JSON form.
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Doc(Document),
}

impl Value {
    /// Type bracket used for cross-type comparison.
    fn bracket(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Str(_) => 2,
            Value::Doc(_) => 3,
            Value::Array(_) => 4,
            Value::Binary(_) => 5,
            Value::Id(_) => 6,
            Value::Bool(_) => 7,
            Value::Time(_) => 8,
        }
    }

    /// Whether two values live in the same comparison bracket.
    pub fn same_bracket(&self, other: &Value) -> bool {
        self.bracket() == other.bracket()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Doc(doc) => Some(doc),
            _ => None,
        }
    }

    /// Convert a decoded JSON payload into store values.
    ///
    /// Integers that fit in `i64` stay integers; everything else numeric becomes a float.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Doc(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Doc(a), Value::Doc(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            _ => self.bracket().cmp(&other.bracket()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Value::Time(t)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t.fixed_offset())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Id(id)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Doc(doc)
    }
}

/// Ordered key/value map. Insertion order is preserved and is the output order.
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing entry in place or appending a new one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Builder-style [`Document::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Resolve a dotted path (`msg.nick`) through nested documents.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_document()?.get(part)?;
        }
        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl Ord for Document {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Document {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_type_order() {
        let mut values = vec![
            Value::Bool(false),
            Value::Str("a".into()),
            Value::Int(3),
            Value::Null,
            Value::Time(Utc::now().fixed_offset()),
        ];
        values.sort();
        assert!(values[0].is_null());
        assert_eq!(values[1], Value::Int(3));
        assert_eq!(values[2], Value::Str("a".into()));
        assert_eq!(values[3], Value::Bool(false));
        assert!(values[4].as_time().is_some());
    }

    #[test]
    fn test_numbers_compare_across_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert!(Value::Int(2) < Value::Float(2.5));
        assert!(Value::Float(10.0) > Value::Int(9));
    }

    #[test]
    fn test_times_compare_by_instant() {
        let utc = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00").unwrap();
        let shifted = DateTime::parse_from_rfc3339("2024-05-01T14:00:00+02:00").unwrap();
        assert_eq!(Value::Time(utc), Value::Time(shifted));
    }

    #[test]
    fn test_document_paths_and_order() {
        let doc = Document::new()
            .with("_time", Utc::now())
            .with("msg", Document::new().with("nick", "cades").with("emote", false));

        assert_eq!(doc.get_path("msg.nick"), Some(&Value::from("cades")));
        assert_eq!(doc.get_path("msg.emote"), Some(&Value::Bool(false)));
        assert!(doc.get_path("msg.missing").is_none());
        assert!(doc.get_path("_time.nested").is_none());

        let keys: Vec<_> = doc.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["_time", "msg"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut doc = Document::new().with("a", 1).with("b", 2);
        doc.insert("a", Value::Int(9));
        let entries: Vec<_> = doc.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert_eq!(
            entries,
            vec![("a".to_string(), Value::Int(9)), ("b".to_string(), Value::Int(2))]
        );
    }

    #[test]
    fn test_from_json_keeps_key_order() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"z": 1, "a": {"m": "x"}, "f": 1.5, "n": null}"#).unwrap();
        let value = Value::from_json(json);
        let doc = value.as_document().unwrap();
        let keys: Vec<_> = doc.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "f", "n"]);
        assert_eq!(doc.get("z"), Some(&Value::Int(1)));
        assert_eq!(doc.get_path("a.m"), Some(&Value::from("x")));
        assert!(matches!(doc.get("f"), Some(Value::Float(f)) if *f == 1.5));
    }

    #[test]
    fn test_object_id_string_form() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = ObjectId::new(at);
        let text = id.to_string();

        assert_eq!(text.len(), 24);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id.timestamp(), at);
        assert_eq!(text.parse::<ObjectId>().unwrap(), id);
        assert!("xyz".parse::<ObjectId>().is_err());
    }
}
