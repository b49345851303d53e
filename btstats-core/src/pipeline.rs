//! Aggregation pipeline stages and their in-process executor
//!
//! A pipeline is an ordered list of [`Stage`]s applied to the documents of one
//! event stream: filter, reshape, explode arrays, group with accumulators, sort,
//! truncate. Actions are declared as stage lists; the store runs them.
//!
//! ```text
//!   events ──► Match ──► Project ──► Unwind ──► Group ──► Sort ──► Limit ──► rows
//! ```

use crate::error::{Error, Result};
use crate::matcher::{self, NAME_CAPTURE};
use crate::value::{Document, Value};
use chrono::{DateTime, Timelike, Utc};
use std::collections::BTreeMap;

/// Label format for five-minute buckets.
pub const BUCKET_LABEL_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// Bucket width in minutes.
pub const BUCKET_MINUTES: u32 = 5;

/// Expression evaluated against one document.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Dotted field path; missing fields evaluate to null
    Field(&'static str),
    Literal(Value),
    /// String with ASCII letters lower-cased, other characters kept; null becomes `""`
    Lower(Box<Expr>),
    /// UTF-8 byte length of a string
    ByteLen(Box<Expr>),
    /// All emote matches in a string, as `{match, idx, captures}` documents
    Matches(Box<Expr>),
    /// Number of emote matches in a string
    MatchCount(Box<Expr>),
    /// One capture of a match document
    Capture { of: Box<Expr>, index: usize },
    /// Five-minute UTC bucket label of a timestamp
    FiveMinuteBucket(Box<Expr>),
}

impl Expr {
    pub fn field(path: &'static str) -> Self {
        Expr::Field(path)
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn lower(self) -> Self {
        Expr::Lower(Box::new(self))
    }

    pub fn byte_len(self) -> Self {
        Expr::ByteLen(Box::new(self))
    }

    pub fn matches(self) -> Self {
        Expr::Matches(Box::new(self))
    }

    pub fn match_count(self) -> Self {
        Expr::MatchCount(Box::new(self))
    }

    /// Emote name capture of a match document.
    pub fn emote_name(self) -> Self {
        Expr::Capture {
            of: Box::new(self),
            index: NAME_CAPTURE,
        }
    }

    pub fn five_minute_bucket(self) -> Self {
        Expr::FiveMinuteBucket(Box::new(self))
    }

    pub fn eval(&self, doc: &Document) -> Result<Value> {
        match self {
            Expr::Field(path) => Ok(doc.get_path(path).cloned().unwrap_or(Value::Null)),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Lower(inner) => match inner.eval(doc)? {
                Value::Null => Ok(Value::Str(String::new())),
                Value::Str(s) => Ok(Value::Str(s.to_ascii_lowercase())),
                other => Err(type_error("lower", "string", &other)),
            },
            Expr::ByteLen(inner) => match inner.eval(doc)? {
                Value::Str(s) => Ok(Value::Int(s.len() as i64)),
                other => Err(type_error("byte length", "string", &other)),
            },
            Expr::Matches(inner) => match inner.eval(doc)? {
                Value::Null => Ok(Value::Array(Vec::new())),
                Value::Str(s) => Ok(Value::Array(
                    matcher::find_all(&s)
                        .map(|m| Value::Doc(m.to_document()))
                        .collect(),
                )),
                other => Err(type_error("pattern match", "string", &other)),
            },
            Expr::MatchCount(inner) => match inner.eval(doc)? {
                Value::Null => Ok(Value::Int(0)),
                Value::Str(s) => Ok(Value::Int(matcher::count(&s) as i64)),
                other => Err(type_error("pattern match", "string", &other)),
            },
            Expr::Capture { of, index } => {
                let matched = of.eval(doc)?;
                Ok(matched
                    .as_document()
                    .and_then(|m| m.get("captures"))
                    .and_then(Value::as_array)
                    .and_then(|caps| caps.get(*index))
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            Expr::FiveMinuteBucket(inner) => match inner.eval(doc)? {
                Value::Time(t) => Ok(Value::Str(bucket_label(&t.with_timezone(&Utc)))),
                other => Err(type_error("bucket", "timestamp", &other)),
            },
        }
    }
}

fn type_error(op: &str, expected: &str, got: &Value) -> Error {
    Error::Pipeline(format!("{op} expects a {expected}, got {got:?}"))
}

/// Floor `t` to its five-minute bucket and format as `YYYY-MM-DDTHH:MMZ`.
pub fn bucket_label(t: &DateTime<Utc>) -> String {
    let minute = t.minute() - t.minute() % BUCKET_MINUTES;
    let floored = t
        .with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*t);
    floored.format(BUCKET_LABEL_FORMAT).to_string()
}

/// Document filter.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Field equals value
    Eq(&'static str, Value),
    /// Field is at least value; values of a different type never match
    Gte(&'static str, Value),
}

impl Predicate {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::Eq(path, expected) => {
                let actual = doc.get_path(path).unwrap_or(&Value::Null);
                actual == expected
            }
            Predicate::Gte(path, bound) => match doc.get_path(path) {
                Some(actual) => actual.same_bracket(bound) && actual >= bound,
                None => false,
            },
        }
    }
}

/// Group accumulator.
#[derive(Debug, Clone)]
pub enum Accumulator {
    /// Numeric sum; non-numeric values are ignored
    Sum(Expr),
    /// Greatest non-null value
    Max(Expr),
    /// Value from the first document in the group
    First(Expr),
}

impl Accumulator {
    /// `Sum(1)`
    pub fn count() -> Self {
        Accumulator::Sum(Expr::lit(1))
    }

    fn init(&self) -> Value {
        match self {
            Accumulator::Sum(_) => Value::Int(0),
            Accumulator::Max(_) => Value::Null,
            Accumulator::First(_) => Value::Null,
        }
    }

    fn fold(&self, acc: &mut Value, doc: &Document, first: bool) -> Result<()> {
        match self {
            Accumulator::Sum(expr) => {
                *acc = match (&*acc, expr.eval(doc)?) {
                    (Value::Int(a), Value::Int(b)) => match a.checked_add(b) {
                        Some(sum) => Value::Int(sum),
                        None => Value::Float(*a as f64 + b as f64),
                    },
                    (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 + b),
                    (Value::Float(a), Value::Int(b)) => Value::Float(a + b as f64),
                    (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
                    (current, _) => current.clone(),
                };
            }
            Accumulator::Max(expr) => {
                let value = expr.eval(doc)?;
                if !value.is_null() && (acc.is_null() || value > *acc) {
                    *acc = value;
                }
            }
            Accumulator::First(expr) => {
                if first {
                    *acc = expr.eval(doc)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub path: &'static str,
    pub order: Order,
}

impl SortKey {
    pub fn asc(path: &'static str) -> Self {
        Self {
            path,
            order: Order::Asc,
        }
    }

    pub fn desc(path: &'static str) -> Self {
        Self {
            path,
            order: Order::Desc,
        }
    }
}

/// One pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Predicate),
    /// Replace each document with the listed computed fields
    Project(Vec<(&'static str, Expr)>),
    /// One output document per element of a top-level array field
    Unwind(&'static str),
    /// Group by `key` into `{_id, ...fields}`; groups appear in first-seen order
    Group {
        key: Expr,
        fields: Vec<(&'static str, Accumulator)>,
    },
    /// Stable multi-key sort
    Sort(Vec<SortKey>),
    Limit(usize),
}

/// Run `stages` over `docs` in order.
pub fn execute(docs: Vec<Document>, stages: &[Stage]) -> Result<Vec<Document>> {
    stages.iter().try_fold(docs, |docs, stage| apply(docs, stage))
}

fn apply(docs: Vec<Document>, stage: &Stage) -> Result<Vec<Document>> {
    match stage {
        Stage::Match(predicate) => Ok(docs.into_iter().filter(|d| predicate.matches(d)).collect()),
        Stage::Project(fields) => docs
            .iter()
            .map(|doc| {
                fields
                    .iter()
                    .map(|(name, expr)| -> Result<(String, Value)> {
                        Ok((name.to_string(), expr.eval(doc)?))
                    })
                    .collect::<Result<Document>>()
            })
            .collect(),
        Stage::Unwind(field) => Ok(unwind(docs, field)),
        Stage::Group { key, fields } => group(&docs, key, fields),
        Stage::Sort(keys) => {
            let mut docs = docs;
            docs.sort_by(|a, b| {
                keys.iter()
                    .map(|k| {
                        let left = a.get_path(k.path).unwrap_or(&Value::Null);
                        let right = b.get_path(k.path).unwrap_or(&Value::Null);
                        match k.order {
                            Order::Asc => left.cmp(right),
                            Order::Desc => right.cmp(left),
                        }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(docs)
        }
        Stage::Limit(n) => {
            let mut docs = docs;
            docs.truncate(*n);
            Ok(docs)
        }
    }
}

fn unwind(docs: Vec<Document>, field: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match doc.get(field).cloned() {
            Some(Value::Array(items)) => {
                for item in items {
                    let mut exploded = doc.clone();
                    exploded.insert(field, item);
                    out.push(exploded);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

fn group(
    docs: &[Document],
    key: &Expr,
    fields: &[(&'static str, Accumulator)],
) -> Result<Vec<Document>> {
    let mut index: BTreeMap<Value, usize> = BTreeMap::new();
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

    for doc in docs {
        let id = key.eval(doc)?;
        let (slot, first) = match index.get(&id) {
            Some(&slot) => (slot, false),
            None => {
                index.insert(id.clone(), groups.len());
                groups.push((id, fields.iter().map(|(_, acc)| acc.init()).collect()));
                (groups.len() - 1, true)
            }
        };
        let accs = &mut groups[slot].1;
        for ((_, acc), value) in fields.iter().zip(accs.iter_mut()) {
            acc.fold(value, doc, first)?;
        }
    }

    Ok(groups
        .into_iter()
        .map(|(id, values)| {
            let mut row = Document::new();
            row.insert("_id", id);
            for ((name, _), value) in fields.iter().zip(values) {
                row.insert(*name, value);
            }
            row
        })
        .collect())
}
