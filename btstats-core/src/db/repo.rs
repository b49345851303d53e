//! Database repository layer
//!
//! The event log lives in a single `events` table. Each row is exposed to
//! pipelines as `{"_id": ObjectId, "_time": timestamp, ...payload}`.

use crate::error::{Error, Result};
use crate::pipeline::{self, Predicate, Stage};
use crate::value::{Document, ObjectId, Value};
use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Deserialize;
use std::path::Path;

/// Query-execution facility of the event store.
///
/// Implementations run `stages` over the documents of `stream` and return the
/// resulting rows. They must not mutate the log.
pub trait EventStore {
    fn aggregate(&self, stream: &str, stages: &[Stage]) -> Result<Vec<Document>>;
}

/// An event to append to the log.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    /// Stream (collection) name, e.g. `chatMsg`
    pub stream: String,
    /// When the event happened
    pub time: DateTime<FixedOffset>,
    /// Stream-specific fields; must be a JSON object
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl NewEvent {
    pub fn new(
        stream: impl Into<String>,
        time: impl Into<DateTime<FixedOffset>>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            stream: stream.into(),
            time: time.into(),
            payload,
        }
    }
}

/// Raw columns of one `events` row.
type EventRow = (String, i64, i32, String);

/// Database handle. One per request; dropping it closes the connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self { conn })
    }

    /// Open an existing database for queries only.
    ///
    /// Fails if the file does not exist rather than creating an empty log.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        super::schema::run_migrations(&self.conn)
    }

    // ============================================
    // Event operations
    // ============================================

    /// Append one event and return its id
    pub fn insert_event(&self, event: &NewEvent) -> Result<ObjectId> {
        insert_into(&self.conn, event)
    }

    /// Append multiple events in a transaction
    pub fn insert_events(&self, events: &[NewEvent]) -> Result<Vec<ObjectId>> {
        let tx = self.conn.unchecked_transaction()?;
        let ids = events
            .iter()
            .map(|event| insert_into(&tx, event))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        tracing::debug!(count = ids.len(), "Appended events");
        Ok(ids)
    }

    /// Count events, optionally restricted to one stream
    pub fn count_events(&self, stream: Option<&str>) -> Result<i64> {
        let count = match stream {
            Some(stream) => self.conn.query_row(
                "SELECT COUNT(*) FROM events WHERE stream = ?1",
                [stream],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// Load the documents of `stream`, oldest first, optionally from `since` on.
    fn load_stream(&self, stream: &str, since: Option<DateTime<Utc>>) -> Result<Vec<Document>> {
        let since_us = since.map_or(i64::MIN, |t| t.timestamp_micros());

        let mut stmt = self.conn.prepare(
            r#"
            SELECT oid, ts_us, ts_offset, payload
            FROM events
            WHERE stream = ?1 AND ts_us >= ?2
            ORDER BY ts_us, id
            "#,
        )?;

        let rows = stmt
            .query_map(params![stream, since_us], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<rusqlite::Result<Vec<EventRow>>>()?;

        rows.into_iter().map(row_to_document).collect()
    }
}

impl EventStore for Database {
    fn aggregate(&self, stream: &str, stages: &[Stage]) -> Result<Vec<Document>> {
        // A leading `_time >= t` match is answered by the index.
        let (since, rest) = match stages.split_first() {
            Some((Stage::Match(Predicate::Gte("_time", Value::Time(t))), rest)) => {
                (Some(t.with_timezone(&Utc)), rest)
            }
            _ => (None, stages),
        };

        let docs = self.load_stream(stream, since)?;
        tracing::debug!(
            stream,
            scanned = docs.len(),
            stages = rest.len(),
            "Running aggregation"
        );
        pipeline::execute(docs, rest)
    }
}

fn insert_into(conn: &Connection, event: &NewEvent) -> Result<ObjectId> {
    if !event.payload.is_object() {
        return Err(Error::Pipeline(format!(
            "payload for stream {} must be a JSON object",
            event.stream
        )));
    }

    let id = ObjectId::new(event.time.with_timezone(&Utc));
    conn.execute(
        r#"
        INSERT INTO events (oid, stream, ts_us, ts_offset, payload)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            id.to_string(),
            event.stream,
            event.time.timestamp_micros(),
            event.time.offset().local_minus_utc(),
            event.payload.to_string(),
        ],
    )?;
    Ok(id)
}

fn row_to_document((oid, ts_us, ts_offset, payload): EventRow) -> Result<Document> {
    let id: ObjectId = oid.parse()?;
    let time = decode_time(ts_us, ts_offset)?;

    let mut doc = Document::new().with("_id", id).with("_time", time);
    match Value::from_json(serde_json::from_str(&payload)?) {
        Value::Doc(fields) => {
            for (key, value) in fields.iter() {
                if key != "_id" && key != "_time" {
                    doc.insert(key, value.clone());
                }
            }
        }
        other => {
            return Err(Error::Pipeline(format!(
                "event {oid} has a non-object payload: {other:?}"
            )))
        }
    }
    Ok(doc)
}

fn decode_time(ts_us: i64, offset_secs: i32) -> Result<DateTime<FixedOffset>> {
    let secs = ts_us.div_euclid(1_000_000);
    let nanos = (ts_us.rem_euclid(1_000_000) * 1_000) as u32;
    let utc = DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| Error::Pipeline(format!("timestamp out of range: {ts_us}")))?;
    let offset = FixedOffset::east_opt(offset_secs)
        .ok_or_else(|| Error::Pipeline(format!("invalid utc offset: {offset_secs}")))?;
    Ok(utc.with_timezone(&offset))
}
