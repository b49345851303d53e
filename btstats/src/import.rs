//! JSON-lines event import
//!
//! Each non-blank line is one event:
//! `{"stream": "chatMsg", "time": "2024-05-01T12:00:00Z", "payload": {...}}`.
//! A file is appended in a single transaction, so a bad line imports nothing.

use anyhow::{Context, Result};
use btstats_core::{Database, NewEvent};
use std::io::BufRead;
use std::path::Path;

/// Parse every event in `reader`, failing on the first malformed line.
pub fn read_events(reader: impl BufRead) -> Result<Vec<NewEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: NewEvent = serde_json::from_str(&line)
            .with_context(|| format!("invalid event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Append the events in `path` to `db`. Returns the number imported.
pub fn import_file(db: &Database, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let events = read_events(std::io::BufReader::new(file))?;

    let ids = db
        .insert_events(&events)
        .with_context(|| format!("failed to import {}", path.display()))?;

    tracing::info!(path = %path.display(), events = ids.len(), "Imported events");
    Ok(ids.len())
}
