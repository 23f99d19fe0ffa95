//! Persistence for loaded classification tables.
//!
//! A snapshot is the filtered table as JSON lines, reloadable without
//! re-reading the export. The CSV export mirrors the input columns plus the
//! fields derived from each row's metadata. Paths ending in `.gz` are
//! gzip-compressed.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::event::{Event, EventTable};
use crate::fetch::read_source;

enum Output {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Output {
    fn create(path: &Path) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let file = BufWriter::new(file);
        let gzip = path.extension().and_then(|e| e.to_str()) == Some("gz");
        Ok(if gzip {
            Output::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Output::Plain(file)
        })
    }

    fn finish(self) -> Result<()> {
        match self {
            Output::Plain(mut w) => w.flush()?,
            Output::Gzip(w) => w.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Output::Plain(w) => w.write(buf),
            Output::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Output::Plain(w) => w.flush(),
            Output::Gzip(w) => w.flush(),
        }
    }
}

/// Writes every event in `table` as one JSON object per line.
pub fn save_snapshot(table: &EventTable, path: &Path) -> Result<()> {
    let mut out = Output::create(path)?;
    for event in table {
        serde_json::to_writer(&mut out, event)?;
        out.write_all(b"\n")?;
    }
    out.finish()?;

    info!(path = %path.display(), events = table.len(), "Snapshot saved");
    Ok(())
}

/// Reads a table written by [`save_snapshot`]. No filters are applied.
pub fn load_snapshot(path: &Path) -> Result<EventTable> {
    let bytes = read_source(&path.to_string_lossy())?;

    let mut events = Vec::new();
    for (i, line) in bytes.as_slice().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .with_context(|| format!("Bad snapshot record at line {}", i + 1))?;
        if event.user_name.trim().is_empty() {
            warn!(
                classification_id = %event.classification_id,
                line = i + 1,
                "Skipping snapshot record without a user name"
            );
            continue;
        }
        events.push(event);
    }

    let table = EventTable::from_events(events);
    info!(path = %path.display(), events = table.len(), "Snapshot loaded");
    Ok(table)
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    classification_id: &'a str,
    user_name: &'a str,
    created_at: String,
    workflow_id: Option<&'a str>,
    workflow_name: Option<&'a str>,
    metadata: String,
    annotations: String,
    subject_data: String,
    live_project: bool,
    task_duration: f64,
    user_language: &'a str,
    viewport_width: Option<u64>,
    viewport_height: Option<u64>,
}

impl<'a> ExportRow<'a> {
    fn from_event(event: &'a Event) -> Result<Self> {
        let viewport = event.viewport();
        Ok(Self {
            classification_id: &event.classification_id,
            user_name: &event.user_name,
            created_at: event.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            workflow_id: event.workflow_id.as_deref(),
            workflow_name: event.workflow_name.as_deref(),
            metadata: serde_json::to_string(&event.metadata)?,
            annotations: serde_json::to_string(&event.annotations)?,
            subject_data: serde_json::to_string(&event.subject_data)?,
            live_project: event.is_live(),
            task_duration: event.task_duration(),
            user_language: event.user_language(),
            viewport_width: viewport.map(|v| v.0),
            viewport_height: viewport.map(|v| v.1),
        })
    }
}

/// Writes `table` as CSV, including the derived metadata columns.
pub fn write_csv(table: &EventTable, path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(Output::create(path)?);

    for event in table {
        writer.serialize(ExportRow::from_event(event)?)?;
    }

    let out = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))?;
    out.finish()?;

    debug!(path = %path.display(), rows = table.len(), "CSV written");
    Ok(())
}
