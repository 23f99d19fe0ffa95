//! CSV export loading and row filtering.
//!
//! Turns a classification export into an [`EventTable`], keeping only rows
//! inside the requested `[from, to)` window and, by default, only rows made
//! while the project was live.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{Result, StatsError};
use crate::event::{Event, EventTable, parse_date_bound, parse_timestamp};
use crate::fetch::read_source;
use crate::snapshot::load_snapshot;

const REQUIRED_COLUMNS: [&str; 5] = [
    "classification_id",
    "user_name",
    "created_at",
    "metadata",
    "annotations",
];

/// Where the classifications come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A raw export: local path (optionally gzipped) or URL.
    Export(String),
    /// A table saved earlier with [`crate::snapshot::save_snapshot`].
    Snapshot(PathBuf),
}

impl InputSource {
    /// Picks the input to use, preferring the raw export when both are given.
    pub fn resolve(input_file: Option<String>, snapshot: Option<PathBuf>) -> Result<Self> {
        match (input_file, snapshot) {
            (Some(file), _) => Ok(InputSource::Export(file)),
            (None, Some(path)) => Ok(InputSource::Snapshot(path)),
            (None, None) => Err(StatsError::MissingInput),
        }
    }
}

/// Row filters applied while loading an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Inclusive lower bound on `created_at`.
    pub from_date: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to_date: Option<DateTime<Utc>>,
    pub live_only: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            from_date: None,
            to_date: None,
            live_only: true,
        }
    }
}

impl LoadOptions {
    /// Builds options from user-supplied date strings.
    pub fn from_args(from: Option<&str>, to: Option<&str>, live_only: bool) -> Result<Self> {
        let parse = |raw: &str| {
            parse_date_bound(raw).ok_or_else(|| StatsError::InvalidDate(raw.to_string()))
        };

        Ok(Self {
            from_date: from.map(parse).transpose()?,
            to_date: to.map(parse).transpose()?,
            live_only,
        })
    }

    pub fn in_window(&self, ts: DateTime<Utc>) -> bool {
        self.from_date.is_none_or(|from| ts >= from) && self.to_date.is_none_or(|to| ts < to)
    }
}

/// Row counts gathered during a load.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_read: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub out_of_window: usize,
    pub not_live: usize,
    pub kept: usize,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    classification_id: String,
    user_name: String,
    created_at: String,
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default)]
    workflow_name: Option<String>,
    metadata: String,
    annotations: String,
    #[serde(default)]
    subject_data: Option<String>,
}

/// Loads classifications from `source`.
///
/// Filters apply to raw exports only; a snapshot is returned as saved.
#[tracing::instrument(skip(options))]
pub fn load(source: &InputSource, options: &LoadOptions) -> anyhow::Result<EventTable> {
    match source {
        InputSource::Export(location) => {
            let bytes = read_source(location)?;
            let (table, _) = parse_export(bytes.as_slice(), options)?;
            Ok(table)
        }
        InputSource::Snapshot(path) => {
            if *options != LoadOptions::default() {
                warn!("Date and live filters are ignored when loading a snapshot");
            }
            load_snapshot(path)
        }
    }
}

/// Parses a classification export and applies `options`.
pub fn parse_export<R: Read>(reader: R, options: &LoadOptions) -> Result<(EventTable, LoadStats)> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(StatsError::MissingColumn(column));
        }
    }

    let mut table = EventTable::new();
    let mut stats = LoadStats::default();

    for result in rdr.deserialize::<RawRow>() {
        stats.rows_read += 1;

        let row = match result {
            Ok(row) => row,
            Err(e) if is_row_error(&e) => {
                warn!(row = stats.rows_read, error = %e, "Skipping malformed row");
                stats.malformed += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let Some(event) = to_event(row) else {
            stats.malformed += 1;
            continue;
        };

        if !options.in_window(event.created_at) {
            stats.out_of_window += 1;
            continue;
        }

        if options.live_only && !event.is_live() {
            stats.not_live += 1;
            continue;
        }

        if table.push(event) {
            stats.kept += 1;
        } else {
            stats.duplicates += 1;
        }
    }

    info!(
        rows_read = stats.rows_read,
        kept = stats.kept,
        malformed = stats.malformed,
        duplicates = stats.duplicates,
        out_of_window = stats.out_of_window,
        not_live = stats.not_live,
        "Classification export loaded"
    );

    Ok((table, stats))
}

fn is_row_error(e: &csv::Error) -> bool {
    matches!(
        e.kind(),
        csv::ErrorKind::Deserialize { .. }
            | csv::ErrorKind::UnequalLengths { .. }
            | csv::ErrorKind::Utf8 { .. }
    )
}

fn to_event(row: RawRow) -> Option<Event> {
    let user_name = row.user_name.trim();
    if user_name.is_empty() {
        warn!(classification_id = %row.classification_id, "Skipping row without a user name");
        return None;
    }

    let Some(created_at) = parse_timestamp(&row.created_at) else {
        warn!(
            classification_id = %row.classification_id,
            created_at = %row.created_at,
            "Skipping row with unparseable timestamp"
        );
        return None;
    };

    Some(Event {
        user_name: user_name.to_string(),
        created_at,
        workflow_id: row.workflow_id,
        workflow_name: row.workflow_name,
        metadata: parse_json_field(&row.classification_id, "metadata", &row.metadata),
        annotations: parse_json_field(&row.classification_id, "annotations", &row.annotations),
        subject_data: row
            .subject_data
            .as_deref()
            .map(|raw| parse_json_field(&row.classification_id, "subject_data", raw))
            .unwrap_or(Value::Null),
        classification_id: row.classification_id,
    })
}

/// Nested JSON columns degrade to `null` rather than failing the row.
fn parse_json_field(classification_id: &str, column: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        debug!(classification_id, column, error = %e, "Unparseable JSON column");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HEADER: &str = "classification_id,user_name,user_id,workflow_id,workflow_name,created_at,gold_standard,expert,metadata,annotations,subject_data,subject_ids\n";

    fn row(id: u32, user: &str, created_at: &str, live: &str) -> String {
        format!(
            "{id},{user},,3,Bugs,{created_at},,,\"{{\"\"live_project\"\":{live},\"\"user_language\"\":\"\"en\"\"}}\",\"[{{\"\"task\"\":\"\"T0\"\",\"\"value\"\":1}}]\",\"{{}}\",99\n"
        )
    }

    fn export(rows: &[String]) -> String {
        let mut s = HEADER.to_string();
        for r in rows {
            s.push_str(r);
        }
        s
    }

    #[test]
    fn test_resolve_requires_an_input() {
        let err = InputSource::resolve(None, None).unwrap_err();
        assert!(matches!(err, StatsError::MissingInput));
    }

    #[test]
    fn test_resolve_prefers_export() {
        let source = InputSource::resolve(Some("a.csv".into()), Some("b.jsonl".into())).unwrap();
        assert_eq!(source, InputSource::Export("a.csv".into()));

        let source = InputSource::resolve(None, Some("b.jsonl".into())).unwrap();
        assert_eq!(source, InputSource::Snapshot("b.jsonl".into()));
    }

    #[test]
    fn test_parse_export_reads_nested_json() {
        let data = export(&[row(1, "alice", "2018-02-20 10:00:00 UTC", "true")]);
        let (table, stats) = parse_export(data.as_bytes(), &LoadOptions::default()).unwrap();

        assert_eq!(stats.kept, 1);
        let event = table.get("1").unwrap();
        assert_eq!(event.user_name, "alice");
        assert_eq!(event.workflow_name.as_deref(), Some("Bugs"));
        assert_eq!(event.user_language(), "en");
        assert_eq!(event.annotations[0]["task"], "T0");
        assert!(event.is_live());
    }

    #[test]
    fn test_live_filter() {
        let data = export(&[
            row(1, "alice", "2018-02-20 10:00:00 UTC", "true"),
            row(2, "bob", "2018-02-20 11:00:00 UTC", "false"),
        ]);

        let (table, stats) = parse_export(data.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(stats.not_live, 1);

        let all = LoadOptions {
            live_only: false,
            ..LoadOptions::default()
        };
        let (table, _) = parse_export(data.as_bytes(), &all).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_malformed_metadata_is_not_live() {
        let data = format!(
            "{HEADER}1,alice,,3,Bugs,2018-02-20 10:00:00 UTC,,,{{not json,[],{{}},99\n"
        );
        let (table, stats) = parse_export(data.as_bytes(), &LoadOptions::default()).unwrap();
        assert!(table.is_empty());
        assert_eq!(stats.not_live, 1);
        assert_eq!(stats.malformed, 0);
    }

    #[test]
    fn test_date_window_is_half_open() {
        let data = export(&[
            row(1, "alice", "2018-02-19 23:59:59 UTC", "true"),
            row(2, "alice", "2018-02-20 00:00:00 UTC", "true"),
            row(3, "bob", "2018-02-25 23:59:59 UTC", "true"),
            row(4, "bob", "2018-02-26 00:00:00 UTC", "true"),
        ]);
        let options = LoadOptions::from_args(Some("2018-02-20"), Some("2018-02-26"), true).unwrap();

        let (table, stats) = parse_export(data.as_bytes(), &options).unwrap();
        assert!(table.get("1").is_none());
        assert!(table.get("2").is_some());
        assert!(table.get("3").is_some());
        assert!(table.get("4").is_none());
        assert_eq!(stats.out_of_window, 2);
    }

    #[test]
    fn test_invalid_utf8_row_is_skipped() {
        let mut data = export(&[row(1, "alice", "2018-02-20 10:00:00 UTC", "true")]).into_bytes();
        data.extend_from_slice(
            b"2,bob,,3,Bugs,2018-02-20 11:00:00 UTC,,,\"{\"\"live_project\"\":true,\"\"user_language\"\":\"\"fr\xe9\"\"}\",[],{},99\n",
        );
        data.extend_from_slice(row(3, "carol", "2018-02-20 12:00:00 UTC", "true").as_bytes());

        let (table, stats) = parse_export(data.as_slice(), &LoadOptions::default()).unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.get("1").is_some());
        assert!(table.get("2").is_none());
        assert!(table.get("3").is_some());
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let data = export(&[
            row(1, "alice", "not a date", "true"),
            row(2, "", "2018-02-20 10:00:00 UTC", "true"),
            row(3, "carol", "2018-02-20 10:00:00 UTC", "true"),
            row(3, "carol", "2018-02-20 10:00:00 UTC", "true"),
        ]);
        let (table, stats) = parse_export(data.as_bytes(), &LoadOptions::default()).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_missing_column() {
        let data = "classification_id,user_name,metadata,annotations\n1,alice,{},[]\n";
        let err = parse_export(data.as_bytes(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, StatsError::MissingColumn("created_at")));
    }

    #[test]
    fn test_invalid_date_argument() {
        let err = LoadOptions::from_args(Some("soon"), None, true).unwrap_err();
        assert!(matches!(err, StatsError::InvalidDate(_)));
    }

    #[test]
    fn test_in_window_without_bounds() {
        let ts = Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap();
        assert!(LoadOptions::default().in_window(ts));
    }
}
