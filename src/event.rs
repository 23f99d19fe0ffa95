//! Canonical classification records and the table that holds them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Prefix the platform gives to users who classify without logging in.
pub const ANONYMOUS_PREFIX: &str = "not-logged-in";

/// One classification made by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub classification_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub annotations: Value,
    #[serde(default)]
    pub subject_data: Value,
}

impl Event {
    /// Whether the classification was made while the project was live.
    ///
    /// Anything other than a boolean `live_project` key counts as not live.
    pub fn is_live(&self) -> bool {
        self.metadata
            .get("live_project")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_anonymous(&self) -> bool {
        is_anonymous(&self.user_name)
    }

    /// Seconds spent on the task, from `started_at` to `finished_at`.
    /// Returns 0.0 when either end is missing or unparseable.
    pub fn task_duration(&self) -> f64 {
        let bound = |key: &str| {
            self.metadata
                .get(key)
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
        };

        match (bound("started_at"), bound("finished_at")) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        }
    }

    pub fn user_language(&self) -> &str {
        self.metadata
            .get("user_language")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Browser viewport as `(width, height)` if both were recorded.
    pub fn viewport(&self) -> Option<(u64, u64)> {
        let viewport = self.metadata.get("viewport")?;
        let width = viewport.get("width").and_then(Value::as_u64)?;
        let height = viewport.get("height").and_then(Value::as_u64)?;
        Some((width, height))
    }
}

pub fn is_anonymous(user_name: &str) -> bool {
    user_name.starts_with(ANONYMOUS_PREFIX)
}

/// Parses the timestamp formats seen in classification exports.
///
/// Accepts `2018-02-20 14:32:11 UTC`, the same without the zone suffix
/// (read as UTC), and RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = raw.strip_suffix(" UTC").unwrap_or(raw);
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|ts| ts.and_utc())
}

/// Parses a date bound. A bare date means midnight UTC on that day.
pub fn parse_date_bound(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
        .or_else(|| parse_timestamp(raw))
}

/// Classifications in load order, indexed by `classification_id`.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    events: Vec<Event>,
    index: HashMap<String, usize>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table, keeping the first occurrence of each event id.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        let mut table = Self::new();
        for event in events {
            table.push(event);
        }
        table
    }

    /// Appends an event. Returns `false` and drops it if the id is taken.
    pub(crate) fn push(&mut self, event: Event) -> bool {
        if self.index.contains_key(&event.classification_id) {
            warn!(
                classification_id = %event.classification_id,
                "Duplicate classification id, keeping the first"
            );
            return false;
        }
        self.index
            .insert(event.classification_id.clone(), self.events.len());
        self.events.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, classification_id: &str) -> Option<&Event> {
        self.index.get(classification_id).map(|&i| &self.events[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Earliest and latest `created_at` in the table.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.events.iter().map(|e| e.created_at).min()?;
        let last = self.events.iter().map(|e| e.created_at).max()?;
        Some((first, last))
    }
}

impl<'a> IntoIterator for &'a EventTable {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
