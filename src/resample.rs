//! Calendar resampling of classification and new-user counts.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::event::EventTable;

/// Calendar bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    Day,
    Week,
    Month,
}

impl Sampling {
    pub const ALL: [Sampling; 3] = [Sampling::Month, Sampling::Week, Sampling::Day];

    /// Bucket a date belongs to, identified by the bucket's last day.
    ///
    /// Weeks end on Sunday; months are labelled by their final day.
    pub fn label(self, date: NaiveDate) -> NaiveDate {
        match self {
            Sampling::Day => date,
            Sampling::Week => {
                let to_sunday = 6 - date.weekday().num_days_from_monday();
                date + Days::new(u64::from(to_sunday))
            }
            Sampling::Month => last_day_of_month(date),
        }
    }

    fn next(self, label: NaiveDate) -> NaiveDate {
        match self {
            Sampling::Day => label + Days::new(1),
            Sampling::Week => label + Days::new(7),
            Sampling::Month => last_day_of_month(label + Days::new(1)),
        }
    }

    /// Bar width, in days, used when charting this sampling.
    pub fn bar_width_days(self) -> f64 {
        match self {
            Sampling::Day => 1.01,
            Sampling::Week => 7.1,
            Sampling::Month => 20.0,
        }
    }
}

impl fmt::Display for Sampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sampling::Day => "day",
            Sampling::Week => "week",
            Sampling::Month => "month",
        })
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: NaiveDate,
    pub number: u64,
    /// Running total up to and including this bucket.
    pub total: u64,
}

/// Contiguous buckets from the first to the last populated one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSeries {
    pub sampling: Sampling,
    pub buckets: Vec<Bucket>,
}

impl BucketSeries {
    pub fn total(&self) -> u64 {
        self.buckets.last().map(|b| b.total).unwrap_or(0)
    }

    pub fn max_number(&self) -> u64 {
        self.buckets.iter().map(|b| b.number).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Counts timestamps per calendar bucket, filling gaps with zero.
pub fn resample<I>(timestamps: I, sampling: Sampling) -> BucketSeries
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for ts in timestamps {
        *counts.entry(sampling.label(ts.date_naive())).or_default() += 1;
    }

    let mut buckets = Vec::with_capacity(counts.len());
    if let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) {
        let mut total = 0;
        let mut label = first;
        while label <= last {
            let number = counts.get(&label).copied().unwrap_or(0);
            total += number;
            buckets.push(Bucket {
                label,
                number,
                total,
            });
            label = sampling.next(label);
        }
    }

    BucketSeries { sampling, buckets }
}

/// Classifications made per bucket.
pub fn classifications_by_time(table: &EventTable, sampling: Sampling) -> BucketSeries {
    resample(table.iter().map(|e| e.created_at), sampling)
}

/// Users making their first classification in each bucket.
///
/// `from`/`to` narrow the table to `[from, to)` before first classifications
/// are found, so a user first seen before `from` counts as new at their first
/// classification inside the window.
pub fn users_by_time(
    table: &EventTable,
    sampling: Sampling,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> BucketSeries {
    let mut first_seen: HashMap<&str, DateTime<Utc>> = HashMap::new();

    for event in table {
        let ts = event.created_at;
        if from.is_some_and(|f| ts < f) || to.is_some_and(|t| ts >= t) {
            continue;
        }
        first_seen
            .entry(event.user_name.as_str())
            .and_modify(|seen| *seen = (*seen).min(ts))
            .or_insert(ts);
    }

    resample(first_seen.into_values(), sampling)
}
