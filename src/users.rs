//! Per-user classification totals and the Gini coefficient.
//!
//! Users are ranked by ascending classification count; the cumulative share
//! of classifications along that ranking traces a discrete Lorenz curve,
//! from which the Gini coefficient is taken as `1 - 2 * mean(share)`.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Result, StatsError};
use crate::event::{EventTable, is_anonymous};

/// One row of the users table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub user_name: String,
    pub classifications: u64,
    pub anonymous: bool,
    /// 1-based position when ranked by ascending count.
    pub rank: usize,
    pub cumulative_classifications: u64,
    pub proportion_total_classifications: f64,
    pub proportion_user_base: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsersTable {
    /// Rows ranked by ascending count, ties broken by user name.
    rows: Vec<UserSummary>,
    pub total_classifications: u64,
    pub total_users: usize,
    pub gini_coefficient: f64,
}

impl UsersTable {
    pub fn from_table(table: &EventTable) -> Result<Self> {
        Self::from_counts(count_by_user(table))
    }

    /// Builds the table from per-user counts.
    ///
    /// # Errors
    ///
    /// [`StatsError::EmptyTable`] if there are no users or no classifications.
    pub fn from_counts(counts: HashMap<String, u64>) -> Result<Self> {
        let total_classifications: u64 = counts.values().sum();
        let total_users = counts.len();
        if total_users == 0 || total_classifications == 0 {
            return Err(StatsError::EmptyTable);
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut cumulative = 0u64;
        let rows: Vec<UserSummary> = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (user_name, classifications))| {
                cumulative += classifications;
                let rank = i + 1;
                UserSummary {
                    anonymous: is_anonymous(&user_name),
                    user_name,
                    classifications,
                    rank,
                    cumulative_classifications: cumulative,
                    proportion_total_classifications: cumulative as f64
                        / total_classifications as f64,
                    proportion_user_base: rank as f64 / total_users as f64,
                }
            })
            .collect();

        let area_under_curve = rows
            .iter()
            .map(|r| r.proportion_total_classifications)
            .sum::<f64>()
            / total_users as f64;
        let gini_coefficient = 1.0 - 2.0 * area_under_curve;

        debug!(total_users, total_classifications, gini_coefficient, "Users table built");

        Ok(Self {
            rows,
            total_classifications,
            total_users,
            gini_coefficient,
        })
    }

    /// Rows from least to most active.
    pub fn ascending(&self) -> &[UserSummary] {
        &self.rows
    }

    /// Rows from most to least active.
    pub fn descending(&self) -> impl Iterator<Item = &UserSummary> {
        self.rows.iter().rev()
    }

    pub fn get(&self, user_name: &str) -> Option<&UserSummary> {
        self.rows.iter().find(|r| r.user_name == user_name)
    }

    pub fn anonymous_users(&self) -> usize {
        self.rows.iter().filter(|r| r.anonymous).count()
    }

    /// Percentage of all classifications made by the `n` most active users.
    pub fn top_share(&self, n: usize) -> f64 {
        let top: u64 = self.descending().take(n).map(|r| r.classifications).sum();
        100.0 * top as f64 / self.total_classifications as f64
    }
}

pub fn count_by_user(table: &EventTable) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for event in table {
        *counts.entry(event.user_name.clone()).or_default() += 1;
    }
    counts
}
