//! Plain-text summary of a users table.

use serde::Serialize;
use std::fmt;

use crate::users::UsersTable;

pub const TOP_POOLS: [usize; 3] = [10, 100, 1000];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_classifications: u64,
    pub total_users: usize,
    pub anonymous_users: usize,
    pub gini_coefficient: f64,
    /// `(pool size, percentage of classifications)` for each of [`TOP_POOLS`].
    pub top_shares: Vec<(usize, f64)>,
}

impl Summary {
    pub fn from_users(users: &UsersTable) -> Self {
        Self {
            total_classifications: users.total_classifications,
            total_users: users.total_users,
            anonymous_users: users.anonymous_users(),
            gini_coefficient: users.gini_coefficient,
            top_shares: TOP_POOLS.iter().map(|&n| (n, users.top_share(n))).collect(),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>30} {:>7}", "Total classifications:", self.total_classifications)?;
        writeln!(f, "{:>30} {:>7}", "Total users:", self.total_users)?;
        writeln!(f, "{:>30} {:>7}", "Anonymous users:", self.anonymous_users)?;
        writeln!(f, "{:>30} {:>7.2}", "Gini coefficient:", self.gini_coefficient)?;
        writeln!(f)?;
        for (n, share) in &self.top_shares {
            let label = format!("Top {n:>4} users have done:");
            writeln!(f, "{label:>30} {share:>7.1} %")?;
        }
        Ok(())
    }
}
