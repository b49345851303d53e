//! Shared recency window and top-N ranking

use crate::config::QueryConfig;
use crate::pipeline::{Predicate, SortKey, Stage};
use crate::value::Value;
use chrono::{DateTime, Duration, Utc};

/// Default recency window in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Default number of ranked rows returned.
pub const DEFAULT_TOP_N: usize = 10;

/// Whether an action only looks at recent events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Recent,
    All,
}

/// Whether an action's rows are ranked and truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    Top,
    Unranked,
}

/// Window length and ranking cutoff applied to every opted-in action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub window: Duration,
    pub limit: usize,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(DEFAULT_WINDOW_DAYS as i64),
            limit: DEFAULT_TOP_N,
        }
    }
}

impl QueryPolicy {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            window: Duration::days(config.window_days as i64),
            limit: config.top_n,
        }
    }

    /// `_time >= now - window`. `now` is fixed once per request.
    pub fn window_stage(&self, now: DateTime<Utc>) -> Stage {
        Stage::Match(Predicate::Gte("_time", Value::from(now - self.window)))
    }

    /// Count descending, most recent first on ties, then the top `limit`.
    pub fn ranking_stages(&self) -> Vec<Stage> {
        vec![
            Stage::Sort(vec![SortKey::desc("count"), SortKey::desc("latest")]),
            Stage::Limit(self.limit),
        ]
    }
}
