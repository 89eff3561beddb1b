use crate::contributions::parse_date;
use crate::error::{Result, SkylineError};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Width of one time bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    #[default]
    Week,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
        }
    }
}

impl FromStr for Granularity {
    type Err = SkylineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            _ => Err(SkylineError::InvalidGranularity(s.to_string())),
        }
    }
}

/// One aggregated time slot. `key` sorts chronologically as a plain string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub count: u64,
}

impl Bucket {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// Collapses a date -> count series into buckets sorted by key.
///
/// Week keys are `YYYY-WW` using the ISO-8601 week-numbering year, so
/// 2021-01-01 lands in `2020-53`.
pub fn aggregate(series: &BTreeMap<String, u64>, granularity: Granularity) -> Result<Vec<Bucket>> {
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();

    for (date, &count) in series {
        let day = parse_date(date)?;
        let key = match granularity {
            Granularity::Day => day.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = day.iso_week();
                format!("{:04}-{:02}", week.year(), week.week())
            }
        };
        *buckets.entry(key).or_insert(0) += count;
    }

    Ok(buckets
        .into_iter()
        .map(|(key, count)| Bucket { key, count })
        .collect())
}

/// Largest count among the buckets, 0 when empty.
pub fn max_count(buckets: &[Bucket]) -> u64 {
    buckets.iter().map(|b| b.count).max().unwrap_or(0)
}
