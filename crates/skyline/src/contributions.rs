use crate::atomic::atomic_write;
use crate::error::{Result, SkylineError};
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Daily activity counts for one account, as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributions {
    #[serde(default)]
    pub username: String,
    pub total_contributions: u64,
    pub first_date: String,
    pub last_date: String,
    /// `YYYY-MM-DD` -> count
    pub by_date: BTreeMap<String, u64>,
}

pub fn parse_date(key: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_FORMAT).map_err(|e| SkylineError::InvalidDate {
        key: key.to_string(),
        source: e,
    })
}

impl Contributions {
    /// Builds a record from raw counts, deriving the date range and total.
    pub fn from_counts(username: impl Into<String>, by_date: BTreeMap<String, u64>) -> Self {
        let first_date = by_date.keys().next().cloned().unwrap_or_default();
        let last_date = by_date.keys().next_back().cloned().unwrap_or_default();
        let mut contribs = Self {
            username: username.into(),
            total_contributions: 0,
            first_date,
            last_date,
            by_date,
        };
        contribs.recount();
        contribs
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SkylineError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let contribs: Contributions = serde_json::from_str(&content)?;
        debug!(
            "Loaded {} days from {}",
            contribs.by_date.len(),
            path.display()
        );
        Ok(contribs)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &json)?;
        info!("Contributions saved to: {}", path.display());
        Ok(())
    }

    pub fn recount(&mut self) {
        self.total_contributions = self.by_date.values().sum();
    }

    /// `"2023"` when the range sits in one year, `"2019-2023"` otherwise.
    pub fn year_range_text(&self) -> Result<String> {
        let start = parse_date(&self.first_date)?.year();
        let end = parse_date(&self.last_date)?.year();

        if start == end {
            Ok(start.to_string())
        } else {
            Ok(format!("{start}-{end}"))
        }
    }

    /// Drops every year before the first one with a non-zero count and moves
    /// `first_date` to January 1st of that year.
    ///
    /// Returns true when `first_date` changed.
    pub fn trim_start_year(&mut self) -> Result<bool> {
        let mut first_year: Option<i32> = None;
        for (date, &count) in &self.by_date {
            if count == 0 {
                continue;
            }
            let year = parse_date(date)?.year();
            first_year = Some(first_year.map_or(year, |y| y.min(year)));
        }

        let Some(first_year) = first_year else {
            return Ok(false);
        };
        info!("First contribution year: {first_year}");

        let mut keep = BTreeMap::new();
        for (date, count) in std::mem::take(&mut self.by_date) {
            if parse_date(&date)?.year() >= first_year {
                keep.insert(date, count);
            }
        }
        self.by_date = keep;

        let first_date = format!("{first_year:04}-01-01");
        if first_date != self.first_date {
            self.first_date = first_date;
            return Ok(true);
        }
        Ok(false)
    }

    /// Removes dates after `today`. Returns how many were dropped.
    pub fn discard_future(&mut self, today: NaiveDate) -> Result<usize> {
        let mut future = Vec::new();
        for date in self.by_date.keys() {
            if parse_date(date)? > today {
                future.push(date.clone());
            }
        }

        for date in &future {
            self.by_date.remove(date);
        }

        if !future.is_empty() {
            warn!("Discarded {} dates after {}", future.len(), today);
            if let Some(last) = self.by_date.keys().next_back() {
                self.last_date = last.clone();
            }
            self.recount();
        }
        Ok(future.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Contributions {
        let mut by_date = BTreeMap::new();
        by_date.insert("2019-06-01".to_string(), 0);
        by_date.insert("2020-12-31".to_string(), 0);
        by_date.insert("2021-03-04".to_string(), 5);
        by_date.insert("2022-07-19".to_string(), 2);
        Contributions::from_counts("octocat", by_date)
    }

    #[test]
    fn test_from_counts_derives_range_and_total() {
        let c = sample();
        assert_eq!(c.first_date, "2019-06-01");
        assert_eq!(c.last_date, "2022-07-19");
        assert_eq!(c.total_contributions, 7);
    }

    #[test]
    fn test_year_range_text() {
        let mut c = sample();
        assert_eq!(c.year_range_text().unwrap(), "2019-2022");

        c.first_date = "2022-01-01".to_string();
        assert_eq!(c.year_range_text().unwrap(), "2022");
    }

    #[test]
    fn test_year_range_text_invalid_date() {
        let mut c = sample();
        c.last_date = "yesterday".to_string();
        assert!(matches!(
            c.year_range_text(),
            Err(SkylineError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_trim_start_year() {
        let mut c = sample();
        assert!(c.trim_start_year().unwrap());
        assert_eq!(c.first_date, "2021-01-01");
        assert_eq!(c.by_date.len(), 2);
        assert!(!c.by_date.contains_key("2020-12-31"));

        // Second pass is a no-op
        assert!(!c.trim_start_year().unwrap());
    }

    #[test]
    fn test_trim_start_year_all_zero() {
        let mut by_date = BTreeMap::new();
        by_date.insert("2020-01-01".to_string(), 0);
        let mut c = Contributions::from_counts("octocat", by_date);

        assert!(!c.trim_start_year().unwrap());
        assert_eq!(c.by_date.len(), 1);
    }

    #[test]
    fn test_discard_future() {
        let mut c = sample();
        let today = NaiveDate::from_ymd_opt(2021, 12, 31).unwrap();

        assert_eq!(c.discard_future(today).unwrap(), 1);
        assert_eq!(c.last_date, "2021-03-04");
        assert_eq!(c.total_contributions, 5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contributions.json");
        let c = sample();

        c.save_to_file(&path).unwrap();
        let loaded = Contributions::load_from_file(&path).unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn test_load_persisted_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contributions.json");
        std::fs::write(
            &path,
            r#"{"username":"octocat","total_contributions":3,"first_date":"2023-01-01","last_date":"2023-01-02","by_date":{"2023-01-01":1,"2023-01-02":2}}"#,
        )
        .unwrap();

        let c = Contributions::load_from_file(&path).unwrap();
        assert_eq!(c.username, "octocat");
        assert_eq!(c.by_date.get("2023-01-02"), Some(&2));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Contributions::load_from_file("does/not/exist.json");
        assert!(matches!(result, Err(SkylineError::ReadFile { .. })));
    }
}
