// src/fetch/weeks.rs

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate};
use url::Url;

/// One Sunday-to-Saturday survey window published as a single spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WeeklyFile {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeeklyFile {
    pub fn new(start: NaiveDate) -> Self {
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    /// `<base>/<end year>/resumo_semanal_lpc_<start>_<end>.xlsx`
    pub fn url(&self, base: &Url) -> Result<Url> {
        let relative = format!(
            "{}/resumo_semanal_lpc_{}_{}.xlsx",
            self.end.year(),
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d"),
        );
        base.join(&relative)
            .with_context(|| format!("joining {relative} onto {base}"))
    }

    pub fn next(&self) -> Self {
        Self::new(self.start + Duration::days(7))
    }
}

/// Sunday closing the previous Monday-based week.
pub fn last_completed_week_end(today: NaiveDate) -> NaiveDate {
    today - Duration::days(i64::from(today.weekday().num_days_from_monday()) + 1)
}

/// Every weekly window from `first_start` whose end is on or before the last
/// completed week boundary relative to `today`.
pub fn generate_weeks(first_start: NaiveDate, today: NaiveDate) -> Vec<WeeklyFile> {
    let limit = last_completed_week_end(today);
    let mut weeks = Vec::new();
    let mut week = WeeklyFile::new(first_start);
    while week.end <= limit {
        weeks.push(week);
        week = week.next();
    }
    weeks
}

/// The windows of `generate_weeks` that end in `year`. Spreadsheets are
/// filed under their end year, which is the only year a run converts.
pub fn weeks_in_year(first_start: NaiveDate, today: NaiveDate, year: i32) -> Vec<WeeklyFile> {
    generate_weeks(first_start, today)
        .into_iter()
        .filter(|w| w.end.year() == year)
        .collect()
}

/// Parse a base URL, making sure relative joins land under it.
pub fn parse_base_url(base: &str) -> Result<Url> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&normalized).with_context(|| format!("parsing base url {base}"))
}
