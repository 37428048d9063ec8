// src/fetch/mod.rs

pub mod download;
pub mod weeks;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::FetchConfig;
use crate::store::DataLayout;

pub use download::{DownloadOutcome, Downloader};
pub use weeks::{generate_weeks, weeks_in_year, WeeklyFile};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub weeks: usize,
    pub downloaded: usize,
    pub skipped_existing: usize,
    pub unavailable: usize,
}

/// Download every completed weekly spreadsheet of the layout's year not yet
/// in the bronze area.
///
/// Missing weeks (non-success status) are skipped; a transport failure that
/// survives the retry budget aborts the stage with `EtlError::Fetch`.
#[instrument(level = "info", skip_all, fields(first = %cfg.first_week_start, today = %today))]
pub fn fetch_weekly_files(
    cfg: &FetchConfig,
    layout: &DataLayout,
    today: NaiveDate,
) -> Result<FetchSummary> {
    let base = weeks::parse_base_url(&cfg.base_url)?;
    let weeks = weeks_in_year(cfg.first_week_start, today, layout.year());
    info!(weeks = weeks.len(), "generated weekly download links");

    let downloader = Downloader::new(cfg)?;
    let mut summary = FetchSummary {
        weeks: weeks.len(),
        ..Default::default()
    };
    for week in &weeks {
        let url = week.url(&base)?;
        let dest = layout.bronze_path(week.start, week.end);
        match downloader.download(&url, &dest)? {
            DownloadOutcome::Saved(_) => summary.downloaded += 1,
            DownloadOutcome::AlreadyPresent(_) => summary.skipped_existing += 1,
            DownloadOutcome::Unavailable(_) => summary.unavailable += 1,
        }
    }

    info!(
        downloaded = summary.downloaded,
        existing = summary.skipped_existing,
        unavailable = summary.unavailable,
        "fetch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn fully_cached_bronze_area_makes_no_requests() {
        let tmp = tempdir().unwrap();
        let layout = DataLayout::new(tmp.path(), 2025);
        let today = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();
        let cfg = FetchConfig {
            base_url: "http://127.0.0.1:9/".into(),
            ..FetchConfig::default()
        };
        for week in weeks_in_year(cfg.first_week_start, today, 2025) {
            let dest = layout.bronze_path(week.start, week.end);
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::write(dest, b"cached").unwrap();
        }

        let summary = fetch_weekly_files(&cfg, &layout, today).unwrap();
        assert_eq!(
            summary,
            FetchSummary {
                weeks: 3,
                downloaded: 0,
                skipped_existing: 3,
                unavailable: 0,
            }
        );
    }

    #[test]
    fn weeks_outside_the_configured_year_are_not_requested() {
        let tmp = tempdir().unwrap();
        let layout = DataLayout::new(tmp.path(), 2026);
        let cfg = FetchConfig {
            base_url: "http://127.0.0.1:9/".into(),
            ..FetchConfig::default()
        };
        // every 2025 week is complete but none ends in 2026 yet
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let summary = fetch_weekly_files(&cfg, &layout, today).unwrap();
        assert_eq!(summary, FetchSummary::default());
        assert!(!tmp.path().join("bronze/2025").exists());
    }
}
