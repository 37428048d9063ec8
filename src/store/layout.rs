// src/store/layout.rs

use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

/// Medallion-style directory layout under one data root.
///
/// ```text
/// <root>/bronze/<yyyy>/<mm>/<start>_<end>.xlsx
/// <root>/silver/<year>/raw/<yyyy>/<mm>/<start>_<end>.csv
/// <root>/silver/<year>/raw_normalized/<yyyy>/<mm>/<start>_<end>.csv
/// <root>/gold/<year>/dim/<table>.csv
/// <root>/gold/<year>/fato/<table>.csv
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
    year: i32,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>, year: i32) -> Self {
        Self {
            root: root.into(),
            year,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn bronze_root(&self) -> PathBuf {
        self.root.join("bronze")
    }

    /// Spreadsheets for the configured year.
    pub fn bronze_year_dir(&self) -> PathBuf {
        self.bronze_root().join(self.year.to_string())
    }

    /// Destination of one weekly spreadsheet, partitioned by the week's end date.
    pub fn bronze_path(&self, start: NaiveDate, end: NaiveDate) -> PathBuf {
        self.bronze_root()
            .join(end.year().to_string())
            .join(format!("{:02}", end.month()))
            .join(format!("{}_{}.xlsx", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")))
    }

    pub fn raw_root(&self) -> PathBuf {
        self.silver_dir().join("raw")
    }

    pub fn normalized_root(&self) -> PathBuf {
        self.silver_dir().join("raw_normalized")
    }

    /// Raw CSV mirroring a bronze spreadsheet's `<yyyy>/<mm>` partition.
    pub fn raw_path_for(&self, bronze_file: &Path) -> Option<PathBuf> {
        let relative = bronze_file.strip_prefix(self.bronze_root()).ok()?;
        Some(self.raw_root().join(relative).with_extension("csv"))
    }

    pub fn dim_dir(&self) -> PathBuf {
        self.gold_dir().join("dim")
    }

    pub fn fact_dir(&self) -> PathBuf {
        self.gold_dir().join("fato")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.gold_dir().join("manifest.json")
    }

    fn silver_dir(&self) -> PathBuf {
        self.root.join("silver").join(self.year.to_string())
    }

    fn gold_dir(&self) -> PathBuf {
        self.root.join("gold").join(self.year.to_string())
    }
}
