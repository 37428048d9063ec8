// src/convert/mod.rs

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{Duration, NaiveDate};
use glob::glob;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

use crate::normalize::text::fold_text;
use crate::store::{csv::write_csv_atomic, DataLayout};

const HEADER_MARKER: &str = "DATA INICIAL";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertSummary {
    pub workbooks: usize,
    pub converted: usize,
    pub skipped_existing: usize,
    pub failed: usize,
}

/// Spreadsheets for the layout's year, in sorted path order.
pub fn discover_workbooks(layout: &DataLayout) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*/*.xlsx", layout.bronze_year_dir().display());
    let mut files = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
        match entry {
            Ok(p) => files.push(p),
            Err(e) => warn!("unreadable bronze path: {}", e),
        }
    }
    Ok(files)
}

/// Convert every bronze spreadsheet that has no raw CSV yet.
#[instrument(level = "info", skip_all, fields(year = layout.year(), sheet = %sheet))]
pub fn convert_workbooks(layout: &DataLayout, sheet: &str) -> Result<ConvertSummary> {
    let workbooks = discover_workbooks(layout)?;
    let mut summary = ConvertSummary {
        workbooks: workbooks.len(),
        ..Default::default()
    };

    for wb in &workbooks {
        let Some(dest) = layout.raw_path_for(wb) else {
            warn!(path = %wb.display(), "outside bronze area, skipping");
            summary.failed += 1;
            continue;
        };
        if dest.exists() {
            debug!(path = %dest.display(), "raw csv exists, skipping");
            summary.skipped_existing += 1;
            continue;
        }
        match convert_workbook(wb, sheet, &dest) {
            Ok(rows) => {
                info!(src = %wb.display(), dest = %dest.display(), rows, "converted");
                summary.converted += 1;
            }
            Err(e) => {
                error!(path = %wb.display(), "conversion failed: {:#}", e);
                summary.failed += 1;
            }
        }
    }

    info!(
        converted = summary.converted,
        existing = summary.skipped_existing,
        failed = summary.failed,
        "conversion complete"
    );
    Ok(summary)
}

/// Write `sheet` of `workbook` to `dest` as CSV; returns the data row count.
pub fn convert_workbook(workbook: &Path, sheet: &str, dest: &Path) -> Result<usize> {
    let mut wb = open_workbook_auto(workbook)
        .with_context(|| format!("opening {}", workbook.display()))?;
    let range = wb
        .worksheet_range(sheet)
        .with_context(|| format!("reading sheet {sheet} of {}", workbook.display()))?;

    let (header, rows) = sheet_table(&range)
        .with_context(|| format!("sheet {sheet} of {} is empty", workbook.display()))?;
    write_csv_atomic(dest, &header, &rows)?;
    Ok(rows.len())
}

/// Header row plus every following non-empty row, rendered as text.
fn sheet_table(range: &Range<Data>) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let rendered: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(render_cell).collect())
        .filter(|cells: &Vec<String>| cells.iter().any(|c| !c.is_empty()))
        .collect();

    let header_at = rendered
        .iter()
        .position(|cells| {
            cells
                .iter()
                .find(|c| !c.is_empty())
                .is_some_and(|first| fold_text(first) == HEADER_MARKER)
        })
        .unwrap_or(0);

    let mut rows = rendered.into_iter().skip(header_at);
    let header = rows.next()?;
    Some((header, rows.collect()))
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format!("{f}"),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.get(..10).unwrap_or(s).to_string(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Excel's day 0 is 1899-12-30 (including the fictitious 1900-02-29).
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(rows: Vec<Vec<Data>>) -> Range<Data> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut r = Range::new((0, 0), (rows.len() as u32 - 1, width as u32 - 1));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, cell) in row.into_iter().enumerate() {
                r.set_value((i as u32, j as u32), cell);
            }
        }
        r
    }

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    #[test]
    fn serial_dates_use_1899_epoch() {
        assert_eq!(excel_serial_to_date(45662.0), NaiveDate::from_ymd_opt(2025, 1, 5));
        assert_eq!(excel_serial_to_date(45662.75), NaiveDate::from_ymd_opt(2025, 1, 5));
        assert_eq!(excel_serial_to_date(-1.0), None);
    }

    #[test]
    fn cells_render_as_plain_text() {
        assert_eq!(render_cell(&Data::Float(10.0)), "10");
        assert_eq!(render_cell(&Data::Float(5.49)), "5.49");
        assert_eq!(render_cell(&Data::Int(7)), "7");
        assert_eq!(render_cell(&s("  ACRE ")), "ACRE");
        assert_eq!(render_cell(&Data::DateTimeIso("2025-01-05T00:00:00".into())), "2025-01-05");
        assert_eq!(render_cell(&Data::Empty), "");
    }

    #[test]
    fn header_found_below_title_rows() {
        let r = range(vec![
            vec![s("SÍNTESE SEMANAL"), Data::Empty],
            vec![Data::Empty, Data::Empty],
            vec![s("DATA INICIAL"), s("PRODUTO")],
            vec![Data::Float(45662.0), s("GASOLINA")],
            vec![Data::Empty, Data::Empty],
            vec![Data::Float(45662.0), s("ETANOL")],
        ]);
        let (header, rows) = sheet_table(&r).unwrap();
        assert_eq!(header, vec!["DATA INICIAL", "PRODUTO"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["45662", "ETANOL"]);
    }

    #[test]
    fn first_non_empty_row_is_header_without_marker() {
        let r = range(vec![
            vec![Data::Empty, Data::Empty],
            vec![s("A"), s("B")],
            vec![Data::Int(1), Data::Int(2)],
        ]);
        let (header, rows) = sheet_table(&r).unwrap();
        assert_eq!(header, vec!["A", "B"]);
        assert_eq!(rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn blank_sheet_has_no_table() {
        let r = range(vec![vec![Data::Empty]]);
        assert!(sheet_table(&r).is_none());
    }

    #[test]
    fn missing_workbook_is_counted_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path(), 2025);
        let dir = layout.bronze_year_dir().join("01");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("2025-01-05_2025-01-11.xlsx"), b"not a zip").unwrap();

        let summary = convert_workbooks(&layout, "MUNICIPIOS").unwrap();
        assert_eq!(summary.workbooks, 1);
        assert_eq!(summary.failed, 1);
        assert!(!layout
            .raw_root()
            .join("2025/01/2025-01-05_2025-01-11.csv")
            .exists());
    }
}
