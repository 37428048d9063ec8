// src/normalize/mod.rs

pub mod decode;
pub mod record;
pub mod text;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ColumnRenames;
use crate::store::csv::write_csv_atomic;

pub use record::{FieldIndex, NormalizedRecord};

/// Result of normalizing every raw weekly file.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    /// All rows, file-then-row order.
    pub records: Vec<NormalizedRecord>,
    pub files_normalized: usize,
    pub files_failed: usize,
}

/// One raw file after header canonicalization and value folding.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Raw CSVs live at `<raw_root>/<yyyy>/<mm>/*.csv`. Glob yields paths in
/// sorted order, which keeps surrogate keys reproducible for a fixed file set.
pub fn discover_raw_files(raw_root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*/*/*.csv", raw_root.display());
    let mut files = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
        match entry {
            Ok(path) => files.push(path),
            Err(e) => warn!("unreadable raw path: {}", e),
        }
    }
    Ok(files)
}

/// Normalize every raw file under `raw_root`, writing cleaned copies under
/// `normalized_root` and accumulating the parsed rows.
///
/// A file that cannot be decoded or parsed is logged and skipped.
#[instrument(level = "info", skip_all, fields(raw = %raw_root.display()))]
pub fn normalize_files(
    raw_root: &Path,
    normalized_root: &Path,
    renames: &ColumnRenames,
) -> Result<NormalizeOutcome> {
    let files = discover_raw_files(raw_root)?;
    info!(files = files.len(), "normalizing raw files");

    let mut outcome = NormalizeOutcome::default();
    for file in &files {
        match normalize_file(file, raw_root, normalized_root, renames) {
            Ok(records) => {
                debug!(path = %file.display(), rows = records.len(), "normalized");
                outcome.records.extend(records);
                outcome.files_normalized += 1;
            }
            Err(e) => {
                error!(path = %file.display(), "skipping file: {:#}", e);
                outcome.files_failed += 1;
            }
        }
    }

    if outcome.files_normalized == 0 {
        warn!("no raw file could be normalized; dimension and fact tables will be empty");
    } else {
        info!(
            files = outcome.files_normalized,
            failed = outcome.files_failed,
            rows = outcome.records.len(),
            "normalized record set ready"
        );
    }
    Ok(outcome)
}

/// Normalize a single raw file, persist its cleaned copy and return its rows.
pub fn normalize_file(
    file: &Path,
    raw_root: &Path,
    normalized_root: &Path,
    renames: &ColumnRenames,
) -> Result<Vec<NormalizedRecord>> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let content = decode::decode_text(&bytes, file)?;
    let table = normalize_table(&content, renames)
        .with_context(|| format!("parsing {}", file.display()))?;

    let relative = file.strip_prefix(raw_root).unwrap_or(file);
    let dest = normalized_root.join(relative);
    write_csv_atomic(&dest, &table.headers, &table.rows)?;
    debug!(dest = %dest.display(), "wrote normalized copy");

    let index = FieldIndex::new(&table.headers);
    Ok(table.rows.iter().map(|row| index.record(row)).collect())
}

/// Parse decoded CSV text into canonical headers and folded values.
pub fn normalize_table(content: &str, renames: &ColumnRenames) -> Result<NormalizedTable> {
    let delimiter = sniff_delimiter(content);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let raw_headers = reader.headers().context("reading header row")?.clone();
    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        bail!("file has no header row");
    }
    let headers: Vec<String> = raw_headers
        .iter()
        .map(|h| text::canonical_header(h, renames))
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1, records are 1-based
        let line = idx + 2;
        let record = result.with_context(|| format!("CSV parse error at line {line}"))?;
        if record.len() > headers.len() {
            bail!(
                "line {line} has {} fields but the header has {}",
                record.len(),
                headers.len()
            );
        }
        let mut row: Vec<String> = record.iter().map(text::fold_text).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    Ok(NormalizedTable { headers, rows })
}

/// Semicolon-separated exports show up next to comma-separated ones; decide
/// from the header line.
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.contains(';') && !header.contains(',') {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const WEEK: &str = "\u{feff}DATA INICIAL,DATA FINAL,ESTADO,MUNICÍPIO,REGIAO,PRODUTO,\
NÚMERO DE POSTOS PESQUISADOS,UNIDADE DE MEDIDA,PREÇO MÉDIO REVENDA,Observação\n\
2025-01-05,2025-01-11,Acre,Rio Branco,Norte,Gasolina,10,R$/l,5.50,ok\n\
2025-01-05,2025-01-11,ACRE,CRUZEIRO DO SUL,NORTE,GASOLINA,8,R$/l,5.20,\n";

    fn seed(raw_root: &Path, rel: &str, content: &[u8]) -> PathBuf {
        let path = raw_root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn table_headers_and_values_are_canonical() {
        let table = normalize_table(WEEK, &ColumnRenames::default()).unwrap();
        assert_eq!(
            table.headers,
            vec![
                "data_inicial",
                "data_final",
                "estado",
                "municipio",
                "regiao",
                "produto",
                "num_postos_pesquisados",
                "unidade_medida",
                "preco_medio_revenda",
                "observacao",
            ]
        );
        assert_eq!(table.rows[0][2], "ACRE");
        assert_eq!(table.rows[0][3], "RIO BRANCO");
        assert_eq!(table.rows[0][7], "R$/L");
        assert_eq!(table.rows[1][9], "");
    }

    #[test]
    fn semicolon_files_are_detected() {
        let content = "ESTADO;PRODUTO\nACRE;GASOLINA\n";
        let table = normalize_table(content, &ColumnRenames::default()).unwrap();
        assert_eq!(table.headers, vec!["estado", "produto"]);
        assert_eq!(table.rows, vec![vec!["ACRE".to_string(), "GASOLINA".to_string()]]);
    }

    #[test]
    fn short_rows_are_padded_long_rows_fail() {
        let renames = ColumnRenames::default();
        let padded = normalize_table("ESTADO,PRODUTO\nACRE\n", &renames).unwrap();
        assert_eq!(padded.rows[0], vec!["ACRE".to_string(), String::new()]);
        assert!(normalize_table("ESTADO,PRODUTO\nACRE,GASOLINA,EXTRA\n", &renames).is_err());
    }

    #[test]
    fn bad_files_are_skipped_and_good_ones_kept() {
        let tmp = tempdir().unwrap();
        let raw = tmp.path().join("raw");
        let norm = tmp.path().join("raw_normalized");
        seed(&raw, "2025/01/2025-01-05_2025-01-11.csv", WEEK.as_bytes());
        seed(&raw, "2025/01/2025-01-12_2025-01-18.csv", b"ESTADO\nPAR\xC1\n");

        let outcome = normalize_files(&raw, &norm, &ColumnRenames::default()).unwrap();
        assert_eq!(outcome.files_normalized, 1);
        assert_eq!(outcome.files_failed, 1);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[1].municipality.as_deref(), Some("CRUZEIRO DO SUL"));
        assert!(norm.join("2025/01/2025-01-05_2025-01-11.csv").exists());
        assert!(!norm.join("2025/01/2025-01-12_2025-01-18.csv").exists());
    }

    #[test]
    fn empty_raw_area_yields_empty_records() {
        let tmp = tempdir().unwrap();
        let outcome = normalize_files(
            &tmp.path().join("raw"),
            &tmp.path().join("norm"),
            &ColumnRenames::default(),
        )
        .unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.files_normalized, 0);
    }

    #[test]
    fn rerun_rewrites_identical_bytes() {
        let tmp = tempdir().unwrap();
        let raw = tmp.path().join("raw");
        let norm = tmp.path().join("norm");
        seed(&raw, "2025/01/week.csv", WEEK.as_bytes());
        let renames = ColumnRenames::default();

        normalize_files(&raw, &norm, &renames).unwrap();
        let first = fs::read(norm.join("2025/01/week.csv")).unwrap();
        normalize_files(&raw, &norm, &renames).unwrap();
        let second = fs::read(norm.join("2025/01/week.csv")).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(b"\xEF\xBB\xBFdata_inicial,"));
    }
}
