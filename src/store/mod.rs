// src/store/mod.rs

pub mod arrow;
pub mod csv;
pub mod layout;

use ::arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use anyhow::{Context, Result};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::error::EtlError;

pub use self::arrow::TableRow;
pub use self::layout::DataLayout;

/// What ended up on disk for one table.
#[derive(Debug, Clone, Serialize)]
pub struct WrittenTable {
    pub table: String,
    pub rows: usize,
    pub path: PathBuf,
}

/// Dimension/fact output area for one year.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dim_dir: PathBuf,
    fact_dir: PathBuf,
    parquet: bool,
}

impl OutputStore {
    pub fn new(layout: &DataLayout, parquet: bool) -> Result<Self> {
        let store = Self {
            dim_dir: layout.dim_dir(),
            fact_dir: layout.fact_dir(),
            parquet,
        };
        for d in [&store.dim_dir, &store.fact_dir] {
            fs::create_dir_all(d).with_context(|| format!("creating {}", d.display()))?;
        }
        Ok(store)
    }

    pub fn write_dimension<R: TableRow>(&self, rows: &[R]) -> Result<WrittenTable> {
        let batch = R::to_batch(rows)?;
        self.write_batch(&self.dim_dir, R::TABLE, &batch)
    }

    pub fn write_fact<R: TableRow>(&self, rows: &[R]) -> Result<WrittenTable> {
        let batch = R::to_batch(rows)?;
        self.write_batch(&self.fact_dir, R::TABLE, &batch)
    }

    fn write_batch(&self, dir: &Path, table: &str, batch: &RecordBatch) -> Result<WrittenTable> {
        let path = dir.join(format!("{table}.csv"));
        write_csv_batch(&path, batch).map_err(|e| EtlError::Store {
            table: table.to_string(),
            path: path.clone(),
            reason: format!("{e:#}"),
        })?;
        debug!(table, path = %path.display(), "wrote csv");

        if self.parquet {
            let pq_path = dir.join(format!("{table}.parquet"));
            write_parquet_batch(&pq_path, batch).map_err(|e| EtlError::Store {
                table: table.to_string(),
                path: pq_path.clone(),
                reason: format!("{e:#}"),
            })?;
            debug!(table, path = %pq_path.display(), "wrote parquet");
        }

        info!(table, rows = batch.num_rows(), "persisted table");
        Ok(WrittenTable {
            table: table.to_string(),
            rows: batch.num_rows(),
            path,
        })
    }
}

/// UTF-8 with BOM, comma-separated, header row, nulls as empty fields.
pub fn write_csv_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    csv::write_atomic(path, |out| {
        out.write_all(csv::UTF8_BOM)?;
        let mut writer = WriterBuilder::new().with_header(true).build(&mut *out);
        writer.write(batch).context("encoding csv batch")?;
        drop(writer);
        Ok(())
    })
}

/// Snappy-compressed Parquet copy, written through the same hidden tmp file
/// as the CSV output.
pub fn write_parquet_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    csv::write_atomic(path, |out| {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(&mut *out, batch.schema(), Some(props))
            .context("creating parquet writer")?;
        writer.write(batch).context("writing parquet batch")?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::arrow::{floats, key_field, keys, texts, text_field};
    use ::arrow::{
        array::ArrayRef,
        datatypes::{DataType, Field, Schema},
    };
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;
    use tempfile::tempdir;

    struct Sample {
        id: u32,
        name: &'static str,
        price: Option<f64>,
    }

    impl TableRow for Sample {
        const TABLE: &'static str = "dim_sample";

        fn schema() -> Schema {
            Schema::new(vec![
                key_field("sample_id"),
                text_field("sample_descricao"),
                Field::new("price", DataType::Float64, true),
            ])
        }

        fn columns(rows: &[Self]) -> Vec<ArrayRef> {
            vec![
                keys(rows.iter().map(|r| r.id)),
                texts(rows.iter().map(|r| r.name)),
                floats(rows.iter().map(|r| r.price)),
            ]
        }
    }

    fn samples() -> Vec<Sample> {
        vec![
            Sample {
                id: 1,
                name: "GASOLINA",
                price: Some(5.5),
            },
            Sample {
                id: 2,
                name: "ETANOL",
                price: None,
            },
        ]
    }

    #[test]
    fn csv_has_bom_header_and_empty_nulls() {
        let tmp = tempdir().unwrap();
        let store = OutputStore::new(&DataLayout::new(tmp.path(), 2025), false).unwrap();
        let written = store.write_dimension(&samples()).unwrap();

        assert_eq!(written.rows, 2);
        assert_eq!(written.path, tmp.path().join("gold/2025/dim/dim_sample.csv"));
        let bytes = fs::read(&written.path).unwrap();
        assert!(bytes.starts_with(super::csv::UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "sample_id,sample_descricao,price");
        assert_eq!(lines[1], "1,GASOLINA,5.5");
        assert_eq!(lines[2], "2,ETANOL,");
        assert!(!tmp.path().join("gold/2025/dim/dim_sample.parquet").exists());
    }

    #[test]
    fn empty_table_still_has_header() {
        let tmp = tempdir().unwrap();
        let store = OutputStore::new(&DataLayout::new(tmp.path(), 2025), false).unwrap();
        let written = store.write_fact::<Sample>(&[]).unwrap();
        let text = fs::read_to_string(&written.path).unwrap();
        assert_eq!(text.trim_start_matches('\u{feff}').trim_end(), "sample_id,sample_descricao,price");
    }

    #[test]
    fn parquet_copy_round_trips_row_count() {
        let tmp = tempdir().unwrap();
        let store = OutputStore::new(&DataLayout::new(tmp.path(), 2025), true).unwrap();
        store.write_fact(&samples()).unwrap();

        let pq = tmp.path().join("gold/2025/fato/dim_sample.parquet");
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(pq).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }

    #[test]
    fn failed_parquet_write_leaves_no_tmp_file() {
        let tmp = tempdir().unwrap();
        // a directory in the way makes the final rename fail
        let target = tmp.path().join("dim_sample.parquet");
        fs::create_dir_all(target.join("occupied")).unwrap();

        let batch = Sample::to_batch(&samples()).unwrap();
        assert!(write_parquet_batch(&target, &batch).is_err());

        let mut names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["dim_sample.parquet"]);
    }
}
