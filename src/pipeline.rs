// src/pipeline.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::convert::{self, ConvertSummary};
use crate::fetch::{self, FetchSummary};
use crate::model::{DimensionSet, FactSet};
use crate::normalize::{self, NormalizeOutcome};
use crate::store::{csv::write_atomic, DataLayout, OutputStore, WrittenTable};

/// Contents of `manifest.json`, also returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub year: i32,
    pub fetch: Option<FetchSummary>,
    pub convert: Option<ConvertSummary>,
    pub files_normalized: usize,
    pub files_failed: usize,
    pub records: usize,
    pub dimensions: Vec<WrittenTable>,
    pub facts: Vec<WrittenTable>,
}

/// Runs every stage in order for one configured year.
pub struct Pipeline {
    config: PipelineConfig,
    layout: DataLayout,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let layout = DataLayout::new(&config.data_dir, config.year);
        Self { config, layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn run(&self) -> Result<RunSummary> {
        self.run_on(Local::now().date_naive())
    }

    /// Run with `today` deciding which weekly files are complete.
    #[instrument(level = "info", skip(self), fields(year = self.config.year, data = %self.config.data_dir.display()))]
    pub fn run_on(&self, today: NaiveDate) -> Result<RunSummary> {
        info!("pipeline start");

        let fetch = if self.config.fetch.enabled {
            Some(fetch::fetch_weekly_files(&self.config.fetch, &self.layout, today)?)
        } else {
            info!("fetch disabled");
            None
        };

        let convert = if self.config.convert.enabled {
            Some(convert::convert_workbooks(&self.layout, &self.config.convert.sheet)?)
        } else {
            info!("conversion disabled");
            None
        };

        let NormalizeOutcome {
            records,
            files_normalized,
            files_failed,
        } = normalize::normalize_files(
            &self.layout.raw_root(),
            &self.layout.normalized_root(),
            &self.config.columns,
        )?;

        // nothing is written until every table is built
        let dims = DimensionSet::build(&records, &self.config.capitals);
        let facts = FactSet::build(&records, &dims)?;

        let store = OutputStore::new(&self.layout, self.config.output.parquet)?;
        let dimensions = write_dimensions(&store, &dims)?;
        let facts = write_facts(&store, &facts)?;

        let summary = RunSummary {
            generated_at: Utc::now(),
            year: self.config.year,
            fetch,
            convert,
            files_normalized,
            files_failed,
            records: records.len(),
            dimensions,
            facts,
        };
        write_manifest(&self.layout.manifest_path(), &summary)?;

        if summary.records == 0 {
            warn!("pipeline finished without records");
        }
        info!(
            records = summary.records,
            tables = summary.dimensions.len() + summary.facts.len(),
            "pipeline complete"
        );
        Ok(summary)
    }
}

#[instrument(level = "info", skip_all)]
pub fn write_dimensions(store: &OutputStore, dims: &DimensionSet) -> Result<Vec<WrittenTable>> {
    Ok(vec![
        store.write_dimension(&dims.products)?,
        store.write_dimension(&dims.units)?,
        store.write_dimension(&dims.regions)?,
        store.write_dimension(&dims.states)?,
        store.write_dimension(&dims.municipalities)?,
        store.write_dimension(&dims.time_periods)?,
        store.write_dimension(&dims.months)?,
        store.write_dimension(&dims.countries)?,
    ])
}

#[instrument(level = "info", skip_all)]
pub fn write_facts(store: &OutputStore, facts: &FactSet) -> Result<Vec<WrittenTable>> {
    Ok(vec![
        store.write_fact(&facts.municipality)?,
        store.write_fact(&facts.state)?,
        store.write_fact(&facts.region)?,
        store.write_fact(&facts.country)?,
    ])
}

fn write_manifest(path: &Path, summary: &RunSummary) -> Result<()> {
    write_atomic(path, |out| {
        serde_json::to_writer_pretty(&mut *out, summary).context("serializing manifest")?;
        Ok(())
    })
    .with_context(|| format!("writing manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn offline(root: &Path) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.year = 2025;
        cfg.data_dir = root.to_path_buf();
        cfg.fetch.enabled = false;
        cfg.convert.enabled = false;
        cfg
    }

    #[test]
    fn empty_raw_area_writes_empty_tables_and_manifest() {
        let tmp = tempdir().unwrap();
        let pipeline = Pipeline::new(offline(tmp.path()));
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.records, 0);
        assert_eq!(summary.dimensions.len(), 8);
        assert_eq!(summary.facts.len(), 4);
        let months = summary
            .dimensions
            .iter()
            .find(|t| t.table == "dim_mes")
            .unwrap();
        assert_eq!(months.rows, 12);
        assert!(summary.facts.iter().all(|t| t.rows == 0 && t.path.exists()));

        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(pipeline.layout().manifest_path()).unwrap()).unwrap();
        assert_eq!(manifest["year"], 2025);
        assert_eq!(manifest["records"], 0);
        assert!(manifest["fetch"].is_null());
    }
}
