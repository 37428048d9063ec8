use anyhow::Result;
use fuelprices::{EtlError, Pipeline, PipelineConfig};
use std::{env, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<EtlError>() {
                Some(kind) => error!(kind = ?kind, "pipeline aborted: {:#}", e),
                None => error!("pipeline aborted: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // ─── 2) args: [--offline] [CONFIG.yaml] ──────────────────────────
    let mut offline = false;
    let mut config_path: Option<PathBuf> = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--offline" => offline = true,
            other => config_path = Some(PathBuf::from(other)),
        }
    }

    // ─── 3) load config ──────────────────────────────────────────────
    let mut config = PipelineConfig::load(config_path.as_deref())?;
    if offline {
        config.fetch.enabled = false;
    }
    info!(
        year = config.year,
        data = %config.data_dir.display(),
        fetch = config.fetch.enabled,
        convert = config.convert.enabled,
        parquet = config.output.parquet,
        "startup"
    );

    // ─── 4) run every stage ──────────────────────────────────────────
    let summary = Pipeline::new(config).run()?;
    info!(
        records = summary.records,
        files = summary.files_normalized,
        failed_files = summary.files_failed,
        "all done"
    );
    for table in summary.dimensions.iter().chain(&summary.facts) {
        info!(table = %table.table, rows = table.rows, path = %table.path.display());
    }
    Ok(())
}
