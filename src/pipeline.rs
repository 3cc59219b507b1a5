use std::path::PathBuf;

use anyhow::Context as _;

use crate::cli::{AggregateArgs, IngestArgs, NormalizeArgs, RunArgs};

pub const BRONZE_SUBDIR: &str = "bronze/raw_kdramas";
pub const SILVER_FILE: &str = "silver/kdramas_silver.parquet";
pub const GOLD_SUBDIR: &str = "gold";

/// Runs each stage only after the previous one succeeded.
pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let data_dir = PathBuf::from(&args.data_dir);
    let bronze_dir = data_dir.join(BRONZE_SUBDIR);
    let silver_path = data_dir.join(SILVER_FILE);
    let gold_dir = data_dir.join(GOLD_SUBDIR);

    tracing::info!(out = %bronze_dir.display(), "run: ingest");
    let ingested = crate::ingest::run(IngestArgs {
        out: bronze_dir.to_string_lossy().to_string(),
        fetch: args.fetch,
        discover: args.discover,
    })
    .context("ingest")?;

    tracing::info!(out = %silver_path.display(), "run: normalize");
    let normalized = crate::normalize::run(NormalizeArgs {
        bronze: bronze_dir.to_string_lossy().to_string(),
        out: silver_path.to_string_lossy().to_string(),
        options: args.normalize,
    })
    .context("normalize")?;

    if normalized == 0 {
        tracing::warn!(
            processed = ingested.entities_processed,
            "nothing normalized; skipping aggregate"
        );
        return Ok(());
    }

    tracing::info!(out = %gold_dir.display(), "run: aggregate");
    let views = crate::aggregate::run(AggregateArgs {
        silver: silver_path.to_string_lossy().to_string(),
        out: gold_dir.to_string_lossy().to_string(),
        options: args.aggregate,
    })
    .context("aggregate")?;

    tracing::info!(
        series = normalized,
        views,
        data_dir = %data_dir.display(),
        "run finished"
    );
    Ok(())
}
