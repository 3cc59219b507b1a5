use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{Datelike as _, NaiveDate};
use serde::de::DeserializeOwned;

use crate::cli::{NormalizeArgs, NormalizeOptions};
use crate::formats::{CreditRecord, DetailRecord, DiscoveryRecord, NormalizedEntity};
use crate::raw_store::{ArtifactStore, LocalFsRawStore, RecordKind};

pub fn run(args: NormalizeArgs) -> anyhow::Result<usize> {
    let bronze_dir = PathBuf::from(&args.bronze);
    let out_path = PathBuf::from(&args.out);

    if !bronze_dir.is_dir() {
        tracing::error!(bronze = %bronze_dir.display(), "bronze directory not found; aborting");
        anyhow::bail!("bronze directory not found: {}", bronze_dir.display());
    }

    let store = LocalFsRawStore::new(bronze_dir);
    let entities = normalize_all(&store, &args.options).context("normalize raw records")?;
    if entities.is_empty() {
        tracing::warn!("no series normalized; silver table not written");
        return Ok(0);
    }

    write_silver(&entities, &out_path)?;
    Ok(entities.len())
}

pub fn write_silver(entities: &[NormalizedEntity], out_path: &Path) -> anyhow::Result<()> {
    let mut frame = crate::table::entities_to_frame(entities).context("build silver table")?;
    crate::table::write_parquet(&mut frame, out_path).context("write silver table")?;
    tracing::info!(
        path = %out_path.display(),
        rows = frame.height(),
        columns = frame.width(),
        "silver table written"
    );
    Ok(())
}

/// One entity per stored discovery record, in ascending id order.
pub fn normalize_all(
    store: &dyn ArtifactStore,
    options: &NormalizeOptions,
) -> anyhow::Result<Vec<NormalizedEntity>> {
    let ids = store
        .list_ids(RecordKind::Discovery)
        .context("list discovery records")?;
    if ids.is_empty() {
        tracing::warn!("no discovery records found in bronze");
        return Ok(Vec::new());
    }
    tracing::info!(count = ids.len(), "normalizing series");

    let mut entities = Vec::with_capacity(ids.len());
    for id in ids {
        match normalize_one(store, id, options) {
            Some(entity) => entities.push(entity),
            None => tracing::warn!(id, "series skipped"),
        }
    }
    Ok(entities)
}

pub fn normalize_one(
    store: &dyn ArtifactStore,
    id: u64,
    options: &NormalizeOptions,
) -> Option<NormalizedEntity> {
    let Some(discovery) = load_record::<DiscoveryRecord>(store, id, RecordKind::Discovery) else {
        tracing::warn!(id, "discovery record missing; cannot normalize");
        return None;
    };
    let detail = load_record::<DetailRecord>(store, id, RecordKind::Detail);
    let credits = load_record::<CreditRecord>(store, id, RecordKind::Credits);

    Some(merge(id, discovery, detail, credits, options))
}

pub fn merge(
    id: u64,
    discovery: DiscoveryRecord,
    detail: Option<DetailRecord>,
    credits: Option<CreditRecord>,
    options: &NormalizeOptions,
) -> NormalizedEntity {
    let (first_air_date, release_year) = parse_first_air_date(id, discovery.first_air_date.as_deref());

    let mut entity = NormalizedEntity {
        id,
        title: discovery.name,
        original_title: discovery.original_name,
        overview: discovery.overview,
        popularity: discovery.popularity,
        vote_average_discover: discovery.vote_average,
        vote_count_discover: discovery.vote_count,
        vote_average: discovery.vote_average,
        vote_count: discovery.vote_count,
        first_air_date_raw: discovery.first_air_date,
        first_air_date,
        release_year,
        original_language: discovery.original_language,
        poster_path: discovery.poster_path,
        backdrop_path: discovery.backdrop_path,
        ..NormalizedEntity::default()
    };

    if let Some(detail) = detail {
        entity.vote_average = detail.vote_average.or(entity.vote_average);
        entity.vote_count = detail.vote_count.or(entity.vote_count);
        entity.genres = detail.genre_names();
        entity.production_companies = detail.production_company_names();
        entity.networks = detail.network_names();
        entity.keywords = detail.keyword_names();
        entity.streaming_providers = detail.flatrate_providers(&options.watch_region);
        entity.status = detail.status;
        entity.tagline = detail.tagline;
        entity.number_of_episodes = detail.number_of_episodes;
        entity.number_of_seasons = detail.number_of_seasons;
        entity.episode_run_time = detail.episode_run_time;
    }

    if let Some(credits) = credits {
        entity.cast = credits.top_cast(options.cast_limit);
        entity.directors = credits.directors();
        entity.writers = credits.writers();
    }

    entity
}

/// Parses `YYYY-MM-DD`; anything else yields no date and no year.
pub fn parse_first_air_date(id: u64, raw: Option<&str>) -> (Option<NaiveDate>, Option<i32>) {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return (None, None);
    };
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => (Some(date), Some(date.year())),
        Err(err) => {
            tracing::warn!(id, first_air_date = raw, %err, "invalid first_air_date");
            (None, None)
        }
    }
}

fn load_record<T: DeserializeOwned>(store: &dyn ArtifactStore, id: u64, kind: RecordKind) -> Option<T> {
    let bytes = match store.get(id, kind) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            tracing::debug!(id, %kind, "raw artifact not found");
            return None;
        }
        Err(err) => {
            tracing::error!(id, %kind, err = format!("{err:#}"), "read raw artifact");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::error!(id, %kind, %err, "decode raw artifact");
            None
        }
    }
}
