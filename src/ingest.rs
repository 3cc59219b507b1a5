use std::path::PathBuf;

use anyhow::Context as _;
use serde_json::Value;

use crate::catalog::{DiscoverQuery, MAX_DISCOVER_PAGES};
use crate::cli::{DiscoverArgs, IngestArgs};
use crate::config::FetchConfig;
use crate::fetch::{FetchClient, Sleeper};
use crate::raw_store::{ArtifactStore, LocalFsRawStore, RecordKind, save_record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub pages_fetched: u32,
    pub entries_discovered: usize,
    pub entities_processed: usize,
    pub entries_skipped: usize,
}

pub fn run(args: IngestArgs) -> anyhow::Result<IngestSummary> {
    let config = FetchConfig::try_from(&args.fetch).context("load fetch config")?;
    let client = FetchClient::new(config).context("build fetch client")?;

    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create bronze dir: {}", out_dir.display()))?;
    let store = LocalFsRawStore::new(out_dir);

    ingest(&client, &store, &args.discover)
}

/// Discovers series and writes their discovery, detail and credit records.
pub fn ingest<S: Sleeper>(
    client: &FetchClient<S>,
    store: &dyn ArtifactStore,
    args: &DiscoverArgs,
) -> anyhow::Result<IngestSummary> {
    if args.start_date > args.end_date {
        anyhow::bail!(
            "--start-date {} is after --end-date {}",
            args.start_date,
            args.end_date
        );
    }

    let mut summary = IngestSummary::default();

    tracing::info!(genre = %args.genre_name, language = %args.genre_language, "resolving genre id");
    let genres = client
        .tv_genres(&args.genre_language)
        .context("fetch genre list")?;
    let Some(genre_id) = genres.and_then(|list| list.find_id(&args.genre_name)) else {
        tracing::error!(genre = %args.genre_name, "genre not found; aborting ingestion");
        return Ok(summary);
    };
    tracing::info!(genre = %args.genre_name, genre_id, "genre resolved");

    let query = DiscoverQuery {
        original_language: args.original_language.clone(),
        genre_id,
        first_air_from: args.start_date,
        first_air_to: args.end_date,
        language: args.language.clone(),
    };

    let first_page = client.discover_tv(&query, 1).context("fetch discover page 1")?;
    let Some((total_pages, total_results, first_results)) = first_page
        .and_then(|page| Some((page.total_pages, page.total_results, page.results?)))
    else {
        tracing::error!("discover page 1 has no results; aborting ingestion");
        return Ok(summary);
    };

    let total_pages = total_pages.unwrap_or(1);
    let pages_to_fetch = args.max_pages.min(total_pages).min(MAX_DISCOVER_PAGES);
    tracing::info!(
        total_results = total_results.unwrap_or(0),
        total_pages,
        pages_to_fetch,
        "discover reports results"
    );

    summary.pages_fetched = 1;
    let mut entries: Vec<Value> = first_results;
    tracing::info!(page = 1, entries = entries.len(), "discover page fetched");

    for page in 2..=pages_to_fetch {
        match client.discover_tv(&query, page) {
            Ok(Some(response)) => match response.results {
                Some(results) if !results.is_empty() => {
                    tracing::info!(page, entries = results.len(), "discover page fetched");
                    summary.pages_fetched += 1;
                    entries.extend(results);
                }
                _ => tracing::warn!(page, "discover page has no results; skipping"),
            },
            Ok(None) => tracing::warn!(page, "discover page returned no data; skipping"),
            Err(err) => tracing::warn!(page, %err, "discover page failed; skipping"),
        }
    }

    summary.entries_discovered = entries.len();
    tracing::info!(entries = entries.len(), "discovery finished; fetching details and credits");

    // Entries repeated across pages are fetched again and overwrite the same artifacts.
    for entry in &entries {
        let Some(id) = entry.get("id").and_then(Value::as_u64) else {
            let name = entry.get("name").and_then(Value::as_str).unwrap_or("<unnamed>");
            tracing::warn!(name, "discovered entry has no id; skipping");
            summary.entries_skipped += 1;
            continue;
        };
        let original_name = entry
            .get("original_name")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");
        tracing::info!(id, original_name, "processing series");

        save_record(store, id, RecordKind::Discovery, entry);

        match client.tv_details(id, &args.language) {
            Ok(Some(details)) => {
                save_record(store, id, RecordKind::Detail, &details);
            }
            Ok(None) => tracing::warn!(id, "no detail record"),
            Err(err) => tracing::warn!(id, %err, "detail fetch failed"),
        }

        match client.tv_credits(id) {
            Ok(Some(credits)) => {
                save_record(store, id, RecordKind::Credits, &credits);
            }
            Ok(None) => tracing::warn!(id, "no credit record"),
            Err(err) => tracing::warn!(id, %err, "credit fetch failed"),
        }

        summary.entities_processed += 1;
    }

    tracing::info!(
        pages = summary.pages_fetched,
        discovered = summary.entries_discovered,
        processed = summary.entities_processed,
        skipped = summary.entries_skipped,
        "ingestion finished"
    );
    Ok(summary)
}
