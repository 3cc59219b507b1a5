use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use polars::prelude::{DataFrame, PolarsResult};

use crate::cli::{AggregateArgs, AggregateOptions};
use crate::formats::NormalizedEntity;
use crate::table::{self, col};

pub const DASHBOARD_FILE: &str = "kdramas_dashboard.parquet";
pub const GENRE_STATS_FILE: &str = "genre_stats.parquet";
pub const TOP_BY_YEAR_FILE: &str = "top_kdramas_by_year.parquet";
pub const YEARLY_TREND_FILE: &str = "yearly_trend.parquet";

pub const LIST_SEPARATOR: &str = ", ";

pub mod gold_col {
    pub const GENRE: &str = "genre";
    pub const TOTAL_KDRAMAS: &str = "total_kdramas";
    pub const MEAN_VOTE_AVERAGE: &str = "mean_vote_average";
    pub const MEAN_POPULARITY: &str = "mean_popularity";
    pub const TOTAL_VOTES: &str = "total_votes";
    pub const RANK: &str = "popularity_rank";
    pub const TOTAL_RELEASED: &str = "total_kdramas_released";
    pub const GENRES_STR: &str = "genres_str";
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreStat {
    pub genre: String,
    pub total_kdramas: i64,
    pub mean_vote_average: Option<f64>,
    pub mean_popularity: Option<f64>,
    pub total_votes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearTop {
    pub release_year: i32,
    pub rank: i64,
    pub id: u64,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub popularity: f64,
    pub vote_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearTrend {
    pub release_year: i32,
    pub total_kdramas_released: i64,
    pub mean_vote_average: Option<f64>,
    pub mean_popularity: Option<f64>,
}

pub fn run(args: AggregateArgs) -> anyhow::Result<usize> {
    let silver_path = PathBuf::from(&args.silver);
    let out_dir = PathBuf::from(&args.out);

    if !silver_path.is_file() {
        tracing::error!(silver = %silver_path.display(), "silver table not found; aborting");
        anyhow::bail!("silver table not found: {}", silver_path.display());
    }

    let frame = table::read_parquet(&silver_path).context("load silver table")?;
    let entities = table::frame_to_entities(&frame).context("decode silver table")?;
    tracing::info!(rows = entities.len(), "silver table loaded");
    if entities.is_empty() {
        tracing::warn!("silver table is empty; no gold views written");
        return Ok(0);
    }

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create gold dir: {}", out_dir.display()))?;

    Ok(aggregate(&entities, &out_dir, &args.options))
}

/// Derives and writes every gold view; returns how many were written.
pub fn aggregate(entities: &[NormalizedEntity], out_dir: &Path, options: &AggregateOptions) -> usize {
    let mut written = 0;

    if write_view(out_dir, DASHBOARD_FILE, dashboard_frame(entities)) {
        written += 1;
    }

    let stats = genre_stats(entities);
    if stats.is_empty() {
        tracing::warn!("no genres in silver table; genre stats not generated");
        discard_stale_view(out_dir, GENRE_STATS_FILE);
    } else if write_view(out_dir, GENRE_STATS_FILE, genre_stats_frame(&stats)) {
        written += 1;
    }

    let top = top_per_year(entities, options.vote_threshold, options.top_n);
    if top.is_empty() {
        tracing::warn!(
            threshold = options.vote_threshold,
            "no series above the vote threshold with a release year; top by year not generated"
        );
        discard_stale_view(out_dir, TOP_BY_YEAR_FILE);
    } else if write_view(out_dir, TOP_BY_YEAR_FILE, top_per_year_frame(&top)) {
        written += 1;
    }

    let trend = yearly_trend(entities);
    if trend.is_empty() {
        tracing::warn!("no release years in silver table; yearly trend not generated");
        discard_stale_view(out_dir, YEARLY_TREND_FILE);
    } else if write_view(out_dir, YEARLY_TREND_FILE, yearly_trend_frame(&trend)) {
        written += 1;
    }

    tracing::info!(views = written, dir = %out_dir.display(), "gold views written");
    written
}

fn write_view(out_dir: &Path, file_name: &str, frame: PolarsResult<DataFrame>) -> bool {
    let path = out_dir.join(file_name);
    let result = frame
        .context("build view")
        .and_then(|mut frame| {
            table::write_parquet(&mut frame, &path)?;
            Ok(frame.height())
        });
    match result {
        Ok(rows) => {
            tracing::info!(path = %path.display(), rows, "gold view written");
            true
        }
        Err(err) => {
            tracing::error!(view = file_name, err = format!("{err:#}"), "gold view not written");
            false
        }
    }
}

/// A skipped view must not leave an earlier run's table behind.
fn discard_stale_view(out_dir: &Path, file_name: &str) {
    let path = out_dir.join(file_name);
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::info!(path = %path.display(), "stale gold view removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), %err, "remove stale gold view"),
    }
}

/// Rounds to 2 decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0_u32), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| round2(sum / f64::from(count)))
}

pub fn join_list<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

pub fn dashboard_frame(entities: &[NormalizedEntity]) -> PolarsResult<DataFrame> {
    let rows = || entities.iter();
    let joined = |name: &str, field: fn(&NormalizedEntity) -> String| {
        let values: Vec<String> = rows().map(field).collect();
        table::string_column(name, values.iter().map(|v| Some(v.as_str())))
    };
    DataFrame::new(vec![
        table::i64_column(col::ID, rows().map(|e| i64::try_from(e.id).ok())),
        table::string_column(col::TITLE, rows().map(|e| e.title.as_deref())),
        table::string_column(col::ORIGINAL_TITLE, rows().map(|e| e.original_title.as_deref())),
        table::string_column(col::OVERVIEW, rows().map(|e| e.overview.as_deref())),
        table::f64_column(col::POPULARITY, rows().map(|e| e.popularity)),
        table::f64_column(col::VOTE_AVERAGE, rows().map(|e| e.vote_average)),
        table::i64_column(col::VOTE_COUNT, rows().map(|e| e.vote_count)),
        table::date_column(col::FIRST_AIR_DATE, rows().map(|e| e.first_air_date)),
        table::i32_column(col::RELEASE_YEAR, rows().map(|e| e.release_year)),
        table::string_column(col::STATUS, rows().map(|e| e.status.as_deref())),
        table::i64_column(col::NUMBER_OF_EPISODES, rows().map(|e| e.number_of_episodes)),
        table::i64_column(col::NUMBER_OF_SEASONS, rows().map(|e| e.number_of_seasons)),
        joined("episode_run_time_str", |e| join_list(&e.episode_run_time)),
        joined(gold_col::GENRES_STR, |e| join_list(&e.genres)),
        joined("production_companies_str", |e| join_list(&e.production_companies)),
        joined("networks_str", |e| join_list(&e.networks)),
        joined("keywords_str", |e| join_list(&e.keywords)),
        joined("streaming_providers_str", |e| join_list(&e.streaming_providers)),
        joined("cast_str", |e| join_list(&e.cast)),
        joined("directors_str", |e| join_list(&e.directors)),
        joined("writers_str", |e| join_list(&e.writers)),
        table::string_column(col::POSTER_PATH, rows().map(|e| e.poster_path.as_deref())),
        table::string_column(col::BACKDROP_PATH, rows().map(|e| e.backdrop_path.as_deref())),
    ])
}

/// One row per genre, most frequent first; equal counts stay in name order.
pub fn genre_stats(entities: &[NormalizedEntity]) -> Vec<GenreStat> {
    #[derive(Default)]
    struct Acc {
        count: i64,
        ratings: Vec<f64>,
        popularity: Vec<f64>,
        votes: i64,
    }

    let mut by_genre: BTreeMap<&str, Acc> = BTreeMap::new();
    for entity in entities {
        for genre in entity.genres.iter().filter(|g| !g.is_empty()) {
            let acc = by_genre.entry(genre.as_str()).or_default();
            acc.count += 1;
            acc.ratings.extend(entity.vote_average);
            acc.popularity.extend(entity.popularity);
            acc.votes += entity.vote_count.unwrap_or(0);
        }
    }

    let mut stats: Vec<GenreStat> = by_genre
        .into_iter()
        .map(|(genre, acc)| GenreStat {
            genre: genre.to_owned(),
            total_kdramas: acc.count,
            mean_vote_average: mean(acc.ratings.into_iter().map(Some)),
            mean_popularity: mean(acc.popularity.into_iter().map(Some)),
            total_votes: acc.votes,
        })
        .collect();
    stats.sort_by(|a, b| b.total_kdramas.cmp(&a.total_kdramas));
    stats
}

/// Most popular series per release year among those with enough votes.
///
/// Ranking is stable: equal popularity keeps the input row order.
pub fn top_per_year(entities: &[NormalizedEntity], vote_threshold: i64, top_n: usize) -> Vec<YearTop> {
    let mut by_year: BTreeMap<i32, Vec<(&NormalizedEntity, f64)>> = BTreeMap::new();
    for entity in entities {
        if entity.vote_count.is_none_or(|votes| votes < vote_threshold) {
            continue;
        }
        let (Some(year), Some(popularity)) = (entity.release_year, entity.popularity) else {
            continue;
        };
        by_year.entry(year).or_default().push((entity, popularity));
    }

    let mut top = Vec::new();
    for (year, mut ranked) in by_year {
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (index, (entity, popularity)) in ranked.into_iter().take(top_n).enumerate() {
            top.push(YearTop {
                release_year: year,
                rank: index as i64 + 1,
                id: entity.id,
                title: entity.title.clone(),
                original_title: entity.original_title.clone(),
                popularity,
                vote_average: entity.vote_average,
            });
        }
    }
    top
}

pub fn yearly_trend(entities: &[NormalizedEntity]) -> Vec<YearTrend> {
    let mut by_year: BTreeMap<i32, Vec<&NormalizedEntity>> = BTreeMap::new();
    for entity in entities {
        if let Some(year) = entity.release_year {
            by_year.entry(year).or_default().push(entity);
        }
    }

    by_year
        .into_iter()
        .map(|(year, rows)| YearTrend {
            release_year: year,
            total_kdramas_released: rows.len() as i64,
            mean_vote_average: mean(rows.iter().map(|e| e.vote_average)),
            mean_popularity: mean(rows.iter().map(|e| e.popularity)),
        })
        .collect()
}

pub fn genre_stats_frame(stats: &[GenreStat]) -> PolarsResult<DataFrame> {
    let rows = || stats.iter();
    DataFrame::new(vec![
        table::string_column(gold_col::GENRE, rows().map(|s| Some(s.genre.as_str()))),
        table::i64_column(gold_col::TOTAL_KDRAMAS, rows().map(|s| Some(s.total_kdramas))),
        table::f64_column(gold_col::MEAN_VOTE_AVERAGE, rows().map(|s| s.mean_vote_average)),
        table::f64_column(gold_col::MEAN_POPULARITY, rows().map(|s| s.mean_popularity)),
        table::i64_column(gold_col::TOTAL_VOTES, rows().map(|s| Some(s.total_votes))),
    ])
}

pub fn top_per_year_frame(top: &[YearTop]) -> PolarsResult<DataFrame> {
    let rows = || top.iter();
    DataFrame::new(vec![
        table::i32_column(col::RELEASE_YEAR, rows().map(|t| Some(t.release_year))),
        table::i64_column(gold_col::RANK, rows().map(|t| Some(t.rank))),
        table::string_column(col::TITLE, rows().map(|t| t.title.as_deref())),
        table::string_column(col::ORIGINAL_TITLE, rows().map(|t| t.original_title.as_deref())),
        table::f64_column(col::POPULARITY, rows().map(|t| Some(t.popularity))),
        table::f64_column(col::VOTE_AVERAGE, rows().map(|t| t.vote_average)),
        table::i64_column(col::ID, rows().map(|t| i64::try_from(t.id).ok())),
    ])
}

pub fn yearly_trend_frame(trend: &[YearTrend]) -> PolarsResult<DataFrame> {
    let rows = || trend.iter();
    DataFrame::new(vec![
        table::i32_column(col::RELEASE_YEAR, rows().map(|t| Some(t.release_year))),
        table::i64_column(gold_col::TOTAL_RELEASED, rows().map(|t| Some(t.total_kdramas_released))),
        table::f64_column(gold_col::MEAN_VOTE_AVERAGE, rows().map(|t| t.mean_vote_average)),
        table::f64_column(gold_col::MEAN_POPULARITY, rows().map(|t| t.mean_popularity)),
    ])
}
