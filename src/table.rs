//! Columnar (Parquet) tables for the Silver and Gold tiers.

use std::fs::File;
use std::path::Path;

use anyhow::Context as _;
use chrono::NaiveDate;
use polars::prelude::*;

use crate::formats::NormalizedEntity;

pub mod col {
    pub const ID: &str = "id_tmdb";
    pub const TITLE: &str = "title";
    pub const ORIGINAL_TITLE: &str = "original_title";
    pub const OVERVIEW: &str = "overview";
    pub const POPULARITY: &str = "popularity";
    pub const VOTE_AVERAGE_DISCOVER: &str = "vote_average_discover";
    pub const VOTE_COUNT_DISCOVER: &str = "vote_count_discover";
    pub const VOTE_AVERAGE: &str = "vote_average";
    pub const VOTE_COUNT: &str = "vote_count";
    pub const FIRST_AIR_DATE_RAW: &str = "first_air_date_str";
    pub const FIRST_AIR_DATE: &str = "first_air_date";
    pub const RELEASE_YEAR: &str = "release_year";
    pub const ORIGINAL_LANGUAGE: &str = "original_language";
    pub const POSTER_PATH: &str = "poster_path";
    pub const BACKDROP_PATH: &str = "backdrop_path";
    pub const STATUS: &str = "status";
    pub const TAGLINE: &str = "tagline";
    pub const NUMBER_OF_EPISODES: &str = "number_of_episodes";
    pub const NUMBER_OF_SEASONS: &str = "number_of_seasons";
    pub const EPISODE_RUN_TIME: &str = "episode_run_time";
    pub const GENRES: &str = "genres";
    pub const PRODUCTION_COMPANIES: &str = "production_companies";
    pub const NETWORKS: &str = "networks";
    pub const KEYWORDS: &str = "keywords";
    pub const STREAMING_PROVIDERS: &str = "streaming_providers";
    pub const CAST: &str = "cast";
    pub const DIRECTORS: &str = "directors";
    pub const WRITERS: &str = "writers";
}

/// Days between 0001-01-01 and 1970-01-01; polars stores dates as epoch days.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn string_column<'a>(name: &str, values: impl Iterator<Item = Option<&'a str>>) -> Column {
    Column::new(name.into(), values.collect::<Vec<_>>())
}

pub fn f64_column(name: &str, values: impl Iterator<Item = Option<f64>>) -> Column {
    Column::new(name.into(), values.collect::<Vec<_>>())
}

pub fn i64_column(name: &str, values: impl Iterator<Item = Option<i64>>) -> Column {
    Column::new(name.into(), values.collect::<Vec<_>>())
}

pub fn i32_column(name: &str, values: impl Iterator<Item = Option<i32>>) -> Column {
    Column::new(name.into(), values.collect::<Vec<_>>())
}

pub fn date_column(name: &str, values: impl Iterator<Item = Option<NaiveDate>>) -> Column {
    Column::new(name.into(), values.collect::<Vec<_>>())
}

pub fn string_list_column<'a>(name: &str, rows: impl Iterator<Item = &'a [String]>) -> Column {
    let lists: Vec<Series> = rows
        .map(|items| {
            let items: Vec<&str> = items.iter().map(String::as_str).collect();
            Series::new(PlSmallStr::EMPTY, items)
        })
        .collect();
    Series::new(name.into(), lists).into()
}

pub fn i64_list_column<'a>(name: &str, rows: impl Iterator<Item = &'a [i64]>) -> Column {
    let lists: Vec<Series> = rows
        .map(|items| Series::new(PlSmallStr::EMPTY, items.to_vec()))
        .collect();
    Series::new(name.into(), lists).into()
}

pub fn entities_to_frame(entities: &[NormalizedEntity]) -> PolarsResult<DataFrame> {
    let rows = || entities.iter();
    DataFrame::new(vec![
        i64_column(col::ID, rows().map(|e| i64::try_from(e.id).ok())),
        string_column(col::TITLE, rows().map(|e| e.title.as_deref())),
        string_column(col::ORIGINAL_TITLE, rows().map(|e| e.original_title.as_deref())),
        string_column(col::OVERVIEW, rows().map(|e| e.overview.as_deref())),
        f64_column(col::POPULARITY, rows().map(|e| e.popularity)),
        f64_column(col::VOTE_AVERAGE_DISCOVER, rows().map(|e| e.vote_average_discover)),
        i64_column(col::VOTE_COUNT_DISCOVER, rows().map(|e| e.vote_count_discover)),
        f64_column(col::VOTE_AVERAGE, rows().map(|e| e.vote_average)),
        i64_column(col::VOTE_COUNT, rows().map(|e| e.vote_count)),
        string_column(col::FIRST_AIR_DATE_RAW, rows().map(|e| e.first_air_date_raw.as_deref())),
        date_column(col::FIRST_AIR_DATE, rows().map(|e| e.first_air_date)),
        i32_column(col::RELEASE_YEAR, rows().map(|e| e.release_year)),
        string_column(col::ORIGINAL_LANGUAGE, rows().map(|e| e.original_language.as_deref())),
        string_column(col::POSTER_PATH, rows().map(|e| e.poster_path.as_deref())),
        string_column(col::BACKDROP_PATH, rows().map(|e| e.backdrop_path.as_deref())),
        string_column(col::STATUS, rows().map(|e| e.status.as_deref())),
        string_column(col::TAGLINE, rows().map(|e| e.tagline.as_deref())),
        i64_column(col::NUMBER_OF_EPISODES, rows().map(|e| e.number_of_episodes)),
        i64_column(col::NUMBER_OF_SEASONS, rows().map(|e| e.number_of_seasons)),
        i64_list_column(col::EPISODE_RUN_TIME, rows().map(|e| e.episode_run_time.as_slice())),
        string_list_column(col::GENRES, rows().map(|e| e.genres.as_slice())),
        string_list_column(
            col::PRODUCTION_COMPANIES,
            rows().map(|e| e.production_companies.as_slice()),
        ),
        string_list_column(col::NETWORKS, rows().map(|e| e.networks.as_slice())),
        string_list_column(col::KEYWORDS, rows().map(|e| e.keywords.as_slice())),
        string_list_column(
            col::STREAMING_PROVIDERS,
            rows().map(|e| e.streaming_providers.as_slice()),
        ),
        string_list_column(col::CAST, rows().map(|e| e.cast.as_slice())),
        string_list_column(col::DIRECTORS, rows().map(|e| e.directors.as_slice())),
        string_list_column(col::WRITERS, rows().map(|e| e.writers.as_slice())),
    ])
}

/// Rebuilds Silver rows; columns missing from the file read as nulls/empties.
pub fn frame_to_entities(frame: &DataFrame) -> anyhow::Result<Vec<NormalizedEntity>> {
    let reader = FrameReader::new(frame);
    let ids = reader.i64(col::ID)?;
    let title = reader.string(col::TITLE)?;
    let original_title = reader.string(col::ORIGINAL_TITLE)?;
    let overview = reader.string(col::OVERVIEW)?;
    let popularity = reader.f64(col::POPULARITY)?;
    let vote_average_discover = reader.f64(col::VOTE_AVERAGE_DISCOVER)?;
    let vote_count_discover = reader.i64(col::VOTE_COUNT_DISCOVER)?;
    let vote_average = reader.f64(col::VOTE_AVERAGE)?;
    let vote_count = reader.i64(col::VOTE_COUNT)?;
    let first_air_date_raw = reader.string(col::FIRST_AIR_DATE_RAW)?;
    let first_air_date = reader.date(col::FIRST_AIR_DATE)?;
    let release_year = reader.i32(col::RELEASE_YEAR)?;
    let original_language = reader.string(col::ORIGINAL_LANGUAGE)?;
    let poster_path = reader.string(col::POSTER_PATH)?;
    let backdrop_path = reader.string(col::BACKDROP_PATH)?;
    let status = reader.string(col::STATUS)?;
    let tagline = reader.string(col::TAGLINE)?;
    let number_of_episodes = reader.i64(col::NUMBER_OF_EPISODES)?;
    let number_of_seasons = reader.i64(col::NUMBER_OF_SEASONS)?;
    let episode_run_time = reader.i64_list(col::EPISODE_RUN_TIME)?;
    let genres = reader.string_list(col::GENRES)?;
    let production_companies = reader.string_list(col::PRODUCTION_COMPANIES)?;
    let networks = reader.string_list(col::NETWORKS)?;
    let keywords = reader.string_list(col::KEYWORDS)?;
    let streaming_providers = reader.string_list(col::STREAMING_PROVIDERS)?;
    let cast = reader.string_list(col::CAST)?;
    let directors = reader.string_list(col::DIRECTORS)?;
    let writers = reader.string_list(col::WRITERS)?;

    let mut entities = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let Some(id) = ids[row].and_then(|id| u64::try_from(id).ok()) else {
            tracing::warn!(row, "silver row has no id; skipping");
            continue;
        };
        entities.push(NormalizedEntity {
            id,
            title: title[row].clone(),
            original_title: original_title[row].clone(),
            overview: overview[row].clone(),
            popularity: popularity[row],
            vote_average_discover: vote_average_discover[row],
            vote_count_discover: vote_count_discover[row],
            vote_average: vote_average[row],
            vote_count: vote_count[row],
            first_air_date_raw: first_air_date_raw[row].clone(),
            first_air_date: first_air_date[row],
            release_year: release_year[row],
            original_language: original_language[row].clone(),
            poster_path: poster_path[row].clone(),
            backdrop_path: backdrop_path[row].clone(),
            status: status[row].clone(),
            tagline: tagline[row].clone(),
            number_of_episodes: number_of_episodes[row],
            number_of_seasons: number_of_seasons[row],
            episode_run_time: episode_run_time[row].clone(),
            genres: genres[row].clone(),
            production_companies: production_companies[row].clone(),
            networks: networks[row].clone(),
            keywords: keywords[row].clone(),
            streaming_providers: streaming_providers[row].clone(),
            cast: cast[row].clone(),
            directors: directors[row].clone(),
            writers: writers[row].clone(),
        });
    }
    Ok(entities)
}

/// Column accessors that tolerate absent columns and loose numeric types.
pub struct FrameReader<'a> {
    frame: &'a DataFrame,
}

impl<'a> FrameReader<'a> {
    pub fn new(frame: &'a DataFrame) -> Self {
        Self { frame }
    }

    fn cast(&self, name: &str, dtype: &DataType) -> anyhow::Result<Option<Series>> {
        let Ok(column) = self.frame.column(name) else {
            tracing::debug!(column = name, "column missing; reading nulls");
            return Ok(None);
        };
        let series = column
            .as_materialized_series()
            .cast(dtype)
            .with_context(|| format!("cast column `{name}` to {dtype}"))?;
        Ok(Some(series))
    }

    pub fn string(&self, name: &str) -> anyhow::Result<Vec<Option<String>>> {
        let Some(series) = self.cast(name, &DataType::String)? else {
            return Ok(vec![None; self.frame.height()]);
        };
        Ok(series
            .str()?
            .into_iter()
            .map(|value| value.map(str::to_owned))
            .collect())
    }

    pub fn f64(&self, name: &str) -> anyhow::Result<Vec<Option<f64>>> {
        let Some(series) = self.cast(name, &DataType::Float64)? else {
            return Ok(vec![None; self.frame.height()]);
        };
        Ok(series.f64()?.into_iter().collect())
    }

    pub fn i64(&self, name: &str) -> anyhow::Result<Vec<Option<i64>>> {
        let Some(series) = self.cast(name, &DataType::Int64)? else {
            return Ok(vec![None; self.frame.height()]);
        };
        Ok(series.i64()?.into_iter().collect())
    }

    pub fn i32(&self, name: &str) -> anyhow::Result<Vec<Option<i32>>> {
        let Some(series) = self.cast(name, &DataType::Int32)? else {
            return Ok(vec![None; self.frame.height()]);
        };
        Ok(series.i32()?.into_iter().collect())
    }

    pub fn date(&self, name: &str) -> anyhow::Result<Vec<Option<NaiveDate>>> {
        let Ok(column) = self.frame.column(name) else {
            return Ok(vec![None; self.frame.height()]);
        };
        let days = column
            .as_materialized_series()
            .cast(&DataType::Int32)
            .with_context(|| format!("cast column `{name}` to epoch days"))?;
        Ok(days
            .i32()?
            .into_iter()
            .map(|days| {
                days.and_then(|days| days.checked_add(EPOCH_DAYS_FROM_CE))
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
            })
            .collect())
    }

    pub fn string_list(&self, name: &str) -> anyhow::Result<Vec<Vec<String>>> {
        let Ok(column) = self.frame.column(name) else {
            return Ok(vec![Vec::new(); self.frame.height()]);
        };
        let mut rows = Vec::with_capacity(self.frame.height());
        for item in column.as_materialized_series().list()? {
            let Some(item) = item else {
                rows.push(Vec::new());
                continue;
            };
            let item = item.cast(&DataType::String)?;
            rows.push(item.str()?.into_iter().flatten().map(str::to_owned).collect());
        }
        Ok(rows)
    }

    pub fn i64_list(&self, name: &str) -> anyhow::Result<Vec<Vec<i64>>> {
        let Ok(column) = self.frame.column(name) else {
            return Ok(vec![Vec::new(); self.frame.height()]);
        };
        let mut rows = Vec::with_capacity(self.frame.height());
        for item in column.as_materialized_series().list()? {
            let Some(item) = item else {
                rows.push(Vec::new());
                continue;
            };
            let item = item.cast(&DataType::Int64)?;
            rows.push(item.i64()?.into_iter().flatten().collect());
        }
        Ok(rows)
    }
}

/// Writes `frame` to a temp file next to `path`, then renames it into place.
pub fn write_parquet(frame: &mut DataFrame, path: &Path) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("create table dir: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in: {}", dir.display()))?;
    ParquetWriter::new(&mut tmp)
        .finish(frame)
        .with_context(|| format!("encode parquet: {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("persist parquet: {}", path.display()))?;
    Ok(())
}

pub fn read_parquet(path: &Path) -> anyhow::Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("open parquet: {}", path.display()))?;
    ParquetReader::new(file)
        .finish()
        .with_context(|| format!("decode parquet: {}", path.display()))
}
