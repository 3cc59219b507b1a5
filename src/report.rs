//! Read-only queries over the Gold dashboard table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::aggregate::{LIST_SEPARATOR, gold_col, round2};
use crate::cli::ReportArgs;
use crate::table::{self, FrameReader, col};

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRow {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub release_year: Option<i32>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
    pub genres: Vec<String>,
}

impl ReportFilter {
    /// Rows without a release year never match.
    pub fn matches(&self, row: &DashboardRow) -> bool {
        let Some(year) = row.release_year else {
            return false;
        };
        if self.from_year.is_some_and(|from| year < from) {
            return false;
        }
        if self.to_year.is_some_and(|to| year > to) {
            return false;
        }
        self.genres.is_empty() || self.genres.iter().any(|wanted| row.genres.contains(wanted))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary<'a> {
    pub count: usize,
    pub mean_rating: Option<f64>,
    pub most_popular: Vec<&'a DashboardRow>,
    pub per_year: BTreeMap<i32, usize>,
}

pub fn run(args: ReportArgs) -> anyhow::Result<()> {
    let path = PathBuf::from(&args.dashboard);
    let rows = load_dashboard(&path).context("load dashboard table")?;

    let filter = ReportFilter {
        from_year: args.from_year,
        to_year: args.to_year,
        genres: args.genres,
    };
    let filtered: Vec<&DashboardRow> = rows.iter().filter(|row| filter.matches(row)).collect();
    tracing::debug!(total = rows.len(), matched = filtered.len(), "dashboard filtered");

    let summary = summarize(&filtered, args.top);
    print!("{}", render(&summary));
    Ok(())
}

pub fn load_dashboard(path: &Path) -> anyhow::Result<Vec<DashboardRow>> {
    let frame = table::read_parquet(path)?;
    let reader = FrameReader::new(&frame);

    let ids = reader.i64(col::ID)?;
    let titles = reader.string(col::TITLE)?;
    let years = reader.i32(col::RELEASE_YEAR)?;
    let popularity = reader.f64(col::POPULARITY)?;
    let ratings = reader.f64(col::VOTE_AVERAGE)?;
    let genres = reader.string(gold_col::GENRES_STR)?;

    Ok((0..frame.height())
        .map(|row| DashboardRow {
            id: ids[row],
            title: titles[row].clone(),
            release_year: years[row],
            popularity: popularity[row],
            vote_average: ratings[row],
            genres: genres[row]
                .as_deref()
                .map(split_genres)
                .unwrap_or_default(),
        })
        .collect())
}

fn split_genres(joined: &str) -> Vec<String> {
    joined
        .split(LIST_SEPARATOR)
        .filter(|genre| !genre.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn summarize<'a>(rows: &[&'a DashboardRow], top: usize) -> ReportSummary<'a> {
    let ratings: Vec<f64> = rows.iter().filter_map(|row| row.vote_average).collect();
    let mean_rating =
        (!ratings.is_empty()).then(|| round2(ratings.iter().sum::<f64>() / ratings.len() as f64));

    let mut most_popular: Vec<&DashboardRow> = rows
        .iter()
        .copied()
        .filter(|row| row.popularity.is_some())
        .collect();
    most_popular.sort_by(|a, b| {
        let a = a.popularity.unwrap_or(f64::NEG_INFINITY);
        let b = b.popularity.unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
    most_popular.truncate(top);

    let mut per_year = BTreeMap::new();
    for year in rows.iter().filter_map(|row| row.release_year) {
        *per_year.entry(year).or_insert(0) += 1;
    }

    ReportSummary {
        count: rows.len(),
        mean_rating,
        most_popular,
        per_year,
    }
}

pub fn render(summary: &ReportSummary<'_>) -> String {
    let mut out = String::new();
    out.push_str(&format!("Series: {}\n", summary.count));
    match summary.mean_rating {
        Some(mean) => out.push_str(&format!("Mean rating: {mean:.2}\n")),
        None => out.push_str("Mean rating: -\n"),
    }

    let mut popular = Table::new();
    popular.set_header(vec![
        header_cell("Title"),
        header_cell("Year"),
        header_cell("Popularity"),
        header_cell("Rating"),
    ]);
    apply_table_style(&mut popular);
    align_column(&mut popular, 1, CellAlignment::Right);
    align_column(&mut popular, 2, CellAlignment::Right);
    align_column(&mut popular, 3, CellAlignment::Right);
    for row in &summary.most_popular {
        popular.add_row(vec![
            Cell::new(row.title.as_deref().unwrap_or("-")),
            optional_cell(row.release_year),
            optional_cell(row.popularity.map(|p| format!("{p:.2}"))),
            optional_cell(row.vote_average.map(|r| format!("{r:.2}"))),
        ]);
    }
    out.push_str("\nMost popular\n");
    out.push_str(&popular.to_string());
    out.push('\n');

    let mut years = Table::new();
    years.set_header(vec![header_cell("Year"), header_cell("Series")]);
    apply_table_style(&mut years);
    align_column(&mut years, 1, CellAlignment::Right);
    for (year, count) in &summary.per_year {
        years.add_row(vec![Cell::new(year), Cell::new(count)]);
    }
    out.push_str("\nSeries per year\n");
    out.push_str(&years.to_string());
    out.push('\n');
    out
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn optional_cell<T: ToString>(value: Option<T>) -> Cell {
    match value {
        Some(value) => Cell::new(value),
        None => Cell::new("-").fg(Color::DarkGrey),
    }
}
