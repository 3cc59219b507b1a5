mod tmdb_stub;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use kdrama_pipeline::cli::DiscoverArgs;
use kdrama_pipeline::config::FetchConfig;
use kdrama_pipeline::fetch::{FetchClient, Sleeper};
use kdrama_pipeline::ingest::{IngestSummary, ingest};
use kdrama_pipeline::raw_store::LocalFsRawStore;
use kdrama_pipeline::table::{frame_to_entities, read_parquet};
use predicates::prelude::*;
use serde_json::{Value, json};
use tmdb_stub::{Catalog, TmdbStub};

fn discover_entry(id: u64, name: &str, first_air_date: &str, popularity: f64, votes: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "original_name": format!("{name} (원제)"),
        "overview": "Uma série.",
        "popularity": popularity,
        "vote_average": 7.0,
        "vote_count": votes,
        "first_air_date": first_air_date,
        "original_language": "ko",
        "poster_path": format!("/poster{id}.jpg"),
        "backdrop_path": null
    })
}

fn sample_catalog() -> Catalog {
    let genres = json!({
        "genres": [
            { "id": 35, "name": "코미디" },
            { "id": 18, "name": "드라마" }
        ]
    });
    let pages = vec![
        json!({
            "page": 1,
            "total_pages": 2,
            "total_results": 4,
            "results": [
                discover_entry(101, "Pousando no Amor", "2021-05-01", 50.0, 120),
                discover_entry(102, "Vincenzo", "2021-07-10", 30.0, 80)
            ]
        }),
        json!({
            "page": 2,
            "total_pages": 2,
            "total_results": 4,
            "results": [
                discover_entry(103, "Sem Data", "not-a-date", 10.0, 5),
                discover_entry(101, "Pousando no Amor", "2021-05-01", 50.0, 120)
            ]
        }),
    ];

    let details = HashMap::from([
        (
            101,
            json!({
                "status": "Ended",
                "tagline": "Amor sem fronteiras",
                "number_of_episodes": 16,
                "number_of_seasons": 1,
                "episode_run_time": [70],
                "genres": [{ "id": 18, "name": "Drama" }, { "id": 10749, "name": "Romance" }],
                "production_companies": [{ "name": "Studio Dragon" }],
                "networks": [{ "name": "tvN" }],
                "vote_average": 8.6,
                "vote_count": 300,
                "keywords": { "results": [{ "name": "north korea" }] },
                "watch/providers": {
                    "results": {
                        "BR": { "flatrate": [{ "provider_name": "Netflix" }] },
                        "US": { "flatrate": [{ "provider_name": "Other" }] }
                    }
                }
            }),
        ),
        (
            102,
            json!({
                "status": "Ended",
                "genres": [{ "id": 18, "name": "Drama" }],
                "vote_average": 8.2,
                "vote_count": 90,
                "keywords": [{ "name": "mafia" }]
            }),
        ),
    ]);
    let credits = HashMap::from([(
        101,
        json!({
            "cast": [{ "name": "Hyun Bin" }, { "name": "Son Ye-jin" }],
            "crew": [
                { "name": "Lee Jeong-hyo", "job": "Director", "department": "Directing" },
                { "name": "Park Ji-eun", "job": "Screenplay", "department": "Writing" }
            ]
        }),
    )]);

    Catalog {
        genres,
        pages,
        details,
        credits,
        ..Catalog::default()
    }
}

fn file_names(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}

#[test]
fn run_builds_bronze_silver_and_gold() -> anyhow::Result<()> {
    let stub = TmdbStub::catalog(sample_catalog());
    let temp = tempfile::TempDir::new()?;
    let data_dir = temp.path().join("data");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .env("TMDB_API_KEY", "test-key")
        .args([
            "run",
            "--data-dir",
            data_dir.to_str().unwrap(),
            "--api-base-url",
            &stub.base_url,
            "--success-delay-ms",
            "0",
        ])
        .assert()
        .success();

    let bronze = data_dir.join("bronze/raw_kdramas");
    assert_eq!(
        file_names(&bronze)?,
        vec![
            "101_credits.json",
            "101_details.json",
            "101_discover_info.json",
            "102_details.json",
            "102_discover_info.json",
            "103_discover_info.json",
        ]
    );

    let saved: Value = serde_json::from_str(&fs::read_to_string(bronze.join("101_details.json"))?)?;
    assert_eq!(saved["networks"][0]["name"], "tvN");

    // The entry repeated on page 2 is fetched again.
    assert_eq!(stub.count_path("/3/tv/101"), 2);
    assert_eq!(stub.count_path("/3/tv/102"), 1);
    assert!(
        stub.requests()
            .iter()
            .filter(|target| target.starts_with("/3/discover/tv?"))
            .all(|target| target.contains("with_genres=18") && target.contains("api_key=test-key"))
    );

    let silver = frame_to_entities(&read_parquet(&data_dir.join("silver/kdramas_silver.parquet"))?)?;
    let ids: Vec<u64> = silver.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![101, 102, 103]);

    let landing = &silver[0];
    assert_eq!(landing.release_year, Some(2021));
    assert_eq!(landing.vote_count, Some(300));
    assert_eq!(landing.vote_count_discover, Some(120));
    assert_eq!(landing.genres, vec!["Drama", "Romance"]);
    assert_eq!(landing.streaming_providers, vec!["Netflix"]);
    assert_eq!(landing.keywords, vec!["north korea"]);
    assert_eq!(landing.cast, vec!["Hyun Bin", "Son Ye-jin"]);
    assert_eq!(landing.directors, vec!["Lee Jeong-hyo"]);
    assert_eq!(landing.writers, vec!["Park Ji-eun"]);

    assert_eq!(silver[1].keywords, vec!["mafia"]);
    assert!(silver[1].cast.is_empty());

    let undated = &silver[2];
    assert_eq!(undated.first_air_date, None);
    assert_eq!(undated.release_year, None);
    assert_eq!(undated.first_air_date_raw.as_deref(), Some("not-a-date"));
    assert!(undated.genres.is_empty());
    assert_eq!(undated.vote_count, Some(5));

    let gold = data_dir.join("gold");
    assert_eq!(
        file_names(&gold)?,
        vec![
            "genre_stats.parquet",
            "kdramas_dashboard.parquet",
            "top_kdramas_by_year.parquet",
            "yearly_trend.parquet",
        ]
    );

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.args([
        "report",
        "--dashboard",
        gold.join("kdramas_dashboard.parquet").to_str().unwrap(),
        "--genre",
        "Romance",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Series: 1"))
    .stdout(predicate::str::contains("Mean rating: 8.60"))
    .stdout(predicate::str::contains("Pousando no Amor"));

    Ok(())
}

#[test]
fn ingest_without_api_key_fails_at_startup() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .env_remove("TMDB_API_KEY")
        .args(["ingest", "--out", "bronze"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key is missing"));

    assert!(!temp.path().join("bronze").exists());
    Ok(())
}

#[test]
fn unknown_genre_ends_ingestion_without_records() -> anyhow::Result<()> {
    let mut catalog = sample_catalog();
    catalog.genres = json!({ "genres": [{ "id": 35, "name": "코미디" }] });
    let stub = TmdbStub::catalog(catalog);
    let temp = tempfile::TempDir::new()?;
    let bronze = temp.path().join("bronze");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .env("TMDB_API_KEY", "test-key")
        .args([
            "ingest",
            "--out",
            bronze.to_str().unwrap(),
            "--api-base-url",
            &stub.base_url,
            "--success-delay-ms",
            "0",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("genre not found"));

    assert!(file_names(&bronze)?.is_empty());
    assert_eq!(stub.count_path("/3/discover/tv"), 0);
    Ok(())
}

#[test]
fn max_pages_limits_discovery() -> anyhow::Result<()> {
    let stub = TmdbStub::catalog(sample_catalog());
    let temp = tempfile::TempDir::new()?;
    let bronze = temp.path().join("bronze");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .env("TMDB_API_KEY", "test-key")
        .args([
            "ingest",
            "--out",
            bronze.to_str().unwrap(),
            "--api-base-url",
            &stub.base_url,
            "--success-delay-ms",
            "0",
            "--max-pages",
            "1",
        ])
        .assert()
        .success();

    assert_eq!(stub.count_path("/3/discover/tv"), 1);
    assert!(!file_names(&bronze)?.contains(&"103_discover_info.json".to_owned()));
    Ok(())
}

#[test]
fn normalize_requires_bronze_directory() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .args(["normalize", "--bronze", "missing", "--out", "silver.parquet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bronze directory not found"));

    assert!(!temp.path().join("silver.parquet").exists());
    Ok(())
}

#[test]
fn aggregate_requires_silver_table() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .args(["aggregate", "--silver", "missing.parquet", "--out", "gold"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("silver table not found"));

    assert!(!temp.path().join("gold").exists());
    Ok(())
}

#[test]
fn report_surfaces_load_failures() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    fs::write(temp.path().join("broken.parquet"), "not parquet")?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .args(["report", "--dashboard", "broken.parquet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("load dashboard table"))
        .stdout(predicate::str::is_empty());
    Ok(())
}

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _: Duration) {}
}

fn discover_args() -> anyhow::Result<DiscoverArgs> {
    Ok(DiscoverArgs {
        genre_name: "드라마".to_owned(),
        genre_language: "ko-KR".to_owned(),
        original_language: "ko".to_owned(),
        language: "pt-BR".to_owned(),
        start_date: NaiveDate::from_ymd_opt(2020, 1, 1).ok_or_else(|| anyhow::anyhow!("bad date"))?,
        end_date: NaiveDate::from_ymd_opt(2025, 5, 30).ok_or_else(|| anyhow::anyhow!("bad date"))?,
        max_pages: 5,
    })
}

#[test]
fn ingestion_skips_failed_pages_entries_and_details() -> anyhow::Result<()> {
    let catalog = Catalog {
        genres: json!({ "genres": [{ "id": 18, "name": "드라마" }] }),
        pages: vec![
            json!({
                "page": 1,
                "total_pages": 3,
                "results": [
                    discover_entry(201, "Uma Advogada Extraordinária", "2022-06-29", 70.0, 400),
                    { "name": "Sem Id", "popularity": 1.0 }
                ]
            }),
            json!({ "page": 2, "total_pages": 3, "results": [discover_entry(202, "Nunca", "2022-01-01", 1.0, 1)] }),
            json!({ "page": 3, "total_pages": 3 }),
        ],
        details: HashMap::from([(201, json!({ "status": "Ended" }))]),
        credits: HashMap::from([(201, json!({ "cast": [{ "name": "Park Eun-bin" }] }))]),
        server_errors: HashSet::from(["/discover/tv?page=2".to_owned(), "/tv/201".to_owned()]),
    };
    let stub = TmdbStub::catalog(catalog);
    let temp = tempfile::TempDir::new()?;
    let store = LocalFsRawStore::new(temp.path());
    let config = FetchConfig::new(Some("test-key"), &stub.base_url)?
        .with_success_delay(Duration::ZERO);
    let client = FetchClient::with_sleeper(config, NoSleep)?;

    let summary = ingest(&client, &store, &discover_args()?)?;

    assert_eq!(
        summary,
        IngestSummary {
            pages_fetched: 1,
            entries_discovered: 2,
            entities_processed: 1,
            entries_skipped: 1,
        }
    );
    assert_eq!(
        file_names(temp.path())?,
        vec!["201_credits.json", "201_discover_info.json"]
    );
    assert_eq!(
        stub.requests()
            .iter()
            .filter(|target| target.starts_with("/3/discover/tv?") && target.contains("page=2"))
            .count(),
        3
    );
    assert_eq!(stub.count_path("/3/tv/201"), 3);
    assert_eq!(stub.count_path("/3/tv/201/credits"), 1);
    assert_eq!(stub.count_path("/3/tv/202"), 0);
    Ok(())
}

#[test]
fn debug_logging_never_prints_the_api_key() -> anyhow::Result<()> {
    let mut catalog = sample_catalog();
    catalog.genres = json!({ "genres": [] });
    let stub = TmdbStub::catalog(catalog);
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .env("TMDB_API_KEY", "key-that-must-stay-hidden")
        .env("RUST_LOG", "debug")
        .args([
            "ingest",
            "--out",
            "bronze",
            "--api-base-url",
            &stub.base_url,
            "--success-delay-ms",
            "0",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"))
        .stderr(predicate::str::contains("key-that-must-stay-hidden").not());

    assert!(
        stub.requests()
            .iter()
            .all(|target| target.contains("api_key=key-that-must-stay-hidden"))
    );
    Ok(())
}

#[test]
fn malformed_genre_list_is_reported() -> anyhow::Result<()> {
    let mut catalog = sample_catalog();
    catalog.genres = json!("unexpected");
    let stub = TmdbStub::catalog(catalog);
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kdrama-pipeline");
    cmd.current_dir(temp.path())
        .env("TMDB_API_KEY", "test-key")
        .args([
            "ingest",
            "--out",
            "bronze",
            "--api-base-url",
            &stub.base_url,
            "--success-delay-ms",
            "0",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("cannot decode catalog response"))
        .stderr(predicate::str::contains("genre not found"));

    assert_eq!(stub.count_path("/3/discover/tv"), 0);
    Ok(())
}
