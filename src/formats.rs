use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Decodes a field as `T`, falling back to `None` when the value is null or
/// has an unexpected shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Decodes a list field, dropping elements that do not fit `T`.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedItem {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

fn names(items: &[NamedItem]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.name.as_deref())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genre {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenreList {
    #[serde(default, deserialize_with = "lenient_list")]
    pub genres: Vec<Genre>,
}

impl GenreList {
    pub fn find_id(&self, name: &str) -> Option<u64> {
        self.genres
            .iter()
            .find(|genre| genre.name.as_deref() == Some(name))
            .and_then(|genre| genre.id)
    }
}

/// One page of `/discover/tv`. Entries are kept verbatim for the raw tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoverPage {
    #[serde(default, deserialize_with = "lenient")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_pages: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_results: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub results: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub original_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub overview: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub popularity: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub vote_average: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub vote_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub first_air_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub original_language: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub poster_path: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub backdrop_path: Option<String>,
}

/// TV keywords come wrapped in `results`; some payloads carry a bare list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeywordList {
    Bare(Vec<NamedItem>),
    Wrapped {
        #[serde(default, deserialize_with = "lenient_list")]
        results: Vec<NamedItem>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provider {
    #[serde(default, deserialize_with = "lenient")]
    pub provider_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionProviders {
    #[serde(default, deserialize_with = "lenient_list")]
    pub flatrate: Vec<Provider>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchProviders {
    #[serde(default, deserialize_with = "lenient")]
    pub results: Option<BTreeMap<String, RegionProviders>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub tagline: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub number_of_episodes: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub number_of_seasons: Option<i64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub episode_run_time: Vec<i64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub genres: Vec<NamedItem>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub production_companies: Vec<NamedItem>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub networks: Vec<NamedItem>,
    #[serde(default, deserialize_with = "lenient")]
    pub vote_average: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub vote_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub keywords: Option<KeywordList>,
    #[serde(
        default,
        rename = "watch/providers",
        deserialize_with = "lenient"
    )]
    pub watch_providers: Option<WatchProviders>,
}

impl DetailRecord {
    pub fn genre_names(&self) -> Vec<String> {
        names(&self.genres)
    }

    pub fn production_company_names(&self) -> Vec<String> {
        names(&self.production_companies)
    }

    pub fn network_names(&self) -> Vec<String> {
        names(&self.networks)
    }

    pub fn keyword_names(&self) -> Vec<String> {
        match &self.keywords {
            Some(KeywordList::Wrapped { results }) => names(results),
            Some(KeywordList::Bare(items)) => names(items),
            None => Vec::new(),
        }
    }

    /// Subscription providers for one region (`flatrate` offers only).
    pub fn flatrate_providers(&self, region: &str) -> Vec<String> {
        self.watch_providers
            .as_ref()
            .and_then(|providers| providers.results.as_ref())
            .and_then(|regions| regions.get(region))
            .map(|region| {
                region
                    .flatrate
                    .iter()
                    .filter_map(|provider| provider.provider_name.as_deref())
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewMember {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub job: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditRecord {
    #[serde(default, deserialize_with = "lenient_list")]
    pub cast: Vec<NamedItem>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub crew: Vec<CrewMember>,
}

impl CreditRecord {
    pub fn top_cast(&self, limit: usize) -> Vec<String> {
        let mut cast = names(&self.cast);
        cast.truncate(limit);
        cast
    }

    /// Crew whose job is exactly "Director".
    pub fn directors(&self) -> Vec<String> {
        self.crew_names(|member| member.job.as_deref() == Some("Director"))
    }

    /// Crew in the "Writing" department, whatever their job title.
    pub fn writers(&self) -> Vec<String> {
        self.crew_names(|member| member.department.as_deref() == Some("Writing"))
    }

    fn crew_names(&self, keep: impl Fn(&CrewMember) -> bool) -> Vec<String> {
        self.crew
            .iter()
            .filter(|member| keep(member))
            .filter_map(|member| member.name.as_deref())
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// One Silver row: the three raw records of a series merged by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub id: u64,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub popularity: Option<f64>,
    pub vote_average_discover: Option<f64>,
    pub vote_count_discover: Option<i64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub first_air_date_raw: Option<String>,
    pub first_air_date: Option<NaiveDate>,
    pub release_year: Option<i32>,
    pub original_language: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub status: Option<String>,
    pub tagline: Option<String>,
    pub number_of_episodes: Option<i64>,
    pub number_of_seasons: Option<i64>,
    pub episode_run_time: Vec<i64>,
    pub genres: Vec<String>,
    pub production_companies: Vec<String>,
    pub networks: Vec<String>,
    pub keywords: Vec<String>,
    pub streaming_providers: Vec<String>,
    pub cast: Vec<String>,
    pub directors: Vec<String>,
    pub writers: Vec<String>,
}
