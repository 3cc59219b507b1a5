//! Typed calls to the TMDB v3 endpoints the pipeline consumes.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::fetch::{FetchClient, FetchError, Sleeper};
use crate::formats::{DiscoverPage, GenreList};

/// The discover endpoint stops serving pages past this one.
pub const MAX_DISCOVER_PAGES: u32 = 500;

pub const DETAIL_APPENDS: &str = "keywords,watch/providers";

#[derive(Debug, Clone)]
pub struct DiscoverQuery {
    pub original_language: String,
    pub genre_id: u64,
    pub first_air_from: NaiveDate,
    pub first_air_to: NaiveDate,
    pub language: String,
}

impl DiscoverQuery {
    fn params(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("language", self.language.clone()),
            ("with_original_language", self.original_language.clone()),
            ("with_genres", self.genre_id.to_string()),
            ("sort_by", "popularity.desc".to_owned()),
            ("air_date.gte", self.first_air_from.format("%Y-%m-%d").to_string()),
            ("air_date.lte", self.first_air_to.format("%Y-%m-%d").to_string()),
            ("page", page.to_string()),
        ]
    }
}

impl<S: Sleeper> FetchClient<S> {
    pub fn tv_genres(&self, language: &str) -> Result<Option<GenreList>, FetchError> {
        let Some(value) = self.get("/genre/tv/list", &[("language", language.to_owned())])? else {
            return Ok(None);
        };
        Ok(Some(decode_or_default("genre list", value)))
    }

    pub fn discover_tv(
        &self,
        query: &DiscoverQuery,
        page: u32,
    ) -> Result<Option<DiscoverPage>, FetchError> {
        let Some(value) = self.get("/discover/tv", &query.params(page))? else {
            return Ok(None);
        };
        Ok(Some(decode_or_default("discover page", value)))
    }

    pub fn tv_details(&self, id: u64, language: &str) -> Result<Option<Value>, FetchError> {
        self.get(
            &format!("/tv/{id}"),
            &[
                ("language", language.to_owned()),
                ("append_to_response", DETAIL_APPENDS.to_owned()),
            ],
        )
    }

    pub fn tv_credits(&self, id: u64) -> Result<Option<Value>, FetchError> {
        self.get(&format!("/tv/{id}/credits"), &[])
    }
}

/// Unexpected shapes decode as an empty response.
fn decode_or_default<T: DeserializeOwned + Default>(what: &str, value: Value) -> T {
    match serde_json::from_value(value) {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::warn!(response = what, %err, "cannot decode catalog response; treating it as empty");
            T::default()
        }
    }
}
