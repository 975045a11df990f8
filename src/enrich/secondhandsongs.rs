//! Cover lookups against the SecondHandSongs API.
//!
//! A search for the (title, performer) pair yields candidate performances;
//! the first one credited to the same act whose record names an earlier
//! original decides the verdict.

use std::time::Duration;

use serde::Deserialize;

use super::{CoverEvidence, CoverSource, Lookup};
use crate::http::{HttpClient, HttpError, RateLimiter};
use crate::models::{DetectionMethod, Song};
use crate::normalize::artists_similar;

const SEARCH_URL: &str = "https://api.secondhandsongs.com/search/performance";

/// The public API allows about 20 requests a minute.
const REQUEST_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default, rename = "resultPage")]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    performer: Option<Performer>,
}

#[derive(Debug, Default, Deserialize)]
struct Performer {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Performance {
    #[serde(default = "default_true", rename = "isOriginal")]
    is_original: bool,
    #[serde(default)]
    originals: Vec<OriginalLink>,
}

#[derive(Debug, Deserialize)]
struct OriginalLink {
    #[serde(default)]
    original: Option<OriginalPerformance>,
}

#[derive(Debug, Deserialize)]
struct OriginalPerformance {
    #[serde(default)]
    performer: Option<Performer>,
}

fn default_true() -> bool {
    true
}

/// Verdict carried by one performance record, `None` when it says nothing.
fn judge_performance(performance: &Performance, artist: &str) -> Option<CoverEvidence> {
    if performance.is_original {
        return None;
    }

    let first = performance.originals.first()?;
    let original_artist = first
        .original
        .as_ref()
        .and_then(|o| o.performer.as_ref())
        .map(|p| p.name.trim())
        .unwrap_or_default();

    if !original_artist.is_empty() && !artists_similar(original_artist, artist) {
        Some(CoverEvidence {
            is_cover: true,
            original_artist: Some(original_artist.to_string()),
            original_year: None,
        })
    } else {
        Some(CoverEvidence::default())
    }
}

/// SecondHandSongs client.
pub struct SecondHandSongs {
    http: HttpClient,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl SecondHandSongs {
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            limiter: RateLimiter::new(REQUEST_INTERVAL),
        }
    }

    fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T, HttpError> {
        self.limiter.wait();
        let mut request = request.header(reqwest::header::ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        self.http.send_json(request)
    }
}

impl CoverSource for SecondHandSongs {
    fn name(&self) -> &'static str {
        "SecondHandSongs"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::CoverDatabase
    }

    fn check(&self, song: &Song) -> Result<Lookup<CoverEvidence>, HttpError> {
        let request = self.http.get(SEARCH_URL)?.query(&[
            ("title", song.title.as_str()),
            ("performer", song.artist.as_str()),
            ("pageSize", "3"),
        ]);

        let page: SearchPage = match self.fetch(request) {
            // Throttled or refused: treat as no answer so other signals decide.
            Err(HttpError::Http { status: 403 }) => {
                tracing::debug!(title = %song.title, "cover database refused the search");
                return Ok(Lookup::NotFound);
            }
            other => other?,
        };

        for result in page.results {
            let Some(uri) = result.uri else { continue };
            let performer = result.performer.unwrap_or_default();
            if !artists_similar(&performer.name, &song.artist) {
                continue;
            }

            let performance: Performance = match self.fetch(self.http.get(&uri)?) {
                Ok(performance) => performance,
                Err(e) if !e.is_transient() => {
                    tracing::debug!(%uri, error = %e, "skipping unreadable performance");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(evidence) = judge_performance(&performance, &song.artist) {
                return Ok(Lookup::Found(evidence));
            }
        }

        Ok(Lookup::Found(CoverEvidence::default()))
    }
}
