//! Artist top tags from the Last.fm web service.

use serde::Deserialize;

use super::{ArtistTagSource, Lookup};
use crate::http::{HttpClient, HttpError};
use crate::models::TagCount;

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Error code for an artist Last.fm does not know.
const INVALID_PARAMETERS: u32 = 6;

#[derive(Debug, Deserialize)]
struct TopTagsResponse {
    #[serde(default)]
    toptags: Option<TopTags>,
    #[serde(default)]
    error: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopTags {
    #[serde(default)]
    tag: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(default)]
    name: String,
    #[serde(default)]
    count: u32,
}

/// Tags of one response; errors travel in the body with a success status.
fn read_tags(response: TopTagsResponse) -> Result<Lookup<Vec<TagCount>>, HttpError> {
    match response.error {
        Some(INVALID_PARAMETERS) => return Ok(Lookup::NotFound),
        Some(code) => {
            return Err(HttpError::Api {
                message: format!(
                    "Last.fm error {code}: {}",
                    response.message.unwrap_or_default()
                ),
            });
        }
        None => {}
    }

    let tags: Vec<TagCount> = response
        .toptags
        .map(|top| top.tag)
        .unwrap_or_default()
        .into_iter()
        .filter(|tag| !tag.name.trim().is_empty())
        .map(|tag| TagCount {
            name: tag.name,
            count: tag.count,
        })
        .collect();
    Ok(if tags.is_empty() {
        Lookup::NotFound
    } else {
        Lookup::Found(tags)
    })
}

/// Last.fm client for `artist.getTopTags`.
pub struct Lastfm {
    http: HttpClient,
    api_key: String,
}

impl Lastfm {
    pub fn new(http: HttpClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }
}

impl ArtistTagSource for Lastfm {
    fn top_tags(&self, artist: &str) -> Result<Lookup<Vec<TagCount>>, HttpError> {
        let request = self.http.get(API_URL)?.query(&[
            ("method", "artist.getTopTags"),
            ("artist", artist),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
        ]);
        read_tags(self.http.send_json(request)?)
    }
}
