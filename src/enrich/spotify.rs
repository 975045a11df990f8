//! Track search against the Spotify Web API.
//!
//! Authenticates with the client-credentials flow; the access token is
//! cached and refreshed once when the API answers 401.

use std::sync::Mutex;

use serde::Deserialize;

use super::{Lookup, MediaLinkSource};
use crate::config::SpotifyCredentials;
use crate::http::{HttpClient, HttpError};
use crate::normalize::partial_similarity;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";

/// Minimum best-window similarity on both title and artist.
const MATCH_THRESHOLD: f64 = 0.85;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<Option<Track>>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<TrackArtist>,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct TrackArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

/// Accepts the first search hit only when it resembles the entry closely.
fn pick_track(response: SearchResponse, title: &str, artist: &str) -> Option<String> {
    let first = response.tracks?.items.into_iter().next()??;
    let first_artist = first.artists.first()?;

    let title_similarity = partial_similarity(title, &first.name);
    let artist_similarity = partial_similarity(artist, &first_artist.name);
    if title_similarity < MATCH_THRESHOLD || artist_similarity < MATCH_THRESHOLD {
        tracing::debug!(
            title,
            artist,
            title_similarity,
            artist_similarity,
            "search hit not close enough"
        );
        return None;
    }

    first.external_urls.spotify
}

/// Spotify search client.
pub struct SpotifyClient {
    http: HttpClient,
    credentials: SpotifyCredentials,
    token: Mutex<Option<String>>,
}

impl SpotifyClient {
    pub fn new(http: HttpClient, credentials: SpotifyCredentials) -> Self {
        Self {
            http,
            credentials,
            token: Mutex::new(None),
        }
    }

    fn access_token(&self) -> Result<String, HttpError> {
        let mut token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        let response: TokenResponse = self.http.send_json(self.http.post(TOKEN_URL)?.form(&form))?;
        *token = Some(response.access_token.clone());
        Ok(response.access_token)
    }

    fn forget_token(&self) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn search(&self, query: &str) -> Result<SearchResponse, HttpError> {
        let token = self.access_token()?;
        let request = self
            .http
            .get(SEARCH_URL)?
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("market", "US")]);
        self.http.send_json(request)
    }
}

impl MediaLinkSource for SpotifyClient {
    fn find_track(&self, title: &str, artist: &str) -> Result<Lookup<String>, HttpError> {
        let query = format!("{title} {artist}");
        let response = match self.search(&query) {
            Err(HttpError::Http { status: 401 }) => {
                tracing::debug!("access token rejected, requesting a new one");
                self.forget_token();
                self.search(&query)?
            }
            other => other?,
        };
        Ok(Lookup::from_option(pick_track(response, title, artist)))
    }
}
