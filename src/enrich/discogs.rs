//! Cover hints from the Discogs release database.
//!
//! Searches releases carrying the title, oldest first. An earlier release
//! credited to another act marks the entry as a cover of that act.

use serde::Deserialize;

use super::{CoverEvidence, CoverSource, Lookup};
use crate::http::{HttpClient, HttpError};
use crate::models::{DetectionMethod, Song};
use crate::normalize::artists_similar;

const SEARCH_URL: &str = "https://api.discogs.com/database/search";

/// Credits that name no performer.
const ANONYMOUS_CREDITS: [&str; 2] = ["various", "unknown artist"];

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<Release>,
}

/// A search hit; `title` reads "Artist - Release".
#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: Option<String>,
}

impl Release {
    /// Credited artist without the " (2)" disambiguation suffix.
    fn artist(&self) -> Option<&str> {
        let (artist, _) = self.title.split_once(" - ")?;
        let artist = match artist.rsplit_once(" (") {
            Some((name, suffix)) if suffix.trim_end_matches(')').chars().all(|c| c.is_ascii_digit()) => {
                name
            }
            _ => artist,
        };
        let artist = artist.trim();
        (!artist.is_empty() && !ANONYMOUS_CREDITS.contains(&artist.to_lowercase().as_str()))
            .then_some(artist)
    }

    fn year(&self) -> Option<i32> {
        self.year.as_deref()?.trim().parse().ok()
    }
}

/// Judges the oldest credited release from 1900 up to the entry's year.
///
/// `None` when no release qualifies. The entry is a cover only when that
/// release predates it and is credited to another act.
fn judge_releases(releases: &[Release], song: &Song) -> Option<CoverEvidence> {
    let (artist, year) = releases
        .iter()
        .filter_map(|release| Some((release.artist()?, release.year()?)))
        .filter(|(_, year)| (1900..=song.year).contains(year))
        .min_by_key(|(_, year)| *year)?;

    if year < song.year && !artists_similar(artist, &song.artist) {
        Some(CoverEvidence {
            is_cover: true,
            original_artist: Some(artist.to_string()),
            original_year: Some(year),
        })
    } else {
        Some(CoverEvidence::default())
    }
}

/// Discogs database search client.
pub struct Discogs {
    http: HttpClient,
    token: String,
}

impl Discogs {
    pub fn new(http: HttpClient, token: impl Into<String>) -> Self {
        Self {
            http,
            token: token.into(),
        }
    }
}

impl CoverSource for Discogs {
    fn name(&self) -> &'static str {
        "Discogs"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::ReleaseDatabase
    }

    fn check(&self, song: &Song) -> Result<Lookup<CoverEvidence>, HttpError> {
        let request = self
            .http
            .get(SEARCH_URL)?
            .header(reqwest::header::AUTHORIZATION, format!("Discogs token={}", self.token))
            .query(&[
                ("track", song.title.as_str()),
                ("type", "release"),
                ("sort", "year"),
                ("sort_order", "asc"),
                ("per_page", "10"),
            ]);
        let results: SearchResults = self.http.send_json(request)?;
        Ok(Lookup::from_option(judge_releases(&results.results, song)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SongBuilder, SongId};

    fn song(title: &str, artist: &str, year: i32) -> Song {
        SongBuilder::new()
            .id(SongId::new(1))
            .title(title)
            .artist(artist)
            .year(year)
            .build()
    }

    fn releases(json: &str) -> Vec<Release> {
        serde_json::from_str::<SearchResults>(json).unwrap().results
    }

    #[test]
    fn oldest_release_by_another_act_is_a_cover() {
        let found = releases(
            r#"{"results": [
                {"title": "Whitney Houston - The Bodyguard", "year": "1992"},
                {"title": "Various - Country Hits", "year": "1970"},
                {"title": "Dolly Parton (2) - Jolene", "year": "1974"},
                {"title": "No Year - Single"}
            ]}"#,
        );

        let evidence = judge_releases(&found, &song("I Will Always Love You", "Whitney Houston", 1992))
            .unwrap();

        assert!(evidence.is_cover);
        assert_eq!(evidence.original_artist.as_deref(), Some("Dolly Parton"));
        assert_eq!(evidence.original_year, Some(1974));
    }

    #[test]
    fn own_or_later_releases_are_not_covers() {
        let own = releases(r#"{"results": [{"title": "Lorde - Royals", "year": "2013"}]}"#);
        assert_eq!(
            judge_releases(&own, &song("Royals", "Lorde", 2013)),
            Some(CoverEvidence::default())
        );

        let later = releases(r#"{"results": [{"title": "Somebody - Royals", "year": "2019"}]}"#);
        assert_eq!(judge_releases(&later, &song("Royals", "Lorde", 2013)), None);
        assert_eq!(judge_releases(&[], &song("Royals", "Lorde", 2013)), None);
    }
}
