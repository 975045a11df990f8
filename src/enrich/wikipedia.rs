//! Cover hints from Wikipedia article text.
//!
//! Searches for the song's article and looks for phrases such as
//! "originally recorded by X in 1975" naming another act.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::{CoverEvidence, CoverSource, Lookup};
use crate::http::{HttpClient, HttpError};
use crate::models::{DetectionMethod, Song};
use crate::normalize::artists_similar;

const SEARCH_URL: &str = "https://en.wikipedia.org/w/rest.php/v1/search/page";
const PAGE_URL: &str = "https://en.wikipedia.org/w/rest.php/v1/page/";

/// Article titles that merely mention songs in passing.
const GENERIC_PAGES: [&str; 6] = [
    "christmas music",
    "list of",
    "music genre",
    "discography",
    "album)",
    "compilation",
];

static ORIGIN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "originally recorded by",
        "first recorded by",
        "popularized by",
        "originally performed by",
    ]
    .into_iter()
    .map(|phrase| Regex::new(&format!(r"(?i){phrase} ([^,.()]+?) in (\d{{4}})")).unwrap())
    .collect()
});

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    pages: Vec<PageRef>,
}

#[derive(Debug, Deserialize)]
struct PageRef {
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Looks for an earlier performer of `song` in one article.
///
/// The article must mention the title and must not be a list or genre
/// page; the named performer must differ from the entry's artist and the
/// year must fall between 1900 and the entry's own year.
pub fn analyze_page(page_title: &str, source: &str, song: &Song) -> Option<CoverEvidence> {
    let title_lower = page_title.to_lowercase();
    let song_title = song.title.to_lowercase();

    if !title_lower.contains(&song_title) && !source.to_lowercase().contains(&song_title) {
        return None;
    }
    if GENERIC_PAGES.iter().any(|generic| title_lower.contains(generic)) {
        return None;
    }

    ORIGIN_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(source))
        .find_map(|captures| {
            let artist = captures.get(1)?.as_str().trim();
            let year: i32 = captures.get(2)?.as_str().parse().ok()?;
            ((1900..=song.year).contains(&year) && !artists_similar(artist, &song.artist)).then(
                || CoverEvidence {
                    is_cover: true,
                    original_artist: Some(artist.to_string()),
                    original_year: Some(year),
                },
            )
        })
}

/// Wikipedia REST client.
pub struct Wikipedia {
    http: HttpClient,
}

impl Wikipedia {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn page(&self, key: &str) -> Result<Option<Page>, HttpError> {
        let mut url = reqwest::Url::parse(PAGE_URL)
            .map_err(|e| HttpError::InvalidUrl(format!("{PAGE_URL}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| HttpError::InvalidUrl(PAGE_URL.to_string()))?
            .pop_if_empty()
            .push(key);

        match self.http.send_json(self.http.get(url.as_str())?) {
            Ok(page) => Ok(Some(page)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl CoverSource for Wikipedia {
    fn name(&self) -> &'static str {
        "Wikipedia"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Encyclopedia
    }

    fn check(&self, song: &Song) -> Result<Lookup<CoverEvidence>, HttpError> {
        for term in [format!("{} song", song.title), song.title.clone()] {
            let request = self
                .http
                .get(SEARCH_URL)?
                .query(&[("q", term.as_str()), ("limit", "3")]);
            let results: SearchResults = self.http.send_json(request)?;

            for page_ref in results.pages.iter().filter(|p| !p.key.is_empty()) {
                let Some(page) = self.page(&page_ref.key)? else {
                    continue;
                };
                let evidence = analyze_page(
                    page.title.as_deref().unwrap_or_default(),
                    page.source.as_deref().unwrap_or_default(),
                    song,
                );
                if let Some(evidence) = evidence {
                    tracing::debug!(page = %page_ref.key, "encyclopedia names an earlier performer");
                    return Ok(Lookup::Found(evidence));
                }
            }
        }
        Ok(Lookup::NotFound)
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

    #[test]
    fn origin_phrase_names_the_original_artist() {
        let evidence = analyze_page(
            "I Will Always Love You",
            "The song was originally recorded by Dolly Parton in 1973, and later...",
            &song("I Will Always Love You", "Whitney Houston", 1992),
        )
        .unwrap();

        assert!(evidence.is_cover);
        assert_eq!(evidence.original_artist.as_deref(), Some("Dolly Parton"));
        assert_eq!(evidence.original_year, Some(1973));
    }

    #[test]
    fn same_artist_or_later_year_is_ignored() {
        let hit = song("Jolene", "Dolly Parton", 1974);
        assert_eq!(
            analyze_page("Jolene (song)", "It was first recorded by Dolly Parton in 1973.", &hit),
            None
        );
        assert_eq!(
            analyze_page("Jolene (song)", "It was first recorded by Someone in 1999.", &hit),
            None
        );
    }

    #[test]
    fn generic_and_unrelated_pages_are_skipped() {
        let hit = song("Silent Night", "Mariah Carey", 1994);
        let text = "Silent Night was originally performed by Franz Gruber in 1918.";
        assert_eq!(analyze_page("List of Christmas carols", text, &hit), None);
        assert_eq!(
            analyze_page("Something else", "originally performed by Nobody in 1950", &hit),
            None
        );
        assert!(analyze_page("Silent Night", text, &hit).is_some());
    }
}
