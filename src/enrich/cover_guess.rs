//! Last-resort cover verdicts from a language model.
//!
//! Asked only when no earlier source settled the entry. The model names
//! the original artist; a different act than the entry's means a cover.

use serde::Deserialize;
use serde_json::json;

use super::describer::complete;
use super::{CoverEvidence, CoverSource, Lookup};
use crate::http::{HttpClient, HttpError};
use crate::models::{DetectionMethod, Song};
use crate::normalize::artists_similar;

const PROMPT_TEMPLATE: &str = r#"Provide the original songwriter(s), original artist and year of first release for "{title}" as recorded by {artist} in {year}.
Return only JSON: {"writers": ["Name"], "original_artist": "Artist Name", "original_year": 1970}
Use null for anything you do not know."#;

#[derive(Debug, Default, Deserialize)]
struct Guess {
    #[serde(default)]
    original_artist: Option<String>,
    #[serde(default)]
    original_year: Option<i32>,
}

pub fn cover_prompt(song: &Song) -> String {
    PROMPT_TEMPLATE
        .replace("{title}", &song.title)
        .replace("{artist}", &song.artist)
        .replace("{year}", &song.year.to_string())
}

/// Reads the model's answer, tolerating a fenced code block.
///
/// `None` when the answer is not JSON or names no original artist. A
/// year after the entry's own is dropped.
fn parse_guess(content: &str, song: &Song) -> Option<CoverEvidence> {
    let json = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let guess: Guess = match serde_json::from_str(json) {
        Ok(guess) => guess,
        Err(e) => {
            tracing::debug!(error = %e, "model answer is not JSON");
            return None;
        }
    };

    let artist = guess.original_artist.as_deref().map(str::trim).filter(|a| !a.is_empty())?;
    if artists_similar(artist, &song.artist) {
        return Some(CoverEvidence::default());
    }
    Some(CoverEvidence {
        is_cover: true,
        original_artist: Some(artist.to_string()),
        original_year: guess.original_year.filter(|year| (1900..=song.year).contains(year)),
    })
}

/// Chat completions client asking for a song's original performer.
pub struct OpenAiCoverGuess {
    http: HttpClient,
    api_key: String,
    model: String,
}

impl OpenAiCoverGuess {
    pub fn new(http: HttpClient, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl CoverSource for OpenAiCoverGuess {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::LanguageModel
    }

    fn is_fallback(&self) -> bool {
        true
    }

    fn check(&self, song: &Song) -> Result<Lookup<CoverEvidence>, HttpError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": cover_prompt(song)}],
            "max_tokens": 200,
            "temperature": 0,
        });

        let answer = complete(&self.http, &self.api_key, &body)?;
        Ok(Lookup::from_option(
            answer.and_then(|content| parse_guess(&content, song)),
        ))
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
    fn prompt_names_the_recording() {
        let prompt = cover_prompt(&song("Respect", "Aretha Franklin", 1967));
        assert!(prompt.contains(r#""Respect" as recorded by Aretha Franklin in 1967"#));
        assert!(prompt.contains("original_artist"));
    }

    #[test]
    fn fenced_answer_naming_another_act_is_a_cover() {
        let answer = "```json\n{\"writers\": [\"Otis Redding\"], \"original_artist\": \"Otis Redding\", \"original_year\": 1965}\n```";

        let evidence = parse_guess(answer, &song("Respect", "Aretha Franklin", 1967)).unwrap();

        assert!(evidence.is_cover);
        assert_eq!(evidence.original_artist.as_deref(), Some("Otis Redding"));
        assert_eq!(evidence.original_year, Some(1965));
    }

    #[test]
    fn own_artist_unknown_or_garbled_answers() {
        let hit = song("Respect", "Aretha Franklin", 1967);
        assert_eq!(
            parse_guess(r#"{"original_artist": "aretha franklin"}"#, &hit),
            Some(CoverEvidence::default())
        );
        assert_eq!(parse_guess(r#"{"original_artist": null}"#, &hit), None);
        assert_eq!(parse_guess("I am not sure.", &hit), None);

        let late = parse_guess(r#"{"original_artist": "Otis Redding", "original_year": 1990}"#, &hit)
            .unwrap();
        assert_eq!(late.original_year, None);
    }
}
