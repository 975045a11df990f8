//! Descriptive text from the OpenAI chat completions API.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{DescriptionSource, Lookup};
use crate::http::{HttpClient, HttpError};
use crate::models::Song;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "You are a music historian who writes concise, informative paragraphs about songs and artists.";

const TOP_TEN_TEMPLATE: &str = r#"Write about the song "{title}" by {artist} from {year} that reached #{peak} on the Billboard Hot 100 chart.

First section should be about the song itself, labeled "Song Info:" in bold and should include details about the song's release, chart performance, and cultural impact.

Second section should be about the artist, labeled "Artist Bio:" in bold and should include a biography of the artist in a single paragraph.

Format exactly as shown below with proper HTML formatting:

<strong>Song Info:</strong><br>
<p>[One paragraph about the song, 4-6 sentences]</p>
<br>
<strong>Artist Bio:</strong><br>
<p>[One paragraph about the artist, 6-8 sentences]</p>"#;

const ARTIST_TEMPLATE: &str = r#"Write about the artist {artist} who had a song "{title}" that reached #{peak} on the Billboard Hot 100 chart in {year}.

The section should be labeled "Artist Bio:" in bold and should include a biography of the artist split into two paragraphs.

Format exactly as shown below with proper HTML formatting:

<strong>Artist Bio:</strong><br>
<p>[First paragraph about the artist, 3-4 sentences]</p>

<p>[Second paragraph about the artist, 3-4 sentences]</p>"#;

/// Prompt for one entry: song and artist sections for top-ten hits,
/// a two-paragraph artist biography otherwise.
pub fn description_prompt(song: &Song) -> String {
    let template = if song.is_top_ten() {
        TOP_TEN_TEMPLATE
    } else {
        ARTIST_TEMPLATE
    };
    template
        .replace("{title}", &song.title)
        .replace("{artist}", &song.artist)
        .replace("{year}", &song.year.to_string())
        .replace("{peak}", &song.peak_rank.to_string())
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Sends one chat completion and returns its trimmed text, if any.
pub(super) fn complete(
    http: &HttpClient,
    api_key: &str,
    body: &Value,
) -> Result<Option<String>, HttpError> {
    let request = http.post(COMPLETIONS_URL)?.bearer_auth(api_key).json(body);
    let response: CompletionResponse = http.send_json(request)?;

    Ok(response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty()))
}

/// Chat completions client.
pub struct OpenAiDescriber {
    http: HttpClient,
    api_key: String,
    model: String,
}

impl OpenAiDescriber {
    pub fn new(http: HttpClient, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl DescriptionSource for OpenAiDescriber {
    fn describe(&self, song: &Song) -> Result<Lookup<String>, HttpError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": description_prompt(song)},
            ],
            "max_tokens": 500,
            "temperature": 0.7,
        });

        match complete(&self.http, &self.api_key, &body)? {
            Some(text) => Ok(Lookup::Found(text)),
            None => Err(HttpError::Api {
                message: "completion contained no text".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SongBuilder, SongId};

    #[test]
    fn top_ten_prompt_asks_for_song_and_artist_sections() {
        let song = SongBuilder::new()
            .id(SongId::new(1))
            .title("Vampire")
            .artist("Olivia Rodrigo")
            .year(2023)
            .peak_rank(1)
            .build();

        let prompt = description_prompt(&song);
        assert!(prompt.contains(r#"the song "Vampire" by Olivia Rodrigo from 2023"#));
        assert!(prompt.contains("reached #1"));
        assert!(prompt.contains("<strong>Song Info:</strong>"));
        assert!(prompt.contains("<strong>Artist Bio:</strong>"));
    }

    #[test]
    fn other_entries_get_a_two_paragraph_bio() {
        let song = SongBuilder::new()
            .id(SongId::new(2))
            .title("Bad Idea Right?")
            .artist("Olivia Rodrigo")
            .year(2023)
            .peak_rank(11)
            .build();

        let prompt = description_prompt(&song);
        assert!(!prompt.contains("Song Info"));
        assert!(prompt.contains("split into two paragraphs"));
        assert!(prompt.contains("#11 on the Billboard Hot 100 chart in 2023"));
    }
}
