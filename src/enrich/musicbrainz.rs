//! MusicBrainz web service client.
//!
//! Serves two lookups: writer credits (recording → work → artist
//! relations) and artist profiles (search, then a detailed lookup with
//! tags, annotation and artist relations). MusicBrainz allows one request
//! per second, which the client enforces itself.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::Date;

use super::{ArtistMetadataSource, Lookup, WriterCredits, WriterSource};
use crate::http::{HttpClient, HttpError, RateLimiter};
use crate::models::{ArtistProfile, ArtistRelation, TagCount, parse_chart_date};

const BASE_URL: &str = "https://musicbrainz.org/ws/2";
const REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// Stored biographies are cut to this many characters.
pub const BIO_LIMIT: usize = 500;

/// Acts that began before this year are not chart artists.
pub const EARLIEST_BEGIN_YEAR: i32 = 1900;

const WRITER_RELATIONS: [&str; 3] = ["composer", "lyricist", "writer"];

#[derive(Debug, Deserialize)]
struct RecordingSearch {
    #[serde(default)]
    recordings: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct Entity {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Relations {
    #[serde(default)]
    relations: Vec<Relation>,
}

#[derive(Debug, Deserialize)]
struct Relation {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    work: Option<Entity>,
    #[serde(default)]
    artist: Option<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArtistSearch {
    #[serde(default)]
    artists: Vec<MbArtist>,
}

#[derive(Debug, Default, Deserialize)]
struct LifeSpan {
    #[serde(default)]
    begin: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Area {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Deserialize)]
struct MbArtist {
    id: String,
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    area: Option<Area>,
    #[serde(rename = "life-span", default)]
    life_span: LifeSpan,
    #[serde(default)]
    annotation: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    relations: Vec<Relation>,
}

impl MbArtist {
    fn begin_year(&self) -> Option<i32> {
        self.life_span.begin.as_deref()?.get(..4)?.parse().ok()
    }

    fn is_plausible(&self) -> bool {
        self.begin_year().is_none_or(|year| year >= EARLIEST_BEGIN_YEAR)
    }
}

/// Parses a registry date: full `YYYY-MM-DD`, or a bare year (optionally
/// with month) read as January 1st.
fn parse_life_date(value: &str) -> Option<Date> {
    if value.len() == 10 {
        return parse_chart_date(value).ok();
    }
    let year: i32 = value.get(..4)?.parse().ok()?;
    Date::from_calendar_date(year, time::Month::January, 1).ok()
}

/// Deduplicated writer names, in relation order.
fn writers_from_relations(relations: &[Relation]) -> Vec<String> {
    let mut writers: Vec<String> = Vec::new();
    for relation in relations {
        if !WRITER_RELATIONS.contains(&relation.kind.as_str()) {
            continue;
        }
        if let Some(artist) = &relation.artist
            && !writers.contains(&artist.name)
        {
            writers.push(artist.name.clone());
        }
    }
    writers
}

fn profile_from_artist(artist: MbArtist) -> ArtistProfile {
    let bio = artist
        .annotation
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| a.chars().take(BIO_LIMIT).collect());

    ArtistProfile {
        begin_year: artist.begin_year(),
        birth_date: artist.life_span.begin.as_deref().and_then(parse_life_date),
        death_date: artist.life_span.end.as_deref().and_then(parse_life_date),
        nationality: artist.area.map(|a| a.name),
        artist_type: artist.kind.as_deref().and_then(|k| k.parse().ok()),
        bio,
        tags: artist
            .tags
            .into_iter()
            .filter(|t| t.count > 0)
            .map(|t| TagCount {
                name: t.name,
                count: u32::try_from(t.count).unwrap_or(u32::MAX),
            })
            .collect(),
        relations: artist
            .relations
            .into_iter()
            .filter_map(|r| {
                let target = r.artist?;
                Some(ArtistRelation {
                    label: r.kind,
                    target_musicbrainz_id: target.id,
                    target_name: target.name,
                    backward: r.direction.as_deref() == Some("backward"),
                })
            })
            .collect(),
        musicbrainz_id: artist.id,
        name: artist.name,
    }
}

/// Quotes a value for a Lucene search term.
fn phrase(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// MusicBrainz client.
pub struct MusicBrainz {
    http: HttpClient,
    limiter: RateLimiter,
}

impl MusicBrainz {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            limiter: RateLimiter::new(REQUEST_INTERVAL),
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, HttpError> {
        self.limiter.wait();
        let request = self
            .http
            .get(&format!("{BASE_URL}/{path}"))?
            .query(query)
            .query(&[("fmt", "json")]);
        self.http.send_json(request)
    }

    /// Writers of the first work linked from `recording_id`, if any.
    fn work_writers(&self, recording_id: &str) -> Result<Option<WriterCredits>, HttpError> {
        let recording: Relations =
            self.get(&format!("recording/{recording_id}"), &[("inc", "work-rels")])?;
        let Some(work) = recording.relations.into_iter().find_map(|r| r.work) else {
            return Ok(None);
        };

        let detail: Relations = self.get(&format!("work/{}", work.id), &[("inc", "artist-rels")])?;
        let writers = writers_from_relations(&detail.relations);
        Ok((!writers.is_empty()).then(|| WriterCredits {
            writers,
            work_id: Some(work.id),
        }))
    }

    fn artist_detail(&self, id: &str) -> Result<Option<MbArtist>, HttpError> {
        match self.get(
            &format!("artist/{id}"),
            &[("inc", "tags+annotation+artist-rels")],
        ) {
            Ok(artist) => Ok(Some(artist)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl WriterSource for MusicBrainz {
    fn name(&self) -> &'static str {
        "MusicBrainz"
    }

    fn writers(&self, title: &str, artist: &str) -> Result<Lookup<WriterCredits>, HttpError> {
        let queries = [
            format!("recording:{} AND artist:{}", phrase(title), phrase(artist)),
            format!("recording:{}", phrase(title)),
        ];

        for query in &queries {
            let search: RecordingSearch =
                self.get("recording", &[("query", query.as_str()), ("limit", "5")])?;

            for recording in &search.recordings {
                match self.work_writers(&recording.id) {
                    Ok(Some(credits)) => return Ok(Lookup::Found(credits)),
                    Ok(None) => {}
                    Err(e) if !e.is_transient() => {
                        tracing::debug!(recording = %recording.id, error = %e, "skipping recording");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(Lookup::NotFound)
    }
}

impl ArtistMetadataSource for MusicBrainz {
    fn lookup_artist(&self, name: &str) -> Result<Lookup<ArtistProfile>, HttpError> {
        let query = format!("artist:{}", phrase(name));
        let search: ArtistSearch =
            self.get("artist", &[("query", query.as_str()), ("limit", "10")])?;

        let Some(candidate) = search
            .artists
            .into_iter()
            .find(|a| a.name.to_lowercase() == name.to_lowercase() && a.is_plausible())
        else {
            return Ok(Lookup::NotFound);
        };

        self.artist_by_id(&candidate.id)
    }

    fn artist_by_id(&self, musicbrainz_id: &str) -> Result<Lookup<ArtistProfile>, HttpError> {
        Ok(match self.artist_detail(musicbrainz_id)? {
            Some(artist) if artist.is_plausible() => Lookup::Found(profile_from_artist(artist)),
            _ => Lookup::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArtistType;
    use time::macros::date;

    #[test]
    fn writers_are_deduplicated_and_filtered_by_role() {
        let work: Relations = serde_json::from_str(
            r#"{"relations": [
                {"type": "composer", "artist": {"id": "1", "name": "Leonard Cohen"}},
                {"type": "lyricist", "artist": {"id": "1", "name": "Leonard Cohen"}},
                {"type": "arranger", "artist": {"id": "2", "name": "John Cale"}},
                {"type": "writer", "artist": {"id": "3", "name": "Someone Else"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            writers_from_relations(&work.relations),
            vec!["Leonard Cohen", "Someone Else"]
        );
    }

    #[test]
    fn life_dates_accept_partial_values() {
        assert_eq!(parse_life_date("1988-05-05"), Some(date!(1988 - 05 - 05)));
        assert_eq!(parse_life_date("1962"), Some(date!(1962 - 01 - 01)));
        assert_eq!(parse_life_date("1962-07"), Some(date!(1962 - 01 - 01)));
        assert_eq!(parse_life_date(""), None);
    }

    #[test]
    fn artist_detail_becomes_a_profile() {
        let artist: MbArtist = serde_json::from_str(
            r#"{
                "id": "cc2c9c3c-b7bc-4b8b-84d8-4fbd8779e493",
                "name": "Adele",
                "type": "Person",
                "area": {"name": "United Kingdom"},
                "life-span": {"begin": "1988-05-05", "end": null},
                "annotation": "  English singer-songwriter.  ",
                "tags": [{"name": "soul", "count": 12}, {"name": "meh", "count": 0}],
                "relations": [
                    {"type": "member of band", "direction": "backward",
                     "artist": {"id": "x", "name": "Somebody"}},
                    {"type": "url", "direction": "forward"}
                ]
            }"#,
        )
        .unwrap();

        let profile = profile_from_artist(artist);
        assert_eq!(profile.name, "Adele");
        assert_eq!(profile.nationality.as_deref(), Some("United Kingdom"));
        assert_eq!(profile.birth_date, Some(date!(1988 - 05 - 05)));
        assert_eq!(profile.death_date, None);
        assert_eq!(profile.begin_year, Some(1988));
        assert_eq!(profile.artist_type, Some(ArtistType::Person));
        assert_eq!(profile.bio.as_deref(), Some("English singer-songwriter."));
        assert_eq!(profile.tags, vec![TagCount { name: "soul".into(), count: 12 }]);
        assert_eq!(profile.relations.len(), 1);
        assert!(profile.relations[0].backward);
    }

    #[test]
    fn long_annotations_are_cut() {
        let artist: MbArtist = serde_json::from_str(&format!(
            r#"{{"id": "1", "name": "X", "annotation": "{}"}}"#,
            "a".repeat(800)
        ))
        .unwrap();
        assert_eq!(profile_from_artist(artist).bio.unwrap().chars().count(), BIO_LIMIT);
    }

    #[test]
    fn pre_1900_acts_are_implausible() {
        let old: MbArtist =
            serde_json::from_str(r#"{"id": "1", "name": "Mozart", "life-span": {"begin": "1756-01-27"}}"#)
                .unwrap();
        let unknown: MbArtist = serde_json::from_str(r#"{"id": "2", "name": "X"}"#).unwrap();
        assert!(!old.is_plausible());
        assert!(unknown.is_plausible());
    }

    #[test]
    fn search_phrases_are_quoted() {
        assert_eq!(phrase(r#"Say "Hi""#), r#""Say \"Hi\"""#);
    }
}
