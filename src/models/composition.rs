use serde::{Deserialize, Serialize};

use super::{CompositionId, SongId};
use crate::normalize::slugify;

/// The songwriting work underlying one or more recorded versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    pub id: CompositionId,
    pub title: String,
    /// Comma-separated writer credits, if known.
    pub original_writer: Option<String>,
    pub original_artist: Option<String>,
    pub original_year: Option<i32>,
    pub slug: String,
    pub is_traditional: bool,
    pub musicbrainz_work_id: Option<String>,
    /// Which sources backed the classification, e.g. "SecondHandSongs+MusicBrainz".
    pub verified_source: Option<String>,
    /// Number of catalog entries pointing at this composition.
    pub total_versions: u32,
    /// Version with the best peak; earliest year breaks ties.
    pub most_successful_song_id: Option<SongId>,
}

/// Slug for a composition: `title-writer`, or just the title for
/// traditional works and unknown writers.
///
/// # Examples
///
/// ```
/// use hot100::models::composition_slug;
///
/// assert_eq!(composition_slug("Hallelujah", Some("Leonard Cohen"), false), "hallelujah-leonard-cohen");
/// assert_eq!(composition_slug("Silent Night", Some("Traditional"), true), "silent-night");
/// assert_eq!(composition_slug("Respect", None, false), "respect");
/// ```
pub fn composition_slug(title: &str, writer: Option<&str>, is_traditional: bool) -> String {
    match writer {
        Some(writer) if !is_traditional && !writer.trim().is_empty() => {
            slugify(&format!("{title}-{writer}"))
        }
        _ => slugify(title),
    }
}

/// Outcome of cover detection for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverClassification {
    pub is_cover: bool,
    pub original_artist: Option<String>,
    pub original_year: Option<i32>,
    /// Comma-separated writer credits.
    pub writers: Option<String>,
    pub musicbrainz_work_id: Option<String>,
    /// Which rule decided `is_cover`.
    pub method: Option<DetectionMethod>,
    /// Sources that contributed any data.
    pub sources: Vec<&'static str>,
}

impl CoverClassification {
    pub fn is_traditional(&self) -> bool {
        self.writers
            .as_deref()
            .is_some_and(|w| w.eq_ignore_ascii_case("traditional"))
    }
}

/// Rule that produced a cover verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    CoverDatabase,
    Encyclopedia,
    /// Earliest release of the title in a discography database.
    ReleaseDatabase,
    /// Language-model guess, consulted last.
    LanguageModel,
    WriterHeuristic,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMethod::CoverDatabase => write!(f, "cover database"),
            DetectionMethod::Encyclopedia => write!(f, "encyclopedia"),
            DetectionMethod::ReleaseDatabase => write!(f, "release database"),
            DetectionMethod::LanguageModel => write!(f, "language model"),
            DetectionMethod::WriterHeuristic => write!(f, "writer heuristic"),
        }
    }
}
