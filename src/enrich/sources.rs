//! Lookup contracts for the external enrichment services.
//!
//! Each trait is `Send + Sync` so production clients and test doubles can
//! be shared behind an `Arc<dyn ...>` in the [`Enricher`](super::Enricher).

use crate::http::HttpError;
use crate::models::{ArtistProfile, DetectionMethod, Song, TagCount};

/// Answer of a lookup that reached the service.
///
/// `NotFound` is a definitive miss and is never retried; transport and
/// server failures travel as `Err(HttpError)` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

/// Streaming-service track search.
pub trait MediaLinkSource: Send + Sync {
    /// Returns the public track URL for a confident match.
    fn find_track(&self, title: &str, artist: &str) -> Result<Lookup<String>, HttpError>;
}

/// Generator of descriptive HTML text for a catalog entry.
pub trait DescriptionSource: Send + Sync {
    fn describe(&self, song: &Song) -> Result<Lookup<String>, HttpError>;
}

/// What a cover source concluded about one recording.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverEvidence {
    pub is_cover: bool,
    pub original_artist: Option<String>,
    pub original_year: Option<i32>,
}

/// A service that can tell whether a recording covers an earlier one.
pub trait CoverSource: Send + Sync {
    /// Short name recorded as the composition's verifying source.
    fn name(&self) -> &'static str;

    /// Detection rule a positive answer from this source counts as.
    fn method(&self) -> DetectionMethod;

    fn check(&self, song: &Song) -> Result<Lookup<CoverEvidence>, HttpError>;

    /// A fallback is skipped once an earlier source found a cover or a
    /// cover database answered.
    fn is_fallback(&self) -> bool {
        false
    }
}

/// Songwriting credits for a recording.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriterCredits {
    pub writers: Vec<String>,
    pub work_id: Option<String>,
}

impl WriterCredits {
    /// Writers joined the way compositions store them.
    pub fn joined(&self) -> Option<String> {
        (!self.writers.is_empty()).then(|| self.writers.join(", "))
    }
}

/// Registry of works and their writers.
pub trait WriterSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn writers(&self, title: &str, artist: &str) -> Result<Lookup<WriterCredits>, HttpError>;
}

/// Registry of artist biographies, tags and relations.
pub trait ArtistMetadataSource: Send + Sync {
    /// Looks up the registry entry whose name matches `name` exactly
    /// (ignoring case).
    fn lookup_artist(&self, name: &str) -> Result<Lookup<ArtistProfile>, HttpError>;

    /// Re-reads an entry already known by registry id.
    fn artist_by_id(&self, musicbrainz_id: &str) -> Result<Lookup<ArtistProfile>, HttpError>;
}

/// Folksonomy tags for artists the registry has no tags for.
pub trait ArtistTagSource: Send + Sync {
    /// Top tags with counts on a 0-100 scale.
    fn top_tags(&self, artist: &str) -> Result<Lookup<Vec<TagCount>>, HttpError>;
}
