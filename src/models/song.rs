use serde::{Deserialize, Serialize};

use super::{ArtistId, CompositionId, SongId};

/// Pipeline stage a catalog entry has reached.
///
/// Stages only move forward: no step removes data set by an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStage {
    /// Not yet seen in any snapshot.
    Unseen,
    /// Created by the reconciler; chart statistics only.
    Tracked,
    /// At least one optional attribute (media link, description) filled.
    Enriched,
    /// Attached to a composition or an artist identity.
    Linked,
}

/// A unique (title, artist) chart record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    /// Display credit as printed on the chart.
    pub artist: String,
    /// Year of first chart appearance.
    pub year: i32,
    /// Best rank ever observed. Only decreases.
    pub peak_rank: u32,
    /// Weeks on chart. Only increases.
    pub weeks_on_chart: u32,
    pub slug: String,
    /// Normalized identity, see `normalize::MatchKey`.
    pub match_key: String,
    /// Descriptive HTML text; empty when not yet written.
    pub review: String,
    pub spotify_url: Option<String>,
    pub youtube_url: Option<String>,
    pub image_url: Option<String>,
    pub average_user_score: Option<f64>,
    pub total_ratings: u32,
    pub composition_id: Option<CompositionId>,
    pub is_original_recording: bool,
    pub artist_id: Option<ArtistId>,
}

impl Song {
    /// Stage derived from which optional attributes are present.
    pub fn stage(&self) -> EnrichmentStage {
        if self.composition_id.is_some() || self.artist_id.is_some() {
            EnrichmentStage::Linked
        } else if self.spotify_url.is_some() || !self.review.is_empty() {
            EnrichmentStage::Enriched
        } else {
            EnrichmentStage::Tracked
        }
    }

    /// Whether a description should be generated in song-and-artist form.
    pub fn is_top_ten(&self) -> bool {
        self.peak_rank <= 10
    }
}

/// Builder for `Song`, mostly used to seed tests and dry-run previews.
///
/// # Examples
///
/// ```
/// use hot100::models::{SongBuilder, SongId};
///
/// let song = SongBuilder::new()
///     .id(SongId::new(1))
///     .title("Hello")
///     .artist("Adele")
///     .year(2015)
///     .build();
///
/// assert_eq!(song.peak_rank, 1);
/// assert_eq!(song.slug, "adele-hello");
/// ```
#[derive(Debug, Default)]
pub struct SongBuilder {
    id: Option<SongId>,
    title: Option<String>,
    artist: Option<String>,
    year: Option<i32>,
    peak_rank: Option<u32>,
    weeks_on_chart: Option<u32>,
    review: Option<String>,
    spotify_url: Option<String>,
}

impl SongBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: SongId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn peak_rank(mut self, peak_rank: u32) -> Self {
        self.peak_rank = Some(peak_rank);
        self
    }

    pub fn weeks_on_chart(mut self, weeks: u32) -> Self {
        self.weeks_on_chart = Some(weeks);
        self
    }

    pub fn review(mut self, review: impl Into<String>) -> Self {
        self.review = Some(review.into());
        self
    }

    pub fn spotify_url(mut self, url: impl Into<String>) -> Self {
        self.spotify_url = Some(url.into());
        self
    }

    /// Builds the `Song`, deriving slug and match key from title and artist.
    ///
    /// # Panics
    ///
    /// Panics if `id`, `title` or `artist` have not been set.
    pub fn build(self) -> Song {
        let title = self.title.expect("title is required");
        let artist = self.artist.expect("artist is required");
        let match_key = crate::normalize::MatchKey::new(&title, &artist)
            .map(|key| key.as_storage())
            .unwrap_or_default();

        Song {
            id: self.id.expect("id is required"),
            slug: crate::normalize::song_slug(&title, &artist),
            match_key,
            title,
            artist,
            year: self.year.unwrap_or(2000),
            peak_rank: self.peak_rank.unwrap_or(1),
            weeks_on_chart: self.weeks_on_chart.unwrap_or(1),
            review: self.review.unwrap_or_default(),
            spotify_url: self.spotify_url,
            youtube_url: None,
            image_url: None,
            average_user_score: None,
            total_ratings: 0,
            composition_id: None,
            is_original_recording: true,
            artist_id: None,
        }
    }
}
