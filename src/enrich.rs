//! Enrichment of catalog entries and artist identities from external sources.
//!
//! Every lookup goes through [`Enricher`], which spaces calls with a fixed
//! delay, retries transient failures with backoff and turns the outcome
//! into found / not found / failed. Results are written fill-if-empty
//! unless the run is forced.

mod artists;
mod cover_guess;
mod covers;
mod describer;
mod discogs;
mod lastfm;
mod musicbrainz;
mod secondhandsongs;
mod sources;
mod spotify;
mod wikipedia;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::catalog::Catalog;
use crate::http::{HttpError, RateLimiter, RetryPolicy};
use crate::models::SongId;

pub use artists::{ArtistOptions, ArtistReport, SyncReport};
pub use cover_guess::{OpenAiCoverGuess, cover_prompt};
pub use covers::{CoverOptions, CoverReport, classify};
pub use describer::{OpenAiDescriber, description_prompt};
pub use discogs::Discogs;
pub use lastfm::Lastfm;
pub use musicbrainz::MusicBrainz;
pub use secondhandsongs::SecondHandSongs;
pub use sources::{
    ArtistMetadataSource, ArtistTagSource, CoverEvidence, CoverSource, DescriptionSource,
    Lookup, MediaLinkSource, WriterCredits, WriterSource,
};
pub use spotify::SpotifyClient;
pub use wikipedia::{Wikipedia, analyze_page};

/// Result of one rate-limited, retried lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome<T> {
    Found(T),
    /// The service definitively has nothing.
    NotFound,
    /// No answer this run; a later run may succeed.
    Failed,
}

/// Which song attributes to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Overwrite attributes that already have a value.
    pub force: bool,
    pub media_links: bool,
    pub descriptions: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            force: false,
            media_links: true,
            descriptions: true,
        }
    }
}

/// Per-attribute counts of an enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    /// Attributes written.
    pub filled: usize,
    /// Attributes already set, or set to the same value.
    pub unchanged: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Requested ids that are not in the catalog.
    pub skipped: usize,
}

/// Builder for [`Enricher`].
///
/// Sources left unset are simply not consulted.
pub struct EnricherBuilder<'a> {
    catalog: &'a Catalog,
    media: Option<Arc<dyn MediaLinkSource>>,
    descriptions: Option<Arc<dyn DescriptionSource>>,
    covers: Vec<Arc<dyn CoverSource>>,
    writers: Option<Arc<dyn WriterSource>>,
    artists: Option<Arc<dyn ArtistMetadataSource>>,
    tags: Option<Arc<dyn ArtistTagSource>>,
    request_delay: Duration,
    retry: RetryPolicy,
}

impl<'a> EnricherBuilder<'a> {
    pub fn media_links(mut self, source: Arc<dyn MediaLinkSource>) -> Self {
        self.media = Some(source);
        self
    }

    pub fn descriptions(mut self, source: Arc<dyn DescriptionSource>) -> Self {
        self.descriptions = Some(source);
        self
    }

    /// Adds a cover source; sources are consulted in the order added,
    /// fallbacks only while no earlier source settled the entry.
    pub fn cover_source(mut self, source: Arc<dyn CoverSource>) -> Self {
        self.covers.push(source);
        self
    }

    pub fn writers(mut self, source: Arc<dyn WriterSource>) -> Self {
        self.writers = Some(source);
        self
    }

    pub fn artist_metadata(mut self, source: Arc<dyn ArtistMetadataSource>) -> Self {
        self.artists = Some(source);
        self
    }

    /// Tag source for artists whose registry entry has no tags.
    pub fn artist_tags(mut self, source: Arc<dyn ArtistTagSource>) -> Self {
        self.tags = Some(source);
        self
    }

    /// Minimum pause between consecutive lookups (default 1s).
    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Enricher<'a> {
        Enricher {
            catalog: self.catalog,
            media: self.media,
            descriptions: self.descriptions,
            covers: self.covers,
            writers: self.writers,
            artists: self.artists,
            tags: self.tags,
            limiter: RateLimiter::new(self.request_delay),
            retry: self.retry,
        }
    }
}

/// Runs enrichment passes against a [`Catalog`].
pub struct Enricher<'a> {
    catalog: &'a Catalog,
    media: Option<Arc<dyn MediaLinkSource>>,
    descriptions: Option<Arc<dyn DescriptionSource>>,
    covers: Vec<Arc<dyn CoverSource>>,
    writers: Option<Arc<dyn WriterSource>>,
    artists: Option<Arc<dyn ArtistMetadataSource>>,
    tags: Option<Arc<dyn ArtistTagSource>>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl<'a> Enricher<'a> {
    pub fn builder(catalog: &'a Catalog) -> EnricherBuilder<'a> {
        EnricherBuilder {
            catalog,
            media: None,
            descriptions: None,
            covers: Vec::new(),
            writers: None,
            artists: None,
            tags: None,
            request_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Performs one lookup under the rate limit and retry policy.
    pub(crate) fn call<T>(
        &self,
        what: &str,
        mut lookup: impl FnMut() -> Result<Lookup<T>, HttpError>,
    ) -> Outcome<T> {
        let result = self.retry.run(|| {
            self.limiter.wait();
            lookup()
        });

        match result {
            Ok(Lookup::Found(value)) => Outcome::Found(value),
            Ok(Lookup::NotFound) => {
                tracing::debug!(what, "not found");
                Outcome::NotFound
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(what, "not found");
                Outcome::NotFound
            }
            Err(e) => {
                tracing::warn!(what, error = %e, "lookup failed");
                Outcome::Failed
            }
        }
    }

    /// Fills media links and descriptions for the given entries.
    ///
    /// Unknown ids are counted as skipped. A failed lookup leaves the
    /// attribute empty for a later run.
    pub fn enrich_songs(&self, ids: &[SongId], options: &EnrichOptions) -> Result<EnrichReport> {
        let mut report = EnrichReport::default();
        let media = self.media.as_ref().filter(|_| options.media_links);
        let descriptions = self.descriptions.as_ref().filter(|_| options.descriptions);

        for &id in ids {
            let Some(song) = self.catalog.song(id)? else {
                report.skipped += 1;
                continue;
            };
            let label = format!("{} - {}", song.artist, song.title);

            if let Some(source) = media {
                let has_link = song.spotify_url.as_deref().is_some_and(|u| !u.is_empty());
                if has_link && !options.force {
                    report.unchanged += 1;
                } else {
                    match self.call(&label, || source.find_track(&song.title, &song.artist)) {
                        Outcome::Found(url) => {
                            if self.catalog.fill_spotify_url(id, &url, options.force)? {
                                tracing::debug!(song = %label, %url, "media link added");
                                report.filled += 1;
                            } else {
                                report.unchanged += 1;
                            }
                        }
                        Outcome::NotFound => report.not_found += 1,
                        Outcome::Failed => report.failed += 1,
                    }
                }
            }

            if let Some(source) = descriptions {
                if !song.review.is_empty() && !options.force {
                    report.unchanged += 1;
                } else {
                    match self.call(&label, || source.describe(&song)) {
                        Outcome::Found(text) => {
                            if self.catalog.fill_review(id, &text, options.force)? {
                                tracing::debug!(song = %label, "description added");
                                report.filled += 1;
                            } else {
                                report.unchanged += 1;
                            }
                        }
                        Outcome::NotFound => report.not_found += 1,
                        Outcome::Failed => report.failed += 1,
                    }
                }
            }
        }

        tracing::info!(
            filled = report.filled,
            unchanged = report.unchanged,
            not_found = report.not_found,
            failed = report.failed,
            "song enrichment finished"
        );
        Ok(report)
    }
}
