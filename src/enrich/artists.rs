//! Artist identities: creation from chart credits, registry enrichment and
//! collaboration linking.

use anyhow::Result;

use super::musicbrainz::EARLIEST_BEGIN_YEAR;
use super::{Enricher, Outcome};
use crate::catalog::refresh_song_counts;
use crate::models::{Artist, ArtistProfile, RelationshipType, TagCount, TagSource};
use crate::normalize::{is_collaboration_name, split_collaboration};

/// Tags kept per artist.
const MAX_TAGS: usize = 5;

/// Folksonomy tags that describe listeners rather than music.
const NOISE_TAGS: [&str; 5] = [
    "seen live",
    "favorites",
    "favourite",
    "albums i own",
    "favorite artists",
];

/// Outcome counts of linking chart credits to identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub artists_created: usize,
    pub songs_linked: usize,
    /// Credits with no identity (only when not creating missing ones).
    pub unmatched: usize,
}

/// Which artists an enrichment pass visits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistOptions {
    pub limit: Option<usize>,
    /// Case-insensitive substring of the artist name.
    pub artist: Option<String>,
    /// Revisit enriched artists and overwrite their fields.
    pub force: bool,
}

/// Outcome counts of an artist enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtistReport {
    pub enriched: usize,
    pub unchanged: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Collaboration credits linked to at least one constituent.
    pub collaborations: usize,
    pub tags_added: usize,
    pub relationships_added: usize,
}

/// Highest-count tags first, capped, with noise tags dropped.
///
/// Noise tags still use up one of the capped slots.
fn select_tags(tags: &[TagCount]) -> Vec<(String, f64)> {
    let mut sorted: Vec<&TagCount> = tags.iter().filter(|t| t.count > 0).collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));
    sorted
        .into_iter()
        .take(MAX_TAGS)
        .map(|t| (t.name.trim().to_lowercase(), (f64::from(t.count) / 100.0).min(1.0)))
        .filter(|(name, _)| !name.is_empty() && !NOISE_TAGS.contains(&name.as_str()))
        .collect()
}

/// A profile is only trusted for an exact name match of a modern act.
fn accept_profile(artist: &Artist, profile: &ArtistProfile) -> bool {
    profile.name.to_lowercase() == artist.name.to_lowercase()
        && profile
            .begin_year
            .is_none_or(|year| year >= EARLIEST_BEGIN_YEAR)
}

impl Enricher<'_> {
    /// Links every chart credit to an artist identity of the same name,
    /// creating missing identities when `create_missing` is set.
    pub fn sync_artists(&self, create_missing: bool) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for (credit, songs) in self.catalog.artist_credits()? {
            let name = credit.trim();
            if name.is_empty() {
                continue;
            }

            let artist = match self.catalog.artist_by_name(name)? {
                Some(artist) => artist,
                None if create_missing => {
                    report.artists_created += 1;
                    tracing::debug!(artist = name, songs, "artist created");
                    self.catalog.create_artist(name)?
                }
                None => {
                    report.unmatched += 1;
                    continue;
                }
            };

            report.songs_linked += self.catalog.link_songs_to_artist(&credit, artist.id)?;
        }

        self.catalog.database().transaction(refresh_song_counts)?;

        tracing::info!(
            created = report.artists_created,
            linked = report.songs_linked,
            unmatched = report.unmatched,
            "artist sync finished"
        );
        Ok(report)
    }

    /// Fills artist identities from the registry, most songs first.
    ///
    /// Credits naming several acts that the registry does not know as one
    /// act are never enriched; they are linked to their constituent
    /// artists instead.
    pub fn enrich_artists(&self, options: &ArtistOptions) -> Result<ArtistReport> {
        let mut report = ArtistReport::default();
        let Some(source) = &self.artists else {
            tracing::warn!("no artist metadata source configured");
            return Ok(report);
        };

        let artists = self.catalog.artists_for_enrichment(
            options.force,
            options.artist.as_deref(),
            options.limit,
        )?;

        for artist in artists {
            let outcome = match (&artist.musicbrainz_id, options.force) {
                (Some(id), true) => self.call(&artist.name, || source.artist_by_id(id)),
                _ => self.call(&artist.name, || source.lookup_artist(&artist.name)),
            };

            match outcome {
                Outcome::Found(profile) if accept_profile(&artist, &profile) => {
                    self.apply_profile(&artist, &profile, options.force, &mut report)?;
                }
                Outcome::Found(_) | Outcome::NotFound => {
                    if is_collaboration_name(&artist.name) {
                        if self.link_collaboration(&artist)? > 0 {
                            report.collaborations += 1;
                        }
                    } else {
                        tracing::debug!(artist = %artist.name, "no registry match");
                        report.not_found += 1;
                    }
                }
                Outcome::Failed => report.failed += 1,
            }
        }

        tracing::info!(
            enriched = report.enriched,
            unchanged = report.unchanged,
            not_found = report.not_found,
            failed = report.failed,
            collaborations = report.collaborations,
            "artist enrichment finished"
        );
        Ok(report)
    }

    fn apply_profile(
        &self,
        artist: &Artist,
        profile: &ArtistProfile,
        force: bool,
        report: &mut ArtistReport,
    ) -> Result<()> {
        let changed = self.catalog.fill_artist_profile(artist.id, profile, force)?;

        let (tags, source) = self.artist_tags(artist, profile);
        let mut tags_added = 0;
        for (name, confidence) in tags {
            if self.catalog.upsert_artist_tag(artist.id, &name, confidence, source)? {
                tags_added += 1;
            }
        }

        let mut relationships_added = 0;
        for relation in &profile.relations {
            let Some(kind) = RelationshipType::from_registry_label(&relation.label) else {
                continue;
            };
            let Some(target) = self
                .catalog
                .artist_by_musicbrainz_id(&relation.target_musicbrainz_id)?
            else {
                continue;
            };
            let (from, to) = if relation.backward {
                (target.id, artist.id)
            } else {
                (artist.id, target.id)
            };
            if self.catalog.add_relationship(from, to, kind, 1.0)? {
                relationships_added += 1;
            }
        }

        if changed || tags_added > 0 {
            tracing::debug!(artist = %artist.name, tags_added, "artist enriched");
            report.enriched += 1;
        } else {
            report.unchanged += 1;
        }
        report.tags_added += tags_added;
        report.relationships_added += relationships_added;
        Ok(())
    }

    /// Registry tags, or the tag source's when the registry has none.
    fn artist_tags(
        &self,
        artist: &Artist,
        profile: &ArtistProfile,
    ) -> (Vec<(String, f64)>, TagSource) {
        let registry = select_tags(&profile.tags);
        if !registry.is_empty() {
            return (registry, TagSource::Musicbrainz);
        }
        let Some(source) = &self.tags else {
            return (registry, TagSource::Musicbrainz);
        };
        match self.call(&artist.name, || source.top_tags(&artist.name)) {
            Outcome::Found(tags) => (select_tags(&tags), TagSource::Lastfm),
            Outcome::NotFound | Outcome::Failed => (Vec::new(), TagSource::Musicbrainz),
        }
    }

    /// Links a collaboration credit to each constituent artist that exists
    /// and is enriched. Returns the number of new links.
    fn link_collaboration(&self, collaboration: &Artist) -> Result<usize> {
        let names = split_collaboration(&collaboration.name);
        if names.len() < 2 {
            tracing::debug!(artist = %collaboration.name, "collaboration could not be split");
            return Ok(0);
        }

        let mut linked = 0;
        for name in names {
            let Some(member) = self.catalog.artist_by_name(&name)? else {
                tracing::debug!(artist = %name, "constituent not in catalog");
                continue;
            };
            if !member.is_enriched() {
                tracing::debug!(artist = %name, "constituent not enriched yet");
                continue;
            }
            if self.catalog.add_relationship(
                collaboration.id,
                member.id,
                RelationshipType::Collaboration,
                1.0,
            )? {
                linked += 1;
            }
        }
        Ok(linked)
    }
}
