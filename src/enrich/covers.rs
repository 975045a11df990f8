//! Cover detection and composition linking.

use anyhow::Result;

use super::{CoverEvidence, Enricher, Outcome, WriterCredits};
use crate::catalog::CompositionDraft;
use crate::models::{CoverClassification, DetectionMethod, Song, SongId};

/// Which entries a cover pass visits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverOptions {
    pub limit: Option<usize>,
    /// Case-insensitive substring of the artist credit.
    pub artist: Option<String>,
    /// Classify without creating or linking compositions.
    pub dry_run: bool,
}

/// Outcome counts of a cover pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverReport {
    pub examined: usize,
    pub covers: usize,
    pub originals: usize,
    /// No source produced any signal; left unlinked.
    pub unlinked: usize,
    /// A lookup failed; left unlinked for a later run.
    pub failed: usize,
    pub classifications: Vec<(SongId, CoverClassification)>,
}

/// Writer-overlap rule: none of the writers, nor any part of a writer's
/// name longer than three characters, appears in the artist credit, and
/// there are at most two writers.
///
/// Prone to false positives for acts performing under a stage name.
fn writers_suggest_cover(writers: &[String], artist: &str) -> bool {
    let artist = artist.to_lowercase();
    let overlaps = writers.iter().map(|w| w.trim().to_lowercase()).any(|name| {
        artist.contains(&name)
            || name
                .split_whitespace()
                .any(|part| part.chars().count() > 3 && artist.contains(part))
    });
    !overlaps && writers.len() <= 2
}

/// Combines source answers into a verdict, `None` when nothing answered.
///
/// `evidence` is in source priority order, tagged with each source's
/// name and detection method. A cover-database answer decides either
/// way; otherwise the first positive encyclopedia answer marks a cover;
/// otherwise the writer-overlap rule decides.
pub fn classify(
    song: &Song,
    evidence: &[(&'static str, DetectionMethod, CoverEvidence)],
    writers: Option<(&'static str, &WriterCredits)>,
) -> Option<CoverClassification> {
    if evidence.is_empty() && writers.is_none() {
        return None;
    }

    let decisive = evidence
        .iter()
        .find(|(_, method, _)| *method == DetectionMethod::CoverDatabase)
        .or_else(|| evidence.iter().find(|(_, _, e)| e.is_cover));

    let (is_cover, method) = match decisive {
        Some((_, method, e)) => (e.is_cover, e.is_cover.then_some(*method)),
        None => match writers {
            Some((_, credits)) if writers_suggest_cover(&credits.writers, &song.artist) => {
                (true, Some(DetectionMethod::WriterHeuristic))
            }
            _ => (false, None),
        },
    };

    let (original_artist, original_year) = if is_cover {
        evidence
            .iter()
            .map(|(_, _, e)| e)
            .find(|e| e.is_cover && e.original_artist.is_some())
            .map(|e| (e.original_artist.clone(), e.original_year))
            .unwrap_or_default()
    } else {
        (None, None)
    };

    let mut sources: Vec<&'static str> = evidence.iter().map(|(name, _, _)| *name).collect();
    if let Some((name, _)) = writers {
        sources.push(name);
    }

    Some(CoverClassification {
        is_cover,
        original_artist,
        original_year,
        writers: writers.and_then(|(_, credits)| credits.joined()),
        musicbrainz_work_id: writers.and_then(|(_, credits)| credits.work_id.clone()),
        method,
        sources,
    })
}

/// A cover was found, or a cover database answered either way.
fn settled(evidence: &[(&'static str, DetectionMethod, CoverEvidence)]) -> bool {
    evidence
        .iter()
        .any(|(_, method, e)| e.is_cover || *method == DetectionMethod::CoverDatabase)
}

/// Composition fields for a classified entry. Originals record their own
/// artist; the year falls back to the entry's year.
fn draft_for(song: &Song, classification: &CoverClassification) -> CompositionDraft {
    let original_artist = match &classification.original_artist {
        Some(artist) => Some(artist.clone()),
        None if !classification.is_cover => Some(song.artist.clone()),
        None => None,
    };

    CompositionDraft {
        title: song.title.clone(),
        original_writer: classification.writers.clone(),
        original_artist,
        original_year: classification.original_year.or(Some(song.year)),
        is_traditional: classification.is_traditional(),
        musicbrainz_work_id: classification.musicbrainz_work_id.clone(),
        verified_source: Some(classification.sources.join("+")),
    }
}

impl Enricher<'_> {
    /// Classifies entries without a composition and links them to one.
    ///
    /// Entries are visited worst peak first. An entry is only linked when
    /// some source answered and no lookup failed.
    pub fn detect_covers(&self, options: &CoverOptions) -> Result<CoverReport> {
        let songs = self
            .catalog
            .songs_without_composition(options.artist.as_deref(), options.limit)?;
        let mut report = CoverReport::default();

        for song in songs {
            report.examined += 1;
            let label = format!("{} - {}", song.artist, song.title);
            let mut failed = false;

            let mut evidence: Vec<(&'static str, DetectionMethod, CoverEvidence)> = Vec::new();
            for source in &self.covers {
                if source.is_fallback() && settled(&evidence) {
                    continue;
                }
                match self.call(&label, || source.check(&song)) {
                    Outcome::Found(e) => evidence.push((source.name(), source.method(), e)),
                    Outcome::NotFound => {}
                    Outcome::Failed => failed = true,
                }
            }

            let writers = match &self.writers {
                Some(source) => match self.call(&label, || source.writers(&song.title, &song.artist)) {
                    Outcome::Found(credits) => Some((source.name(), credits)),
                    Outcome::NotFound => None,
                    Outcome::Failed => {
                        failed = true;
                        None
                    }
                },
                None => None,
            };

            if failed {
                report.failed += 1;
                continue;
            }

            let Some(classification) =
                classify(&song, &evidence, writers.as_ref().map(|(name, c)| (*name, c)))
            else {
                tracing::debug!(song = %label, "no source knows this song");
                report.unlinked += 1;
                continue;
            };

            if classification.is_cover {
                report.covers += 1;
            } else {
                report.originals += 1;
            }
            tracing::info!(
                song = %label,
                is_cover = classification.is_cover,
                method = ?classification.method,
                original_artist = classification.original_artist.as_deref().unwrap_or("-"),
                writers = classification.writers.as_deref().unwrap_or("-"),
                "classified"
            );

            if !options.dry_run {
                let draft = draft_for(&song, &classification);
                self.catalog
                    .link_composition(song.id, &draft, !classification.is_cover)?;
            }
            report.classifications.push((song.id, classification));
        }

        tracing::info!(
            examined = report.examined,
            covers = report.covers,
            originals = report.originals,
            unlinked = report.unlinked,
            failed = report.failed,
            "cover detection finished"
        );
        Ok(report)
    }
}
