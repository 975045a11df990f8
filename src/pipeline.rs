//! Batch runs wiring fetch, reconciliation, enrichment and rebuilds.

use std::sync::Arc;

use anyhow::{Context, Result};
use time::Date;

use crate::aggregate::{Aggregates, RebuildReport};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::enrich::{
    Discogs, EnrichOptions, EnrichReport, Enricher, Lastfm, MusicBrainz, OpenAiCoverGuess,
    OpenAiDescriber, SecondHandSongs, SpotifyClient, Wikipedia,
};
use crate::fetch::{FeedImport, FetchError};
use crate::http::{HttpClient, RetryPolicy};
use crate::models::{ChartSnapshot, PeakDistribution};
use crate::reconcile::{ReconcileOptions, ReconcileReport, Reconciler};

/// Which external sources a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSelection {
    pub spotify: bool,
    pub descriptions: bool,
    /// Ask the language model about entries no other cover source settled.
    pub cover_guess: bool,
}

impl Default for SourceSelection {
    fn default() -> Self {
        Self {
            spotify: true,
            descriptions: true,
            cover_guess: false,
        }
    }
}

/// Builds an [`Enricher`] backed by the production services.
///
/// Services without credentials in `config` are left out: no Spotify
/// credentials means no media links, no OpenAI key means no descriptions.
/// Cover sources are consulted SecondHandSongs first, then Wikipedia,
/// then Discogs when a token is set, then the language model when
/// selected. Last.fm tags artists the registry has no tags for.
pub fn production_enricher<'a>(
    catalog: &'a Catalog,
    config: &Config,
    selection: SourceSelection,
) -> Result<Enricher<'a>> {
    let http = HttpClient::new(&config.user_agent).context("failed to build HTTP client")?;
    let musicbrainz = Arc::new(MusicBrainz::new(http.clone()));

    let mut builder = Enricher::builder(catalog)
        .cover_source(Arc::new(SecondHandSongs::new(
            http.clone(),
            config.secondhandsongs_api_key.clone(),
        )))
        .cover_source(Arc::new(Wikipedia::new(http.clone())))
        .writers(musicbrainz.clone())
        .artist_metadata(musicbrainz)
        .request_delay(config.request_delay)
        .retry(RetryPolicy::new(config.retry_delays.clone()));

    if let Some(token) = &config.discogs_token {
        builder = builder.cover_source(Arc::new(Discogs::new(http.clone(), token.clone())));
    }
    match (&config.openai_api_key, selection.cover_guess) {
        (Some(key), true) => {
            builder = builder.cover_source(Arc::new(OpenAiCoverGuess::new(
                http.clone(),
                key.clone(),
                config.openai_model.clone(),
            )));
        }
        (None, true) => tracing::warn!("OpenAI key not configured, skipping cover guesses"),
        _ => {}
    }
    if let Some(key) = &config.lastfm_api_key {
        builder = builder.artist_tags(Arc::new(Lastfm::new(http.clone(), key.clone())));
    }

    match (&config.spotify, selection.spotify) {
        (Some(credentials), true) => {
            builder = builder.media_links(Arc::new(SpotifyClient::new(
                http.clone(),
                credentials.clone(),
            )));
        }
        (None, true) => tracing::warn!("Spotify credentials not configured, skipping media links"),
        _ => {}
    }

    match (&config.openai_api_key, selection.descriptions) {
        (Some(key), true) => {
            builder = builder.descriptions(Arc::new(OpenAiDescriber::new(
                http,
                key.clone(),
                config.openai_model.clone(),
            )));
        }
        (None, true) => tracing::warn!("OpenAI key not configured, skipping descriptions"),
        _ => {}
    }

    Ok(builder.build())
}

/// Options of the `update` and `import` runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Reconcile in preview mode; no enrichment or rebuild.
    pub dry_run: bool,
    /// Reconcile a chart date that history already holds.
    pub force: bool,
    /// Keep only the first rows of each snapshot.
    pub limit: Option<usize>,
    /// Enrich the entries the run created or changed.
    pub enrich: Option<EnrichOptions>,
}

/// Operator-facing result of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Latest chart date processed.
    pub chart_date: Option<Date>,
    /// History already held this chart; nothing was reconciled.
    pub up_to_date: bool,
    pub snapshots: usize,
    pub reconcile: ReconcileReport,
    pub enrichment: EnrichReport,
    pub rebuild: Option<RebuildReport>,
    /// Peak buckets of the fetched rows, for previews.
    pub distribution: PeakDistribution,
}

impl RunSummary {
    pub fn created(&self) -> usize {
        self.reconcile.created
    }

    pub fn updated(&self) -> usize {
        self.reconcile.updated
    }

    pub fn skipped(&self) -> usize {
        self.reconcile.skipped
    }

    /// Failed row writes plus lookups with no answer this run.
    pub fn failed(&self) -> usize {
        self.reconcile.failed + self.enrichment.failed
    }
}

fn add_distribution(total: &mut PeakDistribution, snapshot: &ChartSnapshot) {
    let d = snapshot.peak_distribution();
    total.number_one += d.number_one;
    total.top_ten += d.top_ten;
    total.top_fifty += d.top_fifty;
    total.rest += d.rest;
}

/// Runs the stages in order over one catalog.
pub struct Pipeline<'a> {
    catalog: &'a Catalog,
    enricher: Enricher<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(enricher: Enricher<'a>) -> Self {
        Self {
            catalog: enricher.catalog(),
            enricher,
        }
    }

    pub fn enricher(&self) -> &Enricher<'a> {
        &self.enricher
    }

    /// Fetches the latest chart and folds it in.
    ///
    /// A fetch failure aborts before any write. Unless forced, a chart date
    /// already present in history is not reconciled again.
    pub fn update(
        &self,
        fetch: impl FnOnce() -> Result<ChartSnapshot, FetchError>,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        let mut snapshot = fetch().context("failed to fetch the current chart")?;
        let mut summary = RunSummary {
            chart_date: Some(snapshot.chart_date),
            ..Default::default()
        };

        if !options.force && self.catalog.is_chart_up_to_date(snapshot.chart_date)? {
            tracing::info!(chart_date = %snapshot.chart_date, "chart already reconciled");
            summary.up_to_date = true;
            return Ok(summary);
        }

        if let Some(limit) = options.limit {
            snapshot.rows.truncate(limit);
        }
        self.fold_in(&[snapshot], options, &mut summary)?;
        Ok(summary)
    }

    /// Folds every snapshot of a bulk import in, oldest first.
    ///
    /// In dry-run mode each week is previewed against the catalog as it
    /// stands, so entries first seen in an earlier week count as created
    /// again.
    pub fn import(&self, mut import: FeedImport, options: &RunOptions) -> Result<RunSummary> {
        if let Some(limit) = options.limit {
            import.snapshots.truncate(limit);
        }
        let mut summary = RunSummary {
            chart_date: import.snapshots.last().map(|s| s.chart_date),
            ..Default::default()
        };
        summary.reconcile.skipped += import.skipped_weeks;

        self.fold_in(&import.snapshots, options, &mut summary)?;
        Ok(summary)
    }

    fn fold_in(
        &self,
        snapshots: &[ChartSnapshot],
        options: &RunOptions,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let reconciler = Reconciler::new(self.catalog);
        let reconcile_options = ReconcileOptions {
            dry_run: options.dry_run,
        };

        for snapshot in snapshots {
            add_distribution(&mut summary.distribution, snapshot);
            let report = reconciler.reconcile(snapshot, &reconcile_options)?;
            summary.reconcile.absorb(report);
            summary.snapshots += 1;
        }

        if options.dry_run {
            return Ok(());
        }

        if let Some(enrich) = &options.enrich {
            summary.enrichment = self
                .enricher
                .enrich_songs(&summary.reconcile.touched, enrich)?;
        }

        summary.rebuild = Some(Aggregates::new(self.catalog).rebuild_all()?);

        tracing::info!(
            snapshots = summary.snapshots,
            created = summary.created(),
            updated = summary.updated(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "run finished"
        );
        Ok(())
    }
}
