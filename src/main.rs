use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hot100::aggregate::Aggregates;
use hot100::backfill::{BackfillOptions, HistoryBackfill};
use hot100::config::{Config, SystemClock};
use hot100::enrich::{ArtistOptions, CoverOptions, EnrichOptions};
use hot100::feedback::Feedback;
use hot100::fetch::{FeedOptions, FeedSource, FetchError, PageSource, load_history_csv};
use hot100::http::{HttpClient, RetryPolicy};
use hot100::models::{FeedbackError, Score};
use hot100::pipeline::{Pipeline, RunOptions, RunSummary, SourceSelection, production_enricher};
use hot100::{Catalog, Database};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// hot100 - Billboard Hot 100 catalog maintenance
#[derive(Parser)]
#[command(name = "hot100")]
#[command(about = "Reconciles Billboard Hot 100 charts into a song catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the current chart, reconcile, enrich new entries and rebuild
    Update(UpdateCommand),
    /// Import weekly charts from the bulk historical feed
    Import(ImportCommand),
    /// Attach chart history from a weekly history CSV to existing entries
    BackfillHistory(BackfillHistoryCommand),
    /// Add media links and descriptions to entries missing them
    Enrich(EnrichCommand),
    /// Classify entries as covers or originals and link compositions
    DetectCovers(DetectCoversCommand),
    /// Link chart credits to artist identities
    SyncArtists(SyncArtistsCommand),
    /// Fill artist identities from the music registry
    EnrichArtists(EnrichArtistsCommand),
    /// Rebuild leaderboards and cached counters
    Rebuild,
    /// Rate a song as a user
    Rate(RateCommand),
}

/// Source selection shared by enriching commands
#[derive(Args, Clone, Copy)]
struct SourceFlags {
    /// Do not look up Spotify links
    #[arg(long)]
    no_spotify: bool,

    /// Do not generate descriptions
    #[arg(long)]
    no_descriptions: bool,
}

impl SourceFlags {
    fn selection(self) -> SourceSelection {
        SourceSelection {
            spotify: !self.no_spotify,
            descriptions: !self.no_descriptions,
            cover_guess: false,
        }
    }

    fn enrich_options(self, force: bool) -> EnrichOptions {
        EnrichOptions {
            force,
            media_links: !self.no_spotify,
            descriptions: !self.no_descriptions,
        }
    }
}

#[derive(Parser)]
struct UpdateCommand {
    /// Preview the chart without writing
    #[arg(long)]
    dry_run: bool,

    /// Reconcile even if this chart date is already stored
    #[arg(long)]
    force: bool,

    /// Only process the first N rows
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Skip enrichment of new entries
    #[arg(long)]
    no_enrich: bool,

    #[command(flatten)]
    sources: SourceFlags,
}

#[derive(Parser)]
struct ImportCommand {
    /// Ignore weeks before this year
    #[arg(long, default_value_t = 2009)]
    start_year: i32,

    /// Only import the first N weeks
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Preview without writing
    #[arg(long)]
    dry_run: bool,

    /// Enrich the imported entries
    #[arg(long)]
    enrich: bool,

    /// Overwrite existing links and descriptions while enriching
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    sources: SourceFlags,
}

#[derive(Parser)]
struct BackfillHistoryCommand {
    /// CSV with columns date,rank,song,artist,last-week,peak-rank,weeks-on-board
    path: PathBuf,

    /// Only visit the first N catalog entries
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Count changes without writing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser)]
struct EnrichCommand {
    /// Only process the first N entries
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Overwrite existing values
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    sources: SourceFlags,
}

#[derive(Parser)]
struct DetectCoversCommand {
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Only entries whose artist contains this text
    #[arg(long)]
    artist: Option<String>,

    /// Classify without linking compositions
    #[arg(long)]
    dry_run: bool,

    /// Ask the language model about entries no other source settled
    #[arg(long)]
    use_llm: bool,
}

#[derive(Parser)]
struct SyncArtistsCommand {
    /// Create identities for credits that have none
    #[arg(long)]
    create_missing: bool,
}

#[derive(Parser)]
struct EnrichArtistsCommand {
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Only artists whose name contains this text
    #[arg(long)]
    artist: Option<String>,

    /// Revisit enriched artists and overwrite their fields
    #[arg(long)]
    force: bool,
}

#[derive(Parser)]
struct RateCommand {
    username: String,

    /// Song slug, e.g. `miley-cyrus-flowers`
    song: String,

    /// Score from 1 to 10
    score: u8,

    /// Optional comment stored with the rating
    #[arg(long)]
    comment: Option<String>,
}

/// Invalid operator input that is not a feedback validation error.
#[derive(Debug, Error)]
#[error("{0}")]
struct UsageError(String);

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(&cli.command) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Logs to stderr, filtered by `LOG_LEVEL` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// User errors are invalid input; everything else is an internal failure.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.downcast_ref::<FeedbackError>().is_some()
            || cause.downcast_ref::<UsageError>().is_some()
            || matches!(
                cause.downcast_ref::<FetchError>(),
                Some(FetchError::Io(_) | FetchError::Csv(_) | FetchError::MissingColumn(_))
            )
    })
}

fn run(command: &Commands) -> Result<()> {
    let config = Config::from_env()?;
    ensure_database_directory(&config.database_path)?;
    let db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open database: {}", config.database_path.display())
    })?;
    let catalog = Catalog::new(db);

    match command {
        Commands::Update(cmd) => handle_update(cmd, &config, &catalog),
        Commands::Import(cmd) => handle_import(cmd, &config, &catalog),
        Commands::BackfillHistory(cmd) => handle_backfill_history(cmd, &catalog),
        Commands::Enrich(cmd) => handle_enrich(cmd, &config, &catalog),
        Commands::DetectCovers(cmd) => handle_detect_covers(cmd, &config, &catalog),
        Commands::SyncArtists(cmd) => handle_sync_artists(cmd, &config, &catalog),
        Commands::EnrichArtists(cmd) => handle_enrich_artists(cmd, &config, &catalog),
        Commands::Rebuild => handle_rebuild(&catalog),
        Commands::Rate(cmd) => handle_rate(cmd, &catalog),
    }
}

fn http_client(config: &Config) -> Result<HttpClient> {
    HttpClient::new(&config.user_agent).context("Failed to build HTTP client")
}

fn handle_update(cmd: &UpdateCommand, config: &Config, catalog: &Catalog) -> Result<()> {
    let source = PageSource::new(
        http_client(config)?,
        &config.chart_url,
        RetryPolicy::new(config.retry_delays.clone()),
        std::sync::Arc::new(SystemClock),
    );
    let pipeline = Pipeline::new(production_enricher(catalog, config, cmd.sources.selection())?);
    let options = RunOptions {
        dry_run: cmd.dry_run,
        force: cmd.force,
        limit: cmd.limit,
        enrich: (!cmd.no_enrich).then(|| cmd.sources.enrich_options(false)),
    };

    let summary = pipeline.update(|| source.fetch_latest(), &options)?;
    if summary.up_to_date {
        if let Some(date) = summary.chart_date {
            println!("Chart dated {date} is already stored. Use --force to update anyway.");
        }
        return Ok(());
    }
    print_run_summary(&summary, cmd.dry_run);
    Ok(())
}

fn handle_import(cmd: &ImportCommand, config: &Config, catalog: &Catalog) -> Result<()> {
    let source = FeedSource::new(
        http_client(config)?,
        &config.feed_url,
        RetryPolicy::new(config.retry_delays.clone()),
    );
    let import = source.fetch(&FeedOptions {
        start_year: cmd.start_year,
        limit: cmd.limit,
    })?;

    let pipeline = Pipeline::new(production_enricher(catalog, config, cmd.sources.selection())?);
    let options = RunOptions {
        dry_run: cmd.dry_run,
        force: false,
        limit: None,
        enrich: cmd.enrich.then(|| cmd.sources.enrich_options(cmd.force)),
    };

    let summary = pipeline.import(import, &options)?;
    print_run_summary(&summary, cmd.dry_run);
    Ok(())
}

fn handle_enrich(cmd: &EnrichCommand, config: &Config, catalog: &Catalog) -> Result<()> {
    let enricher = production_enricher(catalog, config, cmd.sources.selection())?;
    let ids: Vec<_> = catalog
        .songs_for_enrichment(cmd.force, cmd.limit)?
        .into_iter()
        .map(|song| song.id)
        .collect();
    println!("Enriching {} entries", ids.len());

    let report = enricher.enrich_songs(&ids, &cmd.sources.enrich_options(cmd.force))?;
    println!(
        "Filled: {}  Unchanged: {}  Not found: {}  Failed: {}",
        report.filled, report.unchanged, report.not_found, report.failed
    );
    Ok(())
}

fn handle_backfill_history(cmd: &BackfillHistoryCommand, catalog: &Catalog) -> Result<()> {
    let history = load_history_csv(&cmd.path)?;
    println!("Loaded {} chart rows", history.rows.len());

    let report = HistoryBackfill::new(catalog).run(
        &history,
        &BackfillOptions {
            dry_run: cmd.dry_run,
            limit: cmd.limit,
        },
    )?;

    if cmd.dry_run {
        println!("[dry run] nothing was written");
    }
    println!(
        "Songs matched: {}  Without history: {}  Failed: {}",
        report.songs_matched, report.songs_missing, report.songs_failed
    );
    println!(
        "History created: {}  Corrected: {}  Unchanged: {}  Rows skipped: {}",
        report.history_created,
        report.history_updated,
        report.history_unchanged,
        report.skipped_rows
    );
    Ok(())
}

fn handle_detect_covers(cmd: &DetectCoversCommand, config: &Config, catalog: &Catalog) -> Result<()> {
    let selection = SourceSelection {
        cover_guess: cmd.use_llm,
        ..SourceSelection::default()
    };
    let enricher = production_enricher(catalog, config, selection)?;
    let report = enricher.detect_covers(&CoverOptions {
        limit: cmd.limit,
        artist: cmd.artist.clone(),
        dry_run: cmd.dry_run,
    })?;

    if cmd.dry_run {
        println!("[dry run] no compositions were linked");
    }
    println!(
        "Examined: {}  Covers: {}  Originals: {}  Unlinked: {}  Failed: {}",
        report.examined, report.covers, report.originals, report.unlinked, report.failed
    );
    Ok(())
}

fn handle_sync_artists(cmd: &SyncArtistsCommand, config: &Config, catalog: &Catalog) -> Result<()> {
    let enricher = production_enricher(catalog, config, SourceSelection::default())?;
    let report = enricher.sync_artists(cmd.create_missing)?;
    println!(
        "Artists created: {}  Songs linked: {}  Unmatched credits: {}",
        report.artists_created, report.songs_linked, report.unmatched
    );
    println!("Songs without an artist: {}", catalog.unlinked_song_count()?);
    Ok(())
}

fn handle_enrich_artists(
    cmd: &EnrichArtistsCommand,
    config: &Config,
    catalog: &Catalog,
) -> Result<()> {
    let enricher = production_enricher(catalog, config, SourceSelection::default())?;
    let report = enricher.enrich_artists(&ArtistOptions {
        limit: cmd.limit,
        artist: cmd.artist.clone(),
        force: cmd.force,
    })?;
    println!(
        "Enriched: {}  Unchanged: {}  Not found: {}  Failed: {}  Collaborations: {}",
        report.enriched, report.unchanged, report.not_found, report.failed, report.collaborations
    );
    println!(
        "Tags added: {}  Relationships added: {}",
        report.tags_added, report.relationships_added
    );
    Ok(())
}

fn handle_rebuild(catalog: &Catalog) -> Result<()> {
    let report = Aggregates::new(catalog).rebuild_all()?;
    println!(
        "Current chart: {}  Number ones: {}  Rated songs: {}  Compositions: {}",
        report.current_hot100, report.number_ones, report.ratings, report.compositions
    );
    Ok(())
}

fn handle_rate(cmd: &RateCommand, catalog: &Catalog) -> Result<()> {
    let score = Score::new(cmd.score)?;
    let song = catalog
        .song_by_slug(&cmd.song)?
        .ok_or_else(|| UsageError(format!("no song with slug '{}'", cmd.song)))?;

    let feedback = Feedback::new(catalog);
    let user = feedback.ensure_user(&cmd.username)?;
    let summary = feedback.rate(user, song.id, score)?;
    if let Some(body) = &cmd.comment {
        feedback.add_comment(user, song.id, body)?;
    }

    match summary.average {
        Some(average) => println!(
            "Rated '{}' by {}: {} ({} ratings, average {average:.1})",
            song.title,
            song.artist,
            score.get(),
            summary.count
        ),
        None => println!("Rated '{}' by {}", song.title, song.artist),
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary, dry_run: bool) {
    if dry_run {
        let d = summary.distribution;
        println!("[dry run] nothing was written");
        println!(
            "Peaks: #1: {}  #2-10: {}  #11-50: {}  #51-100: {}",
            d.number_one, d.top_ten, d.top_fifty, d.rest
        );
    }
    if let Some(date) = summary.chart_date {
        println!("Chart date: {date}");
    }
    println!(
        "Weeks: {}  Created: {}  Updated: {}  Skipped: {}  Failed: {}",
        summary.snapshots,
        summary.created(),
        summary.updated(),
        summary.skipped(),
        summary.failed()
    );
    if summary.enrichment.filled > 0 || summary.enrichment.failed > 0 {
        println!(
            "Enrichment filled: {}  not found: {}",
            summary.enrichment.filled, summary.enrichment.not_found
        );
    }
}

/// Ensures the parent directory of the database file exists.
fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn feedback_errors_are_user_errors() {
        let error = anyhow::Error::from(FeedbackError::ScoreOutOfRange(11));
        assert!(is_user_error(&error));

        let wrapped = anyhow::Error::from(UsageError("no song".into())).context("rating failed");
        assert!(is_user_error(&wrapped));

        assert!(!is_user_error(&anyhow::anyhow!("disk I/O error")));
        assert!(is_user_error(&anyhow::Error::from(FetchError::MissingColumn("song"))));
        assert!(!is_user_error(&anyhow::Error::from(FetchError::NoRows)));
    }

    #[test]
    fn backfill_takes_a_path_and_flags() {
        let cli = Cli::try_parse_from([
            "hot100",
            "backfill-history",
            "hot100.csv",
            "--dry-run",
            "--limit",
            "50",
        ])
        .unwrap();
        let Commands::BackfillHistory(cmd) = cli.command else {
            panic!("expected backfill-history");
        };
        assert_eq!(cmd.path, PathBuf::from("hot100.csv"));
        assert!(cmd.dry_run);
        assert_eq!(cmd.limit, Some(50));
    }

    #[test]
    fn detect_covers_opts_into_the_language_model() {
        let cli = Cli::try_parse_from(["hot100", "detect-covers", "--use-llm"]).unwrap();
        let Commands::DetectCovers(cmd) = cli.command else {
            panic!("expected detect-covers");
        };
        assert!(cmd.use_llm);
    }

    #[test]
    fn import_defaults_to_2009() {
        let cli = Cli::try_parse_from(["hot100", "import", "--limit", "3"]).unwrap();
        let Commands::Import(cmd) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(cmd.start_year, 2009);
        assert_eq!(cmd.limit, Some(3));
        assert!(!cmd.enrich);
    }

    #[test]
    fn source_flags_select_sources() {
        let cli = Cli::try_parse_from(["hot100", "update", "--dry-run", "--no-spotify"]).unwrap();
        let Commands::Update(cmd) = cli.command else {
            panic!("expected update");
        };
        assert!(cmd.dry_run);
        let options = cmd.sources.enrich_options(false);
        assert!(!options.media_links);
        assert!(options.descriptions);
    }

    #[test]
    fn rate_rejects_scores_outside_range() {
        assert!(Cli::try_parse_from(["hot100", "rate", "ana", "x", "7"]).is_ok());
        assert!(Cli::try_parse_from(["hot100", "rate", "ana", "x", "300"]).is_err());
    }

    #[test]
    fn ensure_database_directory_creates_parents() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("hot100.db");

        ensure_database_directory(&db_path).unwrap();

        assert!(db_path.parent().unwrap().exists());
    }
}
