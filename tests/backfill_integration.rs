use std::fs;

use anyhow::Result;
use hot100::backfill::{BackfillOptions, HistoryBackfill};
use hot100::fetch::{FetchError, load_history_csv};
use hot100::models::{ChartRow, ChartSnapshot};
use hot100::reconcile::{ReconcileOptions, Reconciler};
use hot100::{Catalog, Database};
use tempfile::tempdir;
use time::macros::date;

const HISTORY: &str = "\
date,rank,song,artist,last-week,peak-rank,weeks-on-board
2023-07-22,1,Last Night,Morgan Wallen,1,1,25
2023-07-15,1,Last Night,Morgan Wallen,2,1,24
2023-07-15,3,Fast Car,Luke Combs,4,2,14
2023-07-15,not-a-rank,Broken,Row,,,
";

fn seeded_catalog() -> Result<Catalog> {
    let catalog = Catalog::new(Database::in_memory()?);
    Reconciler::new(&catalog).reconcile(
        &ChartSnapshot::new(
            date!(2023 - 07 - 22),
            vec![
                ChartRow::new(1, "Last Night", "Morgan Wallen").with_weeks(25),
                ChartRow::new(2, "Vampire", "Olivia Rodrigo"),
            ],
        ),
        &ReconcileOptions::default(),
    )?;
    Ok(catalog)
}

#[test]
fn test_backfill_from_file_fills_earlier_weeks() -> Result<()> {
    // Arrange
    let dir = tempdir()?;
    let path = dir.path().join("hot100.csv");
    fs::write(&path, HISTORY)?;
    let catalog = seeded_catalog()?;
    let wallen = catalog.song_by_slug("morgan-wallen-last-night")?.expect("wallen");

    // Act
    let history = load_history_csv(&path)?;
    let first = HistoryBackfill::new(&catalog).run(&history, &BackfillOptions::default())?;
    let second = HistoryBackfill::new(&catalog).run(&history, &BackfillOptions::default())?;

    // Assert: The 07-22 week differs only in last week's rank
    assert_eq!(history.skipped_rows, 1);
    assert_eq!(first.songs_matched, 1);
    assert_eq!(first.songs_missing, 1);
    assert_eq!(first.history_created, 1);
    assert_eq!(first.history_updated, 1);
    assert_eq!(second.history_unchanged, 2);
    assert_eq!(second.history_created + second.history_updated, 0);

    let weeks = catalog.history(wallen.id)?;
    assert_eq!(weeks.len(), 2);
    assert_eq!(weeks[0].chart_date, date!(2023 - 07 - 15));
    assert_eq!(weeks[0].last_week_rank, Some(2));
    assert_eq!(weeks[1].last_week_rank, Some(1));
    assert!(catalog.song_by_slug("luke-combs-fast-car")?.is_none());

    Ok(())
}

#[test]
fn test_backfill_dry_run_writes_nothing() -> Result<()> {
    // Arrange
    let dir = tempdir()?;
    let path = dir.path().join("hot100.csv");
    fs::write(&path, HISTORY)?;
    let catalog = seeded_catalog()?;
    let wallen = catalog.song_by_slug("morgan-wallen-last-night")?.expect("wallen");

    // Act
    let report = HistoryBackfill::new(&catalog).run(
        &load_history_csv(&path)?,
        &BackfillOptions {
            dry_run: true,
            limit: None,
        },
    )?;

    // Assert
    assert_eq!(report.history_created, 1);
    assert_eq!(catalog.history(wallen.id)?.len(), 1);

    Ok(())
}

#[test]
fn test_backfill_reports_unreadable_files() {
    // Arrange
    let dir = tempdir().expect("tempdir");

    // Act
    let result = load_history_csv(&dir.path().join("missing.csv"));

    // Assert
    assert!(matches!(result, Err(FetchError::Io(_))));
}
