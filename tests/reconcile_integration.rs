use anyhow::Result;
use hot100::fetch::{FeedOptions, parse_feed};
use hot100::models::{ChartRow, ChartSnapshot};
use hot100::normalize::MatchKey;
use hot100::reconcile::{ReconcileOptions, Reconciler};
use hot100::{Catalog, Database};
use time::macros::date;

fn reconcile(catalog: &Catalog, snapshot: &ChartSnapshot) -> Result<hot100::reconcile::ReconcileReport> {
    Reconciler::new(catalog).reconcile(snapshot, &ReconcileOptions::default())
}

/// Every catalog and history row, in a stable order.
fn dump(catalog: &Catalog) -> Result<Vec<String>> {
    let conn = catalog.database().connection();
    let mut rows = Vec::new();

    let mut stmt = conn.prepare(
        "SELECT id, title, artist, year, peak_rank, weeks_on_chart, slug, match_key FROM songs ORDER BY id",
    )?;
    for row in stmt.query_map([], |r| {
        Ok(format!(
            "song {}|{}|{}|{}|{}|{}|{}|{}",
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, i32>(3)?,
            r.get::<_, u32>(4)?,
            r.get::<_, u32>(5)?,
            r.get::<_, String>(6)?,
            r.get::<_, String>(7)?
        ))
    })? {
        rows.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT song_id, chart_date, rank, peak_rank, weeks_on_chart FROM chart_history
         ORDER BY song_id, chart_date",
    )?;
    for row in stmt.query_map([], |r| {
        Ok(format!(
            "history {}|{}|{}|{}|{}",
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, u32>(2)?,
            r.get::<_, u32>(3)?,
            r.get::<_, u32>(4)?
        ))
    })? {
        rows.push(row?);
    }

    Ok(rows)
}

#[test]
fn test_two_week_scenario_improves_peak_and_weeks() -> Result<()> {
    // Arrange: Week 1 has the song at #5, week 2 at #2
    let catalog = Catalog::new(Database::in_memory()?);
    let week1 = ChartSnapshot::new(
        date!(2024 - 01 - 06),
        vec![ChartRow::new(5, "Song A", "Artist X").with_peak(5).with_weeks(1)],
    );
    let week2 = ChartSnapshot::new(
        date!(2024 - 01 - 13),
        vec![ChartRow::new(2, "Song A", "Artist X").with_peak(2).with_weeks(2)],
    );

    // Act: Reconcile both weeks
    let first = reconcile(&catalog, &week1)?;
    let second = reconcile(&catalog, &week2)?;

    // Assert: One entry, improved stats, two history rows
    assert_eq!(first.created, 1);
    assert_eq!(second.updated, 1);
    assert_eq!(catalog.song_count()?, 1);

    let id = first.touched[0];
    let song = catalog.song(id)?.expect("song exists");
    assert_eq!(song.peak_rank, 2);
    assert_eq!(song.weeks_on_chart, 2);
    assert_eq!(catalog.history(id)?.len(), 2);

    Ok(())
}

#[test]
fn test_reconciling_twice_is_idempotent() -> Result<()> {
    // Arrange: A snapshot with three rows
    let catalog = Catalog::new(Database::in_memory()?);
    let snapshot = ChartSnapshot::new(
        date!(2023 - 03 - 04),
        vec![
            ChartRow::new(1, "Flowers", "Miley Cyrus").with_weeks(7),
            ChartRow::new(2, "Kill Bill", "SZA").with_peak(1).with_weeks(11),
            ChartRow::new(3, "Last Night", "Morgan Wallen").with_weeks(5),
        ],
    );

    // Act: Reconcile the same snapshot twice
    reconcile(&catalog, &snapshot)?;
    let once = dump(&catalog)?;
    let again = reconcile(&catalog, &snapshot)?;

    // Assert: Identical state and nothing touched the second time
    assert_eq!(dump(&catalog)?, once);
    assert_eq!(again.unchanged, 3);
    assert_eq!(again.history_created, 0);
    assert_eq!(again.history_updated, 0);
    assert!(again.touched.is_empty());

    Ok(())
}

#[test]
fn test_stats_never_regress() -> Result<()> {
    // Arrange: A strong week followed by weaker, stale data
    let catalog = Catalog::new(Database::in_memory()?);
    let strong = ChartSnapshot::new(
        date!(2022 - 08 - 06),
        vec![ChartRow::new(1, "As It Was", "Harry Styles").with_weeks(17)],
    );
    let weak = ChartSnapshot::new(
        date!(2022 - 08 - 13),
        vec![ChartRow::new(40, "As It Was", "Harry Styles").with_peak(40).with_weeks(3)],
    );

    // Act
    let first = reconcile(&catalog, &strong)?;
    let second = reconcile(&catalog, &weak)?;

    // Assert: Peak stays 1, weeks stay 17, entry not touched
    let song = catalog.song(first.touched[0])?.expect("song exists");
    assert_eq!(song.peak_rank, 1);
    assert_eq!(song.weeks_on_chart, 17);
    assert!(second.touched.is_empty());
    assert_eq!(second.history_created, 1);

    Ok(())
}

#[test]
fn test_rank_bounds_missing_peak() -> Result<()> {
    // Arrange: Scraped row claims peak 10 while ranking 4
    let catalog = Catalog::new(Database::in_memory()?);
    let snapshot = ChartSnapshot::new(
        date!(2024 - 02 - 03),
        vec![ChartRow::new(4, "Greedy", "Tate McRae").with_peak(10)],
    );

    // Act
    let report = reconcile(&catalog, &snapshot)?;

    // Assert: The rank is an upper bound for the peak
    let song = catalog.song(report.touched[0])?.expect("song exists");
    assert_eq!(song.peak_rank, 4);

    Ok(())
}

#[test]
fn test_malformed_row_is_skipped_not_fatal() -> Result<()> {
    // Arrange: A 100-row feed week where row 57 lacks a peak position
    let rows: Vec<String> = (1..=100)
        .map(|rank| {
            if rank == 57 {
                format!(r#"{{"song": "Song {rank}", "artist": "Artist {rank}", "this_week": {rank}}}"#)
            } else {
                format!(
                    r#"{{"song": "Song {rank}", "artist": "Artist {rank}", "this_week": {rank}, "peak_position": {rank}, "weeks_on_chart": 1}}"#
                )
            }
        })
        .collect();
    let body = format!(r#"[{{"date": "2015-06-06", "data": [{}]}}]"#, rows.join(","));
    let import = parse_feed(&body, &FeedOptions::default())?;
    let catalog = Catalog::new(Database::in_memory()?);

    // Act
    let report = reconcile(&catalog, &import.snapshots[0])?;

    // Assert: 99 upserts and one recorded skip
    assert_eq!(report.created, 99);
    assert_eq!(report.upserted(), 99);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(catalog.song_count()?, 99);

    Ok(())
}

#[test]
fn test_blank_rows_are_skipped() -> Result<()> {
    // Arrange
    let catalog = Catalog::new(Database::in_memory()?);
    let snapshot = ChartSnapshot::new(
        date!(2024 - 01 - 06),
        vec![
            ChartRow::new(1, "   ", "Nobody"),
            ChartRow::new(2, "Lose Control", "Teddy Swims"),
        ],
    );

    // Act
    let report = reconcile(&catalog, &snapshot)?;

    // Assert
    assert_eq!(report.skipped, 1);
    assert_eq!(report.created, 1);

    Ok(())
}

#[test]
fn test_spelling_variants_resolve_to_one_entry() -> Result<()> {
    // Arrange: The same song credited two ways
    let catalog = Catalog::new(Database::in_memory()?);
    let week1 = ChartSnapshot::new(
        date!(2008 - 01 - 05),
        vec![ChartRow::new(3, "Umbrella", "Rihanna Featuring Jay-Z")],
    );
    let week2 = ChartSnapshot::new(
        date!(2008 - 01 - 12),
        vec![ChartRow::new(1, "UMBRELLA", "Rihanna feat. Jay-Z")],
    );

    // Act
    reconcile(&catalog, &week1)?;
    reconcile(&catalog, &week2)?;

    // Assert: Same match key, one entry, two dates
    assert_eq!(
        MatchKey::new("Umbrella", "Rihanna Featuring Jay-Z")?,
        MatchKey::new("UMBRELLA", "Rihanna feat. Jay-Z")?
    );
    assert_eq!(catalog.song_count()?, 1);

    Ok(())
}

#[test]
fn test_slugs_and_history_dates_are_unique() -> Result<()> {
    // Arrange: Overlapping weeks, one reconciled twice
    let catalog = Catalog::new(Database::in_memory()?);
    let weeks = [date!(2024 - 01 - 06), date!(2024 - 01 - 13), date!(2024 - 01 - 06)];

    // Act
    for chart_date in weeks {
        let snapshot = ChartSnapshot::new(
            chart_date,
            vec![
                ChartRow::new(1, "Lovin On Me", "Jack Harlow"),
                ChartRow::new(2, "Lose Control", "Teddy Swims"),
            ],
        );
        reconcile(&catalog, &snapshot)?;
    }

    // Assert
    let conn = catalog.database().connection();
    let duplicate_slugs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM (SELECT slug FROM songs GROUP BY slug HAVING COUNT(*) > 1)",
        [],
        |row| row.get(0),
    )?;
    let duplicate_dates: i64 = conn.query_row(
        "SELECT COUNT(*) FROM (SELECT song_id, chart_date FROM chart_history
                               GROUP BY song_id, chart_date HAVING COUNT(*) > 1)",
        [],
        |row| row.get(0),
    )?;
    let history_rows: i64 =
        conn.query_row("SELECT COUNT(*) FROM chart_history", [], |row| row.get(0))?;

    assert_eq!(duplicate_slugs, 0);
    assert_eq!(duplicate_dates, 0);
    assert_eq!(history_rows, 4);

    Ok(())
}

#[test]
fn test_dry_run_writes_nothing() -> Result<()> {
    // Arrange
    let catalog = Catalog::new(Database::in_memory()?);
    let snapshot = ChartSnapshot::new(
        date!(2024 - 01 - 06),
        vec![ChartRow::new(1, "Lovin On Me", "Jack Harlow")],
    );

    // Act
    let report = Reconciler::new(&catalog)
        .reconcile(&snapshot, &ReconcileOptions { dry_run: true })?;

    // Assert
    assert_eq!(report.created, 1);
    assert_eq!(catalog.song_count()?, 0);

    Ok(())
}
