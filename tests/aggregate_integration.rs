use anyhow::Result;
use hot100::aggregate::Aggregates;
use hot100::catalog::CompositionDraft;
use hot100::feedback::Feedback;
use hot100::models::{ChartRow, ChartSnapshot, Score, TagSource};
use hot100::reconcile::{ReconcileOptions, Reconciler};
use hot100::{Catalog, Database};
use time::macros::date;

/// A catalog with two chart weeks, ratings, a tag and a composition.
fn populated_catalog() -> Result<Catalog> {
    let catalog = Catalog::new(Database::in_memory()?);
    let reconciler = Reconciler::new(&catalog);

    reconciler.reconcile(
        &ChartSnapshot::new(
            date!(2023 - 03 - 04),
            vec![
                ChartRow::new(1, "Flowers", "Miley Cyrus").with_weeks(7),
                ChartRow::new(2, "Kill Bill", "SZA").with_peak(1).with_weeks(11),
                ChartRow::new(3, "Last Night", "Morgan Wallen").with_weeks(5),
            ],
        ),
        &ReconcileOptions::default(),
    )?;
    let latest = reconciler.reconcile(
        &ChartSnapshot::new(
            date!(2023 - 03 - 11),
            vec![
                ChartRow::new(1, "Last Night", "Morgan Wallen").with_weeks(6),
                ChartRow::new(2, "Flowers", "Miley Cyrus").with_peak(1).with_weeks(8),
                ChartRow::new(3, "Kill Bill", "SZA").with_peak(1).with_weeks(12),
                ChartRow::new(4, "Boy's A Liar Pt. 2", "PinkPantheress & Ice Spice").with_weeks(4),
            ],
        ),
        &ReconcileOptions::default(),
    )?;

    let feedback = Feedback::new(&catalog);
    let ana = feedback.ensure_user("ana")?;
    let bo = feedback.ensure_user("bo")?;
    let flowers = catalog.song_by_slug("miley-cyrus-flowers")?.expect("flowers");
    feedback.rate(ana, flowers.id, Score::new(8)?)?;
    feedback.rate(bo, flowers.id, Score::new(6)?)?;
    feedback.tag_song(flowers.id, "breakup", Some("theme"), TagSource::Manual)?;

    catalog.link_composition(
        flowers.id,
        &CompositionDraft {
            title: "Flowers".into(),
            original_writer: Some("Miley Cyrus, Gregory Hein, Michael Pollack".into()),
            original_artist: Some("Miley Cyrus".into()),
            original_year: Some(2023),
            ..Default::default()
        },
        true,
    )?;
    assert_eq!(latest.created, 1);

    Ok(catalog)
}

/// Every derived table and cached column, serialized in a stable order.
fn derived_state(catalog: &Catalog) -> Result<Vec<String>> {
    let conn = catalog.database().connection();
    let queries = [
        "SELECT position, song_id, title, artist, last_week_position, position_change,
                peak_rank, weeks_on_chart, chart_date FROM current_hot100 ORDER BY position",
        "SELECT position, song_id, title, artist, year, weeks_on_chart
         FROM number_one_songs ORDER BY position",
        "SELECT id, average_user_score, total_ratings FROM songs ORDER BY id",
        "SELECT id, total_versions, most_successful_song_id FROM compositions ORDER BY id",
        "SELECT id, song_count FROM song_tags ORDER BY id",
        "SELECT id, song_count FROM artists ORDER BY id",
    ];

    let mut state = Vec::new();
    for sql in queries {
        let mut stmt = conn.prepare(sql)?;
        let columns = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            let mut fields = Vec::with_capacity(columns);
            for i in 0..columns {
                let value: rusqlite::types::Value = row.get(i)?;
                fields.push(format!("{value:?}"));
            }
            Ok(fields.join("|"))
        })?;
        for row in rows {
            state.push(row?);
        }
    }
    Ok(state)
}

#[test]
fn test_rebuilding_twice_produces_identical_tables() -> Result<()> {
    // Arrange: A populated catalog with one rebuild already done
    let catalog = populated_catalog()?;
    let aggregates = Aggregates::new(&catalog);
    aggregates.rebuild_all()?;
    let first = derived_state(&catalog)?;

    // Act: Rebuild again with no source changes
    aggregates.rebuild_all()?;

    // Assert: Byte-for-byte identical derived tables
    assert_eq!(derived_state(&catalog)?, first);
    assert!(!first.is_empty());

    Ok(())
}

#[test]
fn test_leaderboard_reflects_latest_week() -> Result<()> {
    // Arrange
    let catalog = populated_catalog()?;
    let aggregates = Aggregates::new(&catalog);

    // Act
    let report = aggregates.rebuild_all()?;
    let board = aggregates.current_hot100()?;

    // Assert: Latest week, movement against the previous week
    assert_eq!(report.current_hot100, 4);
    assert_eq!(aggregates.current_chart_date()?, Some(date!(2023 - 03 - 11)));
    assert_eq!(board[0].title, "Last Night");
    assert_eq!(board[0].position_change, Some(2));
    assert_eq!(board[1].position_change, Some(-1));
    assert_eq!(board[3].last_week_position, None);

    Ok(())
}

#[test]
fn test_number_ones_cover_every_chart_topper() -> Result<()> {
    // Arrange
    let catalog = populated_catalog()?;
    let aggregates = Aggregates::new(&catalog);

    // Act
    aggregates.rebuild_number_ones()?;
    let number_ones = aggregates.number_ones()?;

    // Assert: Flowers, Kill Bill and Last Night all peaked at #1; longest run first
    let titles: Vec<&str> = number_ones.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Kill Bill", "Flowers", "Last Night"]);
    assert_eq!(number_ones[0].position, 1);

    Ok(())
}

#[test]
fn test_corrupted_caches_are_repaired() -> Result<()> {
    // Arrange: Hand-edit every cache
    let catalog = populated_catalog()?;
    let conn = catalog.database().connection();
    conn.execute("UPDATE songs SET average_user_score = 1.0, total_ratings = 99", [])?;
    conn.execute("UPDATE compositions SET total_versions = 7", [])?;
    conn.execute("UPDATE song_tags SET song_count = 0", [])?;

    // Act
    Aggregates::new(&catalog).rebuild_all()?;

    // Assert
    let flowers = catalog.song_by_slug("miley-cyrus-flowers")?.expect("flowers");
    assert_eq!(flowers.average_user_score, Some(7.0));
    assert_eq!(flowers.total_ratings, 2);
    let kill_bill = catalog.song_by_slug("sza-kill-bill")?.expect("kill bill");
    assert_eq!(kill_bill.average_user_score, None);
    assert_eq!(kill_bill.total_ratings, 0);

    let composition = catalog
        .composition(flowers.composition_id.expect("linked"))?
        .expect("composition");
    assert_eq!(composition.total_versions, 1);

    let tag_count: u32 =
        conn.query_row("SELECT song_count FROM song_tags", [], |row| row.get(0))?;
    assert_eq!(tag_count, 1);

    Ok(())
}
