use serde::Deserialize;
use serde_json::Value;

use super::FetchError;
use crate::http::{HttpClient, RetryPolicy};
use crate::models::{ChartRow, ChartSnapshot, parse_chart_date};

/// Filters applied while reading the bulk feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    /// Ignore weeks before this year.
    pub start_year: i32,
    /// Keep at most this many weeks (oldest first).
    pub limit: Option<usize>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            start_year: 2009,
            limit: None,
        }
    }
}

/// Snapshots read from the feed plus what had to be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedImport {
    /// Weekly snapshots, oldest first.
    pub snapshots: Vec<ChartSnapshot>,
    /// Weeks that were malformed or had a missing or unparsable date.
    pub skipped_weeks: usize,
}

impl FeedImport {
    /// Rows dropped across all snapshots.
    pub fn skipped_rows(&self) -> usize {
        self.snapshots.iter().map(|s| s.skipped_rows).sum()
    }

    pub fn total_rows(&self) -> usize {
        self.snapshots.iter().map(|s| s.rows.len()).sum()
    }
}

/// One week, with rows left raw so a bad row only costs itself.
#[derive(Debug, Deserialize)]
struct FeedWeek {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    song: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    this_week: Option<u32>,
    #[serde(default)]
    last_week: Option<u32>,
    #[serde(default)]
    peak_position: Option<u32>,
    #[serde(default)]
    weeks_on_chart: Option<u32>,
}

impl FeedEntry {
    /// Decodes one raw row; wrongly typed fields make the row unusable.
    fn parse(raw: Value) -> Option<ChartRow> {
        match serde_json::from_value::<FeedEntry>(raw) {
            Ok(entry) => entry.into_row(),
            Err(e) => {
                tracing::debug!(error = %e, "feed row has wrongly typed fields");
                None
            }
        }
    }

    /// Rows without title, artist or peak are unusable.
    fn into_row(self) -> Option<ChartRow> {
        let title = self.song.filter(|s| !s.trim().is_empty())?;
        let artist = self.artist.filter(|s| !s.trim().is_empty())?;
        let peak = self.peak_position.filter(|&p| p >= 1)?;
        let rank = self.this_week.filter(|&r| r >= 1).unwrap_or(peak);

        Some(
            ChartRow::new(rank, title.trim(), artist.trim())
                .with_peak(peak)
                .with_weeks(self.weeks_on_chart.unwrap_or(1))
                .with_last_week(self.last_week),
        )
    }
}

/// Parses the bulk feed body.
///
/// The feed is a JSON array of `{date, data: [{song, artist, this_week,
/// last_week, peak_position, weeks_on_chart}]}`.
///
/// # Examples
///
/// ```
/// use hot100::fetch::{FeedOptions, parse_feed};
///
/// let body = r#"[{"date": "2010-01-02", "data": [
///     {"song": "Tik Tok", "artist": "Ke$ha", "this_week": 1, "peak_position": 1, "weeks_on_chart": 10},
///     {"song": "Empire State Of Mind", "artist": "Jay-Z + Alicia Keys", "this_week": 2}
/// ]}]"#;
///
/// let import = parse_feed(body, &FeedOptions::default()).unwrap();
/// assert_eq!(import.snapshots[0].rows.len(), 1);
/// assert_eq!(import.skipped_rows(), 1);
/// ```
pub fn parse_feed(body: &str, options: &FeedOptions) -> Result<FeedImport, FetchError> {
    let weeks: Vec<Value> = serde_json::from_str(body).map_err(FetchError::Parse)?;

    let mut import = FeedImport::default();

    for raw in weeks {
        let week = match serde_json::from_value::<FeedWeek>(raw) {
            Ok(week) => week,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed feed week");
                import.skipped_weeks += 1;
                continue;
            }
        };
        let Some(date_text) = week.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) else {
            tracing::warn!("skipping feed week without a date");
            import.skipped_weeks += 1;
            continue;
        };
        let chart_date = match parse_chart_date(date_text) {
            Ok(date) => date,
            Err(e) => {
                tracing::warn!(date = %date_text, error = %e, "skipping week with unparsable date");
                import.skipped_weeks += 1;
                continue;
            }
        };

        if chart_date.year() < options.start_year {
            continue;
        }

        let total = week.data.len();
        let rows: Vec<ChartRow> = week
            .data
            .into_iter()
            .filter_map(FeedEntry::parse)
            .collect();

        let mut snapshot = ChartSnapshot::new(chart_date, rows);
        snapshot.skipped_rows = total - snapshot.rows.len();
        if snapshot.skipped_rows > 0 {
            tracing::warn!(
                chart_date = %date_text,
                skipped = snapshot.skipped_rows,
                "feed rows missing title, artist or peak"
            );
        }
        import.snapshots.push(snapshot);
    }

    import.snapshots.sort_by_key(|s| s.chart_date);
    if let Some(limit) = options.limit {
        import.snapshots.truncate(limit);
    }

    Ok(import)
}

/// Bulk historical feed over HTTP.
pub struct FeedSource {
    http: HttpClient,
    url: String,
    retry: RetryPolicy,
}

impl FeedSource {
    pub fn new(http: HttpClient, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            url: url.into(),
            retry,
        }
    }

    /// Downloads and parses the feed.
    pub fn fetch(&self, options: &FeedOptions) -> Result<FeedImport, FetchError> {
        tracing::info!(url = %self.url, "downloading chart feed");
        let body = self
            .retry
            .run(|| self.http.send_text(self.http.get(&self.url)?))?;

        let import = parse_feed(&body, options)?;
        tracing::info!(
            weeks = import.snapshots.len(),
            rows = import.total_rows(),
            skipped_rows = import.skipped_rows(),
            "chart feed parsed"
        );
        Ok(import)
    }
}
