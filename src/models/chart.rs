use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::format_description;

use super::SongId;

/// Parses a `YYYY-MM-DD` chart date, the storage and feed format.
pub fn parse_chart_date(input: &str) -> Result<Date, time::error::Parse> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]"))
}

/// Formats a chart date as `YYYY-MM-DD`.
pub fn format_chart_date(date: Date) -> String {
    // The description only uses components every Date has.
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

/// One ranked row of a weekly chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRow {
    /// Position on this week's chart, 1-based.
    pub rank: u32,
    pub title: String,
    pub artist: String,
    /// Peak position reported by the source. Never worse than `rank` after merge.
    pub peak_rank: u32,
    pub weeks_on_chart: u32,
    pub last_week_rank: Option<u32>,
    pub image_url: Option<String>,
}

impl ChartRow {
    /// Creates a row whose peak falls back to the rank and weeks to 1.
    pub fn new(rank: u32, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            rank,
            title: title.into(),
            artist: artist.into(),
            peak_rank: rank,
            weeks_on_chart: 1,
            last_week_rank: None,
            image_url: None,
        }
    }

    pub fn with_peak(mut self, peak_rank: u32) -> Self {
        self.peak_rank = peak_rank;
        self
    }

    pub fn with_weeks(mut self, weeks_on_chart: u32) -> Self {
        self.weeks_on_chart = weeks_on_chart;
        self
    }

    pub fn with_last_week(mut self, last_week_rank: Option<u32>) -> Self {
        self.last_week_rank = last_week_rank;
        self
    }

    /// Peak to merge into the catalog: the current rank bounds it from above.
    pub fn effective_peak(&self) -> u32 {
        self.peak_rank.min(self.rank).max(1)
    }

    /// Weeks on chart, never below one for a charting row.
    pub fn effective_weeks(&self) -> u32 {
        self.weeks_on_chart.max(1)
    }
}

/// One week's chart as fetched from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSnapshot {
    pub chart_date: Date,
    pub rows: Vec<ChartRow>,
    /// Rows dropped by the fetcher because required fields were missing.
    pub skipped_rows: usize,
}

impl ChartSnapshot {
    pub fn new(chart_date: Date, rows: Vec<ChartRow>) -> Self {
        Self {
            chart_date,
            rows,
            skipped_rows: 0,
        }
    }

    /// Buckets rows by peak position for dry-run previews.
    pub fn peak_distribution(&self) -> PeakDistribution {
        let mut distribution = PeakDistribution::default();
        for row in &self.rows {
            match row.effective_peak() {
                1 => distribution.number_one += 1,
                2..=10 => distribution.top_ten += 1,
                11..=50 => distribution.top_fifty += 1,
                _ => distribution.rest += 1,
            }
        }
        distribution
    }
}

/// Row counts by peak bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeakDistribution {
    /// Peaked at #1.
    pub number_one: usize,
    /// Peaked at #2-10.
    pub top_ten: usize,
    /// Peaked at #11-50.
    pub top_fifty: usize,
    /// Peaked at #51-100.
    pub rest: usize,
}

/// A catalog entry's position on one chart date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartHistoryEntry {
    pub song_id: SongId,
    pub chart_date: Date,
    pub rank: u32,
    /// Peak to date as of this chart.
    pub peak_rank: u32,
    /// Weeks on chart to date as of this chart.
    pub weeks_on_chart: u32,
    /// Last week's position as the source reported it.
    pub last_week_rank: Option<u32>,
}
