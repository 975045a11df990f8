use serde::{Deserialize, Serialize};
use time::Date;

use super::SongId;

/// One row of the rebuilt current chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentHot100Entry {
    pub position: u32,
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub last_week_position: Option<u32>,
    /// Positive when the song climbed since last week.
    pub position_change: Option<i32>,
    pub peak_rank: u32,
    pub weeks_on_chart: u32,
    pub chart_date: Date,
}

impl CurrentHot100Entry {
    pub fn is_new_entry(&self) -> bool {
        self.last_week_position.is_none()
    }
}

/// One row of the all-time number-one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberOneSong {
    pub position: u32,
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub year: i32,
    pub weeks_on_chart: u32,
}
