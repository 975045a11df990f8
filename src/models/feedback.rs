use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{RatingId, SongId, UserId};

/// Rejected user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("score must be between 1 and 10, got {0}")]
    ScoreOutOfRange(u8),

    #[error("comment cannot be empty")]
    EmptyComment,

    #[error("username cannot be empty")]
    EmptyUsername,

    #[error("tag name cannot be empty")]
    EmptyTag,

    #[error("no song with id {0}")]
    UnknownSong(SongId),
}

/// A rating score in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub fn new(value: u8) -> Result<Self, FeedbackError> {
        if (1..=10).contains(&value) {
            Ok(Self(value))
        } else {
            Err(FeedbackError::ScoreOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = FeedbackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// One user's score for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub user_id: UserId,
    pub song_id: SongId,
    pub score: Score,
}

/// Per-song rating cache: average rounded to one decimal plus count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: u32,
}

impl RatingSummary {
    /// Summary for a raw average as SQLite computes it.
    pub fn from_raw(average: Option<f64>, count: u32) -> Self {
        Self {
            average: average.map(round_one_decimal),
            count,
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_accepts_one_through_ten() {
        assert!(Score::new(1).is_ok());
        assert!(Score::new(10).is_ok());
        assert_eq!(Score::new(0), Err(FeedbackError::ScoreOutOfRange(0)));
        assert_eq!(Score::new(11), Err(FeedbackError::ScoreOutOfRange(11)));
    }

    #[test]
    fn score_deserialization_validates_range() {
        assert!(serde_json::from_str::<Score>("7").is_ok());
        assert!(serde_json::from_str::<Score>("12").is_err());
    }

    #[test]
    fn summary_rounds_to_one_decimal() {
        let summary = RatingSummary::from_raw(Some(7.666_666), 3);
        assert_eq!(summary.average, Some(7.7));
        assert_eq!(RatingSummary::from_raw(None, 0).average, None);
    }
}
