mod artist;
mod chart;
mod composition;
mod feedback;
mod ids;
mod leaderboard;
mod song;

pub use artist::{
    Artist, ArtistProfile, ArtistRelation, ArtistType, RelationshipType, TagCount, TagSource,
};
pub use chart::{
    ChartHistoryEntry, ChartRow, ChartSnapshot, PeakDistribution, format_chart_date,
    parse_chart_date,
};
pub use composition::{Composition, CoverClassification, DetectionMethod, composition_slug};
pub use feedback::{FeedbackError, Rating, RatingSummary, Score};
pub use ids::{ArtistId, CompositionId, RatingId, SongId, TagId, UserId};
pub use leaderboard::{CurrentHot100Entry, NumberOneSong};
pub use song::{EnrichmentStage, Song, SongBuilder};
