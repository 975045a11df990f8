use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a database row id.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying ID value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_id!(
    /// Identifier of a catalog entry (`songs.id`).
    SongId
);

typed_id!(
    /// Identifier of an artist identity (`artists.id`).
    ArtistId
);

typed_id!(
    /// Identifier of an underlying composition (`compositions.id`).
    CompositionId
);

typed_id!(
    /// Identifier of a user who rates, comments and bookmarks.
    UserId
);

typed_id!(
    /// Identifier of a user rating.
    RatingId
);

typed_id!(
    /// Identifier of a genre/mood tag.
    TagId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn song_id_serializes_as_raw_integer() {
        let id = SongId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");

        let deserialized: SongId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn ids_display_their_value() {
        assert_eq!(ArtistId::new(7).to_string(), "7");
        assert_eq!(CompositionId::new(3).get(), 3);
    }

    #[test]
    fn song_ids_order_by_value() {
        let mut ids = vec![SongId::new(3), SongId::new(1), SongId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![SongId::new(1), SongId::new(2), SongId::new(3)]);
    }
}
