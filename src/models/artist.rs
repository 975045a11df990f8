use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;

use super::ArtistId;

/// Kind of act, as far as external registries classify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtistType {
    Person,
    Group,
    Duo,
    Collective,
}

impl ArtistType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtistType::Person => "person",
            ArtistType::Group => "group",
            ArtistType::Duo => "duo",
            ArtistType::Collective => "collective",
        }
    }
}

impl fmt::Display for ArtistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtistType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "person" => Ok(ArtistType::Person),
            "group" => Ok(ArtistType::Group),
            "duo" => Ok(ArtistType::Duo),
            "collective" => Ok(ArtistType::Collective),
            other => Err(format!("unknown artist type: {other}")),
        }
    }
}

/// Label on an artist-to-artist edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    MemberOf,
    SoloFrom,
    Collaboration,
    SideProject,
    Similar,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::MemberOf => "member_of",
            RelationshipType::SoloFrom => "solo_from",
            RelationshipType::Collaboration => "collaboration",
            RelationshipType::SideProject => "side_project",
            RelationshipType::Similar => "similar",
        }
    }

    /// Maps a registry relation label ("member of band") to our label.
    pub fn from_registry_label(label: &str) -> Option<Self> {
        match label {
            "member of band" => Some(RelationshipType::MemberOf),
            "collaboration" => Some(RelationshipType::Collaboration),
            "solo career of" => Some(RelationshipType::SoloFrom),
            "side project of" => Some(RelationshipType::SideProject),
            _ => None,
        }
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member_of" => Ok(RelationshipType::MemberOf),
            "solo_from" => Ok(RelationshipType::SoloFrom),
            "collaboration" => Ok(RelationshipType::Collaboration),
            "side_project" => Ok(RelationshipType::SideProject),
            "similar" => Ok(RelationshipType::Similar),
            other => Err(format!("unknown relationship type: {other}")),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical artist record, distinct from the free-text chart credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
    pub slug: String,
    pub nationality: Option<String>,
    pub birth_date: Option<Date>,
    pub death_date: Option<Date>,
    pub bio: Option<String>,
    pub artist_type: Option<ArtistType>,
    pub is_active: bool,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    /// Cached number of linked catalog entries.
    pub song_count: u32,
}

impl Artist {
    /// Enriched artists carry a registry identifier.
    pub fn is_enriched(&self) -> bool {
        self.musicbrainz_id.is_some()
    }
}

/// Registry data found for one artist name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtistProfile {
    pub musicbrainz_id: String,
    pub name: String,
    pub nationality: Option<String>,
    pub birth_date: Option<Date>,
    pub death_date: Option<Date>,
    /// Registry annotation, already cut to the stored length.
    pub bio: Option<String>,
    pub artist_type: Option<ArtistType>,
    pub begin_year: Option<i32>,
    pub tags: Vec<TagCount>,
    pub relations: Vec<ArtistRelation>,
}

/// A folksonomy tag and how many registry users applied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: u32,
}

/// An edge to another artist as the registry reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRelation {
    /// Registry label, e.g. "member of band".
    pub label: String,
    pub target_musicbrainz_id: String,
    pub target_name: String,
    /// The registry lists the edge from the target's side.
    pub backward: bool,
}

/// Where an artist tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Musicbrainz,
    Lastfm,
    Manual,
    Ai,
    Import,
}

impl TagSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TagSource::Musicbrainz => "musicbrainz",
            TagSource::Lastfm => "lastfm",
            TagSource::Manual => "manual",
            TagSource::Ai => "ai",
            TagSource::Import => "import",
        }
    }
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_type_parses_case_insensitively() {
        assert_eq!("Group".parse::<ArtistType>(), Ok(ArtistType::Group));
        assert!("orchestra".parse::<ArtistType>().is_err());
    }

    #[test]
    fn registry_labels_map_to_relationships() {
        assert_eq!(
            RelationshipType::from_registry_label("member of band"),
            Some(RelationshipType::MemberOf)
        );
        assert_eq!(RelationshipType::from_registry_label("tribute"), None);
        assert_eq!(RelationshipType::SoloFrom.to_string(), "solo_from");
    }
}
