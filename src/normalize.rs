//! Identity normalization for chart rows, artists and compositions.
//!
//! Every comparison between an incoming chart row and the catalog goes
//! through the functions in this module, so the same song spelled
//! "Drake feat. Rihanna" and "Drake & Rihanna" resolves to one entry.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(.*?\)|\[.*?\]").unwrap());

static COLLABORATION_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:featuring|feat|ft|and)\b").unwrap());

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static COLLABORATION_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:duet with|featuring|feat\.|feat|ft\.|ft|with|vs\.|vs|&|and)\s+|\s*/\s*")
        .unwrap()
});

/// Substrings that mark an artist credit as a collaboration of several acts.
const COLLABORATION_INDICATORS: &[&str] = &[
    " featuring ",
    " ft. ",
    " ft ",
    " & ",
    " and ",
    " with ",
    " vs ",
    " vs. ",
    "/",
    " duet with ",
    " feat. ",
    " feat ",
];

/// Fuzzy-match threshold shared by the cover sources.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Errors raised when a row cannot be turned into a matching key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// Title was empty or whitespace-only.
    #[error("title cannot be empty")]
    EmptyTitle,

    /// Artist was empty or whitespace-only.
    #[error("artist cannot be empty")]
    EmptyArtist,
}

/// Canonical identity of a song used for catalog lookups.
///
/// Two rows with the same `MatchKey` are the same catalog entry.
///
/// # Examples
///
/// ```
/// use hot100::normalize::MatchKey;
///
/// let a = MatchKey::new("Umbrella (Remix)", "Rihanna Featuring Jay-Z").unwrap();
/// let b = MatchKey::new("umbrella", "Rihanna & Jay-Z").unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    title: String,
    artist: String,
}

impl MatchKey {
    /// Builds the key for a title/artist pair.
    ///
    /// Returns an error when either side is blank; such rows are unmatchable.
    pub fn new(title: &str, artist: &str) -> Result<Self, NormalizeError> {
        if title.trim().is_empty() {
            return Err(NormalizeError::EmptyTitle);
        }
        if artist.trim().is_empty() {
            return Err(NormalizeError::EmptyArtist);
        }

        Ok(Self {
            title: normalize_or_lowercase(title),
            artist: normalize_or_lowercase(artist),
        })
    }

    /// Normalized title component.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Normalized artist component.
    pub fn artist(&self) -> &str {
        &self.artist
    }

    /// The single-column form stored in `songs.match_key`.
    pub fn as_storage(&self) -> String {
        format!("{}::{}", self.title, self.artist)
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.title, self.artist)
    }
}

/// Names made only of punctuation ("!!!") normalize to nothing; keep them
/// distinguishable by falling back to the trimmed lowercase form.
fn normalize_or_lowercase(raw: &str) -> String {
    let normalized = normalize_text(raw);
    if normalized.is_empty() {
        raw.trim().to_lowercase()
    } else {
        normalized
    }
}

/// Normalizes free text for identity comparison.
///
/// Lower-cases, drops bracketed annotations, strips punctuation, removes
/// collaboration words and collapses whitespace.
///
/// # Examples
///
/// ```
/// use hot100::normalize::normalize_text;
///
/// assert_eq!(normalize_text("  Hello (Radio Edit) "), "hello");
/// assert_eq!(normalize_text("Calvin Harris Feat. Rihanna"), "calvin harris rihanna");
/// ```
#[must_use]
pub fn normalize_text(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let without_brackets = BRACKETED.replace_all(&lowered, " ");
    let without_punctuation = NON_WORD.replace_all(&without_brackets, "");
    let without_markers = COLLABORATION_MARKERS.replace_all(&without_punctuation, " ");
    WHITESPACE
        .replace_all(&without_markers, " ")
        .trim()
        .to_string()
}

/// URL-safe slug: ASCII lowercase words joined by single hyphens.
///
/// Common Latin accents are folded to their base letter; other
/// punctuation is dropped without introducing a separator.
///
/// # Examples
///
/// ```
/// use hot100::normalize::slugify;
///
/// assert_eq!(slugify("AC/DC Back In Black"), "acdc-back-in-black");
/// assert_eq!(slugify("Beyoncé  Halo"), "beyonce-halo");
/// ```
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
            continue;
        }

        let Some(folded) = fold_to_ascii(c) else {
            continue;
        };

        if pending_separator && !slug.is_empty() {
            slug.push('-');
        }
        pending_separator = false;
        slug.push(folded);
    }

    slug
}

fn fold_to_ascii(c: char) -> Option<char> {
    if c.is_ascii_alphanumeric() {
        return Some(c.to_ascii_lowercase());
    }

    let folded = match c.to_lowercase().next()? {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(folded)
}

/// Slug of a catalog entry, shared by the reconciler and artist linking.
pub fn song_slug(title: &str, artist: &str) -> String {
    slugify(&format!("{artist} {title}"))
}

/// Returns true when the credit names several acts ("A featuring B").
pub fn is_collaboration_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    COLLABORATION_INDICATORS
        .iter()
        .any(|indicator| lowered.contains(indicator))
}

/// Splits a collaboration credit into its participating artist names.
///
/// # Examples
///
/// ```
/// use hot100::normalize::split_collaboration;
///
/// assert_eq!(
///     split_collaboration("Lady Gaga & Bradley Cooper"),
///     vec!["Lady Gaga", "Bradley Cooper"]
/// );
/// ```
pub fn split_collaboration(name: &str) -> Vec<String> {
    COLLABORATION_SEPARATORS
        .split(name)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// Reduces an artist name for fuzzy comparison.
fn comparable_artist(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped.replace("the ", "").trim().to_string()
}

/// Fuzzy equality of two artist credits.
pub fn artists_similar(a: &str, b: &str) -> bool {
    strsim::normalized_levenshtein(&comparable_artist(a), &comparable_artist(b))
        > SIMILARITY_THRESHOLD
}

/// Best similarity of the shorter string against any equally long window
/// of the longer one, in `0.0..=1.0`.
///
/// Used to accept search hits whose title carries extra decoration such as
/// "Song - Remastered 2011".
pub fn partial_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if shorter.is_empty() {
        return if longer.is_empty() { 1.0 } else { 0.0 };
    }

    let needle: String = shorter.iter().collect();
    longer
        .windows(shorter.len())
        .map(|window| {
            let candidate: String = window.iter().collect();
            strsim::normalized_levenshtein(&needle, &candidate)
        })
        .fold(0.0, f64::max)
}
