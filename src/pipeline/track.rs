//! Track records threaded through the pipeline, one type per stage boundary.
//!
//! The `(artists, title)` pair produced by the generator is the identity key
//! for a record; later stages add fields but never rewrite that key.

use serde::{Deserialize, Serialize};

/// Raw generator output. The title serializes as `track` to match the
/// generation schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub artists: String,
    #[serde(rename = "track")]
    pub title: String,
}

impl TrackCandidate {
    pub fn new(artists: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artists: artists.into(),
            title: title.into(),
        }
    }

    /// Case- and whitespace-insensitive identity, used for duplicate
    /// detection and for aligning model responses with their inputs.
    #[must_use]
    pub fn identity_key(&self) -> String {
        identity_key(&self.artists, &self.title)
    }

    #[must_use]
    pub fn search_query(&self) -> String {
        format!("{} {}", self.artists, self.title)
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.artists.trim().is_empty() || self.title.trim().is_empty()
    }
}

pub(crate) fn identity_key(artists: &str, title: &str) -> String {
    format!("{}\u{1f}{}", normalize(artists), normalize(title))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribedTrack {
    #[serde(flatten)]
    pub candidate: TrackCandidate,
    /// Sole ranking feature. Blank means "not rankable", never "score zero".
    #[serde(default)]
    pub description: String,
}

impl DescribedTrack {
    #[must_use]
    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    #[serde(flatten)]
    pub track: DescribedTrack,
    pub catalog_id: String,
}

/// Catalog-authoritative record. `artists` and `title` come from the catalog;
/// the generated pair is kept in `generated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedTrack {
    pub generated: TrackCandidate,
    pub artists: String,
    #[serde(rename = "track")]
    pub title: String,
    pub description: String,
    pub catalog_id: String,
    pub playable_uri: String,
    pub external_url: String,
    pub artwork_url: String,
    pub album_name: String,
}

impl EnrichedTrack {
    #[must_use]
    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTrack {
    #[serde(flatten)]
    pub track: EnrichedTrack,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub tracks: Vec<TrackCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribedSet {
    pub tracks: Vec<DescribedTrack>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSet {
    pub tracks: Vec<ResolvedTrack>,
    /// Set when nothing resolved and the fallback record was substituted.
    pub fallback_used: bool,
    /// Misses, per-track lookup errors and duplicate catalog ids.
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedSet {
    pub tracks: Vec<EnrichedTrack>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub tracks: Vec<RankedTrack>,
    /// Tracks left out of ranking for lack of a description.
    pub excluded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_key_ignores_case_and_spacing() {
        let a = TrackCandidate::new("Kanye West,  Chris Martin", "Homecoming");
        let b = TrackCandidate::new(" kanye west, chris martin ", "HOMECOMING");
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn identity_key_keeps_artist_and_title_apart() {
        let a = TrackCandidate::new("A B", "C");
        let b = TrackCandidate::new("A", "B C");
        assert_ne!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn candidate_uses_track_field_name() {
        let value = serde_json::to_value(TrackCandidate::new("Drake", "Headlines"))
            .expect("serializes");
        assert_eq!(value, json!({ "artists": "Drake", "track": "Headlines" }));
    }

    #[test]
    fn resolved_track_flattens_into_one_object() {
        let resolved = ResolvedTrack {
            track: DescribedTrack {
                candidate: TrackCandidate::new("Drake", "Headlines"),
                description: "confident".into(),
            },
            catalog_id: "6LxcPUqx6noURdA5qc4BAT".into(),
        };
        let value = serde_json::to_value(&resolved).expect("serializes");
        assert_eq!(
            value,
            json!({
                "artists": "Drake",
                "track": "Headlines",
                "description": "confident",
                "catalog_id": "6LxcPUqx6noURdA5qc4BAT"
            })
        );
    }

    #[test]
    fn whitespace_description_is_not_rankable() {
        let track = DescribedTrack {
            candidate: TrackCandidate::new("A", "B"),
            description: "   ".into(),
        };
        assert!(!track.has_description());
    }
}
