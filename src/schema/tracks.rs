//! 生成モデル出力のJSON Schema定義。
//!
//! 候補曲リストと説明付き曲リストの2種類。

use once_cell::sync::Lazy;
use serde_json::{Value, json};

pub(crate) const CANDIDATE_TRACKS_SCHEMA_NAME: &str = "candidate_tracks";
pub(crate) const DESCRIBED_TRACKS_SCHEMA_NAME: &str = "described_tracks";

/// `{tracks: [{artists, track}]}`
pub(crate) static CANDIDATE_TRACKS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "CandidateTrackList",
        "type": "object",
        "properties": {
            "tracks": {
                "type": "array",
                "items": { "$ref": "#/$defs/candidate_track" }
            }
        },
        "required": ["tracks"],
        "$defs": {
            "candidate_track": {
                "type": "object",
                "properties": {
                    "artists": {
                        "type": "string",
                        "description": "Display names of all artists, joined with \", \""
                    },
                    "track": {
                        "type": "string",
                        "description": "Song title"
                    }
                },
                "required": ["artists", "track"]
            }
        }
    })
});

/// `{tracks: [{artists, track, description}]}`
pub(crate) static DESCRIBED_TRACKS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "DescribedTrackList",
        "type": "object",
        "properties": {
            "tracks": {
                "type": "array",
                "items": { "$ref": "#/$defs/described_track" }
            }
        },
        "required": ["tracks"],
        "$defs": {
            "described_track": {
                "type": "object",
                "properties": {
                    "artists": { "type": "string" },
                    "track": { "type": "string" },
                    "description": {
                        "type": "string",
                        "description": "One-sentence description of mood, theme, genre and emotional impact"
                    }
                },
                "required": ["artists", "track", "description"]
            }
        }
    })
});
