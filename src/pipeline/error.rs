use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::clients::{CatalogError, LlmError};

/// Which generative stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerativeStage {
    Candidates,
    Descriptions,
}

impl fmt::Display for GenerativeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Candidates => "candidate generation",
            Self::Descriptions => "description enrichment",
        })
    }
}

/// Why a generative payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("payload violates the schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("payload contains no usable tracks")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} returned unusable output: {reason}")]
    GenerationParse {
        stage: GenerativeStage,
        reason: ParseFailure,
    },

    #[error("{stage} failed to reach the generative service: {source}")]
    GenerationService {
        stage: GenerativeStage,
        #[source]
        source: LlmError,
    },

    #[error("metadata fetch failed for {catalog_id}: {source}")]
    MetadataFetch {
        catalog_id: String,
        #[source]
        source: CatalogError,
    },

    #[error("no rankable tracks: {0}")]
    NoRankableTracks(&'static str),

    /// Nothing resolved in the catalog and the fallback record could not be ranked.
    #[error("no candidate could be found in the catalog")]
    CatalogExhausted,

    #[error("embedding failed: {0}")]
    Embedding(String),
}

/// User-facing classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ModelUnusable,
    CatalogUnavailable,
    NoCatalogMatch,
    NothingToRank,
    Internal,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModelUnusable => "model_unusable",
            Self::CatalogUnavailable => "catalog_unavailable",
            Self::NoCatalogMatch => "no_catalog_match",
            Self::NothingToRank => "nothing_to_rank",
            Self::Internal => "internal",
        }
    }

    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::ModelUnusable => {
                "The model could not produce a usable playlist. Try rephrasing the prompt."
            }
            Self::CatalogUnavailable => "The music catalog is unavailable. Please try again.",
            Self::NoCatalogMatch => "No song could be found in the catalog. Please try again.",
            Self::NothingToRank => "No songs could be ranked. Try broadening the prompt.",
            Self::Internal => "Something went wrong while ranking the playlist.",
        }
    }

    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::ModelUnusable | Self::CatalogUnavailable => 502,
            Self::NoCatalogMatch => 404,
            Self::NothingToRank => 422,
            Self::Internal => 500,
        }
    }
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::GenerationParse { .. } | Self::GenerationService { .. } => {
                FailureKind::ModelUnusable
            }
            Self::MetadataFetch { .. } => FailureKind::CatalogUnavailable,
            Self::CatalogExhausted => FailureKind::NoCatalogMatch,
            Self::NoRankableTracks(_) => FailureKind::NothingToRank,
            Self::Embedding(_) => FailureKind::Internal,
        }
    }

    pub(crate) fn parse(stage: GenerativeStage, reason: ParseFailure) -> Self {
        Self::GenerationParse { stage, reason }
    }

    pub(crate) fn service(stage: GenerativeStage, source: LlmError) -> Self {
        Self::GenerationService { stage, source }
    }
}
