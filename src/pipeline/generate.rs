use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::{StructuredGenerator, StructuredRequest};
use crate::schema::tracks::{CANDIDATE_TRACKS_SCHEMA, CANDIDATE_TRACKS_SCHEMA_NAME};
use crate::schema::validate_json;
use crate::util::json::extract_outer_object;

use super::error::{GenerativeStage, ParseFailure, PipelineError};
use super::job::JobContext;
use super::prompts::candidate_instruction;
use super::track::CandidateSet;

#[async_trait]
pub trait CandidateStage: Send + Sync {
    async fn generate(&self, job: &JobContext) -> Result<CandidateSet, PipelineError>;
}

/// Asks the generative service for `count` candidates matching the query.
pub struct LlmCandidateStage {
    generator: Arc<dyn StructuredGenerator>,
    count: usize,
}

impl LlmCandidateStage {
    pub fn new(generator: Arc<dyn StructuredGenerator>, count: usize) -> Self {
        Self { generator, count }
    }
}

/// Repairs, validates and deserializes a structured payload.
///
/// Repair only strips wrappers (code fences, surrounding prose); it never
/// fills in missing fields.
pub(crate) fn parse_structured<T: DeserializeOwned>(
    raw: &str,
    schema: &Value,
) -> Result<T, ParseFailure> {
    let value =
        extract_outer_object(raw).map_err(|e| ParseFailure::MalformedJson(e.to_string()))?;

    let validation = validate_json(schema, &value);
    if !validation.valid {
        return Err(ParseFailure::SchemaViolation(validation.errors));
    }

    serde_json::from_value(value).map_err(|e| ParseFailure::SchemaViolation(vec![e.to_string()]))
}

#[async_trait]
impl CandidateStage for LlmCandidateStage {
    async fn generate(&self, job: &JobContext) -> Result<CandidateSet, PipelineError> {
        let instruction = candidate_instruction(self.count);
        let request = StructuredRequest {
            system: &instruction,
            user: &job.query,
            schema_name: CANDIDATE_TRACKS_SCHEMA_NAME,
            schema: &CANDIDATE_TRACKS_SCHEMA,
        };

        let raw = self
            .generator
            .generate(&request)
            .await
            .map_err(|e| PipelineError::service(GenerativeStage::Candidates, e))?;

        let parsed: CandidateSet = parse_structured(&raw, &CANDIDATE_TRACKS_SCHEMA).map_err(|reason| {
            warn!(job_id = %job.job_id, error = %reason, "candidate payload rejected");
            debug!(job_id = %job.job_id, raw = %raw, "rejected candidate payload");
            PipelineError::parse(GenerativeStage::Candidates, reason)
        })?;

        let returned = parsed.tracks.len();
        let mut seen = HashSet::with_capacity(returned);
        let tracks: Vec<_> = parsed
            .tracks
            .into_iter()
            .filter(|candidate| !candidate.is_blank())
            .filter(|candidate| seen.insert(candidate.identity_key()))
            .collect();

        if tracks.is_empty() {
            return Err(PipelineError::parse(
                GenerativeStage::Candidates,
                ParseFailure::Empty,
            ));
        }

        info!(
            job_id = %job.job_id,
            model = self.generator.model(),
            requested = self.count,
            returned,
            kept = tracks.len(),
            "candidate tracks generated"
        );

        Ok(CandidateSet { tracks })
    }
}
