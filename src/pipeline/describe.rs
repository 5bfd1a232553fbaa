use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::clients::{StructuredGenerator, StructuredRequest};
use crate::schema::tracks::{DESCRIBED_TRACKS_SCHEMA, DESCRIBED_TRACKS_SCHEMA_NAME};

use super::error::{GenerativeStage, PipelineError};
use super::generate::parse_structured;
use super::job::JobContext;
use super::prompts::DESCRIPTION_INSTRUCTION;
use super::track::{CandidateSet, DescribedSet, DescribedTrack};

#[async_trait]
pub trait DescribeStage: Send + Sync {
    /// Output has exactly the input's cardinality and order.
    async fn describe(
        &self,
        job: &JobContext,
        candidates: CandidateSet,
    ) -> Result<DescribedSet, PipelineError>;
}

/// Describes the whole candidate set in one batched generative call.
pub struct LlmDescribeStage {
    generator: Arc<dyn StructuredGenerator>,
}

impl LlmDescribeStage {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct AlignmentStats {
    by_key: usize,
    by_position: usize,
    missing: usize,
}

/// Maps model entries back onto the candidates.
///
/// Key match first, then the unconsumed entry at the same position, otherwise
/// an empty description. Positional matches are only taken when the response
/// has exactly one entry per candidate; once entries are missing, indices no
/// longer line up. The candidate's own identity is always kept.
fn align(candidates: CandidateSet, response: DescribedSet) -> (DescribedSet, AlignmentStats) {
    let positions_line_up = response.tracks.len() == candidates.tracks.len();
    let mut descriptions: Vec<Option<String>> = response
        .tracks
        .iter()
        .map(|track| Some(track.description.clone()))
        .collect();

    let mut by_key: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (index, track) in response.tracks.iter().enumerate() {
        by_key
            .entry(track.candidate.identity_key())
            .or_default()
            .push_back(index);
    }

    let mut assigned: Vec<Option<String>> = candidates
        .tracks
        .iter()
        .map(|candidate| {
            by_key
                .get_mut(&candidate.identity_key())
                .and_then(VecDeque::pop_front)
                .and_then(|index| descriptions[index].take())
        })
        .collect();

    let mut stats = AlignmentStats::default();
    for (index, slot) in assigned.iter_mut().enumerate() {
        if slot.is_some() {
            stats.by_key += 1;
            continue;
        }
        if positions_line_up {
            *slot = descriptions.get_mut(index).and_then(Option::take);
        }
        if slot.is_some() {
            stats.by_position += 1;
            debug!(
                candidate = %candidates.tracks[index].search_query(),
                response = %response.tracks[index].candidate.search_query(),
                "description matched by position"
            );
        } else {
            stats.missing += 1;
        }
    }

    let tracks = candidates
        .tracks
        .into_iter()
        .zip(assigned)
        .map(|(candidate, description)| DescribedTrack {
            candidate,
            description: description.unwrap_or_default(),
        })
        .collect();

    (DescribedSet { tracks }, stats)
}

#[async_trait]
impl DescribeStage for LlmDescribeStage {
    async fn describe(
        &self,
        job: &JobContext,
        candidates: CandidateSet,
    ) -> Result<DescribedSet, PipelineError> {
        let payload = format!("{:#}", json!({ "tracks": &candidates.tracks }));
        let request = StructuredRequest {
            system: DESCRIPTION_INSTRUCTION,
            user: &payload,
            schema_name: DESCRIBED_TRACKS_SCHEMA_NAME,
            schema: &DESCRIBED_TRACKS_SCHEMA,
        };

        let raw = self
            .generator
            .generate(&request)
            .await
            .map_err(|e| PipelineError::service(GenerativeStage::Descriptions, e))?;

        let response: DescribedSet =
            parse_structured(&raw, &DESCRIBED_TRACKS_SCHEMA).map_err(|reason| {
                warn!(job_id = %job.job_id, error = %reason, "description payload rejected");
                PipelineError::parse(GenerativeStage::Descriptions, reason)
            })?;

        let returned = response.tracks.len();
        let (described, stats) = align(candidates, response);
        if stats.by_position > 0 || stats.missing > 0 {
            warn!(
                job_id = %job.job_id,
                returned,
                by_position = stats.by_position,
                missing = stats.missing,
                "description response did not line up with the candidates"
            );
        }

        info!(
            job_id = %job.job_id,
            tracks = described.tracks.len(),
            with_description = described.tracks.iter().filter(|t| t.has_description()).count(),
            "candidate tracks described"
        );

        Ok(described)
    }
}
