use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::embedding::{Embedder, cosine_similarity};
use super::error::PipelineError;
use super::job::JobContext;
use super::prompts::ranking_query;
use super::track::{EnrichedSet, RankedList, RankedTrack};

#[async_trait]
pub trait RankStage: Send + Sync {
    async fn rank(&self, job: &JobContext, enriched: EnrichedSet)
    -> Result<RankedList, PipelineError>;
}

/// Orders tracks by cosine similarity between the prefixed query and each
/// description, all embedded in one batch.
pub struct SemanticRankStage {
    embedder: Arc<dyn Embedder>,
}

impl SemanticRankStage {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

/// Sorts by score, highest first. Equal scores keep their input order.
pub fn order_by_score(tracks: &mut [RankedTrack]) {
    tracks.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
}

#[async_trait]
impl RankStage for SemanticRankStage {
    async fn rank(
        &self,
        job: &JobContext,
        enriched: EnrichedSet,
    ) -> Result<RankedList, PipelineError> {
        if enriched.tracks.is_empty() {
            return Err(PipelineError::NoRankableTracks("no tracks to rank"));
        }

        let total = enriched.tracks.len();
        let (rankable, excluded): (Vec<_>, Vec<_>) = enriched
            .tracks
            .into_iter()
            .partition(|track| track.has_description());
        if rankable.is_empty() {
            return Err(PipelineError::NoRankableTracks(
                "no track has a description",
            ));
        }
        if !excluded.is_empty() {
            debug!(
                job_id = %job.job_id,
                excluded = excluded.len(),
                "tracks without description left out of ranking"
            );
        }

        let mut texts = Vec::with_capacity(rankable.len() + 1);
        texts.push(ranking_query(&job.query));
        texts.extend(rankable.iter().map(|track| track.description.clone()));

        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| PipelineError::Embedding(format!("{e:#}")))?;
        if embeddings.len() != texts.len() {
            return Err(PipelineError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let (query_vector, description_vectors) = embeddings
            .split_first()
            .ok_or_else(|| PipelineError::Embedding("embedding batch was empty".into()))?;

        let mut ranked: Vec<RankedTrack> = rankable
            .into_iter()
            .zip(description_vectors)
            .map(|(track, vector)| RankedTrack {
                similarity_score: cosine_similarity(query_vector, vector),
                track,
            })
            .collect();

        order_by_score(&mut ranked);
        ranked.truncate(job.top_n);

        info!(
            job_id = %job.job_id,
            candidates = total,
            excluded = excluded.len(),
            returned = ranked.len(),
            top_score = ranked.first().map(|t| t.similarity_score),
            "tracks ranked"
        );

        Ok(RankedList {
            tracks: ranked,
            excluded: excluded.len(),
        })
    }
}
