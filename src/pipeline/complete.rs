use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::clients::{CatalogError, CatalogMetadata, CatalogTrack};
use crate::observability::metrics::Metrics;

use super::error::PipelineError;
use super::job::JobContext;
use super::track::{EnrichedSet, EnrichedTrack, ResolvedSet, ResolvedTrack};

/// What the completer does when a single metadata fetch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataFailurePolicy {
    /// Fail the whole stage.
    #[default]
    Abort,
    /// Drop the track and continue; fails only if every fetch fails.
    Skip,
}

impl FromStr for MetadataFailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!("expected `abort` or `skip`, got `{other}`")),
        }
    }
}

#[async_trait]
pub trait CompleteStage: Send + Sync {
    async fn complete(
        &self,
        job: &JobContext,
        resolved: ResolvedSet,
    ) -> Result<EnrichedSet, PipelineError>;
}

/// Replaces generated names with catalog metadata, fetched in the resolver's market.
pub struct CatalogCompleteStage {
    metadata: Arc<dyn CatalogMetadata>,
    market: String,
    concurrency: usize,
    policy: MetadataFailurePolicy,
    metrics: Arc<Metrics>,
}

impl CatalogCompleteStage {
    pub fn new(
        metadata: Arc<dyn CatalogMetadata>,
        market: impl Into<String>,
        concurrency: usize,
        policy: MetadataFailurePolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            metadata,
            market: market.into(),
            concurrency: concurrency.max(1),
            policy,
            metrics,
        }
    }
}

fn merge(resolved: ResolvedTrack, catalog: CatalogTrack) -> EnrichedTrack {
    let artwork_url = catalog.artwork_url().to_string();
    let artists = catalog.artists_display();
    EnrichedTrack {
        generated: resolved.track.candidate,
        artists,
        title: catalog.name,
        description: resolved.track.description,
        catalog_id: resolved.catalog_id,
        playable_uri: catalog.uri,
        external_url: catalog.external_url,
        artwork_url,
        album_name: catalog.album_name,
    }
}

#[async_trait]
impl CompleteStage for CatalogCompleteStage {
    async fn complete(
        &self,
        job: &JobContext,
        resolved: ResolvedSet,
    ) -> Result<EnrichedSet, PipelineError> {
        let total = resolved.tracks.len();
        let requests: Vec<_> = resolved
            .tracks
            .iter()
            .map(|track| self.metadata.track(&track.catalog_id, &self.market))
            .collect();
        let fetches: Vec<Result<CatalogTrack, CatalogError>> =
            stream::iter(requests)
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut tracks = Vec::with_capacity(total);
        let mut first_error: Option<PipelineError> = None;
        let mut skipped = 0;

        for (track, fetched) in resolved.tracks.into_iter().zip(fetches) {
            match fetched {
                Ok(catalog) => tracks.push(merge(track, catalog)),
                Err(source) => {
                    self.metrics.metadata_failures.inc();
                    let error = PipelineError::MetadataFetch {
                        catalog_id: track.catalog_id,
                        source,
                    };
                    if self.policy == MetadataFailurePolicy::Abort {
                        return Err(error);
                    }
                    warn!(job_id = %job.job_id, error = %error, "skipping track without metadata");
                    skipped += 1;
                    first_error.get_or_insert(error);
                }
            }
        }

        if tracks.is_empty() {
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        info!(
            job_id = %job.job_id,
            completed = tracks.len(),
            skipped,
            "track metadata completed"
        );

        Ok(EnrichedSet { tracks, skipped })
    }
}
