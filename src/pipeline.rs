//! Mood-to-playlist pipeline: generate → describe → resolve → complete → rank.
//!
//! Each stage sits behind a trait object so the orchestrator can be assembled
//! from production stages or test doubles through [`PipelineBuilder`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use serde::Serialize;
use uuid::Uuid;

use crate::clients::{CatalogMetadata, CatalogSearch, StructuredGenerator};
use crate::config::Config;
use crate::observability::metrics::Metrics;

pub mod complete;
pub mod describe;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod job;
pub mod prompts;
pub mod rank;
pub mod resolve;
pub mod snapshot;
pub mod track;

pub use error::{FailureKind, GenerativeStage, ParseFailure, PipelineError};
pub use job::JobContext;
pub use track::{
    CandidateSet, DescribedSet, DescribedTrack, EnrichedSet, EnrichedTrack, RankedList,
    RankedTrack, ResolvedSet, ResolvedTrack, TrackCandidate,
};

use complete::{CatalogCompleteStage, CompleteStage};
use describe::{DescribeStage, LlmDescribeStage};
use embedding::Embedder;
use generate::{CandidateStage, LlmCandidateStage};
use rank::{RankStage, SemanticRankStage};
use resolve::{CatalogResolveStage, ResolveStage};
use snapshot::{DebugSink, FileDebugSink, NoopDebugSink};

/// External capabilities the production stages are built from.
#[derive(Clone)]
pub struct Capabilities {
    pub generator: Arc<dyn StructuredGenerator>,
    pub search: Arc<dyn CatalogSearch>,
    pub metadata: Arc<dyn CatalogMetadata>,
    pub embedder: Arc<dyn Embedder>,
}

/// Result of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistOutcome {
    pub job_id: Uuid,
    pub query: String,
    pub fallback_used: bool,
    pub tracks: Vec<RankedTrack>,
}

pub struct PipelineOrchestrator {
    stages: PipelineStages,
    sink: Arc<dyn DebugSink>,
    metrics: Arc<Metrics>,
}

struct PipelineStages {
    generate: Arc<dyn CandidateStage>,
    describe: Arc<dyn DescribeStage>,
    resolve: Arc<dyn ResolveStage>,
    complete: Arc<dyn CompleteStage>,
    rank: Arc<dyn RankStage>,
}

pub struct PipelineBuilder {
    generate: Option<Arc<dyn CandidateStage>>,
    describe: Option<Arc<dyn DescribeStage>>,
    resolve: Option<Arc<dyn ResolveStage>>,
    complete: Option<Arc<dyn CompleteStage>>,
    rank: Option<Arc<dyn RankStage>>,
    sink: Option<Arc<dyn DebugSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl PipelineOrchestrator {
    /// Wires the production stages from configuration.
    ///
    /// # Errors
    /// Only if the builder is left incomplete, which this constructor does not do.
    pub fn from_config(
        config: &Config,
        capabilities: Capabilities,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let sink: Arc<dyn DebugSink> = match config.debug_snapshot_dir() {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "debug snapshots enabled");
                Arc::new(FileDebugSink::new(dir))
            }
            None => Arc::new(NoopDebugSink),
        };

        PipelineBuilder::new()
            .with_generate_stage(Arc::new(LlmCandidateStage::new(
                Arc::clone(&capabilities.generator),
                config.llm_candidate_count(),
            )))
            .with_describe_stage(Arc::new(LlmDescribeStage::new(capabilities.generator)))
            .with_resolve_stage(Arc::new(CatalogResolveStage::new(
                capabilities.search,
                config.catalog_market(),
                config.catalog_max_concurrency(),
                Arc::clone(&metrics),
            )))
            .with_complete_stage(Arc::new(CatalogCompleteStage::new(
                capabilities.metadata,
                config.catalog_market(),
                config.catalog_max_concurrency(),
                config.metadata_failure_policy(),
                Arc::clone(&metrics),
            )))
            .with_rank_stage(Arc::new(SemanticRankStage::new(capabilities.embedder)))
            .with_debug_sink(sink)
            .with_metrics(metrics)
            .build()
    }

    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs every stage in order and records the job's outcome.
    ///
    /// # Errors
    /// The first fatal stage error. [`PipelineError::kind`] classifies it for users.
    pub async fn execute(&self, job: &JobContext) -> Result<PlaylistOutcome, PipelineError> {
        tracing::info!(job_id = %job.job_id, query = %job.query, top_n = job.top_n, "playlist pipeline started");
        let started = Instant::now();
        let result = self.run(job).await;
        self.metrics
            .job_duration
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                self.metrics.jobs_completed.inc();
                tracing::info!(
                    job_id = %job.job_id,
                    tracks = outcome.tracks.len(),
                    fallback_used = outcome.fallback_used,
                    elapsed_ms = started.elapsed().as_millis(),
                    "playlist pipeline completed"
                );
            }
            Err(error) => {
                let kind = error.kind();
                self.metrics
                    .jobs_failed
                    .with_label_values(&[kind.as_str()])
                    .inc();
                tracing::error!(
                    job_id = %job.job_id,
                    kind = kind.as_str(),
                    error = %error,
                    "playlist pipeline failed"
                );
            }
        }
        result
    }

    async fn run(&self, job: &JobContext) -> Result<PlaylistOutcome, PipelineError> {
        let candidates = {
            let _timer = self.metrics.generate_duration.start_timer();
            self.stages.generate.generate(job).await?
        };
        self.metrics
            .candidates_generated
            .inc_by(candidates.tracks.len() as u64);
        self.snapshot(job, "initial_candidate_tracks", &candidates)
            .await;

        let described = {
            let _timer = self.metrics.describe_duration.start_timer();
            self.stages.describe.describe(job, candidates).await?
        };
        self.snapshot(job, "described_candidate_tracks", &described)
            .await;

        let resolved = {
            let _timer = self.metrics.resolve_duration.start_timer();
            self.stages.resolve.resolve(job, described).await
        };
        self.snapshot(job, "candidate_tracks_with_ids", &resolved)
            .await;
        let fallback_used = resolved.fallback_used;

        let enriched = {
            let _timer = self.metrics.complete_duration.start_timer();
            self.stages.complete.complete(job, resolved).await?
        };
        self.snapshot(job, "final_candidate_tracks", &enriched)
            .await;

        let ranked = {
            let _timer = self.metrics.rank_duration.start_timer();
            self.stages.rank.rank(job, enriched).await
        };
        let ranked = match ranked {
            Err(PipelineError::NoRankableTracks(_)) if fallback_used => {
                return Err(PipelineError::CatalogExhausted);
            }
            other => other?,
        };
        self.metrics
            .tracks_ranked
            .inc_by(ranked.tracks.len() as u64);
        self.metrics.tracks_excluded.inc_by(ranked.excluded as u64);
        self.snapshot(job, "ranked_tracks", &ranked).await;

        Ok(PlaylistOutcome {
            job_id: job.job_id,
            query: job.query.clone(),
            fallback_used,
            tracks: ranked.tracks,
        })
    }

    async fn snapshot<T: Serialize + Sync>(&self, job: &JobContext, label: &str, data: &T) {
        let outcome = match serde_json::to_value(data) {
            Ok(value) => self.sink.snapshot(job, label, &value).await,
            Err(error) => Err(error.into()),
        };
        if let Err(error) = outcome {
            self.metrics.snapshot_failures.inc();
            tracing::warn!(
                job_id = %job.job_id,
                label,
                error = %error,
                "debug snapshot failed"
            );
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generate: None,
            describe: None,
            resolve: None,
            complete: None,
            rank: None,
            sink: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_generate_stage(mut self, stage: Arc<dyn CandidateStage>) -> Self {
        self.generate = Some(stage);
        self
    }

    #[must_use]
    pub fn with_describe_stage(mut self, stage: Arc<dyn DescribeStage>) -> Self {
        self.describe = Some(stage);
        self
    }

    #[must_use]
    pub fn with_resolve_stage(mut self, stage: Arc<dyn ResolveStage>) -> Self {
        self.resolve = Some(stage);
        self
    }

    #[must_use]
    pub fn with_complete_stage(mut self, stage: Arc<dyn CompleteStage>) -> Self {
        self.complete = Some(stage);
        self
    }

    #[must_use]
    pub fn with_rank_stage(mut self, stage: Arc<dyn RankStage>) -> Self {
        self.rank = Some(stage);
        self
    }

    /// Defaults to [`NoopDebugSink`].
    #[must_use]
    pub fn with_debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to metrics on a private registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    /// A stage was not configured.
    pub fn build(self) -> Result<PipelineOrchestrator> {
        let stages = PipelineStages {
            generate: self
                .generate
                .ok_or_else(|| anyhow!("generate stage must be configured before build"))?,
            describe: self
                .describe
                .ok_or_else(|| anyhow!("describe stage must be configured before build"))?,
            resolve: self
                .resolve
                .ok_or_else(|| anyhow!("resolve stage must be configured before build"))?,
            complete: self
                .complete
                .ok_or_else(|| anyhow!("complete stage must be configured before build"))?,
            rank: self
                .rank
                .ok_or_else(|| anyhow!("rank stage must be configured before build"))?,
        };
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(Metrics::new(&prometheus::Registry::new())?),
        };

        Ok(PipelineOrchestrator {
            stages,
            sink: self.sink.unwrap_or_else(|| Arc::new(NoopDebugSink)),
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::pipeline::resolve::fallback_track;

    type Order = Arc<Mutex<Vec<&'static str>>>;

    struct RecordingGenerate(Order);
    struct RecordingDescribe(Order);
    struct RecordingResolve {
        order: Order,
        fallback: bool,
    }
    struct RecordingComplete(Order);
    struct RecordingRank(Order);

    #[async_trait]
    impl CandidateStage for RecordingGenerate {
        async fn generate(&self, _job: &JobContext) -> Result<CandidateSet, PipelineError> {
            self.0.lock().expect("order lock").push("generate");
            Ok(CandidateSet {
                tracks: vec![TrackCandidate::new("Drake", "Headlines")],
            })
        }
    }

    #[async_trait]
    impl DescribeStage for RecordingDescribe {
        async fn describe(
            &self,
            _job: &JobContext,
            candidates: CandidateSet,
        ) -> Result<DescribedSet, PipelineError> {
            self.0.lock().expect("order lock").push("describe");
            Ok(DescribedSet {
                tracks: candidates
                    .tracks
                    .into_iter()
                    .map(|candidate| DescribedTrack {
                        candidate,
                        description: "confident".into(),
                    })
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl ResolveStage for RecordingResolve {
        async fn resolve(&self, _job: &JobContext, described: DescribedSet) -> ResolvedSet {
            self.order.lock().expect("order lock").push("resolve");
            if self.fallback {
                return ResolvedSet {
                    tracks: vec![fallback_track()],
                    fallback_used: true,
                    dropped: described.tracks.len(),
                };
            }
            ResolvedSet {
                tracks: described
                    .tracks
                    .into_iter()
                    .map(|track| ResolvedTrack {
                        track,
                        catalog_id: "id".into(),
                    })
                    .collect(),
                fallback_used: false,
                dropped: 0,
            }
        }
    }

    #[async_trait]
    impl CompleteStage for RecordingComplete {
        async fn complete(
            &self,
            _job: &JobContext,
            resolved: ResolvedSet,
        ) -> Result<EnrichedSet, PipelineError> {
            self.0.lock().expect("order lock").push("complete");
            Ok(EnrichedSet {
                tracks: resolved
                    .tracks
                    .into_iter()
                    .map(|t| EnrichedTrack {
                        generated: t.track.candidate.clone(),
                        artists: t.track.candidate.artists,
                        title: t.track.candidate.title,
                        description: t.track.description,
                        catalog_id: t.catalog_id,
                        playable_uri: String::new(),
                        external_url: String::new(),
                        artwork_url: String::new(),
                        album_name: String::new(),
                    })
                    .collect(),
                skipped: 0,
            })
        }
    }

    #[async_trait]
    impl RankStage for RecordingRank {
        async fn rank(
            &self,
            _job: &JobContext,
            enriched: EnrichedSet,
        ) -> Result<RankedList, PipelineError> {
            self.0.lock().expect("order lock").push("rank");
            if enriched.tracks.iter().all(|t| !t.has_description()) {
                return Err(PipelineError::NoRankableTracks("no track has a description"));
            }
            Ok(RankedList {
                tracks: enriched
                    .tracks
                    .into_iter()
                    .map(|track| RankedTrack {
                        track,
                        similarity_score: 0.5,
                    })
                    .collect(),
                excluded: 0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        labels: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DebugSink for RecordingSink {
        async fn snapshot(&self, _job: &JobContext, label: &str, data: &Value) -> Result<()> {
            assert!(data.get("tracks").is_some());
            self.labels.lock().expect("labels lock").push(label.to_string());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl DebugSink for FailingSink {
        async fn snapshot(&self, _job: &JobContext, _label: &str, _data: &Value) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    fn pipeline(order: &Order, fallback: bool, sink: Arc<dyn DebugSink>) -> PipelineOrchestrator {
        PipelineOrchestrator::builder()
            .with_generate_stage(Arc::new(RecordingGenerate(Arc::clone(order))))
            .with_describe_stage(Arc::new(RecordingDescribe(Arc::clone(order))))
            .with_resolve_stage(Arc::new(RecordingResolve {
                order: Arc::clone(order),
                fallback,
            }))
            .with_complete_stage(Arc::new(RecordingComplete(Arc::clone(order))))
            .with_rank_stage(Arc::new(RecordingRank(Arc::clone(order))))
            .with_debug_sink(sink)
            .build()
            .expect("all stages configured")
    }

    #[tokio::test]
    async fn orchestrator_runs_stages_in_order_and_snapshots_each() {
        let order: Order = Arc::default();
        let sink = Arc::new(RecordingSink::default());
        let outcome = pipeline(&order, false, sink.clone())
            .execute(&JobContext::new("rainy day", 20))
            .await
            .expect("pipeline should succeed");

        assert_eq!(outcome.tracks.len(), 1);
        assert!(!outcome.fallback_used);
        assert_eq!(
            *order.lock().expect("order lock"),
            vec!["generate", "describe", "resolve", "complete", "rank"]
        );
        assert_eq!(
            *sink.labels.lock().expect("labels lock"),
            vec![
                "initial_candidate_tracks",
                "described_candidate_tracks",
                "candidate_tracks_with_ids",
                "final_candidate_tracks",
                "ranked_tracks",
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_failures_do_not_fail_the_run() {
        let order: Order = Arc::default();
        let outcome = pipeline(&order, false, Arc::new(FailingSink))
            .execute(&JobContext::new("rainy day", 20))
            .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn unrankable_fallback_maps_to_catalog_exhausted() {
        let order: Order = Arc::default();
        let error = pipeline(&order, true, Arc::new(NoopDebugSink))
            .execute(&JobContext::new("rainy day", 20))
            .await
            .expect_err("fallback has no description");

        assert!(matches!(error, PipelineError::CatalogExhausted));
        assert_eq!(error.kind(), FailureKind::NoCatalogMatch);
    }

    #[test]
    fn build_requires_every_stage() {
        let result = PipelineOrchestrator::builder().build();
        assert!(result.is_err());
    }
}
