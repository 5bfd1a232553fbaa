//! Prometheusメトリクス定義。

use prometheus::{
    Histogram, IntCounter, IntCounterVec, Registry, exponential_buckets, histogram_opts,
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub jobs_completed: IntCounter,
    pub jobs_failed: IntCounterVec,
    pub candidates_generated: IntCounter,
    pub tracks_resolved: IntCounter,
    pub resolution_misses: IntCounter,
    pub resolution_errors: IntCounter,
    pub fallback_injections: IntCounter,
    pub metadata_failures: IntCounter,
    pub tracks_ranked: IntCounter,
    pub tracks_excluded: IntCounter,
    pub snapshot_failures: IntCounter,
    pub playlists_saved: IntCounter,
    pub health_probes: IntCounterVec,

    // ヒストグラム
    pub generate_duration: Histogram,
    pub describe_duration: Histogram,
    pub resolve_duration: Histogram,
    pub complete_duration: Histogram,
    pub rank_duration: Histogram,
    pub job_duration: Histogram,
}

macro_rules! stage_histogram {
    ($name:expr, $help:expr, $registry:expr) => {
        register_histogram_with_registry!(
            histogram_opts!($name, $help, exponential_buckets(0.05, 2.0, 12)?),
            $registry
        )
    };
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名メトリクスが既に登録されている場合。
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            jobs_completed: register_int_counter_with_registry!(
                "playlist_jobs_completed_total",
                "Total number of playlist jobs completed",
                registry
            )?,
            jobs_failed: register_int_counter_vec_with_registry!(
                "playlist_jobs_failed_total",
                "Total number of playlist jobs failed, by failure kind",
                &["kind"],
                registry
            )?,
            candidates_generated: register_int_counter_with_registry!(
                "playlist_candidates_generated_total",
                "Candidate tracks kept after generation",
                registry
            )?,
            tracks_resolved: register_int_counter_with_registry!(
                "playlist_tracks_resolved_total",
                "Tracks resolved to a catalog id",
                registry
            )?,
            resolution_misses: register_int_counter_with_registry!(
                "playlist_resolution_misses_total",
                "Catalog searches with no result",
                registry
            )?,
            resolution_errors: register_int_counter_with_registry!(
                "playlist_resolution_errors_total",
                "Catalog searches that failed and were treated as misses",
                registry
            )?,
            fallback_injections: register_int_counter_with_registry!(
                "playlist_fallback_injections_total",
                "Runs where the fallback track replaced an empty resolution",
                registry
            )?,
            metadata_failures: register_int_counter_with_registry!(
                "playlist_metadata_failures_total",
                "Track metadata fetches that failed",
                registry
            )?,
            tracks_ranked: register_int_counter_with_registry!(
                "playlist_tracks_ranked_total",
                "Tracks returned after ranking and truncation",
                registry
            )?,
            tracks_excluded: register_int_counter_with_registry!(
                "playlist_tracks_excluded_total",
                "Tracks excluded from ranking for lack of a description",
                registry
            )?,
            snapshot_failures: register_int_counter_with_registry!(
                "playlist_snapshot_failures_total",
                "Debug snapshots that could not be written",
                registry
            )?,
            playlists_saved: register_int_counter_with_registry!(
                "playlist_saved_total",
                "Playlists written to a user account",
                registry
            )?,
            health_probes: register_int_counter_vec_with_registry!(
                "playlist_health_probes_total",
                "Health probe requests, by probe and outcome",
                &["probe", "outcome"],
                registry
            )?,
            generate_duration: stage_histogram!(
                "playlist_generate_duration_seconds",
                "Candidate generation latency",
                registry
            )?,
            describe_duration: stage_histogram!(
                "playlist_describe_duration_seconds",
                "Description enrichment latency",
                registry
            )?,
            resolve_duration: stage_histogram!(
                "playlist_resolve_duration_seconds",
                "Catalog resolution latency",
                registry
            )?,
            complete_duration: stage_histogram!(
                "playlist_complete_duration_seconds",
                "Metadata completion latency",
                registry
            )?,
            rank_duration: stage_histogram!(
                "playlist_rank_duration_seconds",
                "Semantic ranking latency",
                registry
            )?,
            job_duration: stage_histogram!(
                "playlist_job_duration_seconds",
                "End-to-end playlist job latency",
                registry
            )?,
        })
    }

    /// 使い捨てレジストリに登録したインスタンス。
    ///
    /// # Panics
    /// 新規レジストリへの登録は失敗しないため、実際には発生しない。
    #[cfg(test)]
    pub(crate) fn new_for_test() -> Self {
        Self::new(&Registry::new()).expect("fresh registry accepts all metrics")
    }
}
