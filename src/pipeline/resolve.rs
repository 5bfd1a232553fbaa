use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::clients::CatalogSearch;
use crate::observability::metrics::Metrics;

use super::job::JobContext;
use super::track::{DescribedSet, DescribedTrack, ResolvedSet, ResolvedTrack, TrackCandidate};

pub const FALLBACK_ARTISTS: &str = "The Weeknd";
pub const FALLBACK_TITLE: &str = "Blinding Lights";
pub const FALLBACK_CATALOG_ID: &str = "0VjIjW4GlUZAMYd2vXMi3b";

#[async_trait]
pub trait ResolveStage: Send + Sync {
    /// Never returns an empty set.
    async fn resolve(&self, job: &JobContext, described: DescribedSet) -> ResolvedSet;
}

/// Record substituted when no candidate resolves. Its description is empty.
#[must_use]
pub fn fallback_track() -> ResolvedTrack {
    ResolvedTrack {
        track: DescribedTrack {
            candidate: TrackCandidate::new(FALLBACK_ARTISTS, FALLBACK_TITLE),
            description: String::new(),
        },
        catalog_id: FALLBACK_CATALOG_ID.to_string(),
    }
}

/// One catalog search per track, first hit wins.
pub struct CatalogResolveStage {
    search: Arc<dyn CatalogSearch>,
    market: String,
    concurrency: usize,
    metrics: Arc<Metrics>,
}

impl CatalogResolveStage {
    pub fn new(
        search: Arc<dyn CatalogSearch>,
        market: impl Into<String>,
        concurrency: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            search,
            market: market.into(),
            concurrency: concurrency.max(1),
            metrics,
        }
    }

    async fn lookup(&self, job: &JobContext, track: &DescribedTrack) -> Option<String> {
        let query = track.candidate.search_query();
        match self.search.search_tracks(&query, 1, &self.market).await {
            Ok(matches) => {
                let hit = matches.into_iter().next().map(|m| m.id);
                if hit.is_none() {
                    self.metrics.resolution_misses.inc();
                    debug!(job_id = %job.job_id, query = %query, "no catalog match");
                }
                hit
            }
            Err(error) => {
                self.metrics.resolution_errors.inc();
                warn!(
                    job_id = %job.job_id,
                    query = %query,
                    error = %error,
                    "catalog search failed, treating as a miss"
                );
                None
            }
        }
    }
}

#[async_trait]
impl ResolveStage for CatalogResolveStage {
    async fn resolve(&self, job: &JobContext, described: DescribedSet) -> ResolvedSet {
        let total = described.tracks.len();

        // buffered() yields in input order regardless of completion order
        let requests: Vec<_> = described
            .tracks
            .iter()
            .map(|track| self.lookup(job, track))
            .collect();
        let lookups: Vec<Option<String>> = stream::iter(requests)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut seen = HashSet::with_capacity(total);
        let mut dropped = 0;
        let mut tracks = Vec::with_capacity(total);
        for (track, catalog_id) in described.tracks.into_iter().zip(lookups) {
            match catalog_id {
                Some(id) if seen.insert(id.clone()) => tracks.push(ResolvedTrack {
                    track,
                    catalog_id: id,
                }),
                Some(id) => {
                    debug!(job_id = %job.job_id, catalog_id = %id, "duplicate catalog id dropped");
                    dropped += 1;
                }
                None => dropped += 1,
            }
        }

        self.metrics.tracks_resolved.inc_by(tracks.len() as u64);

        if tracks.is_empty() {
            warn!(
                job_id = %job.job_id,
                attempted = total,
                "no candidate resolved, substituting fallback track"
            );
            self.metrics.fallback_injections.inc();
            return ResolvedSet {
                tracks: vec![fallback_track()],
                fallback_used: true,
                dropped,
            };
        }

        info!(
            job_id = %job.job_id,
            attempted = total,
            resolved = tracks.len(),
            dropped,
            "candidate tracks resolved"
        );

        ResolvedSet {
            tracks,
            fallback_used: false,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{CatalogError, CatalogMatch};
    use std::collections::HashMap;
    use std::time::Duration;

    struct MapSearch {
        hits: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl CatalogSearch for MapSearch {
        async fn search_tracks(
            &self,
            query: &str,
            limit: u8,
            market: &str,
        ) -> Result<Vec<CatalogMatch>, CatalogError> {
            assert_eq!(limit, 1);
            assert_eq!(market, "GB");
            if query.starts_with("Broken") {
                return Err(CatalogError::Api {
                    status: 500,
                    message: "boom".into(),
                });
            }
            // later tracks answer first
            let delay = 30_u64.saturating_sub(query.len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(self
                .hits
                .get(query)
                .map(|id| CatalogMatch {
                    id: (*id).to_string(),
                    name: query.to_string(),
                })
                .into_iter()
                .collect())
        }
    }

    fn described(pairs: &[(&str, &str)]) -> DescribedSet {
        DescribedSet {
            tracks: pairs
                .iter()
                .map(|(artists, title)| DescribedTrack {
                    candidate: TrackCandidate::new(*artists, *title),
                    description: format!("{title} description"),
                })
                .collect(),
        }
    }

    fn stage(hits: &[(&'static str, &'static str)]) -> CatalogResolveStage {
        CatalogResolveStage::new(
            Arc::new(MapSearch {
                hits: hits.iter().copied().collect(),
            }),
            "GB",
            4,
            Arc::new(Metrics::new_for_test()),
        )
    }

    #[tokio::test]
    async fn keeps_input_order_and_drops_misses() {
        let stage = stage(&[
            ("A 1", "id-a"),
            ("Bb 2", "id-b"),
            ("Ccccccc 3", "id-c"),
        ]);
        let set = stage
            .resolve(
                &JobContext::new("q", 20),
                described(&[("A", "1"), ("FakeArtist123", "Nope"), ("Bb", "2"), ("Broken", "x"), ("Ccccccc", "3")]),
            )
            .await;

        let ids: Vec<_> = set.tracks.iter().map(|t| t.catalog_id.as_str()).collect();
        assert_eq!(ids, ["id-a", "id-b", "id-c"]);
        assert_eq!(set.dropped, 2);
        assert!(!set.fallback_used);
    }

    #[tokio::test]
    async fn duplicate_catalog_ids_keep_first() {
        let stage = stage(&[("A 1", "same"), ("A 1 (Remastered)", "same")]);
        let set = stage
            .resolve(
                &JobContext::new("q", 20),
                described(&[("A", "1"), ("A", "1 (Remastered)")]),
            )
            .await;

        assert_eq!(set.tracks.len(), 1);
        assert_eq!(set.tracks[0].track.candidate.title, "1");
        assert_eq!(set.dropped, 1);
    }

    #[tokio::test]
    async fn all_misses_inject_fallback() {
        let set = stage(&[])
            .resolve(
                &JobContext::new("q", 20),
                described(&[("FakeArtist123", "Nope"), ("Broken", "x")]),
            )
            .await;

        assert!(set.fallback_used);
        assert_eq!(set.tracks, vec![fallback_track()]);
        assert_eq!(set.tracks[0].catalog_id, "0VjIjW4GlUZAMYd2vXMi3b");
    }

    #[tokio::test]
    async fn empty_input_injects_fallback() {
        let set = stage(&[])
            .resolve(&JobContext::new("q", 20), DescribedSet::default())
            .await;
        assert!(set.fallback_used);
        assert_eq!(set.tracks.len(), 1);
    }
}
