//! Best-effort snapshots of intermediate pipeline state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::job::JobContext;

#[async_trait]
pub trait DebugSink: Send + Sync {
    /// Errors are reported to the caller, which logs and ignores them.
    async fn snapshot(&self, job: &JobContext, label: &str, data: &Value) -> Result<()>;
}

/// Used when snapshots are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDebugSink;

#[async_trait]
impl DebugSink for NoopDebugSink {
    async fn snapshot(&self, _job: &JobContext, _label: &str, _data: &Value) -> Result<()> {
        Ok(())
    }
}

/// Writes `{root}/{job_id}/{label}.json` as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct FileDebugSink {
    root: PathBuf,
}

impl FileDebugSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Keeps `[a-z0-9_-]`, lowercasing letters and replacing everything else with `_`.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '_' | '-') => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() {
        "snapshot".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl DebugSink for FileDebugSink {
    async fn snapshot(&self, job: &JobContext, label: &str, data: &Value) -> Result<()> {
        let dir = self.root.join(job.job_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;

        let path = dir.join(format!("{}.json", sanitize_label(label)));
        let body = serde_json::to_vec_pretty(data).context("failed to serialize snapshot")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;

        tracing::debug!(job_id = %job.job_id, path = %path.display(), "snapshot written");
        Ok(())
    }
}
