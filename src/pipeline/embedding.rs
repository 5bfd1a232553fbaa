use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
};
use tokio::sync::Mutex;

/// Sentence-embedding capability used by the ranker.
///
/// Every text of one call must be embedded by the same model so the vectors
/// share a space.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Pretrained sentence-transformer to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbeddingModel {
    #[default]
    AllMiniLmL12V2,
    AllMiniLmL6V2,
    AllDistilrobertaV1,
}

impl EmbeddingModel {
    fn model_type(self) -> SentenceEmbeddingsModelType {
        match self {
            Self::AllMiniLmL12V2 => SentenceEmbeddingsModelType::AllMiniLmL12V2,
            Self::AllMiniLmL6V2 => SentenceEmbeddingsModelType::AllMiniLmL6V2,
            Self::AllDistilrobertaV1 => SentenceEmbeddingsModelType::AllDistilrobertaV1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllMiniLmL12V2 => "all-minilm-l12-v2",
            Self::AllMiniLmL6V2 => "all-minilm-l6-v2",
            Self::AllDistilrobertaV1 => "all-distilroberta-v1",
        }
    }
}

impl FromStr for EmbeddingModel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all-minilm-l12-v2" => Ok(Self::AllMiniLmL12V2),
            "all-minilm-l6-v2" => Ok(Self::AllMiniLmL6V2),
            "all-distilroberta-v1" => Ok(Self::AllDistilrobertaV1),
            other => Err(format!(
                "unsupported embedding model `{other}` (expected all-minilm-l12-v2, all-minilm-l6-v2 or all-distilroberta-v1)"
            )),
        }
    }
}

/// Embedding generation service using rust-bert.
/// This runs on CPU.
#[derive(Clone)]
pub struct EmbeddingService {
    model: Arc<Mutex<SentenceEmbeddingsModel>>,
    kind: EmbeddingModel,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("model", &self.kind.as_str())
            .finish()
    }
}

impl EmbeddingService {
    /// Initialize the embedding model.
    /// This might take a while to download the model on first run.
    ///
    /// # Errors
    /// Model download or load failure.
    pub fn new(kind: EmbeddingModel) -> Result<Self> {
        // Use a separate thread to initialize the model because it's blocking and heavy
        let model = std::thread::spawn(move || {
            SentenceEmbeddingsBuilder::remote(kind.model_type()).create_model()
        })
        .join()
        .map_err(|_| anyhow::anyhow!("Failed to join model creation thread"))?
        .with_context(|| format!("failed to load embedding model {}", kind.as_str()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            kind,
        })
    }

    #[must_use]
    pub fn kind(&self) -> EmbeddingModel {
        self.kind
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    /// Generate embeddings for a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts = texts.to_vec();

        // Offload to blocking thread
        tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.encode(&texts)
        })
        .await
        .context("Failed to join embedding task")?
        .context("Failed to encode texts")
    }
}

/// Compute cosine similarity between two vectors. A zero vector scores 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
