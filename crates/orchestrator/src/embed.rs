//! The embedding provider seam (spec §1, supplemented in SPEC_FULL.md
//! §4.12): the core consumes `Embed(text) -> Vector` from a host-injected
//! provider but never implements a model itself.

use async_trait::async_trait;
use thiserror::Error;

/// Failure from an [`EmbeddingProvider`].
#[derive(Debug, Error)]
pub enum EmbedError {
    /// No real provider was configured; text input cannot be embedded.
    #[error("no embedding provider configured")]
    Unconfigured,
    /// The provider itself failed (model call, network, etc).
    #[error("embedding provider failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// A host-supplied capability turning text into a fixed-dimension vector
/// (spec §1: "The core consumes an `Embed(text) -> Vector` capability from
/// an injected provider").
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of texts, in order. The default implementation calls
    /// [`EmbeddingProvider::embed`] once per item; providers with a real
    /// batch API should override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// The fixed dimension this provider's vectors have.
    fn dimension(&self) -> usize;
}

/// The default provider for a database opened without a real embedder.
/// Raw-vector `add` calls still work; any attempt to embed text fails
/// clearly with [`EmbedError::Unconfigured`] rather than panicking.
pub struct NoopEmbedder {
    dimension: usize,
}

impl NoopEmbedder {
    /// A no-op embedder reporting `dimension` (must still match the
    /// database's configured `d` so dimension checks behave consistently).
    pub fn new(dimension: usize) -> Self {
        NoopEmbedder { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for NoopEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Unconfigured)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_embedder_refuses_text() {
        let embedder = NoopEmbedder::new(3);
        assert!(matches!(embedder.embed("hello").await, Err(EmbedError::Unconfigured)));
    }

    #[tokio::test]
    async fn default_embed_batch_calls_embed_per_item() {
        struct Echo;
        #[async_trait]
        impl EmbeddingProvider for Echo {
            async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
                Ok(vec![text.len() as f32])
            }
            fn dimension(&self) -> usize {
                1
            }
        }
        let out = Echo.embed_batch(&["a".into(), "bb".into()]).await.unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0]]);
    }
}
