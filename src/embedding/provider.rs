use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::image_ref::ImageRef;
use super::replicate::ReplicateProvider;
use crate::config::EmbeddingConfig;

/// Embedding vector produced by the remote CLIP service.
///
/// Image and text embeddings share one vector space, but only when they come
/// from the same provider and model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean norm of the vector.
    pub fn magnitude(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Coarse failure classes reported by an embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Credential or configuration missing. Never retried.
    Unavailable,
    /// The remote call or job failed, or returned something unusable.
    Failed,
    /// Polling gave up before the job reached a terminal state.
    Timeout,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Unavailable => "provider_unavailable",
            ProviderErrorKind::Failed => "provider_error",
            ProviderErrorKind::Timeout => "provider_timeout",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    Transport(String),

    #[error("prediction {id} ended with status '{status}'{}", detail_suffix(.detail))]
    JobFailed {
        id: String,
        status: String,
        detail: Option<String>,
    },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("prediction {id} not finished after {waited:?} ({attempts} polls)")]
    Timeout {
        id: String,
        waited: Duration,
        attempts: u32,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Unavailable(_) => ProviderErrorKind::Unavailable,
            ProviderError::Timeout { .. } => ProviderErrorKind::Timeout,
            ProviderError::Http { .. }
            | ProviderError::Transport(_)
            | ProviderError::JobFailed { .. }
            | ProviderError::Malformed(_) => ProviderErrorKind::Failed,
        }
    }
}

/// A service that maps images and text into a shared embedding space.
///
/// Calls block the current thread until the embedding is available.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed the image behind a fetchable reference.
    fn embed_image(&self, image: &ImageRef) -> Result<Embedding, ProviderError>;

    /// Embed a text prompt.
    fn embed_text(&self, text: &str) -> Result<Embedding, ProviderError>;

    /// Get the provider name for display
    fn provider_name(&self) -> &'static str;
}

/// Create an embedding provider based on configuration
pub fn create_provider(config: &EmbeddingConfig) -> Box<dyn EmbeddingProvider> {
    Box::new(ReplicateProvider::from_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProviderError::Unavailable("no token".into()).kind(),
            ProviderErrorKind::Unavailable
        );
        assert_eq!(
            ProviderError::Malformed("missing embedding".into()).kind(),
            ProviderErrorKind::Failed
        );
        let timeout = ProviderError::Timeout {
            id: "abc".into(),
            waited: Duration::from_secs(3),
            attempts: 4,
        };
        assert_eq!(timeout.kind(), ProviderErrorKind::Timeout);
        assert_eq!(timeout.kind().to_string(), "provider_timeout");
    }

    #[test]
    fn test_job_failed_message() {
        let err = ProviderError::JobFailed {
            id: "p1".into(),
            status: "failed".into(),
            detail: Some("CUDA out of memory".into()),
        };
        assert_eq!(
            err.to_string(),
            "prediction p1 ended with status 'failed': CUDA out of memory"
        );

        let bare = ProviderError::JobFailed {
            id: "p2".into(),
            status: "canceled".into(),
            detail: None,
        };
        assert_eq!(bare.to_string(), "prediction p2 ended with status 'canceled'");
    }

    #[test]
    fn test_embedding_magnitude() {
        let e = Embedding::from(vec![3.0, 4.0]);
        assert!((e.magnitude() - 5.0).abs() < 0.0001);
        assert_eq!(e.len(), 2);
        assert!(Embedding::from(Vec::new()).is_empty());
    }
}
