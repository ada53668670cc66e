use serde::Serialize;
use std::sync::Arc;
use std::thread;
use thiserror::Error;

use super::cache::{LabelEmbedding, LabelEmbeddingCache, LabelEmbeddings};
use super::labels::AttributeCategory;
use super::similarity::best_match;
use crate::config::EmbeddingConfig;
use crate::embedding::{
    create_provider, Embedding, EmbeddingProvider, ImageRef, ProviderError, ProviderErrorKind,
};

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classification unavailable: {0}")]
    Unavailable(#[from] ProviderError),

    #[error("label '{label}' has {actual} dimensions, image embedding has {expected}")]
    DimensionMismatch {
        label: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("category '{0}' has no label prompts")]
    EmptyLabelSet(&'static str),
}

impl ClassificationError {
    /// Short machine-readable reason, for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            ClassificationError::Unavailable(e) => e.kind().as_str(),
            ClassificationError::DimensionMismatch { .. } => "dimension_mismatch",
            ClassificationError::EmptyLabelSet(_) => "empty_label_set",
        }
    }

    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            ClassificationError::Unavailable(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Best label for one attribute of one image.
///
/// `score` is `None` for a fallback to the category default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: &'static str,
    pub score: Option<f32>,
}

impl ClassificationResult {
    pub fn fallback(category: &AttributeCategory) -> Self {
        Self {
            label: category.default_label,
            score: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.score.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeMatch {
    pub category: &'static str,
    pub label: &'static str,
    pub score: Option<f32>,
    pub fallback: bool,
}

impl AttributeMatch {
    fn new(category: &AttributeCategory, result: ClassificationResult) -> Self {
        Self {
            category: category.id,
            label: result.label,
            fallback: result.is_fallback(),
            score: result.score,
        }
    }
}

/// Classification of one image across several categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeReport {
    pub attributes: Vec<AttributeMatch>,
}

impl AttributeReport {
    pub fn get(&self, category: &str) -> Option<&AttributeMatch> {
        self.attributes.iter().find(|a| a.category == category)
    }

    /// True if any attribute fell back to its default.
    pub fn is_degraded(&self) -> bool {
        self.attributes.iter().any(|a| a.fallback)
    }
}

/// Zero-shot garment attribute classifier.
///
/// Label prompts are embedded once per category and cached for the lifetime
/// of the classifier.
pub struct AttributeClassifier {
    provider: Arc<dyn EmbeddingProvider>,
    cache: LabelEmbeddingCache,
}

impl AttributeClassifier {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cache: LabelEmbeddingCache::new(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(Arc::from(create_provider(config)))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub fn cache(&self) -> &LabelEmbeddingCache {
        &self.cache
    }

    /// Classify one attribute of an image. Never fails: any error yields the
    /// category's default label and is logged.
    pub fn classify(&self, category: &'static AttributeCategory, image: &ImageRef) -> ClassificationResult {
        match self.try_classify(category, image) {
            Ok(result) => result,
            Err(e) => fallback(category, &e),
        }
    }

    pub fn try_classify(
        &self,
        category: &'static AttributeCategory,
        image: &ImageRef,
    ) -> Result<ClassificationResult, ClassificationError> {
        let image_embedding = self.provider.embed_image(image)?;
        self.try_classify_embedding(category, &image_embedding)
    }

    /// Classify against an image embedding computed earlier.
    pub fn classify_embedding(
        &self,
        category: &'static AttributeCategory,
        image_embedding: &Embedding,
    ) -> ClassificationResult {
        match self.try_classify_embedding(category, image_embedding) {
            Ok(result) => result,
            Err(e) => fallback(category, &e),
        }
    }

    pub fn try_classify_embedding(
        &self,
        category: &'static AttributeCategory,
        image_embedding: &Embedding,
    ) -> Result<ClassificationResult, ClassificationError> {
        let labels = self.label_embeddings(category)?;

        if let Some(bad) = labels
            .iter()
            .find(|l| l.embedding.len() != image_embedding.len())
        {
            return Err(ClassificationError::DimensionMismatch {
                label: bad.label,
                expected: image_embedding.len(),
                actual: bad.embedding.len(),
            });
        }

        let (label, score) = best_match(
            image_embedding,
            labels.iter().map(|l| (l.label, &l.embedding)),
        )
        .ok_or(ClassificationError::EmptyLabelSet(category.id))?;

        tracing::debug!(category = category.id, label, score, "Attribute classified");
        Ok(ClassificationResult {
            label,
            score: Some(score),
        })
    }

    /// Embed the image once and classify every category against it.
    pub fn classify_all(
        &self,
        categories: &[&'static AttributeCategory],
        image: &ImageRef,
    ) -> AttributeReport {
        let attributes = match self.provider.embed_image(image) {
            Ok(image_embedding) => categories
                .iter()
                .map(|&c| AttributeMatch::new(c, self.classify_embedding(c, &image_embedding)))
                .collect(),
            Err(e) => {
                let err = ClassificationError::from(e);
                categories
                    .iter()
                    .map(|&c| AttributeMatch::new(c, fallback(c, &err)))
                    .collect()
            }
        };

        AttributeReport { attributes }
    }

    fn label_embeddings(
        &self,
        category: &'static AttributeCategory,
    ) -> Result<LabelEmbeddings, ClassificationError> {
        let populated = self.cache.get_or_populate(category.id, || {
            tracing::info!(
                category = category.id,
                labels = category.prompts.len(),
                provider = self.provider.provider_name(),
                "Embedding label prompts"
            );

            // One thread per prompt: each call blocks on the network
            thread::scope(|s| {
                let handles: Vec<_> = category
                    .prompts
                    .iter()
                    .map(|p| {
                        s.spawn(move || {
                            self.provider.embed_text(p.prompt).map(|embedding| LabelEmbedding {
                                label: p.label,
                                embedding,
                            })
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                    .collect::<Result<Vec<_>, ProviderError>>()
            })
        })?;

        Ok(populated)
    }
}

fn fallback(category: &AttributeCategory, err: &ClassificationError) -> ClassificationResult {
    tracing::warn!(
        category = category.id,
        default = category.default_label,
        reason = err.reason(),
        error = %err,
        "Attribute classification failed, using default label"
    );
    ClassificationResult::fallback(category)
}
