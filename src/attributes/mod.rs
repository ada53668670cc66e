//! Zero-shot garment attribute classification
//!
//! Compares an image embedding against embedded label prompts for:
//! - Fit (slim, regular, loose, oversized)
//! - Pattern (plain, striped, checked, floral, dotted, graphic)

mod cache;
mod classifier;
pub mod labels;
pub mod similarity;

pub use cache::{LabelEmbedding, LabelEmbeddingCache, LabelEmbeddings};
pub use classifier::{
    AttributeClassifier, AttributeMatch, AttributeReport, ClassificationError, ClassificationResult,
};
pub use labels::{AttributeCategory, LabelPrompt, FIT, PATTERN};
pub use similarity::cosine_similarity;
