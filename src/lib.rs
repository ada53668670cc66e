//! Zero-shot garment attribute classification.
//!
//! An [`embedding::EmbeddingProvider`] maps images and label prompts into a
//! shared CLIP space; an [`attributes::AttributeClassifier`] picks the label
//! whose prompt is most similar to the image, falling back to a per-category
//! default when the provider fails.

pub mod attributes;
pub mod config;
pub mod embedding;
pub mod logging;

pub use attributes::{AttributeCategory, AttributeClassifier, AttributeReport, ClassificationResult};
pub use config::Config;
pub use embedding::{Embedding, EmbeddingProvider, ImageRef};
