//! Remote embedding providers.
//!
//! Turns images and text prompts into vectors in one shared CLIP space,
//! hiding the provider's submit-then-poll job protocol.

mod image_ref;
pub mod provider;
pub mod replicate;

pub use image_ref::ImageRef;
pub use provider::{create_provider, Embedding, EmbeddingProvider, ProviderError, ProviderErrorKind};
pub use replicate::{PollPolicy, ReplicateProvider};
