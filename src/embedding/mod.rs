//! Embedding port: pluggable text-to-vector providers
//!
//! The engine never talks to an embedding backend directly; everything goes
//! through [`EmbeddingProvider`]. A provider's output dimension and model
//! name together form an [`EmbedderIdentity`], which each vector-store
//! collection pins at first use. [`BatchEmbedder`] wraps a provider with
//! batching, bounded concurrency, timeouts, and transient-failure retry.

mod batch;
mod provider;

pub use batch::BatchEmbedder;
pub use provider::{EmbedderIdentity, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
