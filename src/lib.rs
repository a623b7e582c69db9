//! Mindsong - Knowledge Grounding Engine
//!
//! Turns a corpus of files into a searchable, cached knowledge base used to
//! ground assistant answers: deterministic chunking, pluggable embeddings,
//! idempotent indexing with a provenance manifest, hybrid dense+sparse
//! retrieval, and a similarity/TTL-bounded semantic cache.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod ops;
pub mod query;
pub mod store;

pub use engine::GroundingEngine;
pub use error::{MindsongError, Result};
