//! Vector engine client for the knowledge base.
//!
//! [`VectorStore`] wraps any [`VectorEngine`] (the REST-backed
//! [`HttpVectorEngine`] in production, [`InMemoryEngine`] offline and in
//! tests) and keeps a local [`DocumentCache`] for detail lookups and
//! degraded reads.

pub mod cache;
pub mod engine;
pub mod http;
pub mod memory;
pub mod store;

pub use cache::DocumentCache;
pub use engine::{
    BatchAck, EngineDocument, EngineHit, EngineStats, HitMetadata, IndexDocument, IndexMetadata,
    VectorEngine,
};
pub use http::HttpVectorEngine;
pub use memory::InMemoryEngine;
pub use store::VectorStore;
