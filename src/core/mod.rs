//! Catalog embedding cache and similarity ranking

/// Text encoding of feature vectors for persistence.
pub mod codec;
/// Bounded-concurrency computation of missing catalog vectors.
pub mod coordinator;
/// Embedding and classification collaborator contracts.
pub mod embeddings;
/// Image loading collaborator.
pub mod loader;
/// The single live query and its staleness check.
pub mod query;
/// Cosine ranking with class boost and filters.
pub mod ranker;
/// Precomputed bundles fetched over HTTP.
pub mod remote;
/// Ordered fallback chain of vector providers.
pub mod sources;
/// Version-scoped persistence of vectors and labels.
pub mod store;
