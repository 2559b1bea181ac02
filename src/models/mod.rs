//! Data model shared by the cache, the coordinator and the ranker

/// Catalog items, image sources and the per-item tables.
pub mod catalog;
/// Query state, ranking filters and scored results.
pub mod query;
