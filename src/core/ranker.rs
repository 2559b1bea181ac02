use crate::error::{AppError, Result};
use crate::models::catalog::{CatalogItem, CatalogLabelTable, CatalogVectorTable};
use crate::models::query::{FilterConfig, ScoredResult};

/// Additive score bonus for items sharing a predicted label with the query.
pub const SAME_CLASS_BOOST: f32 = 0.15;

/// Cosine similarity in `[-1, 1]`.
///
/// A zero norm on either side is treated as a denominator of 1, which yields
/// a degenerate score instead of a division by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(AppError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let mut denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        denominator = 1.0;
    }
    Ok(dot / denominator)
}

/// Whether two label sets share a label, ignoring case.
pub fn shares_label(a: &[String], b: &[String]) -> bool {
    a.iter()
        .any(|x| b.iter().any(|y| x.trim().eq_ignore_ascii_case(y.trim())))
}

/// Ranks catalog items against a query vector.
///
/// Pure and deterministic: items with equal scores keep catalog order.
/// Returns an empty list when there is no query vector or no catalog vector,
/// and [`AppError::DimensionMismatch`] when a catalog vector has a different
/// length than the query.
pub fn rank(
    query: Option<&[f32]>,
    query_labels: &[String],
    catalog: &[CatalogItem],
    vectors: &CatalogVectorTable,
    labels: &CatalogLabelTable,
    filter: &FilterConfig,
) -> Result<Vec<ScoredResult>> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    if vectors.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored = Vec::new();
    for item in catalog {
        let Some(vector) = vectors.get(&item.id) else {
            continue;
        };
        let base = cosine_similarity(query, vector)?;

        let item_labels = labels.get(&item.id).map(Vec::as_slice).unwrap_or(&[]);
        let same_class = shares_label(item_labels, query_labels);
        if filter.only_same_class && !same_class {
            continue;
        }

        let boost = if filter.prefer_same_class_boost && same_class {
            SAME_CLASS_BOOST
        } else {
            0.0
        };
        let raw = base + boost;
        let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };

        if filter.filters_category() && item.category != filter.category {
            continue;
        }
        scored.push(ScoredResult {
            item: item.clone(),
            score,
        });
    }

    // Stable sort keeps catalog order among equal scores.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.retain(|result| result.score >= filter.min_similarity);
    scored.truncate(filter.top_k);

    log::debug!("Ranked {} results", scored.len());
    Ok(scored)
}
