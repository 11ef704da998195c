
use std::cmp::Ordering;

use tracing::warn;

/// Exact inner-product index over one entry's chunk embeddings.
///
/// Rows are L2-normalized at build time and queries are normalized the same
/// way, so the inner product is cosine similarity. Search is a linear scan;
/// entries hold at most a few dozen chunks, so exact scoring is cheaper
/// than maintaining any approximate structure.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl VectorIndex {
    /// Build an index from raw embedding rows. Returns `None` when there
    /// are no rows, rows disagree on width, or the width is zero; all of
    /// these mean the entry operates without semantic search rather than
    /// failing.
    #[inline]
    pub fn build(mut rows: Vec<Vec<f32>>) -> Option<Self> {
        let dimension = rows.first()?.len();
        if dimension == 0 || rows.iter().any(|row| row.len() != dimension) {
            warn!("Discarding embedding matrix with inconsistent row widths");
            return None;
        }

        for row in &mut rows {
            l2_normalize(row);
        }

        Some(Self {
            vectors: rows,
            dimension,
        })
    }

    /// Width of the stored embedding rows.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Row indexes and similarity scores of the best `limit` rows for
    /// `query`, highest score first. Ties keep row order. A query of the
    /// wrong width matches nothing.
    #[inline]
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dimension {
            warn!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            );
            return Vec::new();
        }
        if limit == 0 {
            return Vec::new();
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(row, vector)| (row, dot(&query, vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit.min(self.vectors.len()));
        scored
    }
}

/// Scale a vector to unit length. Zero-norm vectors pass through unchanged
/// so they score zero against everything instead of producing NaN.
fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
