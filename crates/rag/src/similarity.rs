//! Distance/similarity conversion.
//!
//! Vector stores report a distance; the rest of the pipeline reasons in
//! similarity in [0, 1]. Both supported metrics assume unit-normalized
//! vectors, which bounds the distance to [0, 2]. A distance outside that range
//! means the store is using a different metric than it declared, so the
//! conversion fails instead of producing a silently wrong score.

use serde::{Deserialize, Serialize};
use storechat_core::ProviderError;

/// Slack for floating point noise at the range edges.
const RANGE_EPSILON: f32 = 1e-4;

/// Distance metric reported by a vector store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in [0, 2]
    #[default]
    Cosine,
    /// `|a - b|` over unit vectors, in [0, 2]
    Euclidean,
}

impl DistanceMetric {
    /// Largest distance the metric can report.
    pub const MAX_DISTANCE: f32 = 2.0;

    /// Convert a store distance into a similarity in [0, 1].
    ///
    /// Cosine: `1 - d / 2`. Euclidean: `1 - d² / 4` (unit vectors make
    /// `d² / 2` the cosine distance).
    pub fn similarity(&self, distance: f32) -> Result<f32, ProviderError> {
        if !distance.is_finite()
            || distance < -RANGE_EPSILON
            || distance > Self::MAX_DISTANCE + RANGE_EPSILON
        {
            return Err(ProviderError::permanent(
                "vector-store",
                format!(
                    "{:?} distance {} is outside the expected [0, 2] range",
                    self, distance
                ),
            ));
        }

        let d = distance.clamp(0.0, Self::MAX_DISTANCE);
        let similarity = match self {
            Self::Cosine => 1.0 - d / 2.0,
            Self::Euclidean => 1.0 - (d * d) / 4.0,
        };
        Ok(similarity.clamp(0.0, 1.0))
    }

    /// Largest distance that still reaches the given similarity.
    pub fn max_distance(&self, similarity: f32) -> f32 {
        let s = similarity.clamp(0.0, 1.0);
        match self {
            Self::Cosine => 2.0 * (1.0 - s),
            Self::Euclidean => 2.0 * (1.0 - s).sqrt(),
        }
    }

    /// Distance between two vectors under this metric.
    ///
    /// Returns `None` when the dimensions differ or either vector is zero.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Option<f32> {
        if a.len() != b.len() || a.is_empty() {
            return None;
        }

        let cosine = cosine_similarity(a, b)?;
        Some(match self {
            Self::Cosine => 1.0 - cosine,
            Self::Euclidean => (2.0 - 2.0 * cosine).max(0.0).sqrt(),
        })
    }
}

/// Cosine similarity in [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        return None;
    }

    Some((dot / (mag_a * mag_b)).clamp(-1.0, 1.0))
}
