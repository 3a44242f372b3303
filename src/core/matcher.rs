use crate::core::embedding::{euclidean_distance, Embedding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An enrolled person and the reference embeddings captured at enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub embeddings: Vec<Embedding>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of every enrolled identity, loaded once per session.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<Identity>,
}

impl Gallery {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl From<Vec<Identity>> for Gallery {
    fn from(identities: Vec<Identity>) -> Self {
        Self::new(identities)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity_id: String,
    pub name: String,
    pub distance: f32,
    pub confidence: i32,
}

/// `round((1 - distance) * 100)`. Not clamped: distances above 1.0 give
/// negative confidence.
pub fn confidence_from_distance(distance: f32) -> i32 {
    ((1.0 - distance) * 100.0).round() as i32
}

/// An identity's representative distance: the closest of its samples.
pub fn representative_distance(query: &[f32], identity: &Identity) -> Option<f32> {
    identity
        .embeddings
        .iter()
        .map(|reference| euclidean_distance(query, reference))
        .filter(|d| !d.is_nan())
        .fold(None, |best, d| match best {
            Some(b) if b <= d => Some(b),
            _ => Some(d),
        })
}

/// Nearest-neighbour search over every enrolled sample.
///
/// The identity with the smallest representative distance wins; on exact
/// ties the first identity in gallery order is kept. Returns `None` for an
/// empty gallery or when the best distance is not below
/// `distance_threshold`.
pub fn find_best_match(
    query: &[f32],
    gallery: &Gallery,
    distance_threshold: f32,
) -> Option<MatchResult> {
    let mut best: Option<(&Identity, f32)> = None;

    for identity in gallery.identities() {
        let Some(distance) = representative_distance(query, identity) else {
            continue;
        };

        let closer = match best {
            Some((_, best_distance)) => distance < best_distance,
            None => distance.is_finite(),
        };
        if closer {
            best = Some((identity, distance));
        }
    }

    let (identity, distance) = best?;
    if distance >= distance_threshold {
        tracing::debug!(
            "Best candidate {} at distance {:.3} is beyond threshold {:.3}",
            identity.name, distance, distance_threshold
        );
        return None;
    }

    Some(MatchResult {
        identity_id: identity.id.clone(),
        name: identity.name.clone(),
        distance,
        confidence: confidence_from_distance(distance),
    })
}
