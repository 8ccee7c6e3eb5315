//! Authority scoring — how much weight a candidate reviewer carries.

use crate::registry::{HealthSnapshot, Reputation};

/// Floor applied to the tag-overlap term so a reputable, healthy reviewer
/// with no topic overlap still carries some weight.
const TAG_OVERLAP_FLOOR: f64 = 0.25;

/// Health factor assumed when the metrics engine has no data for the
/// candidate. Permissive, so an unmonitored pool is not empty by default.
const UNKNOWN_HEALTH_FACTOR: f64 = 0.5;

/// Jaccard overlap between two tag sets.
fn tag_overlap(candidate_tags: &[String], paused_tags: &[String]) -> f64 {
    if candidate_tags.is_empty() || paused_tags.is_empty() {
        return 0.0;
    }
    let intersection = candidate_tags
        .iter()
        .filter(|t| paused_tags.contains(t))
        .count();
    let union = candidate_tags.len() + paused_tags.len() - intersection;
    intersection as f64 / union as f64
}

/// Compute a candidate reviewer's authority score.
///
/// Non-negative; proportional to past review success, current health, and
/// topic overlap with the disputed agent. Zero only for a candidate in the
/// void state or with a fully failed review record.
pub fn authority_score(
    reputation: Reputation,
    health: Option<&HealthSnapshot>,
    candidate_tags: &[String],
    paused_tags: &[String],
) -> f64 {
    let reputation_factor = reputation.ratio();
    let health_factor = health
        .map(HealthSnapshot::health_factor)
        .unwrap_or(UNKNOWN_HEALTH_FACTOR);
    let tag_factor =
        TAG_OVERLAP_FLOOR + (1.0 - TAG_OVERLAP_FLOOR) * tag_overlap(candidate_tags, paused_tags);

    (reputation_factor * health_factor * tag_factor).max(0.0)
}
