use std::cmp::Ordering;

use common::config::ScoreWeights;
use common::models::{Candidate, ScoredCandidate};

/// `w_conf * confidence + w_quality * quality + min(w_rr * risk_reward, reward_cap)`.
pub fn score(candidate: &Candidate, weights: &ScoreWeights) -> f64 {
    weights.confidence * candidate.confidence
        + weights.quality * candidate.quality
        + (weights.risk_reward * candidate.risk_reward).min(weights.reward_cap)
}

/// Rank order: score descending, then instrument id, then generation time.
pub fn compare(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.candidate.instrument.cmp(&b.candidate.instrument))
        .then_with(|| a.candidate.generated_at.cmp(&b.candidate.generated_at))
}

pub fn rank(candidates: Vec<Candidate>, weights: &ScoreWeights) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| ScoredCandidate {
            score: score(&candidate, weights),
            candidate,
        })
        .collect();
    scored.sort_by(compare);
    scored
}
