use std::cmp::Ordering;

use chrono::Duration;
use common::models::ScoredCandidate;

use crate::ranking;

/// Same instrument and side, generated within `window` of each other, with entry
/// prices closer than `price_tolerance_pct` percent of the earlier entry.
pub fn is_duplicate(
    a: &ScoredCandidate,
    b: &ScoredCandidate,
    window: Duration,
    price_tolerance_pct: f64,
) -> bool {
    let (a, b) = (&a.candidate, &b.candidate);
    if a.instrument != b.instrument || a.side != b.side {
        return false;
    }
    if (a.generated_at - b.generated_at).abs() > window {
        return false;
    }

    let base = match a.generated_at.cmp(&b.generated_at) {
        Ordering::Less => a.entry_price,
        Ordering::Greater => b.entry_price,
        Ordering::Equal => a.entry_price.min(b.entry_price),
    };
    if base <= 0.0 {
        return false;
    }
    (a.entry_price - b.entry_price).abs() / base * 100.0 < price_tolerance_pct
}

/// Collapses duplicates to their best-scored member (ties: earliest) and returns
/// the survivors in rank order. Applying it twice changes nothing.
pub fn dedup(
    candidates: Vec<ScoredCandidate>,
    window: Duration,
    price_tolerance_pct: f64,
) -> Vec<ScoredCandidate> {
    let mut by_preference = candidates;
    by_preference.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.candidate.generated_at.cmp(&b.candidate.generated_at))
            .then_with(|| a.candidate.instrument.cmp(&b.candidate.instrument))
    });

    let mut kept: Vec<ScoredCandidate> = Vec::with_capacity(by_preference.len());
    for candidate in by_preference {
        let duplicate = kept
            .iter()
            .any(|k| is_duplicate(k, &candidate, window, price_tolerance_pct));
        if !duplicate {
            kept.push(candidate);
        }
    }

    kept.sort_by(ranking::compare);
    kept
}
