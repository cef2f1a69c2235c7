use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::config::{DedupConfig, ScoreWeights};
use common::models::{Candidate, ScoredCandidate, SkipReason};
use futures_util::{StreamExt, stream};
use market_data::traits::SnapshotProvider;
use tracing::{debug, info, warn};

use crate::dedup;
use crate::generator::CandidateGenerator;
use crate::ranking;

/// Outcome counts of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub evaluated: usize,
    pub candidates: Vec<Candidate>,
    /// Skip reason label -> count, provider failures included.
    pub skipped: BTreeMap<&'static str, usize>,
    pub failures: usize,
}

/// Runs the generator over a universe of instruments on a bounded worker pool,
/// then ranks and deduplicates what came out.
pub struct StrategyService {
    generator: Arc<CandidateGenerator>,
    provider: Arc<dyn SnapshotProvider>,
    concurrency: usize,
    weights: ScoreWeights,
    dedup: DedupConfig,
}

impl StrategyService {
    pub fn new(
        generator: CandidateGenerator,
        provider: Arc<dyn SnapshotProvider>,
        weights: ScoreWeights,
        dedup: DedupConfig,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
            provider,
            concurrency: 8,
            weights,
            dedup,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Evaluates every instrument. Each one runs in its own task so an error or
    /// a panic is counted against that instrument only.
    pub async fn evaluate_all(&self, instruments: &[String], now: DateTime<Utc>) -> EvaluationReport {
        let results: Vec<(String, Result<Candidate, SkipReason>)> = stream::iter(instruments.iter().cloned())
            .map(|instrument| {
                let generator = self.generator.clone();
                let provider = self.provider.clone();
                async move {
                    let symbol = instrument.clone();
                    let handle = tokio::spawn(async move {
                        generator.evaluate(provider.as_ref(), &symbol, now).await
                    });
                    let result = handle.await.unwrap_or_else(|e| {
                        Err(SkipReason::ProviderError(format!("evaluation task failed: {}", e)))
                    });
                    (instrument, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = EvaluationReport {
            evaluated: results.len(),
            ..EvaluationReport::default()
        };

        for (instrument, result) in results {
            match result {
                Ok(candidate) => report.candidates.push(candidate),
                Err(reason) => {
                    if reason.is_failure() {
                        warn!("Evaluation of {} failed: {}", instrument, reason);
                        report.failures += 1;
                    } else {
                        debug!("Skipping {}: {}", instrument, reason);
                    }
                    *report.skipped.entry(reason.label()).or_default() += 1;
                }
            }
        }
        report.candidates.sort_by(|a, b| a.instrument.cmp(&b.instrument));

        info!(
            "Evaluated {} instruments: {} candidates, {} failures, skipped {:?}",
            report.evaluated,
            report.candidates.len(),
            report.failures,
            report.skipped
        );
        report
    }

    pub fn rank_and_dedup(&self, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
        let ranked = ranking::rank(candidates, &self.weights);
        dedup::dedup(ranked, self.dedup.window, self.dedup.price_tolerance_pct)
    }

    /// Evaluate, rank and dedup: the pool a slot is filled from.
    pub async fn candidate_pool(
        &self,
        instruments: &[String],
        now: DateTime<Utc>,
    ) -> (Vec<ScoredCandidate>, EvaluationReport) {
        let report = self.evaluate_all(instruments, now).await;
        let pool = self.rank_and_dedup(report.candidates.clone());
        (pool, report)
    }
}
