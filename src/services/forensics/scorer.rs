// Forensics Scorer
// Fuses perplexity and burstiness into a plagiarism score and an AI-likelihood category

use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

use super::metrics::TextMetrics;
use super::tfidf::tfidf_similarities;
use crate::models::{AiAnalysis, AiCategory, ForensicsResult, MetricsResult};
use crate::services::config_store::{ForensicsConfig, SimilarityMethod};

/// Map perplexity onto a 0..=100 suspicion score; lower perplexity scores higher
pub fn perplexity_score(perplexity: f64, config: &ForensicsConfig) -> f64 {
    for &(upper, score) in &config.perplexity_bands {
        if perplexity < upper {
            return score;
        }
    }
    let max = config.max_perplexity.max(f64::EPSILON);
    (100.0 - (perplexity / max * 100.0).min(100.0)).max(0.0)
}

/// Weighted fusion of the two component scores, clamped to [0, 100]
pub fn fusion_score(perplexity_score: f64, burstiness_score: f64, config: &ForensicsConfig) -> f64 {
    let score = config.perplexity_weight * perplexity_score + config.burstiness_weight * burstiness_score;
    score.clamp(0.0, 100.0)
}

pub fn categorize(perplexity: f64, burstiness: f64, config: &ForensicsConfig) -> AiCategory {
    if perplexity < config.high_confidence_below {
        AiCategory::HighConfidenceAi
    } else if perplexity < config.medium_confidence_below {
        AiCategory::MediumConfidenceAi
    } else if burstiness >= config.burstiness_threshold || perplexity < config.potential_below {
        AiCategory::PotentialAi
    } else {
        AiCategory::LikelyHuman
    }
}

#[derive(Clone)]
pub struct ForensicsScorer {
    metrics: TextMetrics,
    config: ForensicsConfig,
}

impl ForensicsScorer {
    pub fn new(metrics: TextMetrics, config: ForensicsConfig) -> Self {
        Self { metrics, config }
    }

    pub fn config(&self) -> &ForensicsConfig {
        &self.config
    }

    pub fn metrics(&self) -> &TextMetrics {
        &self.metrics
    }

    pub fn analyze_ai_content(&self, text: &str) -> AiAnalysis {
        let m = self.metrics.measure(text);
        AiAnalysis {
            perplexity: m.perplexity,
            burstiness: m.burstiness,
            category: categorize(m.perplexity, m.burstiness, &self.config),
        }
    }

    /// Plagiarism percentage and per-reference similarities
    pub fn plagiarism(&self, text: &str, references: &[String]) -> (f64, Vec<f64>) {
        let m = self.metrics.measure(text);
        self.plagiarism_from(&m, text, references)
    }

    fn plagiarism_from(&self, m: &MetricsResult, text: &str, references: &[String]) -> (f64, Vec<f64>) {
        let score = fusion_score(
            perplexity_score(m.perplexity, &self.config),
            m.burstiness * 100.0,
            &self.config,
        );
        let similarities = match self.config.similarity_method {
            SimilarityMethod::Perplexity => references
                .iter()
                .map(|r| self.perplexity_similarity(m.perplexity, r))
                .collect(),
            SimilarityMethod::TfIdf => tfidf_similarities(text, references),
        };
        (score, similarities)
    }

    fn perplexity_similarity(&self, submission_perplexity: f64, reference: &str) -> f64 {
        if reference.trim().is_empty() {
            return 0.0;
        }
        let reference_perplexity = self.metrics.perplexity(reference);
        let diff = (submission_perplexity - reference_perplexity).abs();
        let max = self.config.max_perplexity.max(f64::EPSILON);
        ((100.0 - (diff / max * 100.0).min(100.0)).max(0.0) / 100.0).clamp(0.0, 1.0)
    }

    /// Full screening: metrics are computed once and shared by the plagiarism
    /// and AI-likelihood paths. Never panics; falls back to sentinel metrics.
    pub fn screen(&self, text: &str, references: &[String]) -> ForensicsResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let m = self.metrics.measure(text);
            self.result_from(&m, text, references)
        }));

        match outcome {
            Ok(result) => {
                info!(
                    "[FORENSICS] score={:.2} category={} ai_generated={} perplexity={:.2} burstiness={:.3}",
                    result.plagiarism_score,
                    result.category,
                    result.ai_generated,
                    result.perplexity,
                    result.burstiness
                );
                result
            }
            Err(_) => {
                warn!("[FORENSICS] Screening panicked, returning sentinel result");
                self.sentinel_result(references.len())
            }
        }
    }

    fn result_from(&self, m: &MetricsResult, text: &str, references: &[String]) -> ForensicsResult {
        let (score, similarities) = self.plagiarism_from(m, text, references);
        self.assemble(m, score, similarities)
    }

    /// Result built from the error-perplexity sentinel, used when screening cannot run
    pub fn sentinel_result(&self, reference_count: usize) -> ForensicsResult {
        let m = MetricsResult {
            perplexity: self.metrics.config().error_perplexity,
            burstiness: 0.0,
        };
        let (score, _) = self.plagiarism_from(&m, "", &[]);
        self.assemble(&m, score, vec![0.0; reference_count])
    }

    fn assemble(&self, m: &MetricsResult, score: f64, similarities: Vec<f64>) -> ForensicsResult {
        let category = categorize(m.perplexity, m.burstiness, &self.config);
        ForensicsResult {
            plagiarism_score: score,
            // Either signal alone is enough to flag
            ai_generated: category.is_ai_flagged() || score > self.config.ai_score_threshold,
            category,
            similarity_scores: similarities,
            perplexity: m.perplexity,
            burstiness: m.burstiness,
        }
    }

    /// AI-flagged submissions scoring above the reject threshold skip grading
    pub fn should_reject(&self, result: &ForensicsResult) -> bool {
        result.ai_generated && result.plagiarism_score > self.config.reject_score_threshold
    }
}
