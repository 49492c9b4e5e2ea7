// Forensics Module
// AI-likelihood and plagiarism screening:
// - language_model: reference model seam and the bundled bigram model
// - metrics: windowed perplexity and burstiness
// - tfidf: lexical similarity against reference texts
// - scorer: score fusion, categorization, screening

pub mod language_model;
pub mod metrics;
pub mod scorer;
pub mod tfidf;

pub use language_model::{LanguageModel, MetricsError, NgramModel};
pub use metrics::TextMetrics;
pub use scorer::{categorize, fusion_score, perplexity_score, ForensicsScorer};
pub use tfidf::tfidf_similarities;
