// Reference Language Model
// Token-level scoring seam for perplexity, with a bundled word bigram model

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::services::text_processor::word_tokens;

const BUNDLED_CORPUS: &str = include_str!("../../../assets/reference_corpus.txt");

/// Reserved id for out-of-vocabulary tokens
pub const UNKNOWN_TOKEN: u32 = 0;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("reference model has no vocabulary")]
    EmptyModel,
    #[error("failed to read reference corpus: {0}")]
    Io(#[from] std::io::Error),
}

/// Causal language model used to score text predictability.
///
/// Implementations are loaded once and shared read-only, so they must be
/// `Send + Sync` and free of interior mutation during scoring.
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Longest token sequence a single scoring call accepts
    fn max_context_tokens(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<u32>, MetricsError>;

    /// Natural-log cross-entropy of each token given all tokens before it
    fn token_losses(&self, ids: &[u32]) -> Result<Vec<f64>, MetricsError>;
}

/// Word bigram model interpolated with an add-k unigram model.
#[derive(Debug, Clone)]
pub struct NgramModel {
    vocab: HashMap<String, u32>,
    unigram: Vec<u64>,
    bigram: HashMap<(u32, u32), u64>,
    /// Number of bigrams starting with each token
    context_totals: Vec<u64>,
    total_tokens: u64,
    smoothing: f64,
    bigram_weight: f64,
    max_context: usize,
}

impl NgramModel {
    pub const DEFAULT_MAX_CONTEXT: usize = 512;

    pub fn from_corpus(corpus: &str) -> Result<Self, MetricsError> {
        let tokens = word_tokens(corpus);
        if tokens.is_empty() {
            return Err(MetricsError::EmptyModel);
        }

        let mut vocab: HashMap<String, u32> = HashMap::new();
        vocab.insert("<unk>".to_string(), UNKNOWN_TOKEN);
        let mut ids = Vec::with_capacity(tokens.len());
        for t in tokens {
            let next_id = vocab.len() as u32;
            let id = *vocab.entry(t).or_insert(next_id);
            ids.push(id);
        }

        let mut unigram = vec![0u64; vocab.len()];
        let mut context_totals = vec![0u64; vocab.len()];
        let mut bigram: HashMap<(u32, u32), u64> = HashMap::new();
        for &id in &ids {
            unigram[id as usize] += 1;
        }
        for pair in ids.windows(2) {
            *bigram.entry((pair[0], pair[1])).or_insert(0) += 1;
            context_totals[pair[0] as usize] += 1;
        }

        Ok(Self {
            vocab,
            unigram,
            bigram,
            context_totals,
            total_tokens: ids.len() as u64,
            smoothing: 0.1,
            bigram_weight: 0.7,
            max_context: Self::DEFAULT_MAX_CONTEXT,
        })
    }

    pub fn from_corpus_file(path: &Path) -> Result<Self, MetricsError> {
        let corpus = fs::read_to_string(path)?;
        let model = Self::from_corpus(&corpus)?;
        info!(
            "[FORENSICS] Loaded reference corpus {} ({} words, vocab {})",
            path.display(),
            model.total_tokens,
            model.vocab_size()
        );
        Ok(model)
    }

    /// Model trained on the corpus shipped with the crate
    pub fn bundled() -> Result<Self, MetricsError> {
        Self::from_corpus(BUNDLED_CORPUS)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn unigram_prob(&self, id: u32) -> f64 {
        let count = self.unigram.get(id as usize).copied().unwrap_or(0) as f64;
        let v = self.vocab.len() as f64;
        (count + self.smoothing) / (self.total_tokens as f64 + self.smoothing * v)
    }

    fn conditional_prob(&self, prev: u32, id: u32) -> f64 {
        let uni = self.unigram_prob(id);
        let ctx = self.context_totals.get(prev as usize).copied().unwrap_or(0);
        if prev == UNKNOWN_TOKEN || ctx == 0 {
            return uni;
        }
        let pair = self.bigram.get(&(prev, id)).copied().unwrap_or(0) as f64;
        self.bigram_weight * (pair / ctx as f64) + (1.0 - self.bigram_weight) * uni
    }
}

impl LanguageModel for NgramModel {
    fn name(&self) -> &str {
        "ngram-bigram"
    }

    fn max_context_tokens(&self) -> usize {
        self.max_context
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>, MetricsError> {
        Ok(word_tokens(text)
            .iter()
            .map(|t| self.vocab.get(t).copied().unwrap_or(UNKNOWN_TOKEN))
            .collect())
    }

    fn token_losses(&self, ids: &[u32]) -> Result<Vec<f64>, MetricsError> {
        if let Some(bad) = ids.iter().find(|&&id| id as usize >= self.vocab.len()) {
            return Err(MetricsError::Inference(format!("token id {} outside vocabulary", bad)));
        }

        let mut losses = Vec::with_capacity(ids.len());
        let mut prev: Option<u32> = None;
        for &id in ids {
            let p = match prev {
                Some(prev_id) => self.conditional_prob(prev_id, id),
                None => self.unigram_prob(id),
            };
            losses.push(-p.ln());
            prev = Some(id);
        }
        Ok(losses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perplexity_of(model: &NgramModel, text: &str) -> f64 {
        let ids = model.encode(text).unwrap();
        let losses = model.token_losses(&ids).unwrap();
        (losses.iter().sum::<f64>() / losses.len() as f64).exp()
    }

    #[test]
    fn test_empty_corpus_is_rejected() {
        assert!(matches!(NgramModel::from_corpus("   "), Err(MetricsError::EmptyModel)));
    }

    #[test]
    fn test_bundled_model_loads() {
        let model = NgramModel::bundled().unwrap();
        assert!(model.vocab_size() > 100);
        assert_eq!(model.max_context_tokens(), 512);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let model = NgramModel::from_corpus("the cat sat on the mat").unwrap();
        let ids = model.encode("the zebra").unwrap();
        assert_ne!(ids[0], UNKNOWN_TOKEN);
        assert_eq!(ids[1], UNKNOWN_TOKEN);
    }

    #[test]
    fn test_familiar_text_scores_lower_than_gibberish() {
        let model = NgramModel::bundled().unwrap();
        let familiar = perplexity_of(&model, "Students should explain their reasoning and support the answer with evidence.");
        let gibberish = perplexity_of(&model, "qzxv wplk trbn mmxq zzkt vbbq klpw qqrt");
        assert!(familiar < gibberish, "familiar={} gibberish={}", familiar, gibberish);
    }

    #[test]
    fn test_losses_are_positive_and_finite() {
        let model = NgramModel::from_corpus("a b a b a c").unwrap();
        let ids = model.encode("a b c d").unwrap();
        let losses = model.token_losses(&ids).unwrap();
        assert_eq!(losses.len(), 4);
        assert!(losses.iter().all(|l| l.is_finite() && *l > 0.0));
    }

    #[test]
    fn test_out_of_range_ids_fail() {
        let model = NgramModel::from_corpus("a b").unwrap();
        assert!(model.token_losses(&[99]).is_err());
    }
}
