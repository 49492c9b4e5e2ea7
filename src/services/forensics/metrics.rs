// Text Metrics
// Perplexity (windowed, min over windows) and burstiness for a submission

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::language_model::{LanguageModel, MetricsError};
use crate::models::MetricsResult;
use crate::services::config_store::MetricsConfig;
use crate::services::text_processor::{char_windows, word_tokens};

#[derive(Clone)]
pub struct TextMetrics {
    model: Arc<dyn LanguageModel>,
    config: MetricsConfig,
}

impl TextMetrics {
    pub fn new(model: Arc<dyn LanguageModel>, config: MetricsConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Perplexity of the text under the reference model.
    ///
    /// Short inputs, failures, and inputs with no scorable window map to
    /// fixed sentinel values from `MetricsConfig` instead of erroring.
    pub fn perplexity(&self, text: &str) -> f64 {
        if text.chars().count() < self.config.short_text_min_chars {
            return self.config.short_text_perplexity;
        }

        match self.window_perplexities(text) {
            Ok(values) => values
                .into_iter()
                .reduce(f64::min)
                .unwrap_or(self.config.empty_windows_perplexity),
            Err(e) => {
                warn!("[FORENSICS] Perplexity calculation failed, using sentinel: {}", e);
                self.config.error_perplexity
            }
        }
    }

    /// Perplexity of every window that produced at least one token.
    /// Text up to `window_chars` long is scored as one window.
    pub fn window_perplexities(&self, text: &str) -> Result<Vec<f64>, MetricsError> {
        let windows = if text.chars().count() <= self.config.window_chars {
            vec![text]
        } else {
            char_windows(text, self.config.window_chars, self.config.window_stride_chars)
        };

        let mut values = Vec::with_capacity(windows.len());
        for window in &windows {
            if let Some(p) = self.score_window(window)? {
                values.push(p);
            }
        }
        debug!(
            "[FORENSICS] {} windows, {} scored",
            windows.len(),
            values.len()
        );
        Ok(values)
    }

    fn score_window(&self, window: &str) -> Result<Option<f64>, MetricsError> {
        let mut ids = self.model.encode(window)?;
        ids.truncate(self.model.max_context_tokens());
        if ids.is_empty() {
            return Ok(None);
        }

        let losses = self.model.token_losses(&ids)?;
        if losses.is_empty() {
            return Ok(None);
        }
        let mean = losses.iter().sum::<f64>() / losses.len() as f64;
        let p = mean.exp();
        if !p.is_finite() {
            return Err(MetricsError::Inference(format!("non-finite perplexity from mean loss {}", mean)));
        }
        Ok(Some(p))
    }

    /// Share of the distinct vocabulary that occurs more than once, in [0, 1]
    pub fn burstiness(&self, text: &str) -> f64 {
        let tokens = word_tokens(text);
        if tokens.is_empty() {
            return 0.0;
        }

        let mut freq: HashMap<&str, usize> = HashMap::new();
        for t in &tokens {
            *freq.entry(t.as_str()).or_insert(0) += 1;
        }
        let repeated = freq.values().filter(|&&c| c > 1).count();
        repeated as f64 / freq.len() as f64
    }

    pub fn measure(&self, text: &str) -> MetricsResult {
        MetricsResult {
            perplexity: self.perplexity(text),
            burstiness: self.burstiness(text),
        }
    }
}
