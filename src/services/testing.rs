// Test doubles shared by the service unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::SearchHit;
use crate::services::forensics::{LanguageModel, MetricsError};
use crate::services::providers::{ProviderError, TextGenerator};
use crate::services::retry::Sleeper;
use crate::services::search::{SearchError, WebSearch};

/// Records requested sleeps instead of waiting
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail,
}

/// Text generator that replays a script, then falls back to a default reply.
/// Every call records the system instruction and user prompt it received.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String, u64)>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn always(reply: &str) -> Self {
        Self {
            fallback: Some(reply.to_string()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn then_always(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (system instruction, user prompt, timeout) per call
    pub fn prompts(&self) -> Vec<(String, String, u64)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn invoke(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        timeout_secs: u64,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push((
            system_instruction.to_string(),
            user_prompt.to_string(),
            timeout_secs,
        ));

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail) => Err(ProviderError::ApiError {
                status: 503,
                message: "scripted failure".to_string(),
            }),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(ProviderError::ApiError {
                    status: 503,
                    message: "service unavailable".to_string(),
                }),
            },
        }
    }
}

/// Search client returning one hit that echoes the query, or always failing
#[derive(Debug, Default)]
pub struct FakeSearch {
    pub fail: bool,
    pub empty: bool,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self {
            empty: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(SearchError::ApiError {
                status: 500,
                message: "search down".to_string(),
            });
        }
        if self.empty {
            return Ok(vec![]);
        }
        Ok(vec![SearchHit {
            title: format!("About {}", query),
            url: "https://example.org/article".to_string(),
            snippet: format!("Background on {}", query),
        }]
        .into_iter()
        .take(max_results)
        .collect())
    }
}

/// Every token costs the same loss, so perplexity is exactly `exp(loss)`
#[derive(Debug, Clone)]
pub struct FixedLossModel {
    pub loss: f64,
    pub max_context: usize,
}

impl FixedLossModel {
    pub fn with_perplexity(perplexity: f64) -> Self {
        Self {
            loss: perplexity.ln(),
            max_context: 512,
        }
    }
}

impl LanguageModel for FixedLossModel {
    fn name(&self) -> &str {
        "fixed-loss"
    }

    fn max_context_tokens(&self) -> usize {
        self.max_context
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>, MetricsError> {
        Ok(text.split_whitespace().map(|_| 1).collect())
    }

    fn token_losses(&self, ids: &[u32]) -> Result<Vec<f64>, MetricsError> {
        Ok(vec![self.loss; ids.len()])
    }
}

/// Fails every encode call
#[derive(Debug, Default, Clone)]
pub struct BrokenModel;

impl LanguageModel for BrokenModel {
    fn name(&self) -> &str {
        "broken"
    }

    fn max_context_tokens(&self) -> usize {
        512
    }

    fn encode(&self, _text: &str) -> Result<Vec<u32>, MetricsError> {
        Err(MetricsError::Tokenization("tokenizer unavailable".to_string()))
    }

    fn token_losses(&self, _ids: &[u32]) -> Result<Vec<f64>, MetricsError> {
        Err(MetricsError::Inference("model unavailable".to_string()))
    }
}
