// Grading Pipeline Orchestrator
// Runs [file analysis] -> research -> analysis -> grading -> [solution] for one submission

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::stages::{self, StageContext};
use super::state::{PipelineError, PipelineState};
use crate::models::{EvaluationResult, SubmissionKind};
use crate::services::config_store::PipelineConfig;
use crate::services::providers::TextGenerator;
use crate::services::retry::{Sleeper, TokioSleeper};
use crate::services::search::WebSearch;

#[derive(Clone)]
pub struct GradingPipeline {
    llm: Arc<dyn TextGenerator>,
    search: Arc<dyn WebSearch>,
    sleeper: Arc<dyn Sleeper>,
    config: PipelineConfig,
}

impl GradingPipeline {
    pub fn new(llm: Arc<dyn TextGenerator>, search: Arc<dyn WebSearch>, config: PipelineConfig) -> Self {
        Self {
            llm,
            search,
            sleeper: Arc::new(TokioSleeper),
            config,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every enabled stage in order. Stage failures degrade to sentinels;
    /// only a broken state transition is returned as an error.
    pub async fn run(&self, state: PipelineState) -> Result<PipelineState, PipelineError> {
        let ctx = StageContext {
            llm: self.llm.as_ref(),
            search: self.search.as_ref(),
            sleeper: self.sleeper.as_ref(),
            config: &self.config,
        };
        let mut state = state;

        if self.config.enhanced {
            if state.kind().is_some() {
                state = stages::file_analysis(ctx, state).await?;
            } else {
                debug!("[PIPELINE] No submission kind, skipping file analysis");
            }
        }
        state = stages::research(ctx, state).await?;
        state = stages::analysis(ctx, state).await?;
        state = stages::grading(ctx, state).await?;
        if self.config.enhanced {
            state = stages::solution(ctx, state).await?;
        }

        Ok(state)
    }

    pub async fn evaluate(&self, question: &str, submission: &str, reference: &str) -> EvaluationResult {
        self.evaluate_with_kind(question, submission, reference, None).await
    }

    /// Entry point: never returns an error. Invalid input and unexpected
    /// failures come back as `success == false`.
    pub async fn evaluate_with_kind(
        &self,
        question: &str,
        submission: &str,
        reference: &str,
        kind: Option<SubmissionKind>,
    ) -> EvaluationResult {
        let state = match PipelineState::new(question, submission, reference) {
            Ok(state) => state.with_kind(kind),
            Err(e) => {
                warn!("[PIPELINE] Rejected evaluation: {}", e);
                return EvaluationResult::failed(e.to_string());
            }
        };

        let start = Instant::now();
        let pipeline = self.clone();
        let handle = tokio::spawn(async move { pipeline.run(state).await });

        match handle.await {
            Ok(Ok(state)) => {
                let result = state.into_result();
                info!(
                    "[PIPELINE] Evaluation complete grade={} messages={} elapsed_ms={}",
                    result.grade,
                    result.message_count,
                    start.elapsed().as_millis()
                );
                result
            }
            Ok(Err(e)) => {
                error!("[PIPELINE] Evaluation failed: {}", e);
                EvaluationResult::failed(format!("An error occurred during checking: {}", e))
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    join_err.to_string()
                };
                error!("[PIPELINE] Evaluation task aborted: {}", message);
                EvaluationResult::failed(format!("An error occurred during checking: {}", message))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
