// Grading Service API
// Entry points combining forensics screening, the grading pipeline and result storage

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    CheckReport, CheckRequest, EvaluationResult, ForensicsResult, StoredRecord, SubmissionKind,
};
use crate::services::config_store::AppConfig;
use crate::services::forensics::{ForensicsScorer, LanguageModel, MetricsError, NgramModel, TextMetrics};
use crate::services::gateway;
use crate::services::pipeline::GradingPipeline;
use crate::services::providers::ProviderClient;
use crate::services::result_sink::{JsonlResultSink, ResultSink};
use crate::services::search::SerperSearch;

pub const INTEGRITY_FEEDBACK: &str = "This submission appears to be generated by AI tools or contains significant plagiarism. Our analysis indicates unusual language patterns. Please submit original work.";
pub const INTEGRITY_ANALYSIS: &str = "Automatic grading skipped due to academic integrity concerns. The text demonstrates unusual perplexity and burstiness patterns consistent with AI-generated text.";

#[derive(Clone)]
pub struct GradingService {
    scorer: Arc<ForensicsScorer>,
    pipeline: GradingPipeline,
    sink: Option<Arc<dyn ResultSink>>,
}

impl GradingService {
    pub fn new(scorer: ForensicsScorer, pipeline: GradingPipeline) -> Self {
        Self {
            scorer: Arc::new(scorer),
            pipeline,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Wire the HTTP clients, the reference model and the JSONL store from config
    pub fn from_config(config: &AppConfig) -> Result<Self, MetricsError> {
        let model: Arc<dyn LanguageModel> = match config.forensics.metrics.reference_corpus_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Arc::new(NgramModel::from_corpus_file(Path::new(path))?),
            _ => Arc::new(NgramModel::bundled()?),
        };
        let metrics = TextMetrics::new(model, config.forensics.metrics.clone());
        let scorer = ForensicsScorer::new(metrics, config.forensics.clone());

        let llm = Arc::new(ProviderClient::from_config(config));
        let search = Arc::new(SerperSearch::from_config(config));
        let pipeline = GradingPipeline::new(llm, search, config.pipeline.clone());

        let data_dir = config.resolved_data_dir();
        info!(
            "[API] Service ready provider={} model={} data_dir={}",
            config.default_provider.as_deref().unwrap_or("gemini"),
            scorer.metrics().model_name(),
            data_dir.display()
        );
        let sink = Arc::new(JsonlResultSink::new(&data_dir));
        Ok(Self::new(scorer, pipeline).with_sink(sink))
    }

    pub fn scorer(&self) -> &ForensicsScorer {
        &self.scorer
    }

    pub fn screen(&self, text: &str, references: &[String]) -> ForensicsResult {
        self.scorer.screen(text, references)
    }

    pub async fn evaluate(&self, question: &str, text: &str, reference: &str) -> EvaluationResult {
        self.pipeline.evaluate(question, text, reference).await
    }

    /// Screen, reject early or grade, then persist
    pub async fn check_submission(&self, request: CheckRequest) -> CheckReport {
        let request_id = Uuid::new_v4().to_string();
        info!(
            "[API] Checking {} for student='{}' chars={}",
            request_id,
            request.student_name,
            request.answer.chars().count()
        );

        let references: Vec<String> = if request.reference_material.trim().is_empty() {
            vec![]
        } else {
            vec![request.reference_material.clone()]
        };
        let forensics = self.screen_off_runtime(&request.answer, references).await;

        if self.scorer.should_reject(&forensics) {
            warn!(
                "[API] Rejecting {}: score={:.2} category={}",
                request_id, forensics.plagiarism_score, forensics.category
            );
            let evaluation = EvaluationResult {
                grade: "Failed".to_string(),
                feedback: INTEGRITY_FEEDBACK.to_string(),
                analysis: INTEGRITY_ANALYSIS.to_string(),
                search_results: String::new(),
                success: false,
                file_analysis: None,
                solution: None,
                message_count: 0,
            };
            return CheckReport {
                request_id,
                student_name: request.student_name,
                forensics: Some(forensics),
                evaluation,
                rejected: true,
                document_id: None,
            };
        }

        let evaluation = self
            .pipeline
            .evaluate_with_kind(
                &request.question,
                &request.answer,
                &request.reference_material,
                request.kind.clone(),
            )
            .await;

        let document_id = if evaluation.success {
            self.persist(&request, &evaluation, &forensics).await
        } else {
            None
        };

        CheckReport {
            request_id,
            student_name: request.student_name,
            forensics: Some(forensics),
            evaluation,
            rejected: false,
            document_id,
        }
    }

    /// Extract an uploaded file and check it; extraction errors become a failed report
    pub async fn check_file(
        &self,
        file_name: &str,
        bytes: &[u8],
        question: &str,
        student_name: &str,
        reference_material: &str,
    ) -> CheckReport {
        match gateway::extract(file_name, bytes) {
            Ok(extracted) => {
                let request = CheckRequest {
                    student_name: student_name.to_string(),
                    question: question.to_string(),
                    answer: extracted.text,
                    reference_material: reference_material.to_string(),
                    kind: Some(extracted.kind),
                };
                self.check_submission(request).await
            }
            Err(e) => {
                error!("[API] Could not extract {}: {}", file_name, e);
                CheckReport {
                    request_id: Uuid::new_v4().to_string(),
                    student_name: student_name.to_string(),
                    forensics: None,
                    evaluation: EvaluationResult::failed(format!("Invalid input: {}", e)),
                    rejected: false,
                    document_id: None,
                }
            }
        }
    }

    /// Scoring is CPU-bound, so it runs on the blocking pool
    async fn screen_off_runtime(&self, text: &str, references: Vec<String>) -> ForensicsResult {
        let scorer = Arc::clone(&self.scorer);
        let owned = text.to_string();
        let count = references.len();
        match tokio::task::spawn_blocking(move || scorer.screen(&owned, &references)).await {
            Ok(result) => result,
            Err(e) => {
                error!("[API] Screening task failed: {}", e);
                self.scorer.sentinel_result(count)
            }
        }
    }

    /// Sinks do blocking file I/O behind a mutex, so the write runs on the blocking pool
    async fn persist(
        &self,
        request: &CheckRequest,
        evaluation: &EvaluationResult,
        forensics: &ForensicsResult,
    ) -> Option<String> {
        let sink = Arc::clone(self.sink.as_ref()?);
        let record = StoredRecord {
            id: String::new(),
            timestamp: String::new(),
            student_name: request.student_name.clone(),
            question: request.question.clone(),
            grade: evaluation.grade.clone(),
            kind: request.kind.clone().or(Some(SubmissionKind::Text)),
            content_chars: request.answer.chars().count(),
            ai_generated: forensics.ai_generated,
            plagiarism_score: forensics.plagiarism_score,
        };
        match tokio::task::spawn_blocking(move || sink.store(record)).await {
            Ok(Ok(id)) => Some(id),
            Ok(Err(e)) => {
                warn!("[API] Failed to store result: {}", e);
                None
            }
            Err(e) => {
                error!("[API] Storage task failed: {}", e);
                None
            }
        }
    }
}
