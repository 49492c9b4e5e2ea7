// Pipeline State
// Immutable value threaded through the stages; each stage returns a new state

use thiserror::Error;

use crate::models::{EvaluationResult, LogEntry, MessageRole, StageKind, SubmissionKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("stage output '{0}' is already set")]
    FieldAlreadySet(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    question: String,
    submission_text: String,
    reference_material: String,
    kind: Option<SubmissionKind>,
    file_analysis: Option<String>,
    search_results: Option<String>,
    analysis: Option<String>,
    grade: Option<String>,
    feedback: Option<String>,
    solution: Option<String>,
    message_log: Vec<LogEntry>,
}

/// Move an output field from unset to set, once
fn set_once(
    slot: &mut Option<String>,
    name: &'static str,
    value: String,
) -> Result<(), PipelineError> {
    if slot.is_some() {
        return Err(PipelineError::FieldAlreadySet(name));
    }
    *slot = Some(value);
    Ok(())
}

impl PipelineState {
    pub fn new(
        question: &str,
        submission_text: &str,
        reference_material: &str,
    ) -> Result<Self, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::InvalidInput("question must not be empty".to_string()));
        }
        Ok(Self {
            question: question.to_string(),
            submission_text: submission_text.to_string(),
            reference_material: reference_material.to_string(),
            kind: None,
            file_analysis: None,
            search_results: None,
            analysis: None,
            grade: None,
            feedback: None,
            solution: None,
            message_log: Vec::new(),
        })
    }

    pub fn with_kind(mut self, kind: Option<SubmissionKind>) -> Self {
        self.kind = kind;
        self
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn submission_text(&self) -> &str {
        &self.submission_text
    }

    pub fn reference_material(&self) -> &str {
        &self.reference_material
    }

    pub fn kind(&self) -> Option<&SubmissionKind> {
        self.kind.as_ref()
    }

    pub fn file_analysis(&self) -> Option<&str> {
        self.file_analysis.as_deref()
    }

    pub fn search_results(&self) -> Option<&str> {
        self.search_results.as_deref()
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    pub fn grade(&self) -> Option<&str> {
        self.grade.as_deref()
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn solution(&self) -> Option<&str> {
        self.solution.as_deref()
    }

    pub fn message_log(&self) -> &[LogEntry] {
        &self.message_log
    }

    pub fn with_file_analysis(mut self, value: String) -> Result<Self, PipelineError> {
        set_once(&mut self.file_analysis, "file_analysis", value)?;
        Ok(self)
    }

    pub fn with_search_results(mut self, value: String) -> Result<Self, PipelineError> {
        set_once(&mut self.search_results, "search_results", value)?;
        Ok(self)
    }

    pub fn with_analysis(mut self, value: String) -> Result<Self, PipelineError> {
        set_once(&mut self.analysis, "analysis", value)?;
        Ok(self)
    }

    /// Grade and feedback always come from the same response, so they are set together
    pub fn with_grading(mut self, grade: String, feedback: String) -> Result<Self, PipelineError> {
        if self.grade.is_some() {
            return Err(PipelineError::FieldAlreadySet("grade"));
        }
        set_once(&mut self.feedback, "feedback", feedback)?;
        self.grade = Some(grade);
        Ok(self)
    }

    pub fn with_solution(mut self, value: String) -> Result<Self, PipelineError> {
        set_once(&mut self.solution, "solution", value)?;
        Ok(self)
    }

    /// Append-only; existing entries are never rewritten
    pub fn with_messages(mut self, entries: Vec<LogEntry>) -> Self {
        self.message_log.extend(entries);
        self
    }

    pub fn into_result(self) -> EvaluationResult {
        EvaluationResult {
            grade: self.grade.unwrap_or_default(),
            feedback: self.feedback.unwrap_or_default(),
            analysis: self.analysis.unwrap_or_default(),
            search_results: self.search_results.unwrap_or_default(),
            success: true,
            file_analysis: self.file_analysis,
            solution: self.solution,
            message_count: self.message_log.len(),
        }
    }
}

pub fn log_pair(stage: StageKind, prompt: &str, response: &str) -> Vec<LogEntry> {
    vec![
        LogEntry {
            stage,
            role: MessageRole::Prompt,
            content: prompt.to_string(),
        },
        LogEntry {
            stage,
            role: MessageRole::Response,
            content: response.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_question_rejected() {
        let err = PipelineState::new("   ", "answer", "").unwrap_err();
        assert!(err.to_string().starts_with("Invalid input:"));
    }

    #[test]
    fn test_fields_set_exactly_once() {
        let state = PipelineState::new("Q", "A", "").unwrap();
        let state = state.with_search_results("results".to_string()).unwrap();
        assert_eq!(state.search_results(), Some("results"));

        let err = state.clone().with_search_results("again".to_string()).unwrap_err();
        assert_eq!(err, PipelineError::FieldAlreadySet("search_results"));

        let state = state.with_grading("90".to_string(), "Good".to_string()).unwrap();
        assert!(state.with_grading("80".to_string(), "Ok".to_string()).is_err());
    }

    #[test]
    fn test_update_leaves_original_untouched() {
        let before = PipelineState::new("Q", "A", "").unwrap();
        let after = before.clone().with_analysis("analysis".to_string()).unwrap();
        assert_eq!(before.analysis(), None);
        assert_eq!(after.analysis(), Some("analysis"));
    }

    #[test]
    fn test_message_log_appends() {
        let state = PipelineState::new("Q", "A", "")
            .unwrap()
            .with_messages(log_pair(StageKind::Research, "p1", "r1"))
            .with_messages(log_pair(StageKind::Analysis, "p2", "r2"));
        let log = state.message_log();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].content, "p1");
        assert_eq!(log[3].role, MessageRole::Response);
        assert_eq!(state.into_result().message_count, 4);
    }
}
