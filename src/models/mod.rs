// GradeShield Data Models
// Shared types for forensics screening and the grading pipeline

use serde::{Deserialize, Serialize};

// ============ Forensics ============

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsResult {
    pub perplexity: f64,
    pub burstiness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiCategory {
    #[serde(rename = "HighConfidenceAI")]
    HighConfidenceAi,
    #[serde(rename = "MediumConfidenceAI")]
    MediumConfidenceAi,
    #[serde(rename = "PotentialAI")]
    PotentialAi,
    LikelyHuman,
}

impl AiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighConfidenceAi => "HighConfidenceAI",
            Self::MediumConfidenceAi => "MediumConfidenceAI",
            Self::PotentialAi => "PotentialAI",
            Self::LikelyHuman => "LikelyHuman",
        }
    }

    /// Human-readable verdict shown in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::HighConfidenceAi => "AI Generated Content (High Confidence)",
            Self::MediumConfidenceAi => "AI Generated Content (Medium Confidence)",
            Self::PotentialAi => "Potential AI Generated Content",
            Self::LikelyHuman => "Likely Human-Written Content",
        }
    }

    /// Every category except `LikelyHuman` counts as a category match
    /// when deciding `ai_generated`.
    pub fn is_ai_flagged(&self) -> bool {
        !matches!(self, Self::LikelyHuman)
    }
}

impl std::fmt::Display for AiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    pub perplexity: f64,
    pub burstiness: f64,
    pub category: AiCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicsResult {
    /// 0..=100, higher is more suspicious
    pub plagiarism_score: f64,
    pub ai_generated: bool,
    pub category: AiCategory,
    /// 0..=1, aligned 1:1 with the supplied reference texts
    pub similarity_scores: Vec<f64>,
    pub perplexity: f64,
    pub burstiness: f64,
}

// ============ Search ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// ============ Pipeline ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    FileAnalysis,
    Research,
    Analysis,
    Grading,
    SolutionGeneration,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileAnalysis => "file_analysis",
            Self::Research => "research",
            Self::Analysis => "analysis",
            Self::Grading => "grading",
            Self::SolutionGeneration => "solution_generation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Prompt,
    Response,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub stage: StageKind,
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub grade: String,
    pub feedback: String,
    pub analysis: String,
    pub search_results: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default)]
    pub message_count: usize,
}

impl EvaluationResult {
    /// Result for an evaluation that could not run at all
    pub fn failed(feedback: String) -> Self {
        Self {
            grade: "Error".to_string(),
            feedback,
            analysis: String::new(),
            search_results: String::new(),
            success: false,
            file_analysis: None,
            solution: None,
            message_count: 0,
        }
    }
}

// ============ Submissions ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "language")]
pub enum SubmissionKind {
    Text,
    Markdown,
    Pdf,
    Docx,
    Notebook,
    Code(String),
    Data,
}

impl SubmissionKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Text => "plain text document".to_string(),
            Self::Markdown => "markdown document".to_string(),
            Self::Pdf => "PDF document".to_string(),
            Self::Docx => "Word document".to_string(),
            Self::Notebook => "Jupyter notebook (code and markdown cells)".to_string(),
            Self::Code(lang) => format!("{} source file", lang),
            Self::Data => "structured data file".to_string(),
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code(_) | Self::Notebook)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSubmission {
    pub file_name: String,
    pub kind: SubmissionKind,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(default)]
    pub student_name: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub reference_material: String,
    #[serde(default)]
    pub kind: Option<SubmissionKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub request_id: String,
    pub student_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forensics: Option<ForensicsResult>,
    pub evaluation: EvaluationResult,
    pub rejected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

// ============ Persistence ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    pub student_name: String,
    pub question: String,
    pub grade: String,
    #[serde(default)]
    pub kind: Option<SubmissionKind>,
    pub content_chars: usize,
    pub ai_generated: bool,
    pub plagiarism_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serializes_with_report_names() {
        let json = serde_json::to_string(&AiCategory::HighConfidenceAi).unwrap();
        assert_eq!(json, "\"HighConfidenceAI\"");
        let parsed: AiCategory = serde_json::from_str("\"LikelyHuman\"").unwrap();
        assert_eq!(parsed, AiCategory::LikelyHuman);
    }

    #[test]
    fn test_category_flags() {
        assert!(AiCategory::PotentialAi.is_ai_flagged());
        assert!(!AiCategory::LikelyHuman.is_ai_flagged());
        assert!(AiCategory::MediumConfidenceAi.label().contains("AI Generated"));
    }

    #[test]
    fn test_failed_evaluation() {
        let result = EvaluationResult::failed("Invalid input: empty question".to_string());
        assert!(!result.success);
        assert_eq!(result.grade, "Error");
    }
}
