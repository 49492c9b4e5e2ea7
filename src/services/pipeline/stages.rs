// Pipeline Stages
// Each stage reads the state, makes one LLM call with retries, and returns a new state

use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::prompts;
use super::state::{log_pair, PipelineError, PipelineState};
use crate::models::{LogEntry, StageKind};
use crate::services::config_store::PipelineConfig;
use crate::services::providers::{ProviderError, TextGenerator};
use crate::services::retry::{retry, RetryPolicy, Sleeper};
use crate::services::search::{format_search_results, WebSearch};
use crate::services::text_processor::{preview, truncate_with_notice};

pub const FILE_ANALYSIS_ERROR: &str = "Error: Unable to analyze file structure due to service issues.";
pub const RESEARCH_ERROR: &str = "Error: Unable to generate search query due to LLM service issues.";
pub const ANALYSIS_ERROR: &str = "Error: Unable to complete analysis due to service issues.";
pub const GRADING_ERROR: &str = "Error: Unable to grade due to service issues";
pub const GRADING_FEEDBACK_ERROR: &str =
    "The system encountered an error while trying to grade this assignment. Please try again later.";
pub const SOLUTION_ERROR: &str = "Error: Unable to generate an improved solution due to service issues.";

/// Borrowed handles a stage needs for its external calls
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub llm: &'a dyn TextGenerator,
    pub search: &'a dyn WebSearch,
    pub sleeper: &'a dyn Sleeper,
    pub config: &'a PipelineConfig,
}

#[derive(Error, Debug)]
enum AttemptError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("empty response from text generator")]
    EmptyResponse(String),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Provider(e) => e.is_retryable(),
            AttemptError::EmptyResponse(_) => true,
        }
    }
}

struct LlmReply {
    text: Option<String>,
    log: Vec<LogEntry>,
}

async fn call_llm(
    ctx: StageContext<'_>,
    stage: StageKind,
    system: &str,
    prompt: &str,
    timeout_secs: u64,
) -> LlmReply {
    let policy = RetryPolicy::exponential(
        ctx.config.max_attempts,
        Duration::from_secs(ctx.config.backoff_base_secs),
    );

    let outcome = retry(
        stage.as_str(),
        &policy,
        ctx.sleeper,
        |e: &AttemptError| e.is_retryable(),
        |_| async move {
            let text = ctx.llm.invoke(system, prompt, timeout_secs).await?;
            if text.trim().is_empty() {
                return Err(AttemptError::EmptyResponse(text));
            }
            Ok(text)
        },
    )
    .await;

    // Responses are logged even when they were unusable; transport failures are not
    let mut log = Vec::new();
    for failure in &outcome.failures {
        if let AttemptError::EmptyResponse(text) = failure {
            log.extend(log_pair(stage, prompt, text));
        }
    }

    match outcome.result {
        Ok(text) => {
            log.extend(log_pair(stage, prompt, &text));
            LlmReply { text: Some(text), log }
        }
        Err(e) => {
            if let AttemptError::EmptyResponse(text) = &e {
                log.extend(log_pair(stage, prompt, text));
            }
            error!(
                "[PIPELINE] {} gave up after {} attempts: {}",
                stage.as_str(),
                outcome.attempts,
                e
            );
            LlmReply { text: None, log }
        }
    }
}

pub async fn file_analysis(
    ctx: StageContext<'_>,
    state: PipelineState,
) -> Result<PipelineState, PipelineError> {
    let kind = match state.kind() {
        Some(kind) => kind.clone(),
        None => return Ok(state),
    };
    let submission = truncate_with_notice(state.submission_text(), ctx.config.analysis_max_chars);
    let prompt = prompts::file_analysis_prompt(state.question(), &submission, &kind);

    let reply = call_llm(
        ctx,
        StageKind::FileAnalysis,
        prompts::FILE_ANALYSIS_SYSTEM,
        &prompt,
        ctx.config.file_analysis_timeout_secs,
    )
    .await;

    let value = reply.text.unwrap_or_else(|| FILE_ANALYSIS_ERROR.to_string());
    state.with_messages(reply.log).with_file_analysis(value)
}

pub async fn research(
    ctx: StageContext<'_>,
    state: PipelineState,
) -> Result<PipelineState, PipelineError> {
    let prompt = prompts::research_prompt(state.question(), state.submission_text(), state.file_analysis());
    let reply = call_llm(
        ctx,
        StageKind::Research,
        prompts::RESEARCH_SYSTEM,
        &prompt,
        ctx.config.research_timeout_secs,
    )
    .await;

    let results = match reply.text.as_deref() {
        Some(raw) => {
            let mut query = clean_query(raw);
            if query.is_empty() {
                query = clean_query(state.question());
            }
            info!("[PIPELINE] Generated search query: {}", query);
            run_search(ctx, &query).await
        }
        None => RESEARCH_ERROR.to_string(),
    };

    state.with_messages(reply.log).with_search_results(results)
}

/// Search failures are swallowed: the stage still completes, with empty results
async fn run_search(ctx: StageContext<'_>, query: &str) -> String {
    let policy = RetryPolicy::fixed(
        ctx.config.search_max_attempts,
        Duration::from_secs(ctx.config.search_retry_delay_secs),
    );
    let max_results = ctx.config.search_max_results;

    let outcome = retry(
        "search",
        &policy,
        ctx.sleeper,
        |e: &crate::services::search::SearchError| e.is_retryable(),
        |_| async move { ctx.search.search(query, max_results).await },
    )
    .await;

    match outcome.result {
        Ok(hits) => format_search_results(&hits),
        Err(e) => {
            warn!("[PIPELINE] Web search failed, continuing without results: {}", e);
            String::new()
        }
    }
}

pub async fn analysis(
    ctx: StageContext<'_>,
    state: PipelineState,
) -> Result<PipelineState, PipelineError> {
    let submission = truncate_with_notice(state.submission_text(), ctx.config.analysis_max_chars);
    if submission.len() != state.submission_text().len() {
        info!(
            "[PIPELINE] Answer exceeds {} chars, truncating for analysis",
            ctx.config.analysis_max_chars
        );
    }
    let prompt = prompts::analysis_prompt(
        state.question(),
        &submission,
        state.reference_material(),
        state.search_results().unwrap_or(""),
        state.file_analysis(),
    );

    let reply = call_llm(
        ctx,
        StageKind::Analysis,
        prompts::ANALYSIS_SYSTEM,
        &prompt,
        ctx.config.analysis_timeout_secs,
    )
    .await;

    let value = reply.text.unwrap_or_else(|| ANALYSIS_ERROR.to_string());
    state.with_messages(reply.log).with_analysis(value)
}

pub async fn grading(
    ctx: StageContext<'_>,
    state: PipelineState,
) -> Result<PipelineState, PipelineError> {
    let submission = truncate_with_notice(state.submission_text(), ctx.config.grading_max_chars);
    let prompt = prompts::grading_prompt(state.question(), &submission, state.analysis().unwrap_or(""));

    let reply = call_llm(
        ctx,
        StageKind::Grading,
        prompts::GRADING_SYSTEM,
        &prompt,
        ctx.config.grading_timeout_secs,
    )
    .await;

    let (grade, feedback) = match reply.text {
        Some(text) => {
            let grade = extract_grade(&text).unwrap_or_else(|| {
                warn!(
                    "[PIPELINE] No grade line in response, using placeholder: {}",
                    preview(&text, 80)
                );
                ctx.config.grade_placeholder.clone()
            });
            info!("[PIPELINE] Assigned grade: {}", grade);
            (grade, text)
        }
        None => (GRADING_ERROR.to_string(), GRADING_FEEDBACK_ERROR.to_string()),
    };

    state.with_messages(reply.log).with_grading(grade, feedback)
}

pub async fn solution(
    ctx: StageContext<'_>,
    state: PipelineState,
) -> Result<PipelineState, PipelineError> {
    let submission = truncate_with_notice(state.submission_text(), ctx.config.grading_max_chars);
    let prompt = prompts::solution_prompt(
        state.question(),
        &submission,
        state.analysis().unwrap_or(""),
        state.feedback().unwrap_or(""),
        state.kind(),
    );

    let reply = call_llm(
        ctx,
        StageKind::SolutionGeneration,
        prompts::SOLUTION_SYSTEM,
        &prompt,
        ctx.config.solution_timeout_secs,
    )
    .await;

    let value = reply.text.unwrap_or_else(|| SOLUTION_ERROR.to_string());
    state.with_messages(reply.log).with_solution(value)
}

/// Text after `GRADE:` on the first line that contains it, trimmed
pub fn extract_grade(response: &str) -> Option<String> {
    response
        .lines()
        .find(|line| line.contains("GRADE:"))
        .and_then(|line| line.split("GRADE:").nth(1))
        .map(|g| g.trim().to_string())
}

/// Plain-text search query: markdown markers and wrapping quotes removed
pub fn clean_query(raw: &str) -> String {
    let first_line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let stripped: String = first_line
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_' | '>' | '[' | ']'))
        .collect();
    stripped
        .trim()
        .trim_start_matches("- ")
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;
    use crate::services::testing::{FakeSearch, RecordingSleeper, Scripted, ScriptedGenerator};

    fn ctx<'a>(
        llm: &'a ScriptedGenerator,
        search: &'a FakeSearch,
        sleeper: &'a RecordingSleeper,
        config: &'a PipelineConfig,
    ) -> StageContext<'a> {
        StageContext { llm, search, sleeper, config }
    }

    fn fresh_state() -> PipelineState {
        PipelineState::new("What is 2+2?", "4", "").unwrap()
    }

    #[test]
    fn test_extract_grade() {
        assert_eq!(extract_grade("GRADE:90\nFEEDBACK: Excellent!").as_deref(), Some("90"));
        assert_eq!(extract_grade("Intro\nGRADE:  85/100  \nMore").as_deref(), Some("85/100"));
        assert_eq!(extract_grade("No grade here"), None);
        assert_eq!(extract_grade("GRADE:   \nFEEDBACK").as_deref(), Some(""));
    }

    #[test]
    fn test_clean_query() {
        assert_eq!(clean_query("**photosynthesis   process**"), "photosynthesis process");
        assert_eq!(clean_query("\n\"binary search\"\nextra line"), "binary search");
        assert_eq!(clean_query("- `addition`"), "addition");
    }

    #[tokio::test]
    async fn test_research_retries_then_succeeds() {
        let llm = ScriptedGenerator::new(vec![
            Scripted::Fail,
            Scripted::Fail,
            Scripted::Reply("basic addition".to_string()),
        ]);
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = research(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();

        assert_eq!(llm.calls(), 3);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(search.queries(), vec!["basic addition".to_string()]);
        let results = state.search_results().unwrap();
        assert!(results.starts_with("Source 1: About basic addition"));
        // Failed transport attempts are not logged
        assert_eq!(state.message_log().len(), 2);
    }

    #[tokio::test]
    async fn test_research_sentinel_after_exhaustion() {
        let llm = ScriptedGenerator::failing();
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = research(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();

        assert_eq!(llm.calls(), 3);
        assert_eq!(state.search_results(), Some(RESEARCH_ERROR));
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_failure_yields_empty_results() {
        let llm = ScriptedGenerator::always("addition");
        let search = FakeSearch::failing();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = research(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();

        assert_eq!(state.search_results(), Some(""));
        assert_eq!(search.calls(), 3);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1), Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_no_search_hits() {
        let llm = ScriptedGenerator::always("addition");
        let search = FakeSearch::empty();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = research(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();
        assert_eq!(state.search_results(), Some("No search results found."));
    }

    #[tokio::test]
    async fn test_empty_response_counts_as_failure_but_is_logged() {
        let llm = ScriptedGenerator::new(vec![Scripted::Reply("   ".to_string())])
            .then_always("A solid analysis.");
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();
        let state = fresh_state().with_search_results(String::new()).unwrap();

        let state = analysis(ctx(&llm, &search, &sleeper, &config), state).await.unwrap();

        assert_eq!(llm.calls(), 2);
        assert_eq!(state.analysis(), Some("A solid analysis."));
        let log = state.message_log();
        assert_eq!(log.len(), 4);
        assert_eq!(log[1].role, MessageRole::Response);
        assert_eq!(log[1].content, "   ");
    }

    #[tokio::test]
    async fn test_analysis_prompt_truncates_long_answer() {
        let llm = ScriptedGenerator::always("analysis");
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();
        let answer = "x".repeat(9000);
        let state = PipelineState::new("Q", &answer, "")
            .unwrap()
            .with_search_results(String::new())
            .unwrap();

        analysis(ctx(&llm, &search, &sleeper, &config), state).await.unwrap();

        let (_, prompt, timeout) = llm.prompts().remove(0);
        let expected = format!(
            "{}\n\n[Note: Answer truncated from 9000 characters due to length limits]",
            "x".repeat(8000)
        );
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains(&"x".repeat(8001)));
        assert_eq!(timeout, 120);
    }

    #[tokio::test]
    async fn test_grading_extracts_grade_and_keeps_full_feedback() {
        let response = "GRADE:90\nFEEDBACK: Excellent!";
        let llm = ScriptedGenerator::always(response);
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = grading(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();

        assert_eq!(state.grade(), Some("90"));
        assert_eq!(state.feedback(), Some(response));
    }

    #[tokio::test]
    async fn test_grading_placeholder_without_grade_line() {
        let llm = ScriptedGenerator::always("Nice work overall.");
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = grading(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();
        assert_eq!(state.grade(), Some("See detailed feedback"));
    }

    #[tokio::test]
    async fn test_grading_keeps_blank_grade_value() {
        let llm = ScriptedGenerator::always("GRADE:\nFEEDBACK: x");
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = grading(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();
        assert_eq!(state.grade(), Some(""));
        assert_eq!(state.feedback(), Some("GRADE:\nFEEDBACK: x"));
    }

    #[tokio::test]
    async fn test_grading_sentinels() {
        let llm = ScriptedGenerator::failing();
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = grading(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();
        assert_eq!(state.grade(), Some(GRADING_ERROR));
        assert_eq!(state.feedback(), Some(GRADING_FEEDBACK_ERROR));
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn test_file_analysis_skipped_without_kind() {
        let llm = ScriptedGenerator::always("structure");
        let search = FakeSearch::default();
        let sleeper = RecordingSleeper::default();
        let config = PipelineConfig::default();

        let state = file_analysis(ctx(&llm, &search, &sleeper, &config), fresh_state()).await.unwrap();
        assert_eq!(state.file_analysis(), None);
        assert_eq!(llm.calls(), 0);
    }
}
