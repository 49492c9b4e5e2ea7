// Grading Pipeline Module
// Staged LLM workflow that researches, analyzes and grades a submission:
// - state: immutable state value and its functional updates
// - prompts: system instructions and per-stage prompts
// - stages: one async fn per stage, with retries and error sentinels
// - orchestrator: stage ordering and the evaluate entry point

pub mod orchestrator;
pub mod prompts;
pub mod stages;
pub mod state;

pub use orchestrator::GradingPipeline;
pub use stages::{extract_grade, StageContext};
pub use state::{PipelineError, PipelineState};
