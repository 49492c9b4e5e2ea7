// GradeShield Core Services

pub mod config_store;
pub mod forensics;
pub mod gateway;
pub mod pipeline;
pub mod providers;
pub mod result_sink;
pub mod retry;
pub mod search;
pub mod text_processor;

#[cfg(test)]
pub(crate) mod testing;

pub use config_store::*;
pub use forensics::{ForensicsScorer, LanguageModel, MetricsError, NgramModel, TextMetrics};
pub use gateway::{detect_kind, extract, GatewayError};
pub use pipeline::{GradingPipeline, PipelineError, PipelineState};
pub use providers::{get_api_key, ProviderClient, ProviderError, TextGenerator};
pub use result_sink::{JsonlResultSink, MemoryResultSink, ResultSink, SinkError};
pub use retry::{retry, RetryPolicy, Sleeper, TokioSleeper};
pub use search::{SearchError, SerperSearch, WebSearch};
