// Web Search Service
// Background research lookups for the grading pipeline

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::models::SearchHit;
use crate::services::config_store::{AppConfig, SearchConfig};
use crate::services::providers::get_api_key;

const SERPER_URL: &str = "https://google.serper.dev/search";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Search API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Search API key not configured")]
    MissingApiKey,
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SearchError::MissingApiKey)
    }
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct SerperItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperItem>,
}

/// Google results through serper.dev
pub struct SerperSearch {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

impl SerperSearch {
    pub fn new(api_key: Option<String>, config: &SearchConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        let base_url = config
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| SERPER_URL.to_string());
        Self { http, api_key, base_url }
    }

    /// Key from `SERPER_API_KEY`, the stored config file, then `config.apiKeys`
    pub fn from_config(config: &AppConfig) -> Self {
        let key = get_api_key("serper").or_else(|| config.api_keys.get("serper").cloned());
        Self::new(key, &config.search)
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;

        let response = self
            .http
            .post(&self.base_url)
            .header("X-API-KEY", key)
            .json(&serde_json::json!({ "q": query, "num": max_results }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: SerperResponse = response.json().await?;
        let hits: Vec<SearchHit> = data
            .organic
            .into_iter()
            .take(max_results)
            .map(|item| SearchHit {
                title: item.title,
                url: item.link,
                snippet: item.snippet,
            })
            .collect();
        info!("[SEARCH] '{}' returned {} results", query, hits.len());
        Ok(hits)
    }
}

/// Render hits as the `Source n` block embedded in later prompts
pub fn format_search_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No search results found.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Source {}: {}\nURL: {}\nSnippet: {}\n\n",
                i + 1,
                hit.title,
                hit.url,
                hit.snippet
            )
        })
        .collect()
}
