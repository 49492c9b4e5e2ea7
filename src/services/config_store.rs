// Configuration Storage Service
// Handles config file read/write and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub version: String,
    pub default_provider: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub forensics: ForensicsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl AppConfig {
    /// Directory for persisted results; falls back to the platform data dir
    pub fn resolved_data_dir(&self) -> PathBuf {
        match self.data_dir.as_deref() {
            Some(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => dirs::data_local_dir()
                .map(|d| d.join("gradeshield"))
                .unwrap_or_else(|| PathBuf::from("data")),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Closeness of submission and reference perplexities
    #[default]
    Perplexity,
    /// Cosine similarity of TF-IDF vectors
    TfIdf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    /// Inputs shorter than this (chars) are not scored by the model
    pub short_text_min_chars: usize,
    pub short_text_perplexity: f64,
    /// Returned when tokenization or inference fails
    pub error_perplexity: f64,
    /// Returned when no window produced a usable token sequence
    pub empty_windows_perplexity: f64,
    pub window_chars: usize,
    pub window_stride_chars: usize,
    /// Path to a plain-text reference corpus; the bundled corpus is used when unset
    pub reference_corpus_path: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            short_text_min_chars: 10,
            short_text_perplexity: 10_000.0,
            error_perplexity: 3_000.0,
            empty_windows_perplexity: 5_000.0,
            window_chars: 1000,
            window_stride_chars: 750,
            reference_corpus_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForensicsConfig {
    pub metrics: MetricsConfig,
    pub max_perplexity: f64,
    pub perplexity_weight: f64,
    pub burstiness_weight: f64,
    /// (perplexity upper bound, score) pairs, checked in order
    pub perplexity_bands: Vec<(f64, f64)>,
    pub high_confidence_below: f64,
    pub medium_confidence_below: f64,
    pub potential_below: f64,
    pub burstiness_threshold: f64,
    /// `plagiarism_score` above this marks the submission as AI generated
    pub ai_score_threshold: f64,
    /// AI-flagged submissions scoring above this are rejected before grading
    pub reject_score_threshold: f64,
    pub similarity_method: SimilarityMethod,
}

impl Default for ForensicsConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            max_perplexity: 1000.0,
            perplexity_weight: 0.9,
            burstiness_weight: 0.1,
            perplexity_bands: vec![(100.0, 95.0), (200.0, 85.0), (400.0, 70.0)],
            high_confidence_below: 200.0,
            medium_confidence_below: 500.0,
            potential_below: 800.0,
            burstiness_threshold: 0.1,
            ai_score_threshold: 20.0,
            reject_score_threshold: 50.0,
            similarity_method: SimilarityMethod::Perplexity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Adds the file-analysis and solution-generation stages
    pub enhanced: bool,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub search_max_attempts: u32,
    pub search_retry_delay_secs: u64,
    pub search_max_results: usize,
    pub analysis_max_chars: usize,
    pub grading_max_chars: usize,
    pub file_analysis_timeout_secs: u64,
    pub research_timeout_secs: u64,
    pub analysis_timeout_secs: u64,
    pub grading_timeout_secs: u64,
    pub solution_timeout_secs: u64,
    pub grade_placeholder: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enhanced: false,
            max_attempts: 3,
            backoff_base_secs: 1,
            search_max_attempts: 3,
            search_retry_delay_secs: 1,
            search_max_results: 3,
            analysis_max_chars: 8000,
            grading_max_chars: 6000,
            file_analysis_timeout_secs: 60,
            research_timeout_secs: 60,
            analysis_timeout_secs: 120,
            grading_timeout_secs: 90,
            solution_timeout_secs: 90,
            grade_placeholder: "See detailed feedback".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub enabled: bool,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gradeshield"))
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, String> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_file, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }

    fn create_backup(&self) -> Result<(), String> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)?;

        Ok(())
    }

    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), String> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| format!("Failed to read backup dir: {}", e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Get provider API key from config file
    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, String> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    /// Store provider API key in config file
    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }
}
