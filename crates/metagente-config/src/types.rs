//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [llm]                    # default model profile
//! [llm.strong]             # named profiles
//! [agent.default]          # default role binding
//! [agent.teacher]          # per-role overrides
//! [optimizer]              # refinement loop settings
//! [dataset]                # input CSV paths
//! [output]                 # artifact paths
//! [logging.transcripts]    # per-turn JSONL transcript
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Built-in defaults shared by the config layer and the CLI.
pub mod defaults {
    /// Minimum ROUGE-L for an instruction to count as a winner.
    pub const THRESHOLD: f64 = 0.7;
    /// Refinement cycles per example.
    pub const MAX_TURNS: u32 = 45;
    /// Examples processed at once.
    pub const CONCURRENCY: usize = 1;
    /// Default model for every role.
    pub const MODEL: &str = "gpt-4o-mini";
    /// Completion token cap per call.
    pub const MAX_TOKENS: u32 = 1024;
    /// Artifact directory.
    pub const OUTPUT_DIR: &str = "results";
    /// Results table filename.
    pub const RESULTS_FILE: &str = "results.csv";
    /// Winner list filename.
    pub const WINNERS_FILE: &str = "best_prompts.txt";
    /// Combined instruction filename.
    pub const FINAL_INSTRUCTION_FILE: &str = "optimized_prompt.txt";
    /// Days a transcript file is kept.
    pub const TRANSCRIPT_RETENTION_DAYS: u32 = 30;
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetagenteConfig {
    /// Default LLM configuration (the bare `[llm]` section).
    pub llm: Option<LlmConfig>,

    /// Named LLM configurations (`[llm.strong]`, `[llm.local]`, etc.).
    #[serde(default, rename = "llm_profiles")]
    pub llm_profiles: HashMap<String, LlmConfig>,

    /// Role bindings (`[agent.teacher]`, `[agent.default]`).
    #[serde(default)]
    pub agent: HashMap<String, AgentConfig>,

    /// Refinement loop settings.
    pub optimizer: Option<OptimizerConfig>,

    /// Dataset locations.
    pub dataset: Option<DatasetConfig>,

    /// Artifact locations.
    pub output: Option<OutputConfig>,

    /// Logging settings.
    pub logging: Option<LoggingConfig>,
}

impl MetagenteConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        // Parse into the raw layout first to handle the llm table split
        let raw: RawConfig = toml::from_str(toml_str)?;
        Ok(raw.into())
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        let raw: RawConfig = self.clone().into();
        Ok(toml::to_string_pretty(&raw)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: MetagenteConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }

        for (name, config) in other.llm_profiles {
            self.llm_profiles.insert(name, config);
        }

        for (name, config) in other.agent {
            self.agent.insert(name, config);
        }

        if other.optimizer.is_some() {
            self.optimizer = other.optimizer;
        }

        if other.dataset.is_some() {
            self.dataset = other.dataset;
        }

        if other.output.is_some() {
            self.output = other.output;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Optimizer settings, falling back to defaults.
    pub fn optimizer(&self) -> OptimizerConfig {
        self.optimizer.clone().unwrap_or_default()
    }

    /// Output settings, falling back to defaults.
    pub fn output(&self) -> OutputConfig {
        self.output.clone().unwrap_or_default()
    }

    /// Transcript log settings, falling back to defaults.
    pub fn transcripts(&self) -> TranscriptLogConfig {
        self.logging
            .as_ref()
            .map(|l| l.transcripts.clone())
            .unwrap_or_default()
    }

    /// Get all defined LLM config names (including "default" for the bare [llm]).
    pub fn llm_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.llm.is_some() {
            names.push("default".to_string());
        }
        names.extend(self.llm_profiles.keys().cloned());
        names.sort();
        names
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw TOML structure (for serde)
// ─────────────────────────────────────────────────────────────────────────────

/// Internal raw config matching the actual TOML layout.
///
/// In TOML, `[llm]` and `[llm.strong]` coexist as a table with both
/// direct keys and sub-tables. This struct handles that mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    llm: Option<RawLlmSection>,
    #[serde(default)]
    agent: HashMap<String, AgentConfig>,
    optimizer: Option<OptimizerConfig>,
    dataset: Option<DatasetConfig>,
    output: Option<OutputConfig>,
    logging: Option<LoggingConfig>,
}

/// The `[llm]` section which can contain both direct fields and named sub-tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawLlmSection {
    backend: Option<Backend>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    retry_max: Option<u32>,
    retry_backoff_ms: Option<u64>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,

    /// Named profiles are captured via flatten.
    #[serde(flatten)]
    profiles: HashMap<String, LlmConfig>,
}

impl From<RawConfig> for MetagenteConfig {
    fn from(raw: RawConfig) -> Self {
        let (llm, llm_profiles) = match raw.llm {
            Some(section) => {
                let default = if section.backend.is_some() || section.model.is_some() {
                    Some(LlmConfig {
                        backend: section.backend,
                        model: section.model,
                        base_url: section.base_url,
                        api_key: section.api_key,
                        retry_max: section.retry_max,
                        retry_backoff_ms: section.retry_backoff_ms,
                        temperature: section.temperature,
                        max_tokens: section.max_tokens,
                    })
                } else {
                    None
                };
                (default, section.profiles)
            }
            None => (None, HashMap::new()),
        };

        MetagenteConfig {
            llm,
            llm_profiles,
            agent: raw.agent,
            optimizer: raw.optimizer,
            dataset: raw.dataset,
            output: raw.output,
            logging: raw.logging,
        }
    }
}

impl From<MetagenteConfig> for RawConfig {
    fn from(config: MetagenteConfig) -> Self {
        let llm = if config.llm.is_some() || !config.llm_profiles.is_empty() {
            let default = config.llm.unwrap_or_default();
            Some(RawLlmSection {
                backend: default.backend,
                model: default.model,
                base_url: default.base_url,
                api_key: default.api_key,
                retry_max: default.retry_max,
                retry_backoff_ms: default.retry_backoff_ms,
                temperature: default.temperature,
                max_tokens: default.max_tokens,
                profiles: config.llm_profiles,
            })
        } else {
            None
        };

        RawConfig {
            llm,
            agent: config.agent,
            optimizer: config.optimizer,
            dataset: config.dataset,
            output: config.output,
            logging: config.logging,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for an LLM profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend provider.
    pub backend: Option<Backend>,
    /// Model identifier.
    pub model: Option<String>,
    /// Custom API base URL (for proxies, self-hosted endpoints).
    pub base_url: Option<String>,
    /// API key (prefer the env var; warns if set here).
    pub api_key: Option<String>,
    /// Maximum retry attempts for failed requests.
    pub retry_max: Option<u32>,
    /// Backoff delay between retries in milliseconds.
    pub retry_backoff_ms: Option<u64>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Get the environment variable name for this backend's API key.
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.env_var())
    }
}

/// Supported LLM backends. Both speak the OpenAI chat-completions format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Openai,
    Custom,
}

impl Backend {
    /// Environment variable name for this backend's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::Openai => "OPENAI_API_KEY",
            Backend::Custom => "LLM_API_KEY",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Openai => "OpenAI",
            Backend::Custom => "Custom",
        }
    }

    /// Parse a backend from its config/CLI spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Backend::Openai),
            "custom" => Some(Backend::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role Binding
// ─────────────────────────────────────────────────────────────────────────────

/// Per-role configuration (`[agent.<role>]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name of the LLM profile to use (references a key in `llm_profiles`).
    pub llm: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Optimizer
// ─────────────────────────────────────────────────────────────────────────────

/// Refinement loop settings (`[optimizer]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Minimum ROUGE-L for a winner.
    pub threshold: f64,
    /// Refinement cycles per example.
    pub max_turns: u32,
    /// Examples processed at once.
    pub concurrency: usize,
    /// Replaces the built-in initial summarizer instruction.
    pub seed_instruction: Option<String>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::THRESHOLD,
            max_turns: defaults::MAX_TURNS,
            concurrency: defaults::CONCURRENCY,
            seed_instruction: None,
        }
    }
}

impl OptimizerConfig {
    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "optimizer.threshold".to_string(),
                reason: format!("{} is outside [0, 1]", self.threshold),
            });
        }
        if self.max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "optimizer.max_turns".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "optimizer.concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dataset / Output
// ─────────────────────────────────────────────────────────────────────────────

/// Dataset locations (`[dataset]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Training CSV used by `optimize`.
    pub train: Option<PathBuf>,
    /// Held-out CSV used by `evaluate`.
    pub test: Option<PathBuf>,
}

/// Artifact locations (`[output]`). File names are relative to `dir`
/// unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub results: PathBuf,
    pub winners: PathBuf,
    pub final_instruction: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::OUTPUT_DIR),
            results: PathBuf::from(defaults::RESULTS_FILE),
            winners: PathBuf::from(defaults::WINNERS_FILE),
            final_instruction: PathBuf::from(defaults::FINAL_INSTRUCTION_FILE),
        }
    }
}

impl OutputConfig {
    pub fn results_path(&self) -> PathBuf {
        self.dir.join(&self.results)
    }

    pub fn winners_path(&self) -> PathBuf {
        self.dir.join(&self.winners)
    }

    pub fn final_instruction_path(&self) -> PathBuf {
        self.dir.join(&self.final_instruction)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Per-turn transcript settings.
    pub transcripts: TranscriptLogConfig,
}

/// Settings for the per-turn JSONL transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptLogConfig {
    /// Whether transcripts are written.
    pub enabled: bool,
    /// Directory for JSONL files (defaults to `<config dir>/transcripts`).
    pub path: Option<PathBuf>,
    /// Days to retain transcript files before cleanup.
    pub retention_days: u32,
}

impl Default for TranscriptLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            retention_days: defaults::TRANSCRIPT_RETENTION_DAYS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = MetagenteConfig::from_toml("").unwrap();
        assert!(config.llm.is_none());
        assert!(config.llm_profiles.is_empty());
        assert_eq!(config.optimizer().max_turns, 45);
        assert!((config.optimizer().threshold - 0.7).abs() < f64::EPSILON);
        assert!(!config.transcripts().enabled);
    }

    #[test]
    fn test_llm_section_split() {
        let config = MetagenteConfig::from_toml(
            r#"
[llm]
backend = "openai"
model = "gpt-4o-mini"
temperature = 0.0

[llm.strong]
backend = "openai"
model = "gpt-4o"

[llm.local]
backend = "custom"
model = "qwen2.5"
base_url = "http://localhost:8000/v1"
"#,
        )
        .unwrap();

        let llm = config.llm.as_ref().unwrap();
        assert_eq!(llm.backend, Some(Backend::Openai));
        assert_eq!(llm.temperature, Some(0.0));
        assert_eq!(config.llm_profiles.len(), 2);
        assert_eq!(
            config.llm_profiles["local"].base_url.as_deref(),
            Some("http://localhost:8000/v1")
        );
        assert_eq!(config.llm_names(), vec!["default", "local", "strong"]);
    }

    #[test]
    fn test_profiles_without_default() {
        let config = MetagenteConfig::from_toml(
            r#"
[llm.strong]
backend = "openai"
model = "gpt-4o"
"#,
        )
        .unwrap();
        assert!(config.llm.is_none());
        assert!(config.llm_profiles.contains_key("strong"));
    }

    #[test]
    fn test_full_sections() {
        let config = MetagenteConfig::from_toml(
            r#"
[agent.teacher]
llm = "strong"

[optimizer]
threshold = 0.8
max_turns = 10
concurrency = 4

[dataset]
train = "data/train.csv"

[output]
dir = "out"

[logging.transcripts]
enabled = true
retention_days = 7
"#,
        )
        .unwrap();

        assert_eq!(config.agent["teacher"].llm.as_deref(), Some("strong"));
        let optimizer = config.optimizer();
        assert_eq!(optimizer.max_turns, 10);
        assert_eq!(optimizer.concurrency, 4);
        assert_eq!(
            config.dataset.as_ref().unwrap().train,
            Some(PathBuf::from("data/train.csv"))
        );
        let output = config.output();
        assert_eq!(output.results_path(), PathBuf::from("out/results.csv"));
        assert_eq!(output.winners_path(), PathBuf::from("out/best_prompts.txt"));
        let transcripts = config.transcripts();
        assert!(transcripts.enabled);
        assert_eq!(transcripts.retention_days, 7);
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = MetagenteConfig::from_toml(
            r#"
[llm]
backend = "openai"
model = "base"

[llm.strong]
backend = "openai"
model = "gpt-4o"

[optimizer]
max_turns = 5
"#,
        )
        .unwrap();
        let overlay = MetagenteConfig::from_toml(
            r#"
[llm]
backend = "custom"
model = "local"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.llm.as_ref().unwrap().backend, Some(Backend::Custom));
        assert!(base.llm_profiles.contains_key("strong"));
        assert_eq!(base.optimizer().max_turns, 5);
    }

    #[test]
    fn test_toml_roundtrip_keeps_profiles() {
        let config = MetagenteConfig::from_toml(
            r#"
[llm]
backend = "openai"
model = "gpt-4o-mini"

[llm.strong]
backend = "openai"
model = "gpt-4o"
"#,
        )
        .unwrap();

        let text = config.to_toml().unwrap();
        let parsed = MetagenteConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.llm.unwrap().model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(
            parsed.llm_profiles["strong"].model.as_deref(),
            Some("gpt-4o")
        );
    }

    #[test]
    fn test_optimizer_validation() {
        assert!(OptimizerConfig::default().validate().is_ok());

        let bad = OptimizerConfig {
            threshold: 1.5,
            ..OptimizerConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "optimizer.threshold"
        ));

        let bad = OptimizerConfig {
            max_turns: 0,
            ..OptimizerConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = OptimizerConfig {
            concurrency: 0,
            ..OptimizerConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_backend_parse_and_env() {
        assert_eq!(Backend::parse("OpenAI"), Some(Backend::Openai));
        assert_eq!(Backend::parse("custom"), Some(Backend::Custom));
        assert_eq!(Backend::parse("anthropic"), None);
        assert_eq!(Backend::Openai.env_var(), "OPENAI_API_KEY");
        assert_eq!(Backend::Custom.to_string(), "Custom");
    }
}
