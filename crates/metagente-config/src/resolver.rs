//! LLM config resolution: turns role bindings into concrete backend configs.
//!
//! Takes a [`MetagenteConfig`] and resolves a fully-qualified [`ResolvedLlm`]
//! for a given role, handling cascading defaults and API key lookup.

use crate::secrets::{self, SecretSource};
use crate::types::defaults;
use crate::{Backend, ConfigError, LlmConfig, MetagenteConfig, Result};

/// Role names that can be bound under `[agent.<role>]`.
pub const ROLES: [&str; 4] = ["extractor", "summarizer", "teacher", "combiner"];

/// A fully resolved LLM configuration ready to construct a backend.
#[derive(Debug, Clone)]
pub struct ResolvedLlm {
    /// The backend provider.
    pub backend: Backend,
    /// Model identifier.
    pub model: String,
    /// API base URL (if custom).
    pub base_url: Option<String>,
    /// Resolved API key.
    pub api_key: Option<String>,
    /// Where the API key was resolved from.
    pub api_key_source: Option<SecretSource>,
    /// How the config was resolved.
    pub resolved_from: ResolvedFrom,
    /// Maximum retry attempts for failed requests.
    pub retry_max: Option<u32>,
    /// Backoff delay between retries in milliseconds.
    pub retry_backoff_ms: Option<u64>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion token cap.
    pub max_tokens: u32,
}

/// Tracks how the LLM config was resolved for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    /// Resolved from role-specific config (`agent.<role>.llm`).
    RoleSpecific { role: String, profile: String },
    /// Resolved from the role default (`agent.default.llm`).
    RoleDefault { profile: String },
    /// Resolved from global default (`[llm]`).
    GlobalDefault,
    /// No `[llm]` section; built-in OpenAI defaults.
    BuiltIn,
}

impl std::fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedFrom::RoleSpecific { role, profile } => {
                write!(f, "agent.{}.llm -> llm.{}", role, profile)
            }
            ResolvedFrom::RoleDefault { profile } => {
                write!(f, "agent.default.llm -> llm.{}", profile)
            }
            ResolvedFrom::GlobalDefault => write!(f, "[llm] (global default)"),
            ResolvedFrom::BuiltIn => write!(f, "built-in default"),
        }
    }
}

/// Resolve the LLM config for a given role.
///
/// 1. Resolve which `LlmConfig` applies (role-specific → agent.default → global → built-in)
/// 2. Validate required fields (backend, model)
/// 3. Resolve API key (env var → config file)
pub fn resolve_for_role(config: &MetagenteConfig, role: &str) -> Result<ResolvedLlm> {
    resolve_for_role_with(config, role, |var| std::env::var(var).ok())
}

/// Same as [`resolve_for_role`] with an injectable environment lookup.
pub fn resolve_for_role_with<F>(config: &MetagenteConfig, role: &str, env: F) -> Result<ResolvedLlm>
where
    F: Fn(&str) -> Option<String>,
{
    let built_in;
    let (llm_config, resolved_from) = match resolve_llm_config(config, role)? {
        Some(found) => found,
        None => {
            built_in = LlmConfig {
                backend: Some(Backend::Openai),
                model: Some(defaults::MODEL.to_string()),
                ..LlmConfig::default()
            };
            (&built_in, ResolvedFrom::BuiltIn)
        }
    };

    let backend = llm_config
        .backend
        .ok_or_else(|| ConfigError::MissingField {
            field: "backend".to_string(),
            context: format!("LLM config (resolved via {})", resolved_from),
        })?;

    let model = llm_config
        .model
        .clone()
        .ok_or_else(|| ConfigError::MissingField {
            field: "model".to_string(),
            context: format!("LLM config (resolved via {})", resolved_from),
        })?;

    if backend == Backend::Custom && llm_config.base_url.is_none() {
        return Err(ConfigError::MissingField {
            field: "base_url".to_string(),
            context: format!("custom backend (resolved via {})", resolved_from),
        });
    }

    let resolved_secret =
        secrets::resolve_api_key_with(&backend, llm_config.api_key.as_deref(), env);

    let (api_key, api_key_source) = match resolved_secret {
        Some(s) => (Some(s.value), Some(s.source)),
        None => (None, None),
    };

    Ok(ResolvedLlm {
        backend,
        model,
        base_url: llm_config.base_url.clone(),
        api_key,
        api_key_source,
        resolved_from,
        retry_max: llm_config.retry_max,
        retry_backoff_ms: llm_config.retry_backoff_ms,
        temperature: llm_config.temperature,
        max_tokens: llm_config.max_tokens.unwrap_or(defaults::MAX_TOKENS),
    })
}

/// Resolve all named LLM configs into a summary for diagnostics.
pub fn resolve_all_profiles(config: &MetagenteConfig) -> Vec<(String, Backend, String)> {
    let mut profiles = Vec::new();

    if let Some(ref llm) = config.llm
        && let (Some(backend), Some(model)) = (llm.backend, &llm.model)
    {
        profiles.push(("default".to_string(), backend, model.clone()));
    }

    for (name, llm) in &config.llm_profiles {
        if let (Some(backend), Some(model)) = (llm.backend, &llm.model) {
            profiles.push((name.clone(), backend, model.clone()));
        }
    }

    profiles.sort_by(|a, b| a.0.cmp(&b.0));
    profiles
}

/// Inner resolution that returns both the config ref and how it was resolved.
/// `None` means nothing is configured and the built-in default applies.
fn resolve_llm_config<'a>(
    config: &'a MetagenteConfig,
    role: &str,
) -> Result<Option<(&'a LlmConfig, ResolvedFrom)>> {
    // 1. Role-specific
    if let Some(role_cfg) = config.agent.get(role)
        && let Some(ref llm_name) = role_cfg.llm
    {
        let llm = lookup_profile(config, llm_name, &format!("agent.{}", role))?;
        return Ok(Some((
            llm,
            ResolvedFrom::RoleSpecific {
                role: role.to_string(),
                profile: llm_name.clone(),
            },
        )));
    }

    // 2. Role default
    if let Some(default_cfg) = config.agent.get("default")
        && let Some(ref llm_name) = default_cfg.llm
    {
        let llm = lookup_profile(config, llm_name, "agent.default")?;
        return Ok(Some((
            llm,
            ResolvedFrom::RoleDefault {
                profile: llm_name.clone(),
            },
        )));
    }

    // 3. Global default
    Ok(config.llm.as_ref().map(|llm| (llm, ResolvedFrom::GlobalDefault)))
}

/// `llm = "default"` refers to the bare `[llm]` section.
fn lookup_profile<'a>(
    config: &'a MetagenteConfig,
    name: &str,
    context: &str,
) -> Result<&'a LlmConfig> {
    let found = if name == "default" {
        config.llm.as_ref()
    } else {
        config.llm_profiles.get(name)
    };
    found.ok_or_else(|| ConfigError::LlmNotFound {
        name: name.to_string(),
        context: context.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
