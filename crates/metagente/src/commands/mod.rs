//! CLI command handlers.

pub mod config;
pub mod evaluate;
pub mod optimize;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use metagente_config::{
    Backend, ConfigError, LoadedConfig, MetagenteConfig, ResolvedLlm, resolve_for_role,
};
use metagente_llm::{OpenAiConfig, create_shared_backend};
use metagente_optimizer::{Generator, RoleGenerators};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// User config directory (config.toml, logs/, transcripts/).
    pub config_dir: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load layered config and surface discovery warnings.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = metagente_config::load_config_with_options(None, self.config_dir.as_deref())?;
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        Ok(loaded)
    }
}

/// Overrides applied to every role's resolved model profile.
#[derive(Debug, Clone, Default)]
pub struct LlmOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Resolve a profile for every role and construct its generator.
pub fn build_generators(
    config: &MetagenteConfig,
    overrides: &LlmOverrides,
) -> Result<RoleGenerators> {
    Ok(RoleGenerators {
        extractor: role_generator(config, "extractor", overrides)?,
        summarizer: role_generator(config, "summarizer", overrides)?,
        teacher: role_generator(config, "teacher", overrides)?,
        combiner: role_generator(config, "combiner", overrides)?,
    })
}

/// Resolve one role's profile with CLI overrides applied.
pub fn resolve_role(
    config: &MetagenteConfig,
    role: &str,
    overrides: &LlmOverrides,
) -> Result<ResolvedLlm> {
    let mut resolved = resolve_for_role(config, role)
        .with_context(|| format!("resolving model profile for {}", role))?;
    if let Some(ref model) = overrides.model {
        resolved.model = model.clone();
    }
    if let Some(ref url) = overrides.base_url {
        resolved.base_url = Some(url.clone());
    }
    Ok(resolved)
}

fn role_generator(
    config: &MetagenteConfig,
    role: &str,
    overrides: &LlmOverrides,
) -> Result<Generator> {
    let resolved = resolve_role(config, role, overrides)?;
    tracing::debug!(
        role,
        backend = %resolved.backend,
        model = %resolved.model,
        from = %resolved.resolved_from,
        "resolved model profile"
    );
    build_generator(&resolved)
}

fn build_generator(resolved: &ResolvedLlm) -> Result<Generator> {
    let mut backend_config = match resolved.backend {
        Backend::Openai => {
            let key = resolved
                .api_key
                .clone()
                .ok_or_else(|| ConfigError::ApiKeyNotFound {
                    backend: resolved.backend.display_name().to_string(),
                    env_var: resolved.backend.env_var().to_string(),
                })?;
            let config = OpenAiConfig::openai(key);
            match resolved.base_url {
                Some(ref url) => config.with_base_url(url),
                None => config,
            }
        }
        Backend::Custom => {
            let url = resolved
                .base_url
                .clone()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "base_url".to_string(),
                    context: "custom backend".to_string(),
                })?;
            OpenAiConfig::custom(url, resolved.api_key.clone())
        }
    };

    if let Some(retries) = resolved.retry_max {
        backend_config = backend_config.with_max_retries(retries);
    }
    if let Some(ms) = resolved.retry_backoff_ms {
        backend_config = backend_config.with_retry_backoff(Duration::from_millis(ms));
    }

    let backend = create_shared_backend(backend_config)?;
    let mut generator =
        Generator::new(backend, resolved.model.clone()).with_max_tokens(resolved.max_tokens);
    if let Some(t) = resolved.temperature {
        generator = generator.with_temperature(t);
    }
    Ok(generator)
}
