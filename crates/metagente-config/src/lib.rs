//! Configuration system for Metagente.
//!
//! Provides TOML-based configuration with:
//! - Named LLM profiles (`[llm]`, `[llm.strong]`, `[llm.local]`, etc.)
//! - Cascading role-to-LLM binding with fallback defaults
//! - Config file layering (user config + project-local overrides)
//! - API key resolution (env var → config file)
//! - Optimizer, dataset, output and transcript settings

pub mod discovery;
pub mod error;
pub mod resolver;
pub mod secrets;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use resolver::{
    ROLES, ResolvedFrom, ResolvedLlm, resolve_all_profiles, resolve_for_role,
    resolve_for_role_with,
};
pub use secrets::{ResolvedSecret, SecretSource};
pub use types::*;
