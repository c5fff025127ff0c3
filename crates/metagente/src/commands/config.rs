//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};

use metagente_config::{ROLES, SecretSource};

use super::{Context, LlmOverrides, resolve_role};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved settings and the profile each role resolves to
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./metagente.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(ctx, local),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    println!("# Metagente Configuration\n");

    // Sources
    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    // LLM profiles
    let profiles = metagente_config::resolve_all_profiles(config);
    if profiles.is_empty() {
        println!("No LLM profiles configured\n");
    } else {
        println!("LLM Profiles:");
        for (name, backend, model) in &profiles {
            println!("  {:<12} {} / {}", name, backend, model);
        }
        println!();
    }

    // Role resolution
    println!("Roles:");
    for role in ROLES {
        match resolve_role(config, role, &LlmOverrides::default()) {
            Ok(resolved) => {
                let key = match resolved.api_key_source {
                    Some(SecretSource::EnvVar(ref var)) => format!("(key: env {})", var),
                    Some(SecretSource::ConfigFile) => "(key: config file)".to_string(),
                    None => "(no key)".to_string(),
                };
                println!(
                    "  {:<12} {} / {}  {}  [{}]",
                    role, resolved.backend, resolved.model, key, resolved.resolved_from
                );
            }
            Err(e) => println!("  {:<12} error: {:#}", role, e),
        }
    }
    println!();

    // Optimizer
    let optimizer = config.optimizer();
    println!("Optimizer:");
    println!("  threshold:   {}", optimizer.threshold);
    println!("  max_turns:   {}", optimizer.max_turns);
    println!("  concurrency: {}", optimizer.concurrency);
    if optimizer.seed_instruction.is_some() {
        println!("  seed:        (custom)");
    }
    println!();

    // Dataset and output
    if let Some(ref dataset) = config.dataset {
        println!("Dataset:");
        if let Some(ref train) = dataset.train {
            println!("  train: {}", train.display());
        }
        if let Some(ref test) = dataset.test {
            println!("  test:  {}", test.display());
        }
        println!();
    }

    let output = config.output();
    println!("Output:");
    println!("  results:           {}", output.results_path().display());
    println!("  winners:           {}", output.winners_path().display());
    println!(
        "  final instruction: {}",
        output.final_instruction_path().display()
    );
    println!();

    let transcripts = config.transcripts();
    if transcripts.enabled {
        println!("Transcripts:");
        match transcripts.path {
            Some(ref path) => println!("  path: {}", path.display()),
            None => println!("  path: <config dir>/transcripts"),
        }
        println!("  retention_days: {}", transcripts.retention_days);
        println!();
    }

    // Warnings
    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'metagente config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"# Metagente Configuration

# Default model profile
[llm]
backend = "openai"
model = "gpt-4o-mini"
retry_max = 3
retry_backoff_ms = 500

# Named profiles (uncomment to use)
# [llm.strong]
# backend = "openai"
# model = "gpt-4o"

# [llm.local]
# backend = "custom"
# model = "llama3.2"
# base_url = "http://localhost:11434/v1"

# Role bindings (uncomment to use)
# [agent.teacher]
# llm = "strong"

[optimizer]
threshold = 0.7
max_turns = 45
concurrency = 1

# [dataset]
# train = "data/train.csv"
# test = "data/test.csv"

[output]
dir = "results"

# [logging.transcripts]
# enabled = true
# retention_days = 30
"#;

fn cmd_init(ctx: &Context, local: bool) -> Result<()> {
    let path = if local {
        std::path::PathBuf::from("metagente.toml")
    } else {
        let dir = ctx
            .config_dir
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        std::fs::create_dir_all(&dir)?;
        dir.join("config.toml")
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    std::fs::write(&path, CONFIG_TEMPLATE)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  export OPENAI_API_KEY=...      # API key for the openai backend");
    println!("  metagente config show          # verify configuration");

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    match ctx.config_dir {
        Some(ref dir) => println!("{}", dir.join("config.toml").display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}
