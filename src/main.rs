//! `civic-agent`: ask questions of municipal datasets from the command line.
//!
//! ```bash
//! export OPENAI_API_KEY="your-api-key"
//! civic-agent --data-dir data ask "How many homicides in 2023?"
//! civic-agent --data-dir data call query_homicides start_year=2023 end_year=2023
//! civic-agent --data-dir data tools
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use civic_agent::prelude::*;
use civic_agent::llm::{summarize_tool, PromptVariant};
use civic_agent::tool::parse_command;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Tool-calling question answering over municipal datasets.
#[derive(Parser, Debug)]
#[command(name = "civic-agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory of JSON dataset files, one domain per file.
    #[arg(short, long, env = "CIVIC_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Maximum tool-calling iterations per question.
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Wall-clock budget per question, in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Model name sent to the chat completions API.
    #[arg(long, env = "CIVIC_MODEL", global = true)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    base_url: Option<String>,

    /// System prompt variant (tool_use, tool_use_reasoned).
    #[arg(long, default_value = "tool_use", global = true)]
    prompt_variant: PromptVariant,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question, letting the model call dataset tools.
    Ask {
        /// The question to answer.
        question: String,

        /// Print the full interaction trace as JSON instead of the answer.
        #[arg(long)]
        trace: bool,
    },

    /// Call one tool directly, bypassing the model.
    #[command(after_help = r#"Examples:
  civic-agent call query_homicides start_year=2023 end_year=2023
  civic-agent call query_homicides '{"group_by": "district", "top_n": 3}'
  civic-agent call get_iucr_info 0110
"#)]
    Call {
        /// Tool name.
        tool: String,

        /// A JSON object, `key=value` pairs, or a single bare value.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List the available tools grouped by dataset.
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match cli.verbose {
            0 => "civic_agent=info",
            1 => "civic_agent=debug",
            _ => "civic_agent=trace",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let registry = Arc::new(build_registry(&cli)?);

    match &cli.command {
        Commands::Ask { question, trace } => ask(&cli, registry, question, *trace).await,
        Commands::Call { tool, args } => call(&registry, tool, args).await,
        Commands::Tools => {
            list_tools(&registry);
            Ok(())
        }
    }
}

fn build_registry(cli: &Cli) -> Result<DomainRegistry> {
    let domains = load_dir(&cli.data_dir)
        .with_context(|| format!("loading datasets from {}", cli.data_dir.display()))?;

    let mut registry = DomainRegistry::new();
    let failures = registry.register_all(domains);
    if !failures.is_empty() {
        warn!(failed = failures.len(), "some datasets were not registered");
    }

    if registry.is_empty() {
        warn!(dir = %cli.data_dir.display(), "no datasets registered");
    } else {
        info!(domains = registry.len(), tools = registry.tool_count(), "registry ready");
    }
    Ok(registry)
}

async fn ask(cli: &Cli, registry: Arc<DomainRegistry>, question: &str, trace: bool) -> Result<()> {
    let mut builder = LLMClientBuilder::new().with_prompt_variant(cli.prompt_variant);
    if let Some(model) = &cli.model {
        builder = builder.with_model(model);
    }
    if let Some(url) = &cli.base_url {
        builder = builder.with_base_url(url);
    }
    let client = builder.build_openai()?;

    let mut config = AgentConfig::builder();
    if let Some(n) = cli.max_iterations {
        config = config.max_iterations(n);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.total_timeout(Duration::from_secs(secs));
    }
    let config = config.from_env().build()?;

    let orchestrator = Orchestrator::new(registry, client, config);
    let outcome = orchestrator.run(question).await;

    if trace {
        println!("{}", serde_json::to_string_pretty(&outcome.trace)?);
    } else {
        println!("{}", outcome.answer);
    }
    Ok(())
}

async fn call(registry: &DomainRegistry, tool: &str, args: &[String]) -> Result<()> {
    let command = parse_command(&format!("{tool} {}", args.join(" ")))?;
    let name = command.tool_name.clone();
    let arguments = command.into_arguments(registry.tool_definition(&name))?;

    let result = registry.dispatch(&name, &arguments).await?;
    println!("{}", registry.format(&result, Some(&name)));
    Ok(())
}

fn list_tools(registry: &DomainRegistry) {
    if registry.is_empty() {
        println!("No tools available.");
        return;
    }

    for registration in registry {
        println!("{}:", registration.id());
        for definition in registration.definitions() {
            println!("{}", summarize_tool(definition));
        }
        println!();
    }
}
