#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_wraps
)]

use std::io::Write;
use std::sync::Arc;

use agent_router::config::RouteConfig;
use agent_router::memory::{create_memory, effective_memory_backend_name};
use agent_router::providers::{create_registry, list_providers, Provider};
use agent_router::routing::AgentName;
use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Multi-agent Telegram webhook router.
#[derive(Parser, Debug)]
#[command(name = "agent-router")]
#[command(version)]
#[command(about = "Route Telegram bot webhooks to per-agent LLM providers.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server
    #[command(long_about = "\
Start the webhook server.

Serves POST {prefix}/{agent} for every agent with a configured bot token \
and GET /telegram/healthz. Configuration is read from the environment \
(and a .env file in the working directory, if present).

Examples:
  agent-router serve
  agent-router serve --port 9000
  agent-router serve --host 127.0.0.1")]
    Serve {
        /// Port to listen on (defaults to TELEGRAM_ROUTER_PORT, PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to TELEGRAM_ROUTER_HOST, then 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show the resolved configuration with secrets redacted
    #[command(long_about = "\
Show the resolved configuration with secrets redacted.

Examples:
  agent-router status
  agent-router status --agent claude --agent gemini")]
    Status {
        /// Agents to describe (repeatable)
        #[arg(short, long = "agent")]
        agents: Vec<String>,
    },

    /// List supported providers and the agent names routed to them
    Providers,

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `agent-router`.

Examples:
  source <(agent-router completions bash)
  agent-router completions zsh > ~/.zfunc/_agent-router")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Completions must stay stdout-only: no env loading, no logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // A missing .env is normal in production.
    let _ = dotenvy::dotenv();

    init_logging();

    let config = RouteConfig::from_process_env();

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.port);
            let host = host.unwrap_or_else(|| config.host.clone());
            if port == 0 {
                bail!("--port must be greater than zero");
            }
            info!("Starting agent-router on {host}:{port}");
            agent_router::run_gateway(Arc::new(config), &host, port).await
        }

        Commands::Status { agents } => print_status(&config, &agents),

        Commands::Providers => {
            let providers = list_providers();
            println!("Supported providers ({} total):\n", providers.len());
            println!("  NAME         DISPLAY NAME   ALIASES");
            println!("  ----------   ------------   -------");
            for p in &providers {
                let aliases = if p.aliases.is_empty() {
                    String::new()
                } else {
                    p.aliases.join(", ")
                };
                println!("  {:<12} {:<14} {}", p.name, p.display_name, aliases);
            }
            println!("\n  Agents with no matching provider use openai.");
            Ok(())
        }
    }
}

/// Respects RUST_LOG (default info); ROUTER_LOG_FORMAT=json switches formatter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ROUTER_LOG_FORMAT").is_ok_and(|v| v.trim().eq_ignore_ascii_case("json"));

    if json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    } else {
        let subscriber = fmt::Subscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    }
}

fn print_status(config: &RouteConfig, agents: &[String]) -> Result<()> {
    let memory = create_memory(config);
    let registry = create_registry(config)?;
    let bridge = config.bridge();

    println!("agent-router status\n");
    println!("  Listen:          {}:{}", config.host, config.port);
    println!("  Webhook route:   {}", config.webhook_route_label());
    println!(
        "  Webhook secret:  {}",
        if config.require_webhook_secret {
            "required"
        } else {
            "optional"
        }
    );
    println!("  Allowed users:   {}", id_list(&config.allowed_user_ids));
    println!("  Allowed chats:   {}", id_list(&config.allowed_chat_ids));
    println!("  Memory:          {}", effective_memory_backend_name(&memory));
    println!("  History cap:     {}", config.max_conversation_messages);
    println!(
        "  Bridge:          {}",
        match &bridge.api_key {
            Some(key) => format!("{} ({}) key {}", bridge.model, bridge.base_url, redact(key)),
            None => "disabled".to_string(),
        }
    );
    println!("  Dead letters:    {}", config.dead_letter_path.display());

    for raw in agents {
        let Some(agent) = AgentName::parse(raw) else {
            bail!("agent names cannot be empty");
        };
        let model = config.agent_model_config(&agent);
        println!("\n  [{agent}]");
        println!("    Bot token:     {}", redact(&config.agent_token(&agent)));
        println!("    Secret:        {}", redact(&config.webhook_secret(&agent)));
        println!("    Username:      {}", or_unset(&config.bot_username(&agent)));
        println!("    Provider:      {}", registry.resolve(&agent).name());
        println!(
            "    Model:         {}",
            model.model.as_deref().unwrap_or("(provider default)")
        );
        println!(
            "    API key:       {}",
            model.api_key.as_deref().map_or_else(|| "(provider default)".to_string(), redact)
        );
    }
    Ok(())
}

/// Mask a secret for display. Short values are hidden entirely.
fn redact(secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    if secret.chars().count() <= 8 {
        return "***".to_string();
    }
    let head: String = secret.chars().take(4).collect();
    format!("{head}***")
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}

fn id_list(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "any".to_string();
    }
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
