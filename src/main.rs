mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aiq", about = "AI provider usage quota monitor", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and display provider usage
    Usage {
        /// Provider to query (default: all enabled)
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Poll providers continuously and alert on threshold crossings
    Watch {
        /// Override the configured refresh interval (minutes)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Store a credential for a provider
    Login {
        /// Provider ID (claude, codex, openai, gemini)
        provider: String,

        /// Directly-supplied API key (stored in the OS keyring)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Delete the stored credential for a provider
    Logout {
        /// Provider ID
        provider: String,
    },
    /// Re-scan for a freshly-created Claude CLI credential
    Reload,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Enable a provider
    Add {
        /// Provider ID to enable
        provider: String,
    },
    /// Disable a provider
    Remove {
        /// Provider ID to disable
        provider: String,
    },
    /// Set the display/polling order of providers
    Order {
        /// Provider IDs, most important first
        providers: Vec<String>,
    },
    /// Set the auto-refresh interval in minutes
    Interval {
        /// Minutes between polls
        minutes: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let output_opts = cli::output::OutputOptions {
        format: if cli.json {
            cli::output::OutputFormat::Json
        } else {
            match cli.format.as_deref() {
                Some("json") => cli::output::OutputFormat::Json,
                _ => cli::output::OutputFormat::Text,
            }
        },
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color),
        verbose: cli.verbose,
    };

    match cli.command {
        None | Some(Commands::Usage { .. }) => {
            let provider = match cli.command {
                Some(Commands::Usage { provider }) => provider,
                _ => None,
            };
            cli::usage_cmd::run(provider, &output_opts).await?;
        }
        Some(Commands::Watch { interval }) => {
            cli::watch_cmd::run(interval, &output_opts).await?;
        }
        Some(Commands::Login { provider, api_key }) => {
            cli::auth_cmd::login(&provider, api_key, &output_opts).await?;
        }
        Some(Commands::Logout { provider }) => {
            cli::auth_cmd::logout(&provider, &output_opts).await?;
        }
        Some(Commands::Reload) => {
            cli::auth_cmd::reload(&output_opts)?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Add { provider } => cli::config_cmd::add(&provider, &output_opts)?,
            ConfigAction::Remove { provider } => {
                cli::config_cmd::remove(&provider, &output_opts)?
            }
            ConfigAction::Order { providers } => {
                cli::config_cmd::order(&providers, &output_opts)?
            }
            ConfigAction::Interval { minutes } => {
                cli::config_cmd::interval(minutes, &output_opts)?
            }
        },
    }

    Ok(())
}
