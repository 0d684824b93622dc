//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use galgo_core::config;
use galgo_core::gateway::{GatewayConfig, RemoteGateway};
use galgo_core::lifecycle::SessionLifecycleManager;
use galgo_core::mirror::FileMirror;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "galgo")]
#[command(version = "0.1")]
#[command(about = "Campus assistant chat client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Email that owns the sessions (overrides config)
    #[arg(long, env = "GALGO_EMAIL", value_name = "EMAIL")]
    email: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage saved sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Start a new session
    New,
    /// Send a message (to the most recent session unless --session is given)
    Send {
        /// The message to send
        #[arg(value_name = "TEXT")]
        text: String,

        /// Append to this session instead of the most recent one
        #[arg(long, value_name = "SESSION_ID")]
        session: Option<String>,
    },
    /// Rename a session
    Rename {
        /// The ID of the session to rename
        #[arg(value_name = "SESSION_ID")]
        id: String,
        /// New title for the session
        #[arg(value_name = "TITLE")]
        title: String,
    },
    /// Delete a session and its stored history
    Delete {
        /// The ID of the session to delete
        #[arg(value_name = "SESSION_ID")]
        id: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Lists sessions, newest first
    List {
        /// Keep only sessions whose title matches (case-insensitive)
        #[arg(long, value_name = "TERM")]
        search: Option<String>,
    },
    /// Shows a session transcript
    Show {
        /// The ID of the session to show
        #[arg(value_name = "SESSION_ID")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let filter = EnvFilter::try_from_env("GALGO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

/// Builds a signed-in lifecycle manager for the resolved user.
async fn connect(config: &config::Config, email: Option<&str>) -> Result<SessionLifecycleManager> {
    let email = config.resolve_email(email)?;
    let gateway = RemoteGateway::new(GatewayConfig::from_config(config)?);
    let mut manager = SessionLifecycleManager::new(gateway, email)
        .with_mirror(Box::new(FileMirror::new(config::paths::mirror_dir())));
    manager.sign_in().await;
    Ok(manager)
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;
    let Cli { command, email } = cli;

    match command {
        Commands::Sessions { command } => {
            let mut manager = connect(&config, email.as_deref()).await?;
            match command {
                SessionCommands::List { search } => {
                    commands::sessions::list(&manager, search.as_deref())
                }
                SessionCommands::Show { id } => commands::sessions::show(&mut manager, &id),
            }
        }

        Commands::New => {
            let mut manager = connect(&config, email.as_deref()).await?;
            commands::chat::new(&mut manager).await
        }

        Commands::Send { text, session } => {
            let mut manager = connect(&config, email.as_deref()).await?;
            commands::chat::send(&mut manager, &text, session.as_deref()).await
        }

        Commands::Rename { id, title } => {
            let mut manager = connect(&config, email.as_deref()).await?;
            commands::chat::rename(&mut manager, &id, &title).await
        }

        Commands::Delete { id } => {
            let mut manager = connect(&config, email.as_deref()).await?;
            commands::chat::delete(&mut manager, &id).await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
