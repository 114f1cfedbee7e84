//! auth-session - log in to a password-grant server and call protected endpoints.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use session_config_and_utils::{init_logging, Config, Paths};

/// Auth session command-line interface.
#[derive(Parser)]
#[command(name = "auth-session")]
#[command(about = "Persistent OAuth password-grant session for the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and session state. Defaults to ~/.auth-session
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange a username and password for a session
    Login {
        #[arg(short, long)]
        user: String,

        #[arg(short, long, env = "AUTH_SESSION_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show whether a session is held
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Renew the held credential now
    Refresh,
    /// End the session
    Logout,
    /// GET a path on the host with the session credential
    Get {
        /// Path relative to the configured host, e.g. /api/me
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));
    let client = commands::SessionClient::open(&config, &paths)?;

    match cli.command {
        Commands::Login { user, password } => client.login(user, password).await,
        Commands::Status { json } => client.status(json),
        Commands::Refresh => client.refresh().await,
        Commands::Logout => client.logout().await,
        Commands::Get { path } => client.get(&path).await,
    }
}
