//! tunemirror - Live-synchronized music library client

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunemirror::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tunemirror=debug,reqwest=debug"
    } else {
        "tunemirror=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let Some(command) = cli.command else {
        <Cli as CommandFactory>::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Auth {
            url,
            login,
            password,
            force,
        } => {
            cli::commands::auth(url, login, password, force).await?;
        }
        Commands::Logout => {
            cli::commands::logout().await?;
        }
        Commands::Watch { takeover } => {
            cli::commands::watch(takeover).await?;
        }
        Commands::Playlists { tracks } => {
            cli::commands::playlists(tracks).await?;
        }
        Commands::Upload { files } => {
            cli::commands::upload(files).await?;
        }
        Commands::Account { action } => {
            cli::commands::account(action).await?;
        }
        Commands::Admin { action } => {
            cli::commands::admin(action).await?;
        }
        Commands::Completion { shell } => {
            cli::commands::completion(shell);
        }
    }

    Ok(())
}
