//! aihuman - interactive AI human avatar sessions
//!
#![doc = "Main entry point for the aihuman command-line application."]

use anyhow::Result;

use aihuman::cli::{Cli, Commands};
use aihuman::commands;
use aihuman::config::{default_config_path, Config};
use aihuman::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load(&config_path, &cli)?;

    // Initialize tracing once the logging section is known
    init_logging(&config.logging)?;
    tracing::debug!("Configuration loaded from {}", config_path.display());

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Session {
            project,
            published,
            document,
            auth_token,
            no_timers,
        } => {
            tracing::info!("Starting interactive session");
            if no_timers {
                tracing::warn!("Session timers are disabled");
            }
            let args = commands::session::SessionArgs {
                project,
                published,
                document,
                auth_token,
                no_timers,
            };
            commands::session::run_session(config, args).await?;
            Ok(())
        }
        Commands::Save {
            project,
            auth_token,
        } => {
            tracing::info!("Saving project from {}", project.display());
            commands::save::run_save(config, &project, auth_token).await?;
            Ok(())
        }
        Commands::Extract {
            file,
            auth_token,
            output,
        } => {
            tracing::info!("Extracting text from {}", file.display());
            commands::extract::run_extract(config, &file, auth_token, output.as_deref()).await?;
            Ok(())
        }
        Commands::Embed {
            project_name,
            preview,
        } => {
            commands::embed::run_embed(config, &project_name, preview)?;
            Ok(())
        }
        Commands::Serve { bind } => {
            tracing::info!("Starting document proxy");
            commands::serve::run_serve(config, bind).await?;
            Ok(())
        }
        Commands::Login {
            token,
            record,
            clear,
        } => {
            commands::login::run_login(token, record.as_deref(), clear)?;
            Ok(())
        }
    }
}
