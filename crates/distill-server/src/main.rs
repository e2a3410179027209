// crates/distill-server/src/main.rs
// Distill - session-scoped context distiller for coding-assistant hooks

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands, HookAction};
use distill::config::DistillPaths;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(home) = dirs::home_dir() {
        if let Err(e) = dotenvy::from_path(home.join(".distill/.env")) {
            tracing::debug!("Failed to load global .env file: {}", e);
        }
    }
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("Failed to load local .env file: {}", e);
    }

    // Usage errors exit 1 rather than clap's default 2
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print()?;
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    // Hooks stay quiet on stderr; operator commands may narrate
    let log_level = match &cli.command {
        Commands::Hook { .. } | Commands::Annotate { .. } => Level::WARN,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let paths = DistillPaths::resolve();

    match cli.command {
        Commands::Hook { action } => match action {
            HookAction::SessionStart => {
                distill::hooks::run_guarded("SessionStart", distill::hooks::session_start::run())
                    .await;
            }
            HookAction::UserPrompt => {
                distill::hooks::run_guarded("UserPromptSubmit", distill::hooks::user_prompt::run())
                    .await;
            }
            HookAction::PostTool => {
                distill::hooks::run_guarded("PostToolUse", distill::hooks::post_tool::run()).await;
            }
            HookAction::Stop => {
                distill::hooks::run_guarded("Stop", distill::hooks::stop::run()).await;
            }
        },
        Commands::Sessions => {
            cli::run_sessions(&paths).await?;
        }
        Commands::Status { session_id } => {
            cli::run_status(&paths, &session_id).await?;
        }
        Commands::Inspect { session_id, limit } => {
            cli::run_inspect(&paths, &session_id, limit).await?;
        }
        Commands::Search { session_id, query } => {
            cli::run_search(&paths, &session_id, &query).await?;
        }
        Commands::Annotate {
            session_id,
            prompt_index,
        } => {
            cli::run_annotate(&paths, &session_id, prompt_index).await?;
        }
    }

    Ok(())
}
