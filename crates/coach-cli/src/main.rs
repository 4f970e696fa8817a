mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "coach",
    about = "Startup coaching assistant: streaming chat server and offline prompt tools",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "COACH_CONFIG", default_value = "coach.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "3000")]
        port: u16,
        /// Postgres connection string (default: the variable named by `database_url_env`)
        #[arg(long)]
        database_url: Option<String>,
        /// Keep everything in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },

    /// Print the system prompt assembled for a memory file
    Prompt {
        /// JSON file holding the project memory
        #[arg(long)]
        memory: PathBuf,
        /// Workflow stage to render the directive for
        #[arg(long, default_value = "intent_understanding")]
        stage: String,
        /// Response language (e.g. fr)
        #[arg(long)]
        locale: Option<String>,
    },

    /// Print the stage that follows <STAGE>, or `none`
    NextStage {
        stage: String,
        /// The user asked a generic question
        #[arg(long)]
        generic: bool,
        /// The project is already described
        #[arg(long)]
        has_description: bool,
        /// Known project phase
        #[arg(long)]
        phase: Option<String>,
        /// The user declined guidance
        #[arg(long)]
        no_guidance: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve {
            port,
            database_url,
            in_memory,
        } => cmd::serve::run(&cli.config, port, database_url, in_memory),
        Commands::Prompt {
            memory,
            stage,
            locale,
        } => cmd::prompt::run(&cli.config, &memory, &stage, locale.as_deref()),
        Commands::NextStage {
            stage,
            generic,
            has_description,
            phase,
            no_guidance,
        } => cmd::next_stage::run(cmd::next_stage::Flags {
            stage,
            generic,
            has_description,
            phase,
            no_guidance,
        }),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
