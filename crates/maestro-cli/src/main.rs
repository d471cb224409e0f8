//! Maestro CLI — run agent workflow patterns from the command line.
//!
//! Builds on maestro-core: YAML workflow definitions are executed through
//! the same `WorkflowEngine` that library callers use.

mod commands;

use clap::{Parser, Subcommand};

/// Maestro — composable multi-agent workflows
#[derive(Parser)]
#[command(name = "maestro", version, about = "Maestro — composable multi-agent workflows")]
pub struct Cli {
    /// Path to an engine configuration YAML file
    #[arg(long, env = "MAESTRO_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow definition
    Run {
        /// Path to the workflow YAML file
        file: String,
        /// Input text; overrides the definition's `input`
        #[arg(long, short = 'i')]
        input: Option<String>,
        /// Use an in-memory echo invoker instead of calling providers
        #[arg(long)]
        dry_run: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
        /// Directory of agent definitions (JSON or YAML)
        #[arg(long)]
        agents_dir: Option<String>,
    },

    /// Check a workflow definition without running it
    Validate {
        /// Path to the workflow YAML file
        file: String,
    },

    /// List registered agents
    Agents {
        /// Directory of agent definitions (JSON or YAML)
        #[arg(long)]
        agents_dir: Option<String>,
    },

    /// Send one message to one agent
    Ask {
        /// Target agent id
        #[arg(long)]
        target: String,
        /// Message to send
        #[arg(long, short = 'm')]
        message: String,
        /// Directory of agent definitions (JSON or YAML)
        #[arg(long)]
        agents_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maestro_core=info,maestro_cli=info".into()),
        )
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run {
            file,
            input,
            dry_run,
            json,
            agents_dir,
        } => {
            commands::workflow::run(
                config,
                &file,
                input.as_deref(),
                dry_run,
                json,
                agents_dir.as_deref(),
            )
            .await
        }
        Commands::Validate { file } => commands::workflow::validate(config, &file),
        Commands::Agents { agents_dir } => commands::agents::list(config, agents_dir.as_deref()),
        Commands::Ask {
            target,
            message,
            agents_dir,
        } => commands::ask::run(config, &target, &message, agents_dir.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
