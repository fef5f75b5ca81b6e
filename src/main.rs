//! LevelUp - Main Server
//!
//! Modernize legacy C++ code with zero regression risk.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use levelup::engine::ModProcessor;
use levelup::model::{CancelFlag, ModRequest};
use levelup::mods::mod_from_id;
use levelup::repo::worktree::repo_name_from_url;
use levelup::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "levelup")]
#[command(about = "Assembly-validated modernization of legacy C++ repositories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and background worker
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Process a single mod request without the HTTP layer
    Process {
        /// Git URL of the repository to modernize
        #[arg(long)]
        repo_url: String,

        /// Builtin mod id to run (e.g. add_override, remove_inline)
        #[arg(long, conflicts_with = "commit")]
        mod_id: Option<String>,

        /// Commit hash to cherry-pick and validate instead of a builtin mod
        #[arg(long)]
        commit: Option<String>,

        /// Free-form description recorded in the result
        #[arg(long, default_value = "one-shot request")]
        description: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,levelup=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            levelup::start_server(config).await
        }
        Commands::Process {
            repo_url,
            mod_id,
            commit,
            description,
        } => run_one_shot(config, &repo_url, mod_id.as_deref(), commit.as_deref(), &description),
    }
}

/// Run a single request synchronously and print the result as JSON.
fn run_one_shot(
    config: Config,
    repo_url: &str,
    mod_id: Option<&str>,
    commit: Option<&str>,
    description: &str,
) -> Result<()> {
    let repo_name = repo_name_from_url(repo_url);
    let request = match (mod_id, commit) {
        (Some(id), None) => {
            ModRequest::builtin(repo_url, &repo_name, description, mod_from_id(id)?)
        }
        (None, Some(hash)) => ModRequest::commit(repo_url, &repo_name, description, hash),
        _ => bail!("exactly one of --mod-id or --commit is required"),
    };

    std::fs::create_dir_all(config.repos_dir())?;
    let compiler = levelup::compiler::compiler_from_id(
        &config.compiler,
        &config.msvc_path,
        &config.clang_path,
    )?;
    let processor = ModProcessor::new(
        &config.workspace(),
        &config.git_path,
        &config.doxygen_path,
        compiler,
    );

    let result = processor.process_request(&request, &CancelFlag::default());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
