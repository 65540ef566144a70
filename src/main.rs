//! Context Keeper CLI
//!
//! Inspect and administer stored conversations without making model calls.

use clap::{Parser, Subcommand};
use context_keeper::config;
use context_keeper::memory::{ConversationStore, FileStore};
use context_keeper::CredentialRotator;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Context Keeper - manage LLM conversation contexts
#[derive(Parser, Debug)]
#[command(name = "context-keeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Home directory holding config.toml (defaults to $CONTEXT_KEEPER_HOME or ~/.context-keeper)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Override the directory conversations are stored in
    #[arg(long, global = true)]
    contexts_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored conversations
    List,
    /// Create an empty conversation
    Create { id: String },
    /// Delete a conversation
    Delete { id: String },
    /// Print the stored turns of a conversation
    Show { id: String },
    /// Print the next API key in rotation (masked)
    NextKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let home = match cli.home {
        Some(home) => home,
        None => config::home_dir()?,
    };
    let mut config = config::load(&home).await?;
    if let Some(dir) = cli.contexts_dir {
        config = config.with_contexts_dir(dir);
    }
    info!("Contexts dir: {:?}", config.contexts_dir);

    let store = FileStore::open(&config.contexts_dir).await?;

    match cli.command {
        Command::List => {
            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No existing conversations found.");
            }
            for id in ids {
                println!("{}", id);
            }
        }
        Command::Create { id } => {
            store.create(&id).await?;
            println!("Conversation '{}' created.", id);
        }
        Command::Delete { id } => {
            store.delete(&id).await?;
            println!("Conversation '{}' deleted.", id);
        }
        Command::Show { id } => {
            for (i, turn) in store.read(&id).await?.iter().enumerate() {
                let marker = if turn.is_summary() { " [summary]" } else { "" };
                println!(
                    "#{} {} {}{}\n{}\n",
                    i,
                    turn.timestamp.to_rfc3339(),
                    turn.role,
                    marker,
                    turn.text
                );
            }
        }
        Command::NextKey => {
            let rotator = CredentialRotator::from_env(&config.credentials_env)?;
            println!(
                "{} keys loaded; next: {}",
                rotator.len(),
                rotator.next().masked()
            );
        }
    }

    Ok(())
}
