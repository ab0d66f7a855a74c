// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Palaver operator CLI.
//!
//! Inspects devices, chats and history in the gateway database and applies
//! operator actions (takeover, release, archive) without a running gateway.

mod control;
mod doctor;
mod status;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use palaver_config::PalaverConfig;
use palaver_core::{PalaverError, SessionStatus, StorageAdapter};
use palaver_storage::SqliteStorage;

/// Palaver - chat session gateway with automated replies.
#[derive(Parser, Debug)]
#[command(name = "palaver", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered devices.
    Sessions {
        /// Only devices in this status (e.g. connected, error).
        #[arg(long)]
        status: Option<SessionStatus>,
    },
    /// List the chats of a device.
    Chats { session: String },
    /// Show the most recent messages of a chat.
    History {
        session: String,
        chat: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Stop automated replies in a chat.
    Takeover {
        session: String,
        chat: String,
        #[arg(long)]
        actor: String,
    },
    /// Return a chat to automated replies.
    Release { session: String, chat: String },
    /// Archive a device; it will not be resumed or started again.
    Archive {
        session: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Run diagnostic checks.
    Doctor {
        /// Also run the slower checks.
        #[arg(long)]
        deep: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => palaver_config::load_and_validate_path(path),
        None => palaver_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            palaver_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    if let Err(e) = run(cli, config).await {
        eprintln!("palaver: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: PalaverConfig) -> Result<(), PalaverError> {
    let Some(command) = cli.command else {
        println!("palaver: use --help for available commands");
        return Ok(());
    };

    if let Commands::Doctor { deep } = command {
        return doctor::run_doctor(&config, cli.config.as_deref(), deep, cli.plain).await;
    }

    let storage = open_storage(&config).await?;
    let result = match command {
        Commands::Sessions { status } => {
            status::run_sessions(storage.as_ref(), status, cli.json, cli.plain).await
        }
        Commands::Chats { session } => {
            status::run_chats(storage.as_ref(), &session, cli.json, cli.plain).await
        }
        Commands::History {
            session,
            chat,
            limit,
        } => status::run_history(storage.as_ref(), &session, &chat, limit, cli.json).await,
        Commands::Takeover {
            session,
            chat,
            actor,
        } => control::run_takeover(storage.clone(), &session, &chat, &actor).await,
        Commands::Release { session, chat } => {
            control::run_release(storage.clone(), &session, &chat).await
        }
        Commands::Archive { session, reason } => {
            control::run_archive(storage.as_ref(), &session, reason.as_deref()).await
        }
        Commands::Doctor { .. } => Ok(()),
    };
    storage.close().await?;
    result
}

async fn open_storage(config: &PalaverConfig) -> Result<Arc<dyn StorageAdapter>, PalaverError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("palaver={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
