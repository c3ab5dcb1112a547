//! # Carrel CLI
//!
//! Thin driver around the workbench core: runs the notification scheduler
//! loop over a store root and exposes the store primitives for scripting.
//!
//! Usage:
//!   carrel watch                     # run the scheduler until Ctrl-C
//!   carrel list                      # print the category tree
//!   carrel next <id>                 # next trigger time for an item
//!   carrel trash <path>              # soft-delete an item
//!   carrel restore <trash-path>      # restore from the trash container

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use carrel_core::{CarrelConfig, ItemKind};
use carrel_scheduler::{Scheduler, SchedulerEngine};
use carrel_store::{Category, RecordStore};

#[derive(Parser)]
#[command(name = "carrel", version, about = "🗂️ Carrel: local-first note/task workbench")]
struct Cli {
    /// Store root directory (overrides the configured one)
    #[arg(long)]
    store: Option<String>,

    /// Config file path (default: ~/.carrel/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the notification scheduler loop until Ctrl-C
    Watch,
    /// Print the category tree and its items
    List,
    /// Print the next trigger time for an item id
    Next { id: String },
    /// Move an item into the trash container
    Trash { path: PathBuf },
    /// Restore a trashed item to its original location
    Restore { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "carrel=debug,carrel_core=debug,carrel_store=debug,carrel_scheduler=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => CarrelConfig::load_from(path)?,
        None => CarrelConfig::load()?,
    };
    let root_str = cli.store.clone().unwrap_or_else(|| config.store_root.clone());
    let root = PathBuf::from(shellexpand::tilde(&root_str).to_string());
    let store = Arc::new(RecordStore::new(&root, config.store.clone())?);

    match cli.command {
        Command::Watch => {
            let mut scheduler = Scheduler::new(store, config.scheduler.clone());
            let reset = scheduler.start().await;
            tracing::info!(
                "watching {} ({} interval baselines reset)",
                root.display(),
                reset.reset_count
            );
            tokio::signal::ctrl_c().await?;
            scheduler.stop().await;
        }
        Command::List => {
            let tree = store.scan()?;
            println!("🗂️ {}", root.display());
            print_category(&tree.root, 0);
        }
        Command::Next { id } => {
            let engine = SchedulerEngine::new(store, config.scheduler.clone());
            match engine.next_trigger_time(&id)? {
                Some(trigger) => println!("{}", trigger.to_rfc3339()),
                None => println!("no trigger scheduled"),
            }
        }
        Command::Trash { path } => {
            let record = store.trash(&path)?;
            println!("trashed: {}", record.path.display());
        }
        Command::Restore { path } => {
            let record = store.restore(&path)?;
            println!("restored: {}", record.path.display());
        }
    }
    Ok(())
}

fn print_category(cat: &Category, depth: usize) {
    let indent = "  ".repeat(depth);
    if depth > 0 {
        println!("{indent}📁 {}/", cat.name);
    }
    for record in &cat.items {
        let icon = match record.item.kind {
            ItemKind::Task => "☐",
            ItemKind::Note => "📝",
        };
        println!("{indent}  {icon} {}  ({})", record.item.title, record.item.id);
    }
    for child in &cat.children {
        print_category(child, depth + 1);
    }
}
