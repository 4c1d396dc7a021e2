// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! apflow - accounts-payable invoice routing.
//!
//! Binary entry point: loads configuration and dispatches subcommands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod doctor;
mod poison;
mod resolve;
mod serve;
mod vendors;

use std::path::PathBuf;

use apflow_config::model::ApflowConfig;
use clap::{Parser, Subcommand};

/// apflow - accounts-payable invoice routing.
#[derive(Parser, Debug)]
#[command(name = "apflow", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to the XDG lookup (`apflow.toml`).
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the stage workers, the mailbox poll timer, and the webhook gateway.
    Serve,
    /// Poll the ingest mailbox once and process everything it produced.
    Ingest,
    /// Manage the vendor ledger.
    Vendors {
        #[command(subcommand)]
        action: VendorsAction,
    },
    /// Inspect and requeue poisoned queue entries.
    Poison {
        #[command(subcommand)]
        action: PoisonAction,
    },
    /// Show how a vendor name or sender address resolves against the ledger.
    Resolve {
        /// Sender address of the invoice email.
        sender: String,
        /// Vendor name as extracted from the invoice.
        #[arg(long)]
        name: Option<String>,
    },
    /// Check configuration, storage, and collaborator health.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[derive(Subcommand, Debug)]
enum VendorsAction {
    /// Import or update vendors from a CSV file.
    Import { path: PathBuf },
    /// List all vendors.
    List,
}

#[derive(Subcommand, Debug)]
enum PoisonAction {
    /// List poisoned entries, optionally for one queue.
    List {
        #[arg(long)]
        queue: Option<String>,
    },
    /// Move a poisoned entry back to pending.
    Requeue { id: i64 },
}

fn load_config(path: Option<&PathBuf>) -> ApflowConfig {
    let loaded = match path {
        Some(path) => apflow_config::load_and_validate_path(path),
        None => apflow_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            apflow_config::render_errors(&errors);
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Ingest => serve::run_once(config).await,
        Commands::Vendors { action } => match action {
            VendorsAction::Import { path } => vendors::run_import(&config, &path).await,
            VendorsAction::List => vendors::run_list(&config).await,
        },
        Commands::Poison { action } => match action {
            PoisonAction::List { queue } => poison::run_list(&config, queue.as_deref()).await,
            PoisonAction::Requeue { id } => poison::run_requeue(&config, id).await,
        },
        Commands::Resolve { sender, name } => {
            resolve::run_resolve(&config, &sender, name.as_deref()).await
        }
        Commands::Doctor { plain } => doctor::run_doctor(&config, plain).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::parse_from(["apflow", "--config", "ap.toml", "poison", "requeue", "7"]);
        assert_eq!(cli.config, Some(PathBuf::from("ap.toml")));
        assert!(matches!(
            cli.command,
            Commands::Poison {
                action: PoisonAction::Requeue { id: 7 }
            }
        ));

        let cli = Cli::parse_from(["apflow", "resolve", "billing@adobe.com", "--name", "Adobe"]);
        match cli.command {
            Commands::Resolve { sender, name } => {
                assert_eq!(sender, "billing@adobe.com");
                assert_eq!(name.as_deref(), Some("Adobe"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
