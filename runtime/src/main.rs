// Copyright 2026 Funnelscope Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use funnelscope_runtime::cli::{self, audit_cmd, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "funnelscope",
    about = "Funnelscope: conversion-optimization audits for websites",
    version,
    after_help = "Run 'funnelscope <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Audit database path (overrides FUNNELSCOPE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new audit and run it until it needs answers or finishes
    Run {
        /// Site to audit (e.g. "example.com")
        url: String,
        /// Audit only the given page, without crawling
        #[arg(long)]
        single_page: bool,
        /// Maximum link depth from the seed
        #[arg(long)]
        max_depth: Option<u32>,
        /// Maximum number of pages to discover
        #[arg(long)]
        max_pages: Option<usize>,
        /// Re-fetch every page when counting backlinks
        #[arg(long)]
        refetch_backlinks: bool,
        /// Skip screenshot capture
        #[arg(long)]
        no_screenshots: bool,
    },
    /// Show an audit, its pages, and its progress
    Status {
        /// Audit id
        id: String,
    },
    /// List every audit
    List,
    /// Show the questions an audit is waiting on
    Questions {
        /// Audit id
        id: String,
        /// Include answered and skipped questions
        #[arg(long)]
        all: bool,
    },
    /// Answer a question
    Answer {
        /// Question id
        question: i64,
        /// Your answer
        response: String,
    },
    /// Skip a question
    Skip {
        /// Question id
        question: i64,
    },
    /// Continue an audit after answering its questions
    Resume {
        /// Audit id
        id: String,
    },
    /// Run one phase of an audit directly
    Invoke {
        /// Audit id
        id: String,
        /// Phase (crawling, prioritizing, questioning, analyzing, synthesizing)
        phase: String,
    },
    /// Restart a failed audit from the phase that failed
    Retry {
        /// Audit id
        id: String,
    },
    /// Print the findings of a completed audit
    Report {
        /// Audit id
        id: String,
        /// Include catalog check results
        #[arg(long)]
        results: bool,
    },
    /// Delete an audit and everything it collected
    Delete {
        /// Audit id
        id: String,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(output::JSON_FLAG, "1");
    }
    if cli.quiet {
        std::env::set_var(output::QUIET_FLAG, "1");
    }
    if cli.verbose {
        std::env::set_var(output::VERBOSE_FLAG, "1");
    }
    init_tracing(cli.verbose, cli.quiet || cli.json);

    let result = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "funnelscope", &mut std::io::stdout());
            Ok(())
        }
        command => match cli::load_config(cli.db) {
            Ok(config) => dispatch(command, config).await,
            Err(e) => Err(e),
        },
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

async fn dispatch(command: Commands, config: funnelscope_runtime::config::AuditConfig) -> Result<()> {
    match command {
        Commands::Run {
            url,
            single_page,
            max_depth,
            max_pages,
            refetch_backlinks,
            no_screenshots,
        } => {
            let options = audit_cmd::RunOptions {
                single_page,
                max_depth,
                max_pages,
                refetch_backlinks,
                no_screenshots,
            };
            audit_cmd::run(config, &url, &options).await
        }
        Commands::Status { id } => audit_cmd::status(config, &id),
        Commands::List => audit_cmd::list(config),
        Commands::Questions { id, all } => cli::question_cmd::list(config, &id, all),
        Commands::Answer { question, response } => {
            cli::question_cmd::answer(config, question, &response)
        }
        Commands::Skip { question } => cli::question_cmd::skip(config, question),
        Commands::Resume { id } => audit_cmd::resume(config, &id).await,
        Commands::Invoke { id, phase } => audit_cmd::invoke(config, &id, &phase).await,
        Commands::Retry { id } => audit_cmd::retry(config, &id).await,
        Commands::Report { id, results } => cli::report_cmd::run(config, &id, results),
        Commands::Delete { id } => audit_cmd::delete(config, &id),
        Commands::Doctor => cli::doctor::run(config).await,
        Commands::Completions { .. } => Ok(()),
    }
}

/// Logs go to stderr. `RUST_LOG` wins over the flags.
fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "funnelscope_runtime=debug"
    } else if quiet {
        "funnelscope_runtime=error"
    } else {
        "funnelscope_runtime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
