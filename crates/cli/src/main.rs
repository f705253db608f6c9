//! Taskledger CLI: append, inspect and verify a file-backed event log.
//!
//! `taskledger [--config FILE] [--data-dir DIR] [--json] COMMAND`
//!
//! Exit codes: 0 success, 1 error, 2 chain integrity findings.
//!
//! Closure jobs live in an in-process queue, so they do not outlive a single
//! invocation. `evaluate --finalize` runs a closure decision directly instead.

mod commands;
mod format;
mod parse;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use taskledger::{Ledger, LedgerConfig};
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{
    format_error, format_evaluation, format_finalize, format_history, format_page, format_record,
    format_verification, OutputMode,
};
use parse::{matches_to_action, CliAction, VerifyTarget};

const DEFAULT_DATA_DIR: &str = ".taskledger";

fn main() {
    init_tracing();

    let matches = build_cli().get_matches();
    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let exit_code = match run(&matches, mode) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            1
        }
    };
    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(matches: &clap::ArgMatches) -> Result<LedgerConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path))?,
        None => LedgerConfig::default(),
    };
    if let Some(dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if config.durability.requires_log() && config.data_dir.is_none() {
        config.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
    }
    Ok(config)
}

fn run(matches: &clap::ArgMatches, mode: OutputMode) -> Result<i32> {
    let action = matches_to_action(matches)?;
    let config = load_config(matches)?;
    let ledger = Ledger::builder()
        .config(config)
        .open()
        .context("failed to open ledger")?;

    let (output, code) = match action {
        CliAction::Append(fact) => {
            let outcome = ledger.record_fact(fact)?;
            (format_record(&outcome, mode), 0)
        }
        CliAction::List {
            workspace,
            filter,
            page,
        } => {
            let page = ledger.events.list_events(&workspace, &filter, page)?;
            (format_page(&page, mode), 0)
        }
        CliAction::Verify(target) => {
            let results = match target {
                VerifyTarget::Workspace(ws) => {
                    let verification = ledger.verify_workspace(&ws)?;
                    vec![(ws, verification)]
                }
                VerifyTarget::All => ledger.verify_all()?,
            };
            let tampered = results.iter().any(|(_, v)| !v.valid);
            (format_verification(&results, mode), if tampered { 2 } else { 0 })
        }
        CliAction::Task(task) => {
            let history = ledger.events.events_for_task(&task)?;
            (format_history(&history, mode), 0)
        }
        CliAction::Evaluate {
            workspace,
            task,
            tier,
            finalize,
        } => {
            if let Some(tier) = tier {
                ledger.policies.assign_tier(&workspace, tier);
            }
            let output = if finalize {
                format_finalize(&ledger.engine.evaluate_and_finalize(&task, &workspace)?, mode)
            } else {
                format_evaluation(&ledger.engine.evaluate_closure(&task, &workspace)?, mode)
            };
            (output, 0)
        }
    };

    ledger.close()?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(code)
}
