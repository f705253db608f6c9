//! Clap command tree.

use clap::{Arg, ArgAction, ArgGroup, Command};

/// Build the `taskledger` command.
pub fn build_cli() -> Command {
    Command::new("taskledger")
        .about("Tamper-evident delivery event log")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .short('d')
                .value_name("DIR")
                .global(true)
                .help("Data directory (overrides the config file; default .taskledger)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Print machine-readable JSON"),
        )
        .subcommand(append_cmd())
        .subcommand(list_cmd())
        .subcommand(verify_cmd())
        .subcommand(task_cmd())
        .subcommand(evaluate_cmd())
}

fn workspace_arg() -> Arg {
    Arg::new("workspace")
        .long("workspace")
        .short('w')
        .value_name("ID")
        .help("Workspace id")
}

fn task_arg() -> Arg {
    Arg::new("task")
        .long("task")
        .short('t')
        .value_name("ID")
        .help("Task id")
}

fn append_cmd() -> Command {
    Command::new("append")
        .about("Append an event to a workspace chain")
        .arg(workspace_arg().required(true))
        .arg(task_arg())
        .arg(
            Arg::new("type")
                .long("type")
                .value_name("EVENT_TYPE")
                .required(true)
                .help("Event type, e.g. pr_opened"),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .value_name("SOURCE")
                .help("Trigger source (default automatic)"),
        )
        .arg(
            Arg::new("payload")
                .long("payload")
                .value_name("JSON")
                .help("JSON object payload (default {})"),
        )
}

fn list_cmd() -> Command {
    Command::new("list")
        .about("List a workspace's events in chain order")
        .arg(workspace_arg().required(true))
        .arg(task_arg())
        .arg(
            Arg::new("type")
                .long("type")
                .value_name("EVENT_TYPE")
                .help("Only events of this type"),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("50"),
        )
}

fn verify_cmd() -> Command {
    Command::new("verify")
        .about("Verify hash chain integrity (exit code 2 on findings)")
        .arg(workspace_arg())
        .arg(
            Arg::new("all")
                .long("all")
                .action(ArgAction::SetTrue)
                .help("Verify every workspace"),
        )
        .group(
            ArgGroup::new("target")
                .args(["workspace", "all"])
                .required(true),
        )
}

fn task_cmd() -> Command {
    Command::new("task")
        .about("Show a task's events and summary")
        .arg(task_arg().required(true))
}

fn evaluate_cmd() -> Command {
    Command::new("evaluate")
        .about("Evaluate a task's closure eligibility")
        .arg(workspace_arg().required(true))
        .arg(task_arg().required(true))
        .arg(
            Arg::new("tier")
                .long("tier")
                .value_name("TIER")
                .help("Policy tier for the workspace: agile, standard or hardened"),
        )
        .arg(
            Arg::new("finalize")
                .long("finalize")
                .action(ArgAction::SetTrue)
                .help("Append closure_approved when eligible"),
        )
}
