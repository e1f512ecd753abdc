use std::time::Duration;

use anyhow::Result;
use chrono::SecondsFormat;
use clap::Args;

use crate::exec::{self, ExecRequest, ExecTarget, ExitCodeError};
use crate::executions;
use crate::format::OutputFormat;
use crate::store::FsWorkspaceStore;

/// Run a command across workspace repositories
///
/// Sequential by default: repositories run in workspace order and the run
/// stops at the first non-zero exit, which becomes workshed's own exit
/// code. With --parallel everything runs to completion and the worst exit
/// code wins. Every run is appended to the workspace's history.
///
/// Examples:
///   workshed exec -- cargo test
///   workshed exec --parallel -- git fetch --all
///   workshed exec --in api -- cargo build
///   workshed exec --in root -- ls -la
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Where to run: "all" (default), "root" for the workspace directory,
    /// or a repository name
    #[arg(long = "in", value_name = "TARGET", default_value = "all")]
    pub target: String,

    /// Run repositories concurrently; don't stop at failures
    #[arg(long)]
    pub parallel: bool,

    /// Kill any invocation still running after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Capture the git state afterwards, linked to this execution
    #[arg(long)]
    pub capture: bool,

    /// Command and arguments to run (after --)
    #[arg(last = true, required = true)]
    pub cmd: Vec<String>,
}

pub fn run(store: &FsWorkspaceStore, handle: &str, args: ExecArgs) -> Result<()> {
    let target = match args.target.as_str() {
        "all" => ExecTarget::All,
        "root" => ExecTarget::Root,
        name => ExecTarget::Repo(name.to_string()),
    };

    let config = store.config();
    let timeout = match args.timeout {
        // Zero means no timeout, same as the config file.
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None if config.exec.timeout_seconds > 0 => {
            Some(Duration::from_secs(config.exec.timeout_seconds))
        }
        None => None,
    };

    let outcome = exec::run(
        store,
        handle,
        ExecRequest {
            target,
            command: args.cmd,
            parallel: args.parallel || config.exec.parallel,
            timeout,
            capture_after: args.capture,
        },
    )?;

    if let Some(capture) = &outcome.capture {
        println!("Captured state as {}", capture.id);
    }
    if outcome.record.exit_code != 0 {
        return Err(ExitCodeError(outcome.record.exit_code).into());
    }
    Ok(())
}

/// Show past executions, newest first
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Workspace handle (default: the workspace enclosing the current directory)
    pub handle: Option<String>,

    /// Show at most this many records
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

pub fn history(store: &FsWorkspaceStore, handle: &str, args: &HistoryArgs) -> Result<()> {
    let records = executions::list(store, handle, args.limit)?;

    match args.format {
        OutputFormat::Json => println!("{}", args.format.serialize(&records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No executions recorded.");
                return Ok(());
            }
            println!("ID\tWHEN\tTARGET\tEXIT\tCOMMAND");
            for record in &records {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    record.id,
                    record.completed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    record.target,
                    record.exit_code,
                    record.command.join(" ")
                );
            }
        }
    }
    Ok(())
}
