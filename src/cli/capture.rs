use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::SecondsFormat;
use clap::Subcommand;

use crate::capture::{
    apply_capture, capture_state, list_captures, preflight_apply, CaptureOptions, PreflightReport,
};
use crate::format::OutputFormat;
use crate::model::Capture;

use super::store_and_handle;

/// Capture subcommands
#[derive(Subcommand, Debug)]
pub enum CaptureCommands {
    /// Record the current git state of every repository
    ///
    /// Stores commit hash, branch, and dirty flag per repository. Dirty
    /// trees capture fine; only their flag is recorded, not the changes.
    /// A repository whose directory is missing aborts the whole capture.
    Create {
        /// Workspace handle (default: the enclosing workspace)
        handle: Option<String>,

        /// Short label for the capture
        #[arg(long, default_value = "")]
        name: String,

        /// Longer description
        #[arg(long, default_value = "")]
        description: String,

        /// Tag, repeatable
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// List captures, most recent first
    List {
        /// Workspace handle (default: the enclosing workspace)
        handle: Option<String>,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check whether a capture could be applied right now
    ///
    /// Read-only. Reports, per repository: missing directory, not a git
    /// repository, dirty working tree, or a recorded commit that is no
    /// longer reachable. Exits non-zero when any issue is found.
    Preflight {
        /// Capture id (a unique prefix is enough)
        capture_id: String,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Restore the workspace to a captured state
    ///
    /// Re-runs the preflight and refuses if anything is in the way. Before
    /// touching anything it writes a checkpoint capture of the current
    /// state, then checks out every recorded commit (detached HEAD).
    Apply {
        /// Capture id (a unique prefix is enough)
        capture_id: String,
    },
}

pub fn run(root: Option<PathBuf>, selection: Option<String>, cmd: CaptureCommands) -> Result<()> {
    match cmd {
        CaptureCommands::Create { handle, name, description, tags } => {
            let (store, handle) = store_and_handle(root, handle.or(selection))?;
            let capture = capture_state(
                &store,
                &handle,
                CaptureOptions { name, description, tags, ..CaptureOptions::default() },
            )?;
            println!("Captured state as {}", capture.id);
            for git_ref in &capture.git_state {
                println!(
                    "  {}  {}{}",
                    git_ref.repository,
                    short_hash(&git_ref.commit_hash),
                    if git_ref.dirty { "  (dirty)" } else { "" }
                );
            }
            Ok(())
        }

        CaptureCommands::List { handle, format } => {
            let (store, handle) = store_and_handle(root, handle.or(selection))?;
            let captures = list_captures(&store, &handle)?;
            print_captures(&captures, format)
        }

        CaptureCommands::Preflight { capture_id, format } => {
            let (store, handle) = store_and_handle(root, selection)?;
            let report = preflight_apply(&store, &handle, &capture_id)?;

            if format == OutputFormat::Json {
                println!("{}", format.serialize(&report)?);
            } else {
                print_report(&report);
            }
            if !report.valid {
                bail!("preflight found {} issue(s)", report.issues.len());
            }
            Ok(())
        }

        CaptureCommands::Apply { capture_id } => {
            let (store, handle) = store_and_handle(root, selection)?;
            let outcome = apply_capture(&store, &handle, &capture_id)?;
            println!("Saved checkpoint {}", outcome.checkpoint.id);
            println!(
                "Applied capture {}: {} repositor{} at recorded commits (detached HEAD)",
                outcome.applied.id,
                outcome.applied.git_state.len(),
                if outcome.applied.git_state.len() == 1 { "y" } else { "ies" }
            );
            Ok(())
        }
    }
}

fn print_captures(captures: &[Capture], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", format.serialize(&captures)?);
        return Ok(());
    }
    if captures.is_empty() {
        println!("No captures found.");
        return Ok(());
    }
    println!("ID\tKIND\tCREATED\tREPOS\tNAME");
    for capture in captures {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            capture.id,
            capture.kind,
            capture.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            capture.git_state.len(),
            capture.name
        );
    }
    Ok(())
}

fn print_report(report: &PreflightReport) {
    println!("Preflight for capture {}:", report.capture_id);
    if report.valid {
        println!("  [OK] ready to apply");
        return;
    }
    for issue in &report.issues {
        println!("  [FAIL] {}: {}", issue.repository, issue.details);
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
