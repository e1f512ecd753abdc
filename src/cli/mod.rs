//! Command-line interface.
//!
//! Thin layer over the store: parses arguments, resolves the store root and
//! the target workspace, and renders results. Domain logic stays in the
//! library modules.

mod capture;
mod doctor;
mod exec;
mod repo;
mod workspace;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::config;
use crate::store::{find_enclosing, FsWorkspaceStore};

/// Workspace manager for multi-repository work
///
/// workshed bundles one or more git clones under a single directory with a
/// human-authored purpose and a generated handle. Workspaces live under a
/// store root (--root / WORKSHED_ROOT, default ~/workshed).
///
/// QUICK START:
///
///   workshed create "try the new parser" --repo https://github.com/acme/parser
///   cd $(workshed path <handle>)
///
///   # Run a command in every repository:
///   workshed exec -- cargo test
///
///   # Snapshot the git state, and come back to it later:
///   workshed capture create --name baseline
///   workshed capture apply <capture-id>
///
/// Inside a workspace directory the handle can be omitted — commands find
/// the enclosing workspace on their own.
#[derive(Parser)]
#[command(name = "workshed")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'workshed <command> --help' for more information on a specific command.")]
pub struct Cli {
    /// Store root directory
    #[arg(long, global = true, env = config::ROOT_ENV, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Workspace to operate on (default: the workspace enclosing the
    /// current directory)
    #[arg(short = 'w', long = "workspace", global = true, value_name = "HANDLE")]
    workspace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Create(workspace::CreateArgs),
    List(workspace::ListArgs),
    Show(workspace::ShowArgs),
    Path(workspace::PathArgs),
    Update(workspace::UpdateArgs),
    Remove(workspace::RemoveArgs),

    /// Manage a workspace's repositories
    #[command(subcommand)]
    Repo(repo::RepoCommands),

    /// Record and restore git state
    #[command(subcommand)]
    Capture(capture::CaptureCommands),

    Exec(exec::ExecArgs),
    History(exec::HistoryArgs),
    Doctor(doctor::DoctorArgs),

    /// Generate shell completions
    ///
    /// Example:
    ///   workshed completions bash > /etc/bash_completion.d/workshed
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}

pub fn run() -> Result<()> {
    let Cli { root, workspace: selection, command } = Cli::parse();

    match command {
        Commands::Create(args) => workspace::create(&open_store(root)?, args),
        Commands::List(args) => workspace::list(&open_store(root)?, &args),
        Commands::Show(args) => {
            let format = args.format;
            let (store, handle) = store_and_handle(root, args.handle.or(selection))?;
            workspace::show(&store, &handle, format)
        }
        Commands::Path(args) => workspace::path(&open_store(root)?, &args),
        Commands::Update(args) => workspace::update(&open_store(root)?, &args),
        Commands::Remove(args) => workspace::remove(&open_store(root)?, &args),

        Commands::Repo(cmd) => repo::run(root, selection, cmd),
        Commands::Capture(cmd) => capture::run(root, selection, cmd),

        Commands::Exec(args) => {
            let (store, handle) = store_and_handle(root, selection)?;
            exec::run(&store, &handle, args)
        }
        Commands::History(args) => {
            let (store, handle) = store_and_handle(root, args.handle.clone().or(selection))?;
            exec::history(&store, &handle, &args)
        }
        Commands::Doctor(mut args) => {
            // -w narrows to one workspace; no handle at all means the whole
            // store, so no directory discovery here.
            args.handle = args.handle.or(selection);
            doctor::run(&open_store(root)?, &args)
        }

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "workshed", &mut io::stdout());
            Ok(())
        }
    }
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(dir) => Ok(dir),
        None => Ok(config::default_root()?),
    }
}

fn open_store(root: Option<PathBuf>) -> Result<FsWorkspaceStore> {
    Ok(FsWorkspaceStore::open(resolve_root(root)?)?)
}

/// Resolve which workspace a command targets: an explicit handle wins,
/// otherwise the workspace enclosing the current directory. Discovery also
/// pins the store root to wherever that workspace actually lives.
fn store_and_handle(
    root: Option<PathBuf>,
    selection: Option<String>,
) -> Result<(FsWorkspaceStore, String)> {
    if let Some(handle) = selection {
        return Ok((open_store(root)?, handle));
    }

    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let (ws_dir, ws) = find_enclosing(&cwd)?;
    let store_root = ws_dir
        .parent()
        .map(Path::to_path_buf)
        .context("workspace directory has no parent")?;
    Ok((FsWorkspaceStore::open(store_root)?, ws.handle))
}
