use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::SecondsFormat;
use clap::Args;

use crate::capture;
use crate::executions;
use crate::format::OutputFormat;
use crate::model::Workspace;
use crate::store::{CreateRequest, FsWorkspaceStore, RepoSpec, WorkspaceStore as _};

/// Create a new workspace
///
/// Creates a directory under the store root, seeds it from --template if
/// given, clones every --repo into it, and writes the workspace metadata.
/// The whole operation is atomic: a failed clone leaves nothing behind.
///
/// Repositories can pin a branch or tag with a `#ref` suffix. Each --name
/// overrides the derived directory name of the --repo at the same position.
///
/// Examples:
///   workshed create "try the new parser" --repo https://github.com/acme/parser
///   workshed create "release prep" \
///     --repo git@github.com:acme/api.git#v2 --name backend \
///     --repo ../tools
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// What this workspace is for
    pub purpose: String,

    /// Repository to clone: URL or local path, optionally with `#ref`
    #[arg(long = "repo", value_name = "SOURCE[#REF]")]
    pub repos: Vec<String>,

    /// Directory name for the --repo at the same position
    #[arg(long = "name", value_name = "NAME")]
    pub names: Vec<String>,

    /// Shallow-clone depth for every repository (0 = full history)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub depth: u32,

    /// Seed the workspace with the contents of this directory
    #[arg(long, value_name = "DIR")]
    pub template: Option<PathBuf>,

    /// Use this handle instead of generating one
    #[arg(long, value_name = "HANDLE")]
    pub handle: Option<String>,
}

/// Split a trailing `#ref` off a source argument.
pub(super) fn split_source_ref(raw: &str) -> (String, Option<String>) {
    match raw.rsplit_once('#') {
        Some((source, reference)) if !source.is_empty() && !reference.is_empty() => {
            (source.to_string(), Some(reference.to_string()))
        }
        _ => (raw.to_string(), None),
    }
}

pub fn create(store: &FsWorkspaceStore, args: CreateArgs) -> Result<()> {
    if args.names.len() > args.repos.len() {
        bail!(
            "got {} --name values for {} --repo values\n  \
             Each --name overrides the --repo at the same position.",
            args.names.len(),
            args.repos.len()
        );
    }

    let repos = args
        .repos
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let (source, git_ref) = split_source_ref(raw);
            RepoSpec { source, name: args.names.get(i).cloned(), git_ref, depth: args.depth }
        })
        .collect();

    let ws = store.create(CreateRequest {
        purpose: args.purpose,
        handle: args.handle,
        repos,
        template: args.template,
    })?;
    let path = store.path(&ws.handle);

    println!("Workspace '{}' ready!", ws.handle);
    println!();
    println!("  Purpose: {}", ws.purpose);
    println!("  Path:    {}", path.display());
    if !ws.repositories.is_empty() {
        println!("  Repositories:");
        for repo in &ws.repositories {
            println!("    {}  {}{}", repo.name, repo.url, ref_suffix(repo.git_ref.as_deref()));
        }
    }
    println!();
    println!("To start working:");
    println!("  cd {}", path.display());
    println!("  workshed exec -- <command>      # run something in every repository");
    println!("  workshed capture create         # snapshot the git state");

    Ok(())
}

fn ref_suffix(git_ref: Option<&str>) -> String {
    git_ref.map(|r| format!("  @{r}")).unwrap_or_default()
}

/// List workspaces in the store
///
/// One line per workspace, oldest first. --filter keeps only workspaces
/// whose purpose or repository names contain the given substring
/// (case-insensitive).
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show workspaces whose purpose or repository names match
    #[arg(long, value_name = "SUBSTR")]
    pub filter: Option<String>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

pub fn list(store: &FsWorkspaceStore, args: &ListArgs) -> Result<()> {
    let workspaces = store.list(args.filter.as_deref())?;

    match args.format {
        OutputFormat::Json => println!("{}", args.format.serialize(&workspaces)?),
        OutputFormat::Text => {
            if workspaces.is_empty() {
                println!("No workspaces found.");
                return Ok(());
            }
            println!("HANDLE\tREPOS\tCREATED\tPURPOSE");
            for ws in &workspaces {
                println!(
                    "{}\t{}\t{}\t{}",
                    ws.handle,
                    ws.repositories.len(),
                    ws.created_at.format("%Y-%m-%d"),
                    ws.purpose
                );
            }
        }
    }
    Ok(())
}

/// Show one workspace in detail
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Workspace handle (default: the workspace enclosing the current directory)
    pub handle: Option<String>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

pub fn show(store: &FsWorkspaceStore, handle: &str, format: OutputFormat) -> Result<()> {
    let ws = store.get(handle)?;

    if format == OutputFormat::Json {
        println!("{}", format.serialize(&ws)?);
        return Ok(());
    }

    print_workspace(store, &ws);
    Ok(())
}

fn print_workspace(store: &FsWorkspaceStore, ws: &Workspace) {
    println!("Workspace: {}", ws.handle);
    println!("Purpose:   {}", ws.purpose);
    println!("Created:   {}", ws.created_at.to_rfc3339_opts(SecondsFormat::Secs, true));
    println!("Path:      {}", store.path(&ws.handle).display());
    println!();

    if ws.repositories.is_empty() {
        println!("No repositories attached.");
    } else {
        println!("Repositories:");
        for repo in &ws.repositories {
            let depth =
                if repo.depth > 0 { format!("  (depth {})", repo.depth) } else { String::new() };
            println!(
                "  {}  {}{}{}",
                repo.name,
                repo.url,
                ref_suffix(repo.git_ref.as_deref()),
                depth
            );
        }
    }

    // Best-effort activity summary; a workspace with unreadable records
    // still shows, doctor reports the damage.
    if let Ok(captures) = capture::list_captures(store, &ws.handle)
        && !captures.is_empty()
    {
        println!();
        println!("Captures:  {} (latest {})", captures.len(), captures[0].id);
    }
    if let Ok(history) = executions::list(store, &ws.handle, Some(1))
        && let Some(last) = history.first()
    {
        println!(
            "Last exec: {} (exit {})",
            last.completed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            last.exit_code
        );
    }
}

/// Print the absolute path of a workspace
///
/// Made for shell substitution:
///   cd $(workshed path amber-falcon)
#[derive(Args, Debug)]
pub struct PathArgs {
    /// Workspace handle
    pub handle: String,
}

pub fn path(store: &FsWorkspaceStore, args: &PathArgs) -> Result<()> {
    store.get(&args.handle)?;
    println!("{}", store.path(&args.handle).display());
    Ok(())
}

/// Change what a workspace is for
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Workspace handle
    pub handle: String,

    /// The new purpose
    pub purpose: String,
}

pub fn update(store: &FsWorkspaceStore, args: &UpdateArgs) -> Result<()> {
    let ws = store.update_purpose(&args.handle, &args.purpose)?;
    println!("Purpose of '{}' is now: {}", ws.handle, ws.purpose);
    Ok(())
}

/// Delete a workspace and everything in it
///
/// Removes the directory, all clones, captures, and execution history.
/// There is no confirmation prompt and no undo.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Workspace handle
    pub handle: String,
}

pub fn remove(store: &FsWorkspaceStore, args: &RemoveArgs) -> Result<()> {
    store.remove(&args.handle)?;
    println!("Workspace '{}' removed.", args.handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ref_split() {
        assert_eq!(
            split_source_ref("https://github.com/acme/api.git#v2"),
            ("https://github.com/acme/api.git".to_string(), Some("v2".to_string()))
        );
        assert_eq!(
            split_source_ref("git@github.com:acme/api.git#feature/retry"),
            ("git@github.com:acme/api.git".to_string(), Some("feature/retry".to_string()))
        );
        assert_eq!(split_source_ref("../tools"), ("../tools".to_string(), None));
        // A trailing '#' is not a ref.
        assert_eq!(split_source_ref("x#"), ("x#".to_string(), None));
    }
}
