use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use crate::deadline::Deadline;
use crate::store::RepoSpec;

use super::{store_and_handle, workspace::split_source_ref};

/// Repository subcommands
#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Clone repositories into a workspace
    ///
    /// Sources are remote URLs (https, ssh, git, file, or git@host:path)
    /// or local directories. The whole batch is validated before the first
    /// clone; each successful clone is recorded immediately, so a failure
    /// partway keeps the repositories already added.
    ///
    /// Examples:
    ///   workshed repo add https://github.com/acme/tools
    ///   workshed repo add ../local-checkout --name vendor
    ///   workshed repo add -w amber-falcon git@github.com:acme/api.git#v2
    Add {
        /// Clone sources: URLs or local paths, optionally with `#ref`
        #[arg(required = true, value_name = "SOURCE[#REF]")]
        sources: Vec<String>,

        /// Directory name override (single source only)
        #[arg(long, value_name = "NAME")]
        name: Option<String>,

        /// Branch or tag to clone, for sources without a `#ref`
        #[arg(long, value_name = "REF")]
        git_ref: Option<String>,

        /// Shallow-clone depth (0 = full history)
        #[arg(long, value_name = "N", default_value_t = 0)]
        depth: u32,

        /// Total time budget for all clones, in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Detach a repository and delete its directory
    ///
    /// Removing a repository whose directory is already gone still drops
    /// the metadata entry; re-running a remove is not an error.
    Remove {
        /// Repository name within the workspace
        name: String,
    },
}

pub fn run(root: Option<PathBuf>, selection: Option<String>, cmd: RepoCommands) -> Result<()> {
    let (store, handle) = store_and_handle(root, selection)?;

    match cmd {
        RepoCommands::Add { sources, name, git_ref, depth, timeout } => {
            if name.is_some() && sources.len() > 1 {
                bail!(
                    "--name applies to exactly one SOURCE (got {})\n  \
                     Add repositories one at a time to alias them.",
                    sources.len()
                );
            }

            let specs: Vec<RepoSpec> = sources
                .iter()
                .map(|raw| {
                    let (source, fragment) = split_source_ref(raw);
                    RepoSpec {
                        source,
                        name: name.clone(),
                        git_ref: fragment.or_else(|| git_ref.clone()),
                        depth,
                    }
                })
                .collect();

            let deadline = match timeout {
                Some(0) => Deadline::none(),
                Some(secs) => Deadline::after(Duration::from_secs(secs)),
                None => store.config().clone.deadline(specs.len()),
            };
            let cwd = std::env::current_dir().context("cannot determine current directory")?;

            let added = store.add_repositories(&handle, &specs, &cwd, deadline)?;
            println!("Added {} repo(s) to '{handle}':", added.len());
            for repo in &added {
                println!("  {}  {}", repo.name, repo.url);
            }
            Ok(())
        }

        RepoCommands::Remove { name } => {
            store.remove_repository(&handle, &name)?;
            println!("Removed '{name}' from '{handle}'.");
            Ok(())
        }
    }
}
