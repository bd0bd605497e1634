use clap::{Parser, Subcommand};

use crate::model::Reference;

/// Resolves module references into a consistent set of pinned commits.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Name of the module manifest
    #[clap(short, long, default_value = "modpin.toml")]
    pub module_location: String,
    /// Name of the lock file
    #[clap(short, long, default_value = "modpin.lock")]
    pub lockfile_location: String,
    /// Location of the git cache directory [default: $HOME/.modpin/cache]
    #[clap(short, long)]
    pub cache_directory: Option<String>,
    /// Abort a resolution that takes longer than this many seconds
    #[clap(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolves references and their dependencies to one pin per repository
    Resolve {
        /// References of the form remote/owner/repository[:ref]
        #[clap(required = true)]
        references: Vec<Reference>,
    },
    /// Lists every candidate pin reachable from the references, without tie-breaking
    ResolveLocal {
        #[clap(required = true)]
        references: Vec<Reference>,
    },
    /// Creates a lock file based on the module manifest
    Lock {
        /// Fail if the lock file is missing or out of date
        #[clap(long)]
        locked: bool,
        /// Ignore the existing lock file and write a new one
        #[clap(long, conflicts_with = "locked")]
        recreate: bool,
    },
    /// Removes the git cache
    ClearCache,
}
