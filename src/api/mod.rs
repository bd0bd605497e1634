use std::{error::Error, path::PathBuf, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::{
    cli::command_handlers::{do_clear_cache, do_lock, do_resolve, do_resolve_local},
    git::GitCache,
    model::{lock::LockFile, ModulePin, Reference},
    resolver::{CandidateSet, Resolver},
};

mod builder;

pub use builder::ModpinBuilder;

pub struct Modpin {
    cache: Arc<GitCache>,
    resolver: Resolver,
    root: PathBuf,
    module_file_name: PathBuf,
    lock_file_name: PathBuf,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockMode {
    /// Verify that the lock file is up to date. This mode should be normally used on CI.
    Locked,
    /// Update the lock file if necessary.
    Update,
    /// Recreate the lock file from scratch.
    Recreate,
}

impl Modpin {
    pub fn builder() -> ModpinBuilder {
        ModpinBuilder::default()
    }

    /// Resolves `references` and everything they depend on to one pin per repository.
    pub async fn resolve(
        &self,
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<Vec<ModulePin>, Box<dyn Error>> {
        do_resolve(&self.resolver, references, cancel).await
    }

    /// Lists every candidate pin reachable from `references`, without tie-breaking.
    pub async fn resolve_local(
        &self,
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<CandidateSet, Box<dyn Error>> {
        do_resolve_local(&self.resolver, references, cancel).await
    }

    /// Creates, updates or verifies a lock file based on the module manifest
    pub async fn lock(
        &self,
        lock_mode: LockMode,
        cancel: &CancellationToken,
    ) -> Result<LockFile, Box<dyn Error>> {
        do_lock(
            lock_mode,
            &self.resolver,
            &self.root,
            &self.module_file_name,
            &self.lock_file_name,
            cancel,
        )
        .await
    }

    pub fn clear_cache(&self) -> Result<(), Box<dyn Error>> {
        do_clear_cache(&self.cache)
    }
}
