use std::{error::Error, path::Path};

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    api::LockMode,
    git::GitCache,
    model::{lock::LockFile, manifest::ModuleManifest, ModulePin, Reference},
    resolver::{CandidateSet, Resolver},
};

/// Handler to resolve command
pub async fn do_resolve(
    resolver: &Resolver,
    references: &[Reference],
    cancel: &CancellationToken,
) -> Result<Vec<ModulePin>, Box<dyn Error>> {
    Ok(resolver.resolve_references(references, cancel).await?)
}

/// Handler to resolve-local command
pub async fn do_resolve_local(
    resolver: &Resolver,
    references: &[Reference],
    cancel: &CancellationToken,
) -> Result<CandidateSet, Box<dyn Error>> {
    Ok(resolver.resolve_local_references(references, cancel).await?)
}

/// Handler to lock command
/// Resolves the dependencies declared by the module manifest and
/// writes or verifies the lock file
pub async fn do_lock(
    lock_mode: LockMode,
    resolver: &Resolver,
    root: &Path,
    module_file_name: &Path,
    lock_file_name: &Path,
    cancel: &CancellationToken,
) -> Result<LockFile, Box<dyn Error>> {
    let manifest = ModuleManifest::from_file(&root.join(module_file_name))?;

    let lock_file_path = root.join(lock_file_name);

    let old_lock = match (lock_mode, lock_file_path.exists()) {
        (LockMode::Locked, false) => return Err("Lock file does not exist".into()),
        (LockMode::Locked | LockMode::Update, true) => {
            Some(LockFile::from_file(&lock_file_path)?)
        }
        (LockMode::Update, false) | (LockMode::Recreate, _) => None,
    };

    let references = manifest.references();
    let lockfile = if references.is_empty() {
        debug!("Module declares no dependencies");
        LockFile::default()
    } else {
        debug!("Generating lockfile...");
        let pins = resolver.resolve_references(&references, cancel).await?;
        LockFile::from_pins(&pins)
    };

    debug!("Generated lockfile: {:?}", lockfile);

    match old_lock {
        Some(old_lock) if old_lock == lockfile => debug!("Lockfile is up to date"),
        _ if lock_mode == LockMode::Locked => {
            return Err(format!(
                "Lock file {} is out of date, run `modpin lock` to update it",
                lock_file_path.display()
            )
            .into())
        }
        _ => {
            std::fs::write(&lock_file_path, lockfile.to_string()?)?;
            info!("Wrote lockfile to {}", lock_file_path.display());
        }
    }

    Ok(lockfile)
}

pub fn do_clear_cache(cache: &GitCache) -> Result<(), Box<dyn Error>> {
    cache.clear()?;
    Ok(())
}
