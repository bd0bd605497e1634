use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info};

use crate::{
    fetcher::{ensure_single_remote, FetchError, LocalPins, PinFetcher},
    model::{DependencyEdge, ModulePin, PinKey, Reference},
};

use super::{GitCache, RepositoryError};

/// Resolves references against git forges through a [`GitCache`].
///
/// Resolved references and the dependencies declared at each commit are
/// memoized for the lifetime of the fetcher.
#[derive(Clone)]
pub struct GitFetcher {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<GitCache>,
    pins: DashMap<Reference, ModulePin>,
    dependencies: DashMap<PinKey, Vec<Reference>>,
}

impl GitFetcher {
    pub fn new(cache: Arc<GitCache>) -> Self {
        GitFetcher {
            inner: Arc::new(Inner {
                cache,
                pins: DashMap::new(),
                dependencies: DashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl PinFetcher for GitFetcher {
    async fn fetch_local(&self, references: &[Reference]) -> Result<LocalPins, FetchError> {
        ensure_single_remote(references)?;
        let inner = self.inner.clone();
        let references = references.to_vec();
        tokio::task::spawn_blocking(move || inner.fetch_local(&references))
            .await
            .map_err(|error| anyhow::Error::new(error).context("git task failed"))?
    }
}

impl Inner {
    fn fetch_local(&self, references: &[Reference]) -> Result<LocalPins, FetchError> {
        let mut result = LocalPins::default();
        for reference in references {
            let pin = self.pin(reference)?;
            let dependencies = self
                .dependencies(&pin)
                .map_err(|error| into_fetch_error(error, reference))?;
            for dependency in dependencies {
                let to = self
                    .pin(&dependency)
                    .map_err(|source| FetchError::Dependency {
                        reference: reference.clone(),
                        dependency: dependency.clone(),
                        source: Box::new(source),
                    })?;
                result.edges.push(DependencyEdge {
                    from: pin.pin_key(),
                    to,
                });
            }
            result.pins.push(pin);
        }
        Ok(result)
    }

    fn pin(&self, reference: &Reference) -> Result<ModulePin, FetchError> {
        if let Some(pin) = self.pins.get(reference) {
            debug!("{} is already resolved to {}", reference, pin.value());
            return Ok(pin.value().clone());
        }
        let pin = self
            .cache
            .with_repository(&reference.repository, |repository| {
                repository.pin(&reference.revision)
            })
            .map_err(|error| into_fetch_error(error, reference))?;
        info!("Resolved {} to {}", reference, pin);
        self.pins.insert(reference.clone(), pin.clone());
        Ok(pin)
    }

    fn dependencies(&self, pin: &ModulePin) -> Result<Vec<Reference>, RepositoryError> {
        let key = pin.pin_key();
        if let Some(dependencies) = self.dependencies.get(&key) {
            return Ok(dependencies.value().clone());
        }
        let manifest = self
            .cache
            .with_repository(&pin.repository, |repository| repository.manifest(&pin.commit))?;
        let dependencies = manifest.references();
        self.dependencies.insert(key, dependencies.clone());
        Ok(dependencies)
    }
}

fn into_fetch_error(error: RepositoryError, reference: &Reference) -> FetchError {
    match error {
        RepositoryError::RevisionNotFound { .. } | RepositoryError::MissingDefaultBranch { .. } => {
            FetchError::NotFound {
                reference: reference.clone(),
            }
        }
        RepositoryError::InvalidRevision { revision } => FetchError::InvalidReference {
            reference: reference.clone(),
            reason: format!("{revision} is not a valid branch, tag or commit name"),
        },
        error => FetchError::Transport(
            anyhow::Error::new(error).context(format!("Failed to resolve {reference}")),
        ),
    }
}
