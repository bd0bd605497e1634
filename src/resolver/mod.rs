mod error;
mod graph;
mod select;

use std::{
    collections::{btree_map::Entry, BTreeMap, HashMap},
    future::Future,
    sync::Arc,
    time::Duration,
};

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    fetcher::PinFetcher,
    model::{Candidate, ModulePin, Reference, RepositoryKey},
};

pub use error::{CancelReason, Conflict, ResolveError};
pub use select::select_winners;

use graph::build_graph;

/// Every candidate found during traversal, grouped by repository.
pub type CandidateSet = BTreeMap<RepositoryKey, Vec<Candidate>>;

/// Maps each remote host to the fetcher that talks to it.
#[derive(Clone, Default)]
pub struct Remotes {
    fetchers: HashMap<String, Arc<dyn PinFetcher>>,
    fallback: Option<Arc<dyn PinFetcher>>,
}

impl Remotes {
    fn fetcher(&self, remote: &str) -> Result<Arc<dyn PinFetcher>, ResolveError> {
        self.fetchers
            .get(remote)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ResolveError::UnknownRemote {
                remote: remote.to_owned(),
            })
    }
}

#[derive(Default)]
pub struct ResolverBuilder {
    remotes: Remotes,
    timeout: Option<Duration>,
}

impl ResolverBuilder {
    /// Fetcher used for references on `remote`.
    pub fn remote(mut self, remote: impl Into<String>, fetcher: Arc<dyn PinFetcher>) -> Self {
        self.remotes.fetchers.insert(remote.into(), fetcher);
        self
    }

    /// Fetcher used for any remote without a dedicated one.
    pub fn fallback(mut self, fetcher: Arc<dyn PinFetcher>) -> Self {
        self.remotes.fallback = Some(fetcher);
        self
    }

    /// Upper bound on the duration of a single resolution.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Resolver {
        Resolver {
            remotes: self.remotes,
            timeout: self.timeout,
        }
    }
}

/// Turns module references into pins.
///
/// A resolver holds no state between calls, so one instance can serve
/// concurrent resolutions.
pub struct Resolver {
    remotes: Remotes,
    timeout: Option<Duration>,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    /// Resolves `references` and their transitive dependencies to exactly one
    /// pin per repository, sorted by repository.
    ///
    /// Every repository reached during traversal is part of the result, even
    /// one that only a losing commit depends on, so a conflict anywhere in the
    /// graph fails the resolution.
    ///
    /// Fails before any fetch if `references` is empty or names a repository
    /// twice with different refs.
    pub async fn resolve_references(
        &self,
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<Vec<ModulePin>, ResolveError> {
        let seeds = unique_seeds(references)?;
        let graph = self
            .with_deadline(build_graph(&self.remotes, &seeds, cancel))
            .await?;
        let pins = select_winners(&graph.candidates)?;
        info!("Resolved {} module pin(s)", pins.len());
        Ok(pins)
    }

    /// Collects every candidate reachable from `references` without choosing
    /// between competing pins of the same repository.
    pub async fn resolve_local_references(
        &self,
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<CandidateSet, ResolveError> {
        if references.is_empty() {
            return Err(ResolveError::NoReferences);
        }
        let mut seeds: Vec<Reference> = Vec::with_capacity(references.len());
        for reference in references {
            if !seeds.contains(reference) {
                seeds.push(reference.clone());
            }
        }
        let graph = self
            .with_deadline(build_graph(&self.remotes, &seeds, cancel))
            .await?;
        Ok(graph.candidates)
    }

    async fn with_deadline<T>(
        &self,
        future: impl Future<Output = Result<T, ResolveError>>,
    ) -> Result<T, ResolveError> {
        match self.timeout {
            None => future.await,
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .map_err(|_| ResolveError::Cancelled(CancelReason::TimedOut(timeout)))?,
        }
    }
}

/// Drops identical duplicates and rejects the same repository requested with
/// different refs.
fn unique_seeds(references: &[Reference]) -> Result<Vec<Reference>, ResolveError> {
    if references.is_empty() {
        return Err(ResolveError::NoReferences);
    }
    let mut seen: BTreeMap<&RepositoryKey, &Reference> = BTreeMap::new();
    let mut seeds = Vec::with_capacity(references.len());
    for reference in references {
        match seen.entry(&reference.repository) {
            Entry::Vacant(entry) => {
                entry.insert(reference);
                seeds.push(reference.clone());
            }
            Entry::Occupied(entry) if entry.get().revision == reference.revision => {
                debug!("Ignoring duplicate reference {}", reference);
            }
            Entry::Occupied(entry) => {
                return Err(ResolveError::DuplicateReferenceConflict {
                    first: (*entry.get()).clone(),
                    second: reference.clone(),
                })
            }
        }
    }
    Ok(seeds)
}
